//! The job table as shared between the interpreter and the notification
//! bridge, and the foreground waiter built on it.

use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};

use crate::jobs::{JobState, JobTable, Pid};
use crate::signal::GroupSignaller;
use crate::terminal::ForegroundTerminal;

/// The job table plus a condition signalled whenever it changes.
///
/// Holding the guard returned by [`JobControl::lock`] defers every child
/// state notification: the bridge applies events only under the same lock.
#[derive(Debug)]
pub struct JobControl {
    table: Mutex<JobTable>,
    changed: Condvar,
}

impl JobControl {
    pub fn new(table: JobTable) -> Self {
        Self {
            table: Mutex::new(table),
            changed: Condvar::new(),
        }
    }

    pub fn lock(&self) -> MutexGuard<'_, JobTable> {
        self.table.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Wake anyone blocked in [`JobControl::wait_foreground`].
    pub fn notify(&self) {
        self.changed.notify_all();
    }

    /// Block until no job is in the foreground.
    pub fn wait_foreground(&self) {
        let mut table = self.lock();
        while let Some(id) = table.find_foreground().map(|job| job.id()) {
            tracing::trace!(job = %id, "waiting for foreground job");
            table = self
                .changed
                .wait(table)
                .unwrap_or_else(PoisonError::into_inner);
        }
    }
}

/// Give the terminal to `pgid`, when there is one to give.
///
/// The terminal comes back to the shell when the guard drops.
pub(crate) fn hand_terminal(pgid: Pid) -> Option<ForegroundTerminal> {
    match ForegroundTerminal::hand_to(pgid) {
        Ok(guard) => Some(guard),
        Err(e) => {
            tracing::warn!(pgid, error = %e, "cannot hand terminal to job");
            None
        }
    }
}

/// Give the terminal to `pgid` and wait until its job leaves the
/// foreground. The shell takes the terminal back on return.
pub fn run_foreground(control: &JobControl, pgid: Pid) {
    let _terminal = hand_terminal(pgid);
    control.wait_foreground();
}

/// Send `SIGHUP` to every remaining job, then `SIGCONT` to the stopped
/// ones so they can act on it.
pub fn hang_up_all(control: &JobControl, signaller: &mut dyn GroupSignaller) {
    let table = control.lock();
    for job in table.iter() {
        if let Err(e) = signaller.signal_group(job.pgid(), libc::SIGHUP) {
            tracing::debug!(job = %job.id(), error = %e, "hangup not delivered");
        }
        if job.state() == JobState::Stopped {
            if let Err(e) = signaller.signal_group(job.pgid(), libc::SIGCONT) {
                tracing::debug!(job = %job.id(), error = %e, "continue not delivered");
            }
        }
    }
}
