//! The notification bridge: reaps child state changes and folds them into
//! the job table.
//!
//! `SIGCHLD` is blocked in every thread and consumed by one dedicated thread
//! with `sigwait`, so events are applied one drain at a time, always under
//! the table lock.

use std::fmt;
use std::io::{self, Write};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crate::control::JobControl;
use crate::jobs::{Job, JobId, JobState, JobTable, Pid};
use crate::signal;
use crate::status::{self, ChildEvent};

/// A job transition worth telling the user about.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Announcement {
    Stopped(Job),
    Done { id: JobId, pid: Pid, command: String },
}

impl fmt::Display for Announcement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Announcement::Stopped(job) => job.fmt(f),
            Announcement::Done { id, pid, command } => write!(f, "[{id}] {pid} Done {command}"),
        }
    }
}

/// Apply one child event to the table.
///
/// Events for pids the table does not know are ignored. A finished job is
/// always removed; it is announced as done only if it was running in the
/// background when it finished.
pub fn apply(table: &mut JobTable, event: ChildEvent) -> Option<Announcement> {
    let pid = event.pid();
    let Some(job) = table.find_by_pid(pid) else {
        tracing::trace!(pid, ?event, "event for untracked process");
        return None;
    };
    let id = job.id();

    match event {
        ChildEvent::Stopped { .. } => {
            table.set_state(id, JobState::Stopped).ok()?;
            table.find_by_id(id).cloned().map(Announcement::Stopped)
        }
        ChildEvent::Continued { .. } => {
            if job.state() == JobState::Stopped {
                table.set_state(id, JobState::Running).ok()?;
            }
            None
        }
        ChildEvent::Exited { .. } | ChildEvent::Signaled { .. } => {
            let job = table.remove_by_pid(pid).ok()?;
            tracing::debug!(job = %id, pid, status = ?event.exit_code(), "job finished");
            (job.state() == JobState::Running).then(|| Announcement::Done {
                id,
                pid,
                command: job.command().to_string(),
            })
        }
    }
}

/// Reap every pending child state change without blocking and apply it.
///
/// Announcements are written after the table lock is released.
pub fn drain(control: &JobControl, out: &mut dyn Write) {
    let mut announcements = Vec::new();
    {
        let mut table = control.lock();
        loop {
            let mut raw_status: libc::c_int = 0;
            let pid = unsafe {
                libc::waitpid(
                    -1,
                    &mut raw_status,
                    libc::WNOHANG | libc::WUNTRACED | libc::WCONTINUED,
                )
            };
            if pid == 0 {
                break;
            }
            if pid < 0 {
                let err = io::Error::last_os_error();
                match err.raw_os_error() {
                    Some(libc::EINTR) => continue,
                    Some(libc::ECHILD) => {}
                    _ => tracing::warn!(error = %err, "waitpid failed"),
                }
                break;
            }
            if let Some(note) = status::decode(pid, raw_status).and_then(|e| apply(&mut table, e)) {
                announcements.push(note);
            }
        }
    }
    control.notify();

    for note in announcements {
        let _ = writeln!(out, "{note}");
    }
    let _ = out.flush();
}

/// Start the bridge thread.
///
/// Must run before any other thread is spawned so that every thread
/// inherits the blocked `SIGCHLD`.
pub fn install(control: Arc<JobControl>) -> io::Result<JoinHandle<()>> {
    signal::block_child_signal()?;
    thread::Builder::new()
        .name("child-watch".to_string())
        .spawn(move || {
            loop {
                if let Err(e) = signal::wait_child_signal() {
                    tracing::error!(error = %e, "cannot wait for child signals");
                    return;
                }
                drain(&control, &mut io::stdout());
            }
        })
}
