//! Signal plumbing: the shell's own dispositions, the `SIGCHLD` mask, and
//! group-directed signals for job control.

use std::io;
use std::mem::MaybeUninit;

use crate::jobs::Pid;

/// Signals whose disposition the shell changes and a child must restore.
pub(crate) const CUSTOMIZED_SIGNALS: [libc::c_int; 7] = [
    libc::SIGINT,
    libc::SIGQUIT,
    libc::SIGTSTP,
    libc::SIGTTIN,
    libc::SIGTTOU,
    libc::SIGPIPE,
    libc::SIGCHLD,
];

/// Sends signals to whole process groups.
pub trait GroupSignaller {
    fn signal_group(&mut self, pgid: Pid, signal: libc::c_int) -> io::Result<()>;
}

/// [`GroupSignaller`] backed by `kill(2)`.
#[derive(Debug, Default, Clone, Copy)]
pub struct Kill;

impl GroupSignaller for Kill {
    fn signal_group(&mut self, pgid: Pid, signal: libc::c_int) -> io::Result<()> {
        if pgid <= 0 {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "invalid process group id",
            ));
        }

        loop {
            let rc = unsafe { libc::kill(-pgid, signal) };
            if rc == 0 {
                tracing::debug!(pgid, signal, "signalled process group");
                return Ok(());
            }

            let err = io::Error::last_os_error();
            if err.raw_os_error() == Some(libc::EINTR) {
                continue;
            }
            return Err(err);
        }
    }
}

fn child_signal_set() -> io::Result<libc::sigset_t> {
    let mut set = MaybeUninit::<libc::sigset_t>::uninit();
    unsafe {
        if libc::sigemptyset(set.as_mut_ptr()) != 0
            || libc::sigaddset(set.as_mut_ptr(), libc::SIGCHLD) != 0
        {
            return Err(io::Error::last_os_error());
        }
        Ok(set.assume_init())
    }
}

/// Block `SIGCHLD` in the calling thread.
///
/// Threads spawned afterwards inherit the mask, so calling this before any
/// thread exists leaves [`wait_child_signal`] as the only consumer.
pub fn block_child_signal() -> io::Result<()> {
    let set = child_signal_set()?;
    let rc = unsafe { libc::pthread_sigmask(libc::SIG_BLOCK, &set, std::ptr::null_mut()) };
    if rc != 0 {
        return Err(io::Error::from_raw_os_error(rc));
    }
    Ok(())
}

/// Sleep until a `SIGCHLD` is pending, then consume it.
pub fn wait_child_signal() -> io::Result<()> {
    let set = child_signal_set()?;
    let mut received: libc::c_int = 0;
    loop {
        let rc = unsafe { libc::sigwait(&set, &mut received) };
        match rc {
            0 => return Ok(()),
            libc::EINTR => continue,
            code => return Err(io::Error::from_raw_os_error(code)),
        }
    }
}

/// Make the shell immune to the terminal's stop signals and to `SIGPIPE`.
pub fn ignore_job_control_signals() -> io::Result<()> {
    for signal in [libc::SIGTSTP, libc::SIGTTIN, libc::SIGTTOU, libc::SIGPIPE] {
        if unsafe { libc::signal(signal, libc::SIG_IGN) } == libc::SIG_ERR {
            return Err(io::Error::last_os_error());
        }
    }
    Ok(())
}

/// Restore default dispositions and an empty signal mask.
///
/// Runs in a freshly forked child: only async-signal-safe calls.
pub(crate) fn reset_for_exec() {
    unsafe {
        for signal in CUSTOMIZED_SIGNALS {
            libc::signal(signal, libc::SIG_DFL);
        }
        let mut empty = MaybeUninit::<libc::sigset_t>::uninit();
        libc::sigemptyset(empty.as_mut_ptr());
        libc::sigprocmask(libc::SIG_SETMASK, empty.as_ptr(), std::ptr::null_mut());
    }
}

pub(crate) fn set_process_group(pid: Pid, pgid: Pid) -> io::Result<()> {
    loop {
        let rc = unsafe { libc::setpgid(pid, pgid) };
        if rc == 0 {
            return Ok(());
        }

        let err = io::Error::last_os_error();
        match err.raw_os_error() {
            Some(code) if code == libc::EINTR => continue,
            // The child already exec'd or is gone; it set its own group first.
            Some(code) if code == libc::EACCES || code == libc::ESRCH => return Ok(()),
            _ => return Err(err),
        }
    }
}
