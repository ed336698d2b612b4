//! Ownership of the controlling terminal's foreground process group.

use std::io;

use crate::jobs::Pid;

/// Whether the shell reads from a terminal.
pub fn is_interactive() -> bool {
    unsafe { libc::isatty(libc::STDIN_FILENO) == 1 }
}

/// Put the shell in its own process group and make that group the
/// terminal's foreground group.
pub fn take_control() -> io::Result<()> {
    let pid = unsafe { libc::getpid() };
    if unsafe { libc::getpgrp() } != pid {
        // EPERM here means the shell already leads its session.
        if unsafe { libc::setpgid(0, 0) } != 0 {
            let err = io::Error::last_os_error();
            if err.raw_os_error() != Some(libc::EPERM) {
                return Err(err);
            }
        }
    }
    set_terminal_foreground(libc::STDIN_FILENO, unsafe { libc::getpgrp() })
}

/// Hands the terminal to a job and takes it back on drop.
///
/// A no-op when standard input is not a terminal.
pub(crate) struct ForegroundTerminal {
    tty_fd: Option<libc::c_int>,
    shell_pgid: Pid,
}

impl ForegroundTerminal {
    pub(crate) fn hand_to(target_pgid: Pid) -> io::Result<Self> {
        let tty_fd = is_interactive().then_some(libc::STDIN_FILENO);
        let shell_pgid = unsafe { libc::getpgrp() };
        let guard = Self { tty_fd, shell_pgid };

        if let Some(fd) = guard.tty_fd {
            set_terminal_foreground(fd, target_pgid)?;
        }
        #[cfg(test)]
        testing::HANDED.set(Some(target_pgid));

        Ok(guard)
    }
}

impl Drop for ForegroundTerminal {
    fn drop(&mut self) {
        #[cfg(test)]
        testing::HANDED.set(None);
        if let Some(fd) = self.tty_fd {
            if let Err(e) = set_terminal_foreground(fd, self.shell_pgid) {
                tracing::warn!(error = %e, "cannot take the terminal back");
            }
        }
    }
}

/// Make the calling child's group the terminal's foreground group.
///
/// Runs between `fork` and `exec`, while `SIGTTOU` is still ignored.
pub(crate) fn claim_in_child() {
    unsafe {
        libc::tcsetpgrp(libc::STDIN_FILENO, libc::getpgrp());
    }
}

struct SignalIgnoreGuard {
    signal: libc::c_int,
    previous: libc::sighandler_t,
}

impl SignalIgnoreGuard {
    fn ignore(signal: libc::c_int) -> io::Result<Self> {
        let previous = unsafe { libc::signal(signal, libc::SIG_IGN) };
        if previous == libc::SIG_ERR {
            return Err(io::Error::last_os_error());
        }
        Ok(Self { signal, previous })
    }
}

impl Drop for SignalIgnoreGuard {
    fn drop(&mut self) {
        unsafe {
            libc::signal(self.signal, self.previous);
        }
    }
}

fn set_terminal_foreground(fd: libc::c_int, pgid: Pid) -> io::Result<()> {
    if pgid <= 0 {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            "invalid process group id",
        ));
    }

    let _sigttou = SignalIgnoreGuard::ignore(libc::SIGTTOU)?;
    loop {
        let rc = unsafe { libc::tcsetpgrp(fd, pgid) };
        if rc == 0 {
            return Ok(());
        }

        let err = io::Error::last_os_error();
        if err.raw_os_error() == Some(libc::EINTR) {
            continue;
        }
        return Err(err);
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use std::cell::Cell;

    use crate::jobs::Pid;

    thread_local! {
        pub(super) static HANDED: Cell<Option<Pid>> = const { Cell::new(None) };
    }

    /// The group this thread's live [`super::ForegroundTerminal`] handed the
    /// terminal to, tty or not.
    pub(crate) fn handed_to() -> Option<Pid> {
        HANDED.get()
    }
}
