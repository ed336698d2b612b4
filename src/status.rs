use crate::jobs::Pid;

/// A child state change reported by `waitpid`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ChildEvent {
    Exited { pid: Pid, code: i32 },
    Signaled { pid: Pid, signal: i32 },
    Stopped { pid: Pid, signal: i32 },
    Continued { pid: Pid },
}

impl ChildEvent {
    pub fn pid(&self) -> Pid {
        match *self {
            ChildEvent::Exited { pid, .. }
            | ChildEvent::Signaled { pid, .. }
            | ChildEvent::Stopped { pid, .. }
            | ChildEvent::Continued { pid } => pid,
        }
    }

    /// Shell-style status of a finished process: the exit code, or
    /// `128 + signal` when it was killed.
    pub fn exit_code(&self) -> Option<i32> {
        match *self {
            ChildEvent::Exited { code, .. } => Some(code),
            ChildEvent::Signaled { signal, .. } => Some(128 + signal),
            _ => None,
        }
    }
}

/// Decode a raw `waitpid` status for `pid`.
pub fn decode(pid: Pid, raw_status: libc::c_int) -> Option<ChildEvent> {
    if unsafe { libc::WIFEXITED(raw_status) } {
        return Some(ChildEvent::Exited {
            pid,
            code: unsafe { libc::WEXITSTATUS(raw_status) },
        });
    }

    if unsafe { libc::WIFSIGNALED(raw_status) } {
        return Some(ChildEvent::Signaled {
            pid,
            signal: unsafe { libc::WTERMSIG(raw_status) },
        });
    }

    if unsafe { libc::WIFSTOPPED(raw_status) } {
        return Some(ChildEvent::Stopped {
            pid,
            signal: unsafe { libc::WSTOPSIG(raw_status) },
        });
    }

    if unsafe { libc::WIFCONTINUED(raw_status) } {
        return Some(ChildEvent::Continued { pid });
    }

    None
}

// The raw encodings below are the Linux/glibc layout.
#[cfg(all(test, target_os = "linux"))]
mod tests {
    use super::*;

    #[test]
    fn exit_status() {
        assert_eq!(
            decode(7, 3 << 8),
            Some(ChildEvent::Exited { pid: 7, code: 3 })
        );
        assert_eq!(decode(7, 3 << 8).and_then(|e| e.exit_code()), Some(3));
    }

    #[test]
    fn killed_by_signal() {
        let event = decode(7, libc::SIGKILL).unwrap();
        assert_eq!(
            event,
            ChildEvent::Signaled {
                pid: 7,
                signal: libc::SIGKILL
            }
        );
        assert_eq!(event.exit_code(), Some(128 + libc::SIGKILL));
    }

    #[test]
    fn stopped_by_signal() {
        let event = decode(7, (libc::SIGTSTP << 8) | 0x7f).unwrap();
        assert_eq!(
            event,
            ChildEvent::Stopped {
                pid: 7,
                signal: libc::SIGTSTP
            }
        );
        assert_eq!(event.exit_code(), None);
    }

    #[test]
    fn continued() {
        assert_eq!(decode(7, 0xffff), Some(ChildEvent::Continued { pid: 7 }));
    }
}
