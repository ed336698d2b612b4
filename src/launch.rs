//! Process creation for simple commands and pipelines.
//!
//! Every job gets its own process group led by its first process. The table
//! lock is held from before the first `fork` until the job is registered, so
//! the bridge can never see a state change for a pid the table does not yet
//! know.

use std::ffi::{CString, c_char};
use std::io;
use std::os::fd::{AsRawFd, RawFd};

use thiserror::Error;

use crate::cmdline::CommandLine;
use crate::control::JobControl;
use crate::jobs::{JobError, JobId, JobState, Pid};
use crate::signal::{self, GroupSignaller, Kill};
use crate::terminal;

/// Exit status of a child whose program could not be found or executed.
pub const EXIT_NOT_FOUND: i32 = 127;

/// Exit status of a child whose redirection could not be opened.
pub const EXIT_REDIRECT_FAILED: i32 = 126;

#[derive(Debug, Error)]
pub enum LaunchError {
    #[error("nothing to run")]
    EmptyCommand,

    #[error("{0}: argument contains a NUL byte")]
    NulInArgument(String),

    #[error("cannot create pipe: {0}")]
    Pipe(#[source] io::Error),

    #[error("cannot fork: {0}")]
    Fork(#[source] io::Error),

    #[error(transparent)]
    Job(#[from] JobError),
}

/// Result of a successful launch.
#[derive(Debug)]
pub struct Launched {
    pub id: JobId,
    /// Pid of the first stage; also the job's process group.
    pub pid: Pid,
    /// Every stage's pid, in pipeline order.
    pub stage_pids: Vec<Pid>,
    pub background: bool,
}

/// One stage's argument vector, converted before forking.
struct Stage {
    argv: Vec<CString>,
    argv_ptrs: Vec<*const c_char>,
}

impl Stage {
    fn new(words: &[String]) -> Result<Self, LaunchError> {
        let argv = words
            .iter()
            .map(|word| c_string(word))
            .collect::<Result<Vec<_>, _>>()?;
        if argv.is_empty() {
            return Err(LaunchError::EmptyCommand);
        }
        let argv_ptrs = argv
            .iter()
            .map(|arg| arg.as_ptr())
            .chain(std::iter::once(std::ptr::null()))
            .collect();
        Ok(Self { argv, argv_ptrs })
    }
}

/// Everything a child needs, prepared so the child never allocates.
struct Plan {
    stages: Vec<Stage>,
    input: Option<CString>,
    output: Option<CString>,
    claim_terminal: bool,
}

fn c_string(s: &str) -> Result<CString, LaunchError> {
    CString::new(s).map_err(|_| LaunchError::NulInArgument(s.to_string()))
}

/// Start the processes for `line` and register them as one job.
///
/// A foreground job is registered as [`JobState::Foreground`]; the caller
/// then waits for it with [`crate::control::run_foreground`].
pub fn launch(control: &JobControl, line: &CommandLine) -> Result<Launched, LaunchError> {
    if line.stages.is_empty() {
        return Err(LaunchError::EmptyCommand);
    }
    let plan = Plan {
        stages: line
            .stages
            .iter()
            .map(|words| Stage::new(words))
            .collect::<Result<_, _>>()?,
        input: line.input.as_deref().map(c_string).transpose()?,
        output: line.output.as_deref().map(c_string).transpose()?,
        claim_terminal: !line.background && terminal::is_interactive(),
    };
    let state = if line.background {
        JobState::Running
    } else {
        JobState::Foreground
    };
    let command = line.display_text();

    let pipes = (1..plan.stages.len())
        .map(|_| os_pipe::pipe())
        .collect::<io::Result<Vec<_>>>()
        .map_err(LaunchError::Pipe)?;
    let pipe_fds: Vec<(RawFd, RawFd)> = pipes
        .iter()
        .map(|(reader, writer)| (reader.as_raw_fd(), writer.as_raw_fd()))
        .collect();

    let mut table = control.lock();
    table.check_room(state)?;

    let mut stage_pids: Vec<Pid> = Vec::with_capacity(plan.stages.len());
    for index in 0..plan.stages.len() {
        let group = stage_pids.first().copied().unwrap_or(0);
        match unsafe { libc::fork() } {
            -1 => {
                let err = io::Error::last_os_error();
                if group > 0 {
                    let _ = Kill.signal_group(group, libc::SIGKILL);
                }
                return Err(LaunchError::Fork(err));
            }
            0 => exec_stage(&plan, index, group, &pipe_fds),
            pid => {
                // Also set from the parent, so the group exists before the
                // next stage tries to join it.
                let pgid = if index == 0 { pid } else { group };
                if let Err(e) = signal::set_process_group(pid, pgid) {
                    tracing::warn!(pid, pgid, error = %e, "setpgid failed");
                }
                stage_pids.push(pid);
            }
        }
    }
    drop(pipes);

    let pid = stage_pids[0];
    let id = table.allocate(pid, pid, state, &command)?;
    drop(table);

    tracing::debug!(job = %id, pid, stages = stage_pids.len(), background = line.background, "launched");
    Ok(Launched {
        id,
        pid,
        stage_pids,
        background: line.background,
    })
}

/// Child side of one pipeline stage. Only async-signal-safe calls.
fn exec_stage(plan: &Plan, index: usize, group: Pid, pipe_fds: &[(RawFd, RawFd)]) -> ! {
    let last = plan.stages.len() - 1;
    unsafe {
        libc::setpgid(0, group);
        if index == 0 && plan.claim_terminal {
            terminal::claim_in_child();
        }
        signal::reset_for_exec();

        if index > 0 {
            wire(pipe_fds[index - 1].0, libc::STDIN_FILENO);
        } else if let Some(path) = &plan.input {
            redirect(path, libc::O_RDONLY, libc::STDIN_FILENO);
        }
        if index < last {
            wire(pipe_fds[index].1, libc::STDOUT_FILENO);
        } else if let Some(path) = &plan.output {
            redirect(
                path,
                libc::O_WRONLY | libc::O_CREAT | libc::O_TRUNC,
                libc::STDOUT_FILENO,
            );
        }
        for &(read, write) in pipe_fds {
            libc::close(read);
            libc::close(write);
        }

        let stage = &plan.stages[index];
        libc::execvp(stage.argv_ptrs[0], stage.argv_ptrs.as_ptr());

        let name = stage.argv[0].as_bytes();
        match last_errno() {
            libc::ENOENT => report(&[name, b": command not found"]),
            errno => report(&[name, b": ", cause(errno, "cannot execute").as_bytes()]),
        }
        libc::_exit(EXIT_NOT_FOUND)
    }
}

/// Open `path` onto `target`, or end the child.
unsafe fn redirect(path: &CString, flags: libc::c_int, target: libc::c_int) {
    unsafe {
        let fd = libc::open(path.as_ptr(), flags | libc::O_CLOEXEC, 0o666 as libc::c_uint);
        if fd < 0 {
            let why = cause(last_errno(), "cannot open file");
            report(&[path.as_bytes(), b": ", why.as_bytes()]);
            libc::_exit(EXIT_REDIRECT_FAILED);
        }
        wire(fd, target);
        libc::close(fd);
    }
}

/// Duplicate `fd` onto `target`, or end the child.
unsafe fn wire(fd: libc::c_int, target: libc::c_int) {
    unsafe {
        loop {
            if libc::dup2(fd, target) >= 0 {
                return;
            }
            let errno = last_errno();
            if errno != libc::EINTR {
                let why = cause(errno, "bad file descriptor");
                report(&[b"cannot wire standard streams: ", why.as_bytes()]);
                libc::_exit(EXIT_REDIRECT_FAILED);
            }
        }
    }
}

fn last_errno() -> libc::c_int {
    io::Error::last_os_error().raw_os_error().unwrap_or(0)
}

fn cause(errno: libc::c_int, fallback: &'static str) -> &'static str {
    match errno {
        libc::EACCES => "Permission denied",
        libc::ENOENT => "No such file or directory",
        libc::ENOTDIR => "Not a directory",
        libc::EISDIR => "Is a directory",
        _ => fallback,
    }
}

/// Write `jobsh: <parts>\n` to stderr with `write(2)`.
fn report(parts: &[&[u8]]) {
    write_stderr(b"jobsh: ");
    for part in parts {
        write_stderr(part);
    }
    write_stderr(b"\n");
}

fn write_stderr(mut buf: &[u8]) {
    while !buf.is_empty() {
        let n = unsafe { libc::write(libc::STDERR_FILENO, buf.as_ptr().cast(), buf.len()) };
        if n < 0 {
            if last_errno() == libc::EINTR {
                continue;
            }
            return;
        }
        buf = &buf[n as usize..];
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cmdline;
    use crate::jobs::JobTable;
    use crate::status::{self, ChildEvent};
    use assert_matches::assert_matches;

    fn control(capacity: usize) -> JobControl {
        JobControl::new(JobTable::new(capacity, 256))
    }

    fn wait_for(pid: Pid) -> ChildEvent {
        let mut raw_status = 0;
        let rc = unsafe { libc::waitpid(pid, &mut raw_status, 0) };
        assert_eq!(rc, pid, "waitpid failed: {}", io::Error::last_os_error());
        status::decode(pid, raw_status).unwrap()
    }

    fn kill_and_reap(launched: &Launched) {
        unsafe { libc::kill(-launched.pid, libc::SIGKILL) };
        for &pid in &launched.stage_pids {
            wait_for(pid);
        }
    }

    #[test]
    fn background_command_registers_running_job() {
        let control = control(4);
        let launched = launch(&control, &cmdline::parse("sleep 5 &")).unwrap();

        {
            let table = control.lock();
            let job = table.find_by_id(launched.id).unwrap();
            assert_eq!(job.pid(), launched.pid);
            assert_eq!(job.pgid(), launched.pid);
            assert_eq!(job.state(), JobState::Running);
            assert_eq!(job.command(), "sleep 5");
        }
        assert_eq!(unsafe { libc::getpgid(launched.pid) }, launched.pid);
        kill_and_reap(&launched);
    }

    #[test]
    fn pipeline_is_one_job_in_one_group() {
        let control = control(4);
        let launched =
            launch(&control, &cmdline::parse("sleep 5 | sleep 5 | sleep 5 &")).unwrap();

        assert_eq!(launched.stage_pids.len(), 3);
        assert_eq!(launched.stage_pids[0], launched.pid);
        for &pid in &launched.stage_pids {
            assert_eq!(unsafe { libc::getpgid(pid) }, launched.pid);
        }
        {
            let table = control.lock();
            assert_eq!(table.len(), 1);
            let job = table.find_by_pid(launched.pid).unwrap();
            assert_eq!(job.command(), "sleep 5 | sleep 5 | sleep 5");
        }
        kill_and_reap(&launched);
    }

    #[test]
    fn full_table_refuses_before_forking() {
        let control = control(1);
        control
            .lock()
            .allocate(999_999, 999_999, JobState::Stopped, "held")
            .unwrap();

        let result = launch(&control, &cmdline::parse("true &"));
        assert_matches!(result, Err(LaunchError::Job(JobError::TableFull)));

        let table = control.lock();
        assert_eq!(table.len(), 1);
        assert!(table.find_by_pid(999_999).is_some());
    }

    #[test]
    fn missing_program_exits_with_reserved_status() {
        let control = control(4);
        let launched =
            launch(&control, &cmdline::parse("jobsh-test-no-such-program &")).unwrap();
        assert_eq!(
            wait_for(launched.pid),
            ChildEvent::Exited {
                pid: launched.pid,
                code: EXIT_NOT_FOUND
            }
        );
    }

    #[test]
    fn unopenable_redirections_exit_with_reserved_status() {
        let control = control(4);
        for input in [
            "cat < /nonexistent-jobsh-dir/input &",
            "true > / &",
        ] {
            let launched = launch(&control, &cmdline::parse(input)).unwrap();
            assert_eq!(
                wait_for(launched.pid).exit_code(),
                Some(EXIT_REDIRECT_FAILED),
                "{input}"
            );
        }
    }

    #[test]
    fn redirections_wire_first_and_last_stage() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("in.txt");
        let output = dir.path().join("out.txt");
        std::fs::write(&input, "hello\n").unwrap();

        let control = control(4);
        let line = format!(
            "cat < {} | tr a-z A-Z | cat > {} &",
            input.display(),
            output.display()
        );
        let launched = launch(&control, &cmdline::parse(&line)).unwrap();
        for &pid in &launched.stage_pids {
            assert_eq!(wait_for(pid).exit_code(), Some(0));
        }
        assert_eq!(std::fs::read_to_string(&output).unwrap(), "HELLO\n");
    }

    #[test]
    fn failed_descriptor_wiring_ends_the_child() {
        let pid = unsafe { libc::fork() };
        assert!(pid >= 0, "fork failed: {}", io::Error::last_os_error());
        if pid == 0 {
            unsafe {
                wire(-1, libc::STDIN_FILENO);
                libc::_exit(0)
            }
        }
        assert_eq!(wait_for(pid).exit_code(), Some(EXIT_REDIRECT_FAILED));
    }

    #[test]
    fn nul_byte_is_rejected() {
        let control = control(4);
        let line = CommandLine {
            stages: vec![vec!["echo".to_string(), "a\0b".to_string()]],
            ..CommandLine::default()
        };
        assert_matches!(launch(&control, &line), Err(LaunchError::NulInArgument(_)));
        assert!(control.lock().is_empty());
    }
}
