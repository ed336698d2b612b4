use std::io::Write;

use crate::control::{self, JobControl};
use crate::jobs::{JobError, JobId, JobState, JobTable};
use crate::signal::GroupSignaller;

/// The list of all builtin command names.
const BUILTINS: &[&str] = &["jobs", "fg", "bg", "stop"];

/// Returns true if the command name is a shell builtin.
pub fn is_builtin(name: &str) -> bool {
    BUILTINS.contains(&name)
}

/// Run builtin `name` with its optional job token, writing output to the
/// provided streams. Returns the exit code.
pub fn execute(
    name: &str,
    token: Option<&str>,
    control: &JobControl,
    signaller: &mut dyn GroupSignaller,
    stdout: &mut dyn Write,
    stderr: &mut dyn Write,
) -> i32 {
    match name {
        "jobs" => builtin_jobs(control, stdout),
        "fg" => builtin_fg(token, control, signaller, stdout, stderr),
        "bg" => builtin_bg(token, control, signaller, stdout, stderr),
        "stop" => builtin_stop(token, control, signaller, stderr),
        _ => {
            let _ = writeln!(stderr, "jobsh: unknown builtin: {name}");
            1
        }
    }
}

/// List all tracked jobs, in table order.
fn builtin_jobs(control: &JobControl, stdout: &mut dyn Write) -> i32 {
    let table = control.lock();
    for job in table.iter() {
        let _ = writeln!(stdout, "{job}");
    }
    0
}

/// Continue a job in the foreground and wait for it to leave the foreground.
///
/// The terminal goes to the job before it is continued, so it never wakes up
/// in a background group.
fn builtin_fg(
    token: Option<&str>,
    control: &JobControl,
    signaller: &mut dyn GroupSignaller,
    stdout: &mut dyn Write,
    stderr: &mut dyn Write,
) -> i32 {
    let mut table = control.lock();
    let Some(id) = resolve("fg", token, &table, stderr) else {
        return 1;
    };
    let Some(job) = table.find_by_id(id) else {
        return 1;
    };
    let (pgid, previous) = (job.pgid(), job.state());
    let _ = writeln!(stdout, "{}", job.command());

    if let Err(e) = table.set_state(id, JobState::Foreground) {
        let _ = writeln!(stderr, "fg: {e}");
        return 1;
    }
    let terminal = control::hand_terminal(pgid);
    if let Err(e) = signaller.signal_group(pgid, libc::SIGCONT) {
        drop(terminal);
        let _ = table.set_state(id, previous);
        let _ = writeln!(stderr, "fg: cannot continue job [{id}]: {e}");
        return 1;
    }
    drop(table);

    control.wait_foreground();
    drop(terminal);
    0
}

/// Continue a job in the background.
fn builtin_bg(
    token: Option<&str>,
    control: &JobControl,
    signaller: &mut dyn GroupSignaller,
    stdout: &mut dyn Write,
    stderr: &mut dyn Write,
) -> i32 {
    let mut table = control.lock();
    let Some(id) = resolve("bg", token, &table, stderr) else {
        return 1;
    };
    let Some(job) = table.find_by_id(id) else {
        return 1;
    };
    let (pgid, previous) = (job.pgid(), job.state());

    if let Err(e) = table.set_state(id, JobState::Running) {
        let _ = writeln!(stderr, "bg: {e}");
        return 1;
    }
    if let Err(e) = signaller.signal_group(pgid, libc::SIGCONT) {
        let _ = table.set_state(id, previous);
        let _ = writeln!(stderr, "bg: cannot continue job [{id}]: {e}");
        return 1;
    }
    if let Some(job) = table.find_by_id(id) {
        let _ = writeln!(stdout, "{job}");
    }
    drop(table);
    control.notify();
    0
}

/// Suspend a job. The table learns about it from the bridge.
fn builtin_stop(
    token: Option<&str>,
    control: &JobControl,
    signaller: &mut dyn GroupSignaller,
    stderr: &mut dyn Write,
) -> i32 {
    let table = control.lock();
    let Some(id) = resolve("stop", token, &table, stderr) else {
        return 1;
    };
    let Some(job) = table.find_by_id(id) else {
        return 1;
    };

    if let Err(e) = signaller.signal_group(job.pgid(), libc::SIGSTOP) {
        let _ = writeln!(stderr, "stop: cannot stop job [{id}]: {e}");
        return 1;
    }
    0
}

// ── Helpers ──

/// Resolve the builtin's token, reporting a missing or unknown job.
fn resolve(
    builtin: &str,
    token: Option<&str>,
    table: &JobTable,
    stderr: &mut dyn Write,
) -> Option<JobId> {
    let Some(token) = token else {
        let _ = writeln!(stderr, "{builtin}: job id required (%<job> or <pid>)");
        return None;
    };
    match table.resolve_token(token) {
        Ok(id) => Some(id),
        Err(JobError::NotFound) => {
            let _ = writeln!(stderr, "{builtin}: {token}: no such job");
            None
        }
        Err(e) => {
            let _ = writeln!(stderr, "{builtin}: {token}: {e}");
            None
        }
    }
}
