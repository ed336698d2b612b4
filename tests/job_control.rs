#![cfg(unix)]

use std::io::Write;
use std::process::{Command, Stdio};

fn run_shell_with_env(lines: &[&str], env: &[(&str, &str)]) -> std::process::Output {
    let mut child = Command::new(env!("CARGO_BIN_EXE_jobsh"))
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .envs(env.iter().copied())
        .spawn()
        .expect("spawn jobsh");

    {
        let stdin = child.stdin.as_mut().expect("stdin");
        for line in lines {
            writeln!(stdin, "{line}").expect("write line");
        }
    }
    drop(child.stdin.take());

    child.wait_with_output().expect("wait output")
}

fn run_shell(lines: &[&str]) -> std::process::Output {
    run_shell_with_env(lines, &[])
}

#[test]
fn background_job_is_listed_and_reported_done_once() {
    let output = run_shell(&["sleep 0.3 &", "jobs", "sleep 1"]);
    let stdout = String::from_utf8_lossy(&output.stdout);

    assert!(stdout.contains("[1] "), "stdout was: {stdout}");
    assert!(stdout.contains(" Running sleep 0.3"), "stdout was: {stdout}");
    assert_eq!(
        stdout.matches(" Done sleep 0.3").count(),
        1,
        "stdout was: {stdout}"
    );
    assert!(output.status.success());
}

#[test]
fn job_ids_are_recycled() {
    let output = run_shell(&["sleep 0.2 &", "sleep 0.6", "sleep 5 &", "jobs"]);
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains(" Running sleep 5"), "stdout was: {stdout}");
    let listing = stdout
        .lines()
        .find(|line| line.contains("Running sleep 5"))
        .unwrap_or_default();
    assert!(listing.contains("[1] "), "listing was: {listing}");
}

#[test]
fn foreground_command_blocks_until_exit() {
    let dir = tempfile::tempdir().unwrap();
    let marker = dir.path().join("marker");
    let first = format!("sh -c 'sleep 0.3; echo first > {}'", marker.display());
    let second = format!("cat {}", marker.display());

    let output = run_shell(&[&first, &second, "jobs"]);
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("first"), "stdout was: {stdout}");
    assert!(!stdout.contains("Foreground"), "stdout was: {stdout}");
}

#[test]
fn fg_on_unknown_job_reports_and_changes_nothing() {
    let output = run_shell(&["fg 99999", "fg %7", "jobs", "echo ALIVE"]);
    let stdout = String::from_utf8_lossy(&output.stdout);
    let stderr = String::from_utf8_lossy(&output.stderr);

    assert!(stderr.contains("fg: 99999: no such job"), "stderr was: {stderr}");
    assert!(stderr.contains("fg: %7: no such job"), "stderr was: {stderr}");
    assert!(stdout.contains("ALIVE"), "stdout was: {stdout}");
    assert!(!stdout.contains("[1]"), "stdout was: {stdout}");
}

#[test]
fn stop_then_bg_changes_state() {
    let output = run_shell(&[
        "sleep 3 &",
        "stop %1",
        "sleep 0.3",
        "jobs",
        "bg %1",
        "sleep 0.3",
        "jobs",
    ]);
    let stdout = String::from_utf8_lossy(&output.stdout);

    let stopped = stdout.find(" Stopped sleep 3").expect("no Stopped line");
    let resumed = stdout.rfind(" Running sleep 3").expect("no Running line");
    assert!(stopped < resumed, "stdout was: {stdout}");
}

#[test]
fn fg_resumes_a_stopped_job_and_waits() {
    let output = run_shell(&["sleep 0.5 &", "stop %1", "sleep 0.2", "fg %1", "echo BACK"]);
    let stdout = String::from_utf8_lossy(&output.stdout);

    let resumed = stdout.find("sleep 0.5\n").expect("fg did not echo the command");
    let back = stdout.find("BACK").expect("shell did not continue");
    assert!(resumed < back, "stdout was: {stdout}");
    // It finished in the foreground, so there is no Done report.
    assert!(!stdout.contains("Done"), "stdout was: {stdout}");
}

#[test]
fn builtin_argument_errors() {
    let output = run_shell(&["bg", "fg %1 %2", "stop abc"]);
    let stderr = String::from_utf8_lossy(&output.stderr);

    assert!(stderr.contains("bg: job id required"), "stderr was: {stderr}");
    assert!(stderr.contains("fg: too many arguments"), "stderr was: {stderr}");
    assert!(stderr.contains("stop: abc: invalid job id"), "stderr was: {stderr}");
}

#[test]
fn full_table_is_reported_and_shell_continues() {
    let output = run_shell_with_env(
        &["sleep 2 &", "sleep 2 &", "jobs", "echo ALIVE"],
        &[("JOBSH_MAX_JOBS", "1")],
    );
    let stdout = String::from_utf8_lossy(&output.stdout);
    let stderr = String::from_utf8_lossy(&output.stderr);

    assert!(stderr.contains("jobsh: job table full"), "stderr was: {stderr}");
    assert_eq!(stdout.matches(" Running sleep 2").count(), 1, "stdout was: {stdout}");
    assert!(stdout.contains("ALIVE"), "stdout was: {stdout}");
}

#[test]
fn exit_hangs_up_remaining_jobs() {
    let dir = tempfile::tempdir().unwrap();
    let marker = dir.path().join("survived");
    let line = format!("sh -c 'sleep 1; touch {}' &", marker.display());

    let output = run_shell(&[&line, "stop %1", "sleep 0.2"]);
    assert!(output.status.success());
    std::thread::sleep(std::time::Duration::from_millis(1500));
    assert!(!marker.exists(), "job outlived the shell");
}
