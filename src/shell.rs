//! The interpreter loop: read a line, run it, repeat until end of input.

use std::io::{self, BufRead, Write};
use std::sync::Arc;

use crate::bridge;
use crate::builtins;
use crate::cmdline;
use crate::config::Config;
use crate::control::{self, JobControl};
use crate::jobs::JobTable;
use crate::launch;
use crate::signal::{self, Kill};
use crate::terminal;

/// Fatal startup failure.
#[derive(Debug, thiserror::Error)]
#[error("cannot watch child processes: {0}")]
pub struct StartupError(#[from] io::Error);

/// Set up job control and run the read-eval loop on standard input.
///
/// Returns once input is exhausted, after hanging up the remaining jobs.
pub fn run(config: &Config) -> Result<(), StartupError> {
    let control = Arc::new(JobControl::new(JobTable::new(
        config.max_jobs,
        config.max_command,
    )));

    // First: every later thread must inherit the blocked SIGCHLD.
    bridge::install(Arc::clone(&control))?;

    if let Err(e) = signal::ignore_job_control_signals() {
        tracing::warn!(error = %e, "cannot ignore job control signals");
    }
    if terminal::is_interactive() {
        if let Err(e) = terminal::take_control() {
            tracing::warn!(error = %e, "cannot take control of the terminal");
        }
    }
    if let Err(e) = ctrlc::set_handler(|| {
        println!();
        let _ = io::stdout().flush();
    }) {
        tracing::warn!(error = %e, "cannot install Ctrl-C handler");
    }

    let mut stdin = io::stdin().lock();
    let mut stdout = io::stdout();

    loop {
        print!("{}", config.prompt);
        if stdout.flush().is_err() {
            break;
        }

        let mut input = String::new();
        match stdin.read_line(&mut input) {
            Ok(0) => {
                println!();
                break;
            }
            Ok(_) => run_line(input.trim(), &control),
            Err(error) => {
                eprintln!("jobsh: error reading input: {error}");
                break;
            }
        }
    }

    control::hang_up_all(&control, &mut Kill);
    Ok(())
}

/// Parse and run one input line.
fn run_line(input: &str, control: &JobControl) {
    let line = cmdline::parse(input);
    if let Some(message) = &line.error {
        eprintln!("error: {message}");
        return;
    }
    let Some(first) = line.stages.first() else {
        return;
    };

    if line.stages.len() == 1 && builtins::is_builtin(&first[0]) {
        let name = first[0].as_str();
        if first.len() > 2 {
            eprintln!("{name}: too many arguments");
            return;
        }
        let token = first.get(1).map(String::as_str);
        builtins::execute(
            name,
            token,
            control,
            &mut Kill,
            &mut io::stdout(),
            &mut io::stderr(),
        );
        return;
    }

    match launch::launch(control, &line) {
        Ok(launched) if launched.background => {
            println!("[{}] {}", launched.id, launched.pid);
        }
        Ok(launched) => {
            tracing::trace!(job = %launched.id, "waiting in foreground");
            control::run_foreground(control, launched.pid);
        }
        Err(e) => eprintln!("jobsh: {e}"),
    }
}
