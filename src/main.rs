use std::io;

use tracing_subscriber::EnvFilter;

use jobsh::config::Config;

fn init_tracing(filter: &str) {
    let filter = EnvFilter::try_new(filter).unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .without_time()
        .init();
}

#[cfg(unix)]
fn main() {
    let (config, problems) = Config::from_env();
    init_tracing(&config.log_filter);
    for problem in problems {
        eprintln!("jobsh: {problem}; using the default");
    }

    if let Err(e) = jobsh::shell::run(&config) {
        eprintln!("jobsh: {e}");
        std::process::exit(1);
    }
}

#[cfg(not(unix))]
fn main() {
    let (config, _) = Config::from_env();
    init_tracing(&config.log_filter);
    eprintln!("jobsh: job control needs a Unix system");
    std::process::exit(1);
}
