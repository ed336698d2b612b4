use thiserror::Error;

/// Default number of job table slots.
pub const DEFAULT_MAX_JOBS: usize = 10;

/// Upper bound accepted for `JOBSH_MAX_JOBS`.
pub const MAX_JOBS_LIMIT: usize = 1024;

/// Default bound on a job's stored command text, in bytes.
pub const DEFAULT_MAX_COMMAND: usize = 256;

pub const DEFAULT_PROMPT: &str = "jobsh> ";

pub const DEFAULT_LOG_FILTER: &str = "warn";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{var}: `{value}` is not a number")]
    NotANumber { var: &'static str, value: String },

    #[error("{var}: {value} is out of range ({min}..={max})")]
    OutOfRange {
        var: &'static str,
        value: usize,
        min: usize,
        max: usize,
    },
}

/// Shell settings, read once at startup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub max_jobs: usize,
    pub max_command: usize,
    pub prompt: String,
    pub log_filter: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            max_jobs: DEFAULT_MAX_JOBS,
            max_command: DEFAULT_MAX_COMMAND,
            prompt: DEFAULT_PROMPT.to_string(),
            log_filter: DEFAULT_LOG_FILTER.to_string(),
        }
    }
}

impl Config {
    /// Build the configuration from the process environment.
    ///
    /// Bad values fall back to their default; the problems are returned so
    /// the caller can report them once logging is up.
    pub fn from_env() -> (Self, Vec<ConfigError>) {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`Config::from_env`] with an arbitrary variable source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> (Self, Vec<ConfigError>) {
        let mut config = Self::default();
        let mut problems = Vec::new();

        if let Some(raw) = lookup("JOBSH_MAX_JOBS") {
            match parse_bounded("JOBSH_MAX_JOBS", &raw, 1, MAX_JOBS_LIMIT) {
                Ok(n) => config.max_jobs = n,
                Err(e) => problems.push(e),
            }
        }
        if let Some(raw) = lookup("JOBSH_MAX_COMMAND") {
            match parse_bounded("JOBSH_MAX_COMMAND", &raw, 1, usize::MAX) {
                Ok(n) => config.max_command = n,
                Err(e) => problems.push(e),
            }
        }
        if let Some(prompt) = lookup("JOBSH_PROMPT") {
            config.prompt = prompt;
        }
        if let Some(filter) = lookup("JOBSH_LOG") {
            if !filter.trim().is_empty() {
                config.log_filter = filter;
            }
        }

        (config, problems)
    }
}

fn parse_bounded(
    var: &'static str,
    raw: &str,
    min: usize,
    max: usize,
) -> Result<usize, ConfigError> {
    let value = raw
        .trim()
        .parse::<usize>()
        .map_err(|_| ConfigError::NotANumber {
            var,
            value: raw.to_string(),
        })?;
    if value < min || value > max {
        return Err(ConfigError::OutOfRange {
            var,
            value,
            min,
            max,
        });
    }
    Ok(value)
}
