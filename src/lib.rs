//! Job control for an interactive command interpreter: a bounded job table,
//! process-group orchestration for commands and pipelines, and the child
//! state notifications that keep the table current.

pub mod cmdline;
pub mod config;

#[cfg(unix)]
pub mod bridge;
#[cfg(unix)]
pub mod builtins;
#[cfg(unix)]
pub mod control;
#[cfg(unix)]
pub mod jobs;
#[cfg(unix)]
pub mod launch;
#[cfg(unix)]
pub mod shell;
#[cfg(unix)]
pub mod signal;
#[cfg(unix)]
pub mod status;
#[cfg(unix)]
pub mod terminal;
