// src/errors.rs

//! Crate-wide error type.
//!
//! Recorded failures (launch, interrupted wait) are stored by the background
//! execution task and handed out again by `last_error()`, so every variant is
//! `Clone` and wraps its cause in an `Arc`.

use std::io;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;

#[derive(Error, Debug, Clone)]
pub enum RunnerError {
    /// Missing log directory, rejected launch request, wrong accessor for
    /// the active stream mode. Never retried.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Process creation failed on every fork attempt.
    #[error("Failed to fork '{program}' after {attempts} attempt(s): {source}")]
    Launch {
        program: String,
        attempts: u32,
        #[source]
        source: Arc<io::Error>,
    },

    /// Waiting for the process to exit failed.
    #[error("Interrupted while waiting for process exit: {source}")]
    WaitInterrupted {
        #[source]
        source: Arc<io::Error>,
    },

    #[error("Process has not started: {0}")]
    NotStarted(String),

    #[error("Process already finished")]
    AlreadyFinished,

    #[error("Wait for event '{event}' took more than {timeout:?}")]
    Timeout { event: String, timeout: Duration },

    #[error("Exit code is not available yet")]
    ExitCodeUnavailable,

    #[error("Log file {path:?} doesn't exist")]
    MissingLog { path: PathBuf },

    #[error("IO error: {0}")]
    Io(Arc<io::Error>),

    #[error("TOML parsing error: {0}")]
    Toml(String),
}

impl From<io::Error> for RunnerError {
    fn from(err: io::Error) -> Self {
        RunnerError::Io(Arc::new(err))
    }
}

impl From<toml::de::Error> for RunnerError {
    fn from(err: toml::de::Error) -> Self {
        RunnerError::Toml(err.to_string())
    }
}

impl RunnerError {
    pub(crate) fn config(msg: impl Into<String>) -> Self {
        RunnerError::Configuration(msg.into())
    }
}

pub use anyhow::Error;
pub type Result<T> = std::result::Result<T, RunnerError>;
