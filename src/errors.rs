// src/errors.rs

//! Crate-wide error type and result alias.
//!
//! Startup problems (bad config, unknown processor, watcher misuse) surface
//! as a [`RewatchError`]. Processor internals keep using `anyhow` and are
//! folded into a failed result by the dispatcher.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum RewatchError {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Unknown processor: \"{0}\"")]
    UnknownProcessor(String),

    #[error("Job '{job}' lacks mandatory key '{key}'")]
    MissingKey { job: String, key: String },

    #[error("Invalid pattern '{pattern}': {reason}")]
    InvalidPattern { pattern: String, reason: String },

    #[error("Invalid signal: {0}")]
    InvalidSignal(String),

    #[error("Watcher error: {0}")]
    WatcherState(String),

    #[error("TOML parsing error: {0}")]
    TomlError(#[from] toml::de::Error),

    #[error("Notify error: {0}")]
    Notify(#[from] notify::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, RewatchError>;
