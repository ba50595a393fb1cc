//! Error types for tgbridge-core

use std::path::PathBuf;
use std::time::Duration;

/// Chat transport errors
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("Bot token not configured")]
    Disabled,

    #[error("HTTP error calling {method}: {source}")]
    Http {
        method: &'static str,
        #[source]
        source: reqwest::Error,
    },

    #[error("{method} rejected: {description}")]
    Rejected {
        method: &'static str,
        description: String,
    },

    #[error("Malformed response from {method}: {reason}")]
    Malformed { method: &'static str, reason: String },
}

/// Console transport errors
#[derive(Debug, thiserror::Error)]
pub enum ConsoleError {
    #[error("{command} timed out after {timeout:?}")]
    Timeout {
        command: &'static str,
        timeout: Duration,
    },

    #[error("{command} exited with {status}: {stderr}")]
    Failed {
        command: &'static str,
        status: i32,
        stderr: String,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid config {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("Invalid value for {var}: {value}")]
    InvalidEnv { var: &'static str, value: String },

    #[error("TELEGRAM_BOT_TOKEN not set")]
    MissingToken,
}
