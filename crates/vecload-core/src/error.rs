use std::fmt;

use thiserror::Error;

/// Pipeline stage a fatal error belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Config,
    Input,
    Provisioning,
    Encoding,
    Upsert,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Config => "config",
            Stage::Input => "input",
            Stage::Provisioning => "provisioning",
            Stage::Encoding => "encoding",
            Stage::Upsert => "upsert",
        };
        f.write_str(name)
    }
}

/// Run-aborting errors. Recoverable per-record and per-batch failures are
/// counted in the run report instead.
#[derive(Debug, Error)]
pub enum Error {
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Malformed input document: {0}")]
    MalformedInput(String),

    #[error("Provisioning index '{index}' failed: {message}")]
    Provisioning { index: String, message: String },

    #[error("Embedding dimension mismatch{suffix}: expected {expected}, got {actual}", suffix = record_suffix(.record))]
    DimensionMismatch {
        expected: usize,
        actual: usize,
        record: Option<String>,
    },

    #[error("Upsert into index '{index}' failed: {message}")]
    Upsert { index: String, message: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    pub fn stage(&self) -> Stage {
        match self {
            Error::InvalidConfig(_) => Stage::Config,
            Error::MalformedInput(_) | Error::Io(_) => Stage::Input,
            Error::Provisioning { .. } => Stage::Provisioning,
            Error::DimensionMismatch { .. } => Stage::Encoding,
            Error::Upsert { .. } => Stage::Upsert,
        }
    }

    pub fn provisioning(index: &str, err: &anyhow::Error) -> Self {
        Error::Provisioning {
            index: index.to_string(),
            message: format!("{err:#}"),
        }
    }
}

/// A failed call to the index service. `status` is `None` when no HTTP
/// response arrived (connection refused, timeout).
#[derive(Debug, Error)]
#[error("{message}")]
pub struct ServiceError {
    pub status: Option<u16>,
    pub message: String,
}

impl ServiceError {
    pub fn new(status: Option<u16>, message: impl Into<String>) -> Self {
        Self { status, message: message.into() }
    }

    /// Transport failures, 429 and 5xx are worth another attempt; any other
    /// status will fail the same way again.
    pub fn is_retryable(&self) -> bool {
        match self.status {
            None => true,
            Some(status) => status == 429 || status >= 500,
        }
    }
}

fn record_suffix(record: &Option<String>) -> String {
    record
        .as_ref()
        .map(|id| format!(" for record '{id}'"))
        .unwrap_or_default()
}

pub type Result<T> = std::result::Result<T, Error>;
