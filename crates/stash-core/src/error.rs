//! Error types for Stash.

use chrono::{DateTime, Utc};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    // Input errors
    #[error("Invalid identifier: {0}")]
    InvalidIdentifier(String),

    #[error("Invalid payload: {0}")]
    InvalidPayload(String),

    #[error("Invalid namespace: {0}")]
    InvalidNamespace(String),

    // Storage errors
    #[error("Storage {operation} failed for {path}: {message}")]
    Storage {
        operation: String,
        path: String,
        message: String,
    },

    #[error("Version allocation for {cache_id} gave up after {attempts} attempts")]
    VersionConflict { cache_id: String, attempts: u32 },

    // Expiry errors
    #[error("Cache entry {cache_id} expired at {expired_at}")]
    Gone {
        cache_id: String,
        expired_at: DateTime<Utc>,
    },

    // Infrastructure errors
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),

    // Generic
    #[error("Internal error: {0}")]
    Internal(String),

    #[error("{0}")]
    Other(String),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Build a storage error naming the operation and the path it touched.
    pub fn storage(
        operation: impl Into<String>,
        path: impl Into<String>,
        err: impl std::fmt::Display,
    ) -> Self {
        Error::Storage {
            operation: operation.into(),
            path: path.into(),
            message: err.to_string(),
        }
    }

    /// The path a storage error refers to, if any.
    pub fn path(&self) -> Option<&str> {
        match self {
            Error::Storage { path, .. } => Some(path),
            _ => None,
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Serialization(err.to_string())
    }
}
