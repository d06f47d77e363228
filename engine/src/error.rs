//! Error types for the Stockroom engine.

use crate::{Collection, RecordId};
use thiserror::Error;

/// All possible errors from the Stockroom engine.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum Error {
    // Remote errors
    #[error("transport error: {0}")]
    Transport(String),

    #[error("remote rejected {method} {path}: HTTP {status}")]
    RemoteRejected {
        method: String,
        path: String,
        status: u16,
    },

    #[error("could not decode remote {collection} body: {reason}")]
    Decode {
        collection: Collection,
        reason: String,
    },

    // Local store errors
    #[error("record not found: {collection}/{id}")]
    NotFound { collection: Collection, id: RecordId },

    #[error("record already exists: {collection}/{id}")]
    AlreadyExists { collection: Collection, id: RecordId },

    #[error("validation failed for field '{field}': {reason}")]
    Validation { field: String, reason: String },

    // Ambient errors
    #[error("fallback cache error: {0}")]
    Cache(String),

    #[error("invalid configuration for {key}: {reason}")]
    Config { key: String, reason: String },
}

impl Error {
    pub(crate) fn not_found(collection: Collection, id: impl Into<RecordId>) -> Self {
        Error::NotFound {
            collection,
            id: id.into(),
        }
    }

    pub(crate) fn validation(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Error::Validation {
            field: field.into(),
            reason: reason.into(),
        }
    }

    /// Whether retrying the same call might succeed.
    ///
    /// Transport failures and 5xx/429 responses are transient; everything
    /// else fails the same way on every attempt.
    pub fn is_transient(&self) -> bool {
        match self {
            Error::Transport(_) => true,
            Error::RemoteRejected { status, .. } => *status >= 500 || *status == 429,
            _ => false,
        }
    }
}

impl From<reqwest::Error> for Error {
    fn from(e: reqwest::Error) -> Self {
        Error::Transport(e.to_string())
    }
}

/// Result type for engine operations.
pub type Result<T> = std::result::Result<T, Error>;
