//! Error types for evidence-core.

use thiserror::Error;

/// Result type alias using evidence-core's Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur during grading and evaluation operations.
#[derive(Error, Debug)]
pub enum Error {
    /// Referenced record does not exist
    #[error("{kind} {id} not found")]
    NotFound { kind: &'static str, id: String },

    /// Input that cannot produce a meaningful record
    #[error("Malformed input: {0}")]
    MalformedInput(String),

    /// Knowledge store error
    #[error("Storage error: {0}")]
    Storage(String),

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// External search collaborator failed
    #[error("External search error: {0}")]
    ExternalSearch(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Create a not-found error for a claim.
    pub fn claim_not_found(id: impl std::fmt::Display) -> Self {
        Self::NotFound {
            kind: "claim",
            id: id.to_string(),
        }
    }

    /// Create a not-found error for a source.
    pub fn source_not_found(id: impl std::fmt::Display) -> Self {
        Self::NotFound {
            kind: "source",
            id: id.to_string(),
        }
    }

    /// Create a not-found error for an evaluation.
    pub fn evaluation_not_found(id: impl std::fmt::Display) -> Self {
        Self::NotFound {
            kind: "evaluation",
            id: id.to_string(),
        }
    }

    /// Create an external search error.
    pub fn external_search(message: impl Into<String>) -> Self {
        Self::ExternalSearch(message.into())
    }

    /// Whether this error reports a missing record.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}

impl From<rusqlite::Error> for Error {
    fn from(err: rusqlite::Error) -> Self {
        Self::Storage(err.to_string())
    }
}
