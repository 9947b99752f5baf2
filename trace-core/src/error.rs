//! Domain error types.
//!
//! Every rule violation surfaces as a distinct variant so callers can map
//! them to transport-level responses (validation vs. not-found vs.
//! conflict vs. permission) without string matching.

use thiserror::Error;

/// Domain result type
pub type TraceResult<T> = Result<T, TraceError>;

/// Domain error
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TraceError {
    /// Malformed or missing required input
    #[error("Validation failed: {0}")]
    Validation(String),

    /// A referenced entity does not exist
    #[error("{entity} not found: {key}")]
    NotFound { entity: &'static str, key: String },

    /// One or more catalog codes did not resolve
    #[error("Unknown {entity} codes: {}", codes.join(", "))]
    UnknownCodes {
        entity: &'static str,
        codes: Vec<String>,
    },

    /// Uniqueness or state-exclusivity violation
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Acting user lacks the required role
    #[error("Permission denied: {0}")]
    Permission(String),

    /// Underlying storage failure
    #[error("Storage error: {0}")]
    Storage(String),

    /// Encode/decode failure at the storage boundary
    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl TraceError {
    /// Not-found constructor for a single entity lookup
    pub fn not_found(entity: &'static str, key: impl Into<String>) -> Self {
        Self::NotFound {
            entity,
            key: key.into(),
        }
    }

    /// Validation constructor
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    /// Conflict constructor
    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::Conflict(msg.into())
    }

    /// Permission constructor
    pub fn permission(msg: impl Into<String>) -> Self {
        Self::Permission(msg.into())
    }
}

impl From<serde_json::Error> for TraceError {
    fn from(e: serde_json::Error) -> Self {
        TraceError::Serialization(e.to_string())
    }
}
