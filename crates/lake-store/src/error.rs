//! Error types for the storage layer.

use thiserror::Error;

/// Errors that can occur in the storage layer.
#[derive(Error, Debug)]
pub enum StoreError {
    /// Archive log write failed. There is no durability without the
    /// archive, so callers must treat this as fatal for the operation.
    #[error("Archive write failed: {reason}")]
    ArchiveWrite { reason: String },

    /// Archive item not found by id.
    #[error("Archive item not found: {id}")]
    ItemNotFound { id: String },

    /// Store record not found by key.
    #[error("Store record not found in {store}: {key}")]
    RecordNotFound { store: String, key: String },

    /// Adapter write failed.
    #[error("Write to {store} failed: {reason}")]
    WriteFailed { store: String, reason: String },

    /// Adapter query failed.
    #[error("Query against {store} failed: {reason}")]
    QueryFailed { store: String, reason: String },

    /// Adapter reported itself unavailable.
    #[error("Store {store} is unavailable")]
    Unavailable { store: String },

    /// Illegal item status transition.
    #[error("Invalid status transition for {id}: {from} -> {to}")]
    InvalidStatusTransition { id: String, from: String, to: String },

    /// Malformed fingerprint string.
    #[error("Invalid fingerprint: {value}")]
    InvalidFingerprint { value: String },

    /// Serialization error.
    #[error("Serialization failed: {0}")]
    Serialization(String),
}

impl From<serde_json::Error> for StoreError {
    fn from(err: serde_json::Error) -> Self {
        StoreError::Serialization(err.to_string())
    }
}

/// Result type for storage operations.
pub type StoreResult<T> = std::result::Result<T, StoreError>;
