//! Error types for Stash core operations.
//!
//! This module defines the error hierarchy for all core operations.
//! Storage-layer failures that the stores recover from locally (durable
//! pushes, mirror writes) are logged and never reach callers; the variants
//! below are the ones that do. The CLI layer maps these to user-facing
//! messages.

use thiserror::Error;

/// Result type alias for Stash operations.
pub type Result<T> = std::result::Result<T, StashError>;

/// Core error type for Stash operations.
#[derive(Debug, Error)]
pub enum StashError {
    /// Record, folder, item or file not found by id
    #[error("Not found: {0}")]
    NotFound(String),

    /// Persisted payload could not be parsed
    #[error("Corrupt payload: {0}")]
    Corrupt(String),

    /// Payload exceeds the capacity of the target cache
    #[error("Capacity exceeded: {size} bytes (limit {limit})")]
    CapacityExceeded { size: usize, limit: usize },

    /// Wrong password or tampered ciphertext
    #[error("Decryption failed")]
    DecryptionFailed,

    /// Non-cascading delete of a folder that still has children
    #[error("Folder is not empty: {0}")]
    NotEmpty(String),

    /// Folder move would make a folder its own ancestor
    #[error("Folder {folder} cannot be moved under {target}")]
    FolderCycle { folder: String, target: String },

    /// Cryptographic primitives failed the startup self-test
    #[error("Cryptography unavailable: {0}")]
    CryptoUnavailable(String),

    /// Encryption error other than authentication failure
    #[error("Encryption error: {0}")]
    Crypto(String),

    /// Storage backend error
    #[error("Storage error: {0}")]
    Storage(String),

    /// Data validation error
    #[error("Validation error: {0}")]
    Validation(String),

    /// Invalid caller input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// I/O error
    #[error("I/O error: {source}")]
    Io {
        #[from]
        source: std::io::Error,
    },

    /// JSON serialization/deserialization error
    #[error("JSON error: {source}")]
    Json {
        #[from]
        source: serde_json::Error,
    },
}

impl StashError {
    /// Shorthand for a `NotFound` naming the kind of thing and its id.
    pub(crate) fn not_found(kind: &str, id: &str) -> Self {
        StashError::NotFound(format!("{} {}", kind, id))
    }
}
