//! Error types for csmt

use crate::model::Hash;
use thiserror::Error;

/// Result type alias for csmt operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in csmt operations
#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] bincode::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Node not found: {0}")]
    NotFound(Hash),

    #[error("Corruption detected: {0}")]
    Corruption(String),

    #[error("Invalid database file: {0}")]
    InvalidFile(String),

    #[error("Version mismatch: expected {expected}, found {found}")]
    VersionMismatch { expected: u32, found: u32 },

    #[error("Witness does not match root: expected {expected}, computed {computed}")]
    WitnessMismatch { expected: Hash, computed: Hash },

    #[error("Malformed witness: {0}")]
    MalformedWitness(String),

    #[error("Transaction is read-only")]
    ReadOnly,

    #[error("Config error: {0}")]
    Config(String),
}

impl Error {
    /// Whether this error means the store can no longer be trusted.
    ///
    /// Store I/O, decode failures and dangling node references are fatal for
    /// the process. Witness failures and misuse are ordinary rejections.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Error::Io(_)
                | Error::Serialization(_)
                | Error::NotFound(_)
                | Error::Corruption(_)
                | Error::InvalidFile(_)
                | Error::VersionMismatch { .. }
        )
    }
}
