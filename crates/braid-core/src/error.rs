//! Unified error types for Braid

use std::path::PathBuf;
use thiserror::Error;

/// Unified error type for all Braid operations
#[derive(Error, Debug)]
pub enum BraidError {
    // Configuration errors
    #[error("Config error: {0}")]
    Config(String),

    // Worker errors
    #[error("Worker error: {0}")]
    Worker(String),

    #[error("Worker timed out after {0:?}")]
    Timeout(std::time::Duration),

    // Integration errors
    #[error("Merge failed for {resource}: {reason}")]
    Merge { resource: String, reason: String },

    /// The coordination status document could not be durably written.
    /// This is the only fatal error of a scheduling run.
    #[error("Failed to write status document {}: {source}", .path.display())]
    StatusWrite {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    // Generic
    #[error("{0}")]
    Other(String),
}

/// Result type alias using BraidError
pub type Result<T> = std::result::Result<T, BraidError>;
