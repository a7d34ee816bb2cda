//! Error types for collide-core

use thiserror::Error;

/// Result type alias using collide-core's Error
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in collide-core operations
#[derive(Error, Debug)]
pub enum Error {
    /// Intent timestamp older than the last known intent from the same
    /// session on the same field; rejected, not retried
    #[error("Stale intent: {0}")]
    StaleIntent(String),

    /// Manual resolution targeted a conflict that is not pending
    /// (already resolved, discarded, or never existed)
    #[error("Unknown conflict: {0}")]
    UnknownConflict(String),

    /// Resolved value could not be committed to the record store
    #[error("Persistence write failed: {0}")]
    PersistenceWrite(String),

    /// Manual resolution strategy not applicable to the conflict, or a
    /// required resolved value was missing
    #[error("Invalid strategy: {0}")]
    InvalidStrategy(String),

    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
