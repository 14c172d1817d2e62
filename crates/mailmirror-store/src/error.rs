//! Store errors.

use thiserror::Error;

/// Errors from the persistent cache.
#[derive(Debug, Error)]
pub enum Error {
    /// Database error.
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// A stored blob failed to decode.
    #[error("corrupt cache entry: {0}")]
    Corrupt(#[from] serde_json::Error),
}

/// Result type alias for store operations.
pub type Result<T> = std::result::Result<T, Error>;
