//! Store error types.

use thiserror::Error;

/// Every variant is a persistence failure; the split only keeps the cause.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Persistence failure (io): {0}")]
    Io(#[from] std::io::Error),

    #[error("Persistence failure (json): {0}")]
    Json(#[from] serde_json::Error),

    #[error("Persistence failure: corrupt {collection}: {reason}")]
    Corrupt { collection: String, reason: String },
}

pub type StoreResult<T> = Result<T, StoreError>;
