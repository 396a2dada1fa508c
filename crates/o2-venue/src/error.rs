//! Venue error types.

use o2_core::CoreError;
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum VenueError {
    /// Transport failure or timeout.
    #[error("Network error: {0}")]
    Network(String),

    /// The venue answered with a non-success status.
    #[error("Venue rejected request (HTTP {status}): {message}")]
    Rejected { status: u16, message: String },

    #[error("Failed to decode venue response: {0}")]
    Decode(String),

    #[error("Market not found: {0}")]
    MarketNotFound(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),
}

impl VenueError {
    pub fn is_network(&self) -> bool {
        matches!(self, Self::Network(_))
    }

    pub fn is_rejected(&self) -> bool {
        matches!(self, Self::Rejected { .. })
    }

    /// Rejection caused by a stale or reused nonce.
    pub fn is_invalid_nonce(&self) -> bool {
        match self {
            Self::Rejected { message, .. } => message.to_lowercase().contains("nonce"),
            _ => false,
        }
    }

    /// Message a user should see; the venue's own text for rejections.
    pub fn user_message(&self) -> String {
        match self {
            Self::Rejected { message, .. } => message.clone(),
            other => other.to_string(),
        }
    }
}

impl From<CoreError> for VenueError {
    fn from(e: CoreError) -> Self {
        Self::InvalidRequest(e.to_string())
    }
}

pub type VenueResult<T> = Result<T, VenueError>;
