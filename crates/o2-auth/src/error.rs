//! Error types for o2-auth.

use o2_core::CoreError;
use o2_session::SessionError;
use o2_store::StoreError;
use o2_venue::VenueError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("No wallet connected")]
    NoWalletConnected,

    #[error("Auth flow already in progress")]
    FlowInProgress,

    #[error("Whitelist query failed: {0}")]
    Whitelist(String),

    #[error(transparent)]
    Session(#[from] SessionError),

    #[error(transparent)]
    Venue(#[from] VenueError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Core(#[from] CoreError),
}

impl AuthError {
    /// Message suitable for the flow context.
    pub fn user_message(&self) -> String {
        match self {
            Self::Venue(e) => e.user_message(),
            Self::Session(SessionError::Venue(e)) => e.user_message(),
            other => other.to_string(),
        }
    }
}

pub type AuthResult<T> = Result<T, AuthError>;
