//! Error types for o2-session.

use o2_core::CoreError;
use o2_store::StoreError;
use o2_venue::VenueError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("No wallet connected")]
    NoWalletConnected,

    #[error("No active session")]
    NoActiveSession,

    #[error("Session requires at least one contract id")]
    EmptyContractSet,

    /// The owner refused the signing prompt.
    #[error("Signature request was declined: {0}")]
    SignatureDeclined(String),

    #[error("Signing failed: {0}")]
    Signing(String),

    #[error("Password not set for session key encryption")]
    PasswordNotSet,

    #[error("Session key encryption failed: {0}")]
    EncryptionFailure(String),

    #[error("Invalid session key: {0}")]
    InvalidKey(String),

    #[error(transparent)]
    Venue(#[from] VenueError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Core(#[from] CoreError),
}

impl SessionError {
    /// Classify a wallet signing failure. Wallets report user rejection as
    /// free text, so the message is matched loosely.
    pub fn from_wallet_message(message: impl Into<String>) -> Self {
        let message = message.into();
        let lower = message.to_lowercase();
        if ["reject", "denied", "declined", "cancel"]
            .iter()
            .any(|needle| lower.contains(needle))
        {
            Self::SignatureDeclined(message)
        } else {
            Self::Signing(message)
        }
    }

    pub fn is_declined(&self) -> bool {
        matches!(self, Self::SignatureDeclined(_))
    }
}

pub type SessionResult<T> = Result<T, SessionError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wallet_rejection_is_declined() {
        assert!(SessionError::from_wallet_message("User rejected the request.").is_declined());
        assert!(SessionError::from_wallet_message("Request cancelled by user").is_declined());
        assert!(!SessionError::from_wallet_message("connector unavailable").is_declined());
    }
}
