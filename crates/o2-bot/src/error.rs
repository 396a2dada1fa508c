//! Application error types.

use o2_auth::AuthFlowState;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("Configuration error: {0}")]
    Config(String),

    /// The auth flow stopped short of a ready session.
    #[error("Authentication stopped in state {state}: {reason}")]
    NotReady {
        state: AuthFlowState,
        reason: String,
    },

    #[error("Auth error: {0}")]
    Auth(#[from] o2_auth::AuthError),

    #[error("Session error: {0}")]
    Session(#[from] o2_session::SessionError),

    #[error("Engine error: {0}")]
    Engine(#[from] o2_engine::EngineError),

    #[error("Venue error: {0}")]
    Venue(#[from] o2_venue::VenueError),

    #[error("Store error: {0}")]
    Store(#[from] o2_store::StoreError),

    #[error("Telemetry error: {0}")]
    Telemetry(#[from] o2_telemetry::TelemetryError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type AppResult<T> = Result<T, AppError>;
