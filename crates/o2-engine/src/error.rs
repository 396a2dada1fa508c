//! Error types for o2-engine.

use o2_core::CoreError;
use o2_session::SessionError;
use o2_store::StoreError;
use o2_strategy::StrategyError;
use o2_venue::VenueError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum EngineError {
    /// `start` called before `initialize`.
    #[error("Engine not initialized with an owner and trading account")]
    NotInitialized,

    #[error("Market {0} is not scheduled")]
    UnknownMarket(String),

    #[error(transparent)]
    Strategy(#[from] StrategyError),

    #[error(transparent)]
    Venue(#[from] VenueError),

    #[error(transparent)]
    Session(#[from] SessionError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Core(#[from] CoreError),
}

pub type EngineResult<T> = Result<T, EngineError>;
