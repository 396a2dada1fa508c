//! Error types for o2-strategy.

use o2_core::CoreError;
use o2_venue::VenueError;
use rust_decimal::Decimal;
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StrategyError {
    #[error("Insufficient balance: {0}")]
    InsufficientBalance(String),

    #[error("Order value {notional} below minimum {minimum}")]
    BelowMinimum { notional: Decimal, minimum: Decimal },

    #[error("Price {price} below average buy {average}")]
    BelowAverageBuy { price: Decimal, average: Decimal },

    #[error("No usable price for market {0}")]
    NoPrice(String),

    #[error("Strategy {strategy} cannot run a {config} config")]
    ConfigMismatch {
        strategy: &'static str,
        config: &'static str,
    },

    #[error("Order placement failed: {0}")]
    Placement(String),

    #[error(transparent)]
    Venue(#[from] VenueError),

    #[error(transparent)]
    Core(#[from] CoreError),
}

impl StrategyError {
    /// Conditions that only skip an order side; the cycle continues.
    pub fn is_skip(&self) -> bool {
        matches!(
            self,
            Self::InsufficientBalance(_)
                | Self::BelowMinimum { .. }
                | Self::BelowAverageBuy { .. }
        )
    }
}

pub type StrategyResult<T> = Result<T, StrategyError>;
