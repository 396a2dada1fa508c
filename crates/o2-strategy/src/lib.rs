//! Trading strategies for the O2 agent.
//!
//! A [`Strategy`] reads a ticker and balances through an
//! [`ExchangeGateway`], plans order intents and places them. Planning is
//! pure (`plan_*` functions) so sizing rules can be tested without I/O.

pub mod balance_threshold;
pub mod error;
pub mod gateway;
pub mod jitter;
pub mod market_making;
#[cfg(any(test, feature = "test-util"))]
pub mod mock;
pub mod registry;
pub mod strategy;

pub use balance_threshold::BalanceThresholdStrategy;
pub use error::{StrategyError, StrategyResult};
pub use gateway::{place_intents, DynGateway, ExchangeGateway};
pub use jitter::{jittered_delay, random_delay};
pub use market_making::MarketMakingStrategy;
#[cfg(any(test, feature = "test-util"))]
pub use mock::MockGateway;
pub use registry::{StrategyInfo, StrategyRegistry, StrategyType};
pub use strategy::{check_minimum, DynStrategy, Strategy};
