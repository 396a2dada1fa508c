//! Core domain types for the O2 trading agent.
//!
//! This crate provides the types shared by every other crate:
//! - `OwnerAddress`: normalized wallet address with b256 conversion
//! - `TradingAccount`, `Session`, `SessionKeyRecord`: auth data model
//! - `Market`, `Ticker`, `Balance`: venue snapshots
//! - `StrategyConfig`: tagged per-market strategy configuration
//! - `Clock` and `Observers`: injectable time and callback fan-out

pub mod account;
pub mod address;
pub mod clock;
pub mod decimal;
pub mod error;
pub mod market;
pub mod observer;
pub mod order;
pub mod strategy_config;
pub mod trade;

pub use account::{Session, SessionKeyRecord, TermsAcceptance, TradingAccount};
pub use address::{b256_bytes, normalize_b256, AddressKind, OwnerAddress};
pub use clock::{Clock, DynClock, ManualClock, SystemClock};
pub use error::{CoreError, Result};
pub use market::{AssetInfo, Balance, Market, MarketBalances, Ticker};
pub use observer::{Observers, Subscription};
pub use order::{OrderExecution, OrderIntent, OrderSide, OrderType, StrategyExecutionResult};
pub use strategy_config::{
    BalanceThresholdParams, FillState, MarketMakingParams, OrderManagement, SideFills,
    StrategyConfig, StrategyConfigRecord, StrategyKind, Timing,
};
pub use trade::{Trade, TradeStats, TradeUpdate};
