//! O2 DEX trading agent.
//!
//! Wires the venue client, durable store, session keys, auth flow and
//! trading engine together:
//! - [`AppConfig`]: TOML file plus `O2__` environment overrides
//! - [`Application`]: authenticate an owner wallet, then run strategies

pub mod app;
pub mod config;
pub mod error;

pub use app::Application;
pub use config::AppConfig;
pub use error::{AppError, AppResult};
