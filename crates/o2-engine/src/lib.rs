//! Trading engine for the O2 agent.
//!
//! - [`TradingEngine`]: per-market scheduling of strategy cycles
//! - [`TransactionLock`]: one in-flight order batch across all markets
//! - [`Scheduler`]: deadline queue drained by the engine's driver task
//! - [`SessionGateway`]: signs and submits orders with a session key
//! - [`FillTracker`]: folds venue fills into per-market fill state

pub mod engine;
pub mod error;
pub mod events;
pub mod fills;
pub mod gateway;
pub mod lock;
pub mod scheduler;

pub use engine::{CycleOutcome, EngineSettings, TradingEngine};
pub use error::{EngineError, EngineResult};
pub use events::{EngineEvents, StatusEvent, StatusLevel};
pub use fills::{fold_fills, FillTracker, FillUpdate, FILL_QUERY_COUNT};
pub use gateway::SessionGateway;
pub use lock::{LockGuard, TransactionLock};
pub use scheduler::Scheduler;
