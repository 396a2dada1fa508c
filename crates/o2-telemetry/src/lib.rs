//! Prometheus metrics and structured logging for the O2 agent.
//!
//! - [`init_logging`]: `tracing` subscriber with env filter, JSON in production
//! - [`Metrics`]: static counters for auth, engine cycles, orders and fills

pub mod error;
pub mod logging;
pub mod metrics;

pub use error::{TelemetryError, TelemetryResult};
pub use logging::init_logging;
pub use metrics::Metrics;
