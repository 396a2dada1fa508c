//! Prometheus metrics for the O2 agent.
//!
//! Registration happens on first use of each static and unwraps: a failure
//! there means a duplicate metric name, which is a programming error.

use crate::error::{TelemetryError, TelemetryResult};
use once_cell::sync::Lazy;
use prometheus::{
    register_counter_vec, register_int_counter, register_int_gauge, CounterVec, Encoder,
    IntCounter, IntGauge, TextEncoder,
};

/// Auth flow transitions. Labels: state
pub static AUTH_TRANSITIONS: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "o2_auth_transitions_total",
        "Auth flow state transitions",
        &["state"]
    )
    .unwrap()
});

/// Sessions registered with the venue.
pub static SESSIONS_CREATED: Lazy<IntCounter> = Lazy::new(|| {
    register_int_counter!("o2_sessions_created_total", "Sessions registered").unwrap()
});

/// Completed strategy cycles. Labels: market_id, executed
pub static CYCLES: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "o2_engine_cycles_total",
        "Strategy cycles run by the engine",
        &["market_id", "executed"]
    )
    .unwrap()
});

/// Cycles that hit the transaction lock and backed off.
pub static LOCK_CONTENTIONS: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "o2_engine_lock_contentions_total",
        "Cycles deferred because another market held the transaction lock",
        &["market_id"]
    )
    .unwrap()
});

/// Cycles that failed and took the error backoff.
pub static CYCLE_ERRORS: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "o2_engine_cycle_errors_total",
        "Strategy cycles that failed",
        &["market_id"]
    )
    .unwrap()
});

/// Order placement outcomes. Labels: market_id, side, outcome (placed/failed)
pub static ORDERS: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "o2_orders_total",
        "Order placements by outcome",
        &["market_id", "side", "outcome"]
    )
    .unwrap()
});

/// Fills folded into strategy state.
pub static FILL_UPDATES: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "o2_fill_updates_total",
        "Order fills recorded",
        &["market_id", "side"]
    )
    .unwrap()
});

/// Markets currently scheduled.
pub static ACTIVE_MARKETS: Lazy<IntGauge> = Lazy::new(|| {
    register_int_gauge!("o2_engine_active_markets", "Markets scheduled by the engine").unwrap()
});

/// Metrics facade.
pub struct Metrics;

impl Metrics {
    pub fn auth_transition(state: &str) {
        AUTH_TRANSITIONS.with_label_values(&[state]).inc();
    }

    pub fn session_created() {
        SESSIONS_CREATED.inc();
    }

    pub fn cycle(market_id: &str, executed: bool) {
        let executed = if executed { "true" } else { "false" };
        CYCLES.with_label_values(&[market_id, executed]).inc();
    }

    pub fn lock_contention(market_id: &str) {
        LOCK_CONTENTIONS.with_label_values(&[market_id]).inc();
    }

    pub fn cycle_error(market_id: &str) {
        CYCLE_ERRORS.with_label_values(&[market_id]).inc();
    }

    pub fn order_placed(market_id: &str, side: &str) {
        ORDERS.with_label_values(&[market_id, side, "placed"]).inc();
    }

    pub fn order_failed(market_id: &str, side: &str) {
        ORDERS.with_label_values(&[market_id, side, "failed"]).inc();
    }

    pub fn fill_recorded(market_id: &str, side: &str) {
        FILL_UPDATES.with_label_values(&[market_id, side]).inc();
    }

    pub fn set_active_markets(count: usize) {
        ACTIVE_MARKETS.set(count as i64);
    }

    /// Text exposition of every registered metric.
    pub fn render() -> TelemetryResult<String> {
        let mut buffer = Vec::new();
        TextEncoder::new()
            .encode(&prometheus::gather(), &mut buffer)
            .map_err(|e| TelemetryError::Metrics(e.to_string()))?;
        String::from_utf8(buffer).map_err(|e| TelemetryError::Metrics(e.to_string()))
    }
}
