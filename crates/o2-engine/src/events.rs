//! Engine status stream.

use o2_core::{DynClock, Observers, Subscription};
use serde::Serialize;
use std::fmt;
use tracing::{error, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StatusLevel {
    Info,
    Success,
    Error,
    Warning,
}

impl fmt::Display for StatusLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Info => write!(f, "info"),
            Self::Success => write!(f, "success"),
            Self::Error => write!(f, "error"),
            Self::Warning => write!(f, "warning"),
        }
    }
}

/// Human-readable status line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatusEvent {
    pub level: StatusLevel,
    pub message: String,
    pub market_id: Option<String>,
    pub timestamp: u64,
}

/// Status lines plus a payload-free "trade completed" signal. Subscribers
/// are isolated from each other and from the engine.
pub struct EngineEvents {
    clock: DynClock,
    status: Observers<StatusEvent>,
    trade_completed: Observers<()>,
}

impl EngineEvents {
    pub fn new(clock: DynClock) -> Self {
        Self {
            clock,
            status: Observers::new(),
            trade_completed: Observers::new(),
        }
    }

    pub fn on_status<F>(&self, callback: F) -> Subscription
    where
        F: Fn(&StatusEvent) + Send + Sync + 'static,
    {
        self.status.subscribe(callback)
    }

    pub fn on_trade_completed<F>(&self, callback: F) -> Subscription
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.trade_completed.subscribe(move |_: &()| callback())
    }

    pub fn emit(&self, level: StatusLevel, market_id: Option<&str>, message: impl Into<String>) {
        let event = StatusEvent {
            level,
            message: message.into(),
            market_id: market_id.map(str::to_string),
            timestamp: self.clock.now_ms(),
        };
        let market = event.market_id.as_deref().unwrap_or("-");
        match level {
            StatusLevel::Error => error!(market_id = market, "{}", event.message),
            StatusLevel::Warning => warn!(market_id = market, "{}", event.message),
            StatusLevel::Info | StatusLevel::Success => {
                info!(market_id = market, level = %level, "{}", event.message)
            }
        }
        self.status.notify(&event);
    }

    pub fn trade_completed(&self) {
        self.trade_completed.notify(&());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use o2_core::ManualClock;
    use parking_lot::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[test]
    fn test_status_delivered_with_timestamp() {
        let events = EngineEvents::new(Arc::new(ManualClock::new(99)));
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let _sub = events.on_status(move |e| sink.lock().push(e.clone()));

        events.emit(StatusLevel::Success, Some("0xm"), "Buy order placed");

        let seen = seen.lock();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].level, StatusLevel::Success);
        assert_eq!(seen[0].market_id.as_deref(), Some("0xm"));
        assert_eq!(seen[0].timestamp, 99);
    }

    #[test]
    fn test_panicking_subscriber_is_isolated() {
        let events = EngineEvents::new(Arc::new(ManualClock::new(0)));
        let count = Arc::new(AtomicUsize::new(0));
        let _bad = events.on_trade_completed(|| panic!("ui exploded"));
        let counter = count.clone();
        let _good = events.on_trade_completed(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        events.trade_completed();
        events.trade_completed();
        assert_eq!(count.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_unsubscribe() {
        let events = EngineEvents::new(Arc::new(ManualClock::new(0)));
        let count = Arc::new(AtomicUsize::new(0));
        let counter = count.clone();
        let sub = events.on_status(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        events.emit(StatusLevel::Info, None, "one");
        sub.unsubscribe();
        events.emit(StatusLevel::Info, None, "two");
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }
}
