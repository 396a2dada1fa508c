//! Trading engine.
//!
//! Runs every active strategy config on its own schedule. Cycles across all
//! markets share one [`TransactionLock`]: a cycle that finds it held backs
//! off and retries instead of waiting, so at most one nonce-bearing batch is
//! being built and submitted at any time.

use crate::error::{EngineError, EngineResult};
use crate::events::{EngineEvents, StatusEvent, StatusLevel};
use crate::fills::FillTracker;
use crate::lock::TransactionLock;
use crate::scheduler::Scheduler;
use o2_core::{
    DynClock, Market, OrderExecution, OwnerAddress, StrategyConfig, StrategyConfigRecord,
    Subscription, Trade,
};
use o2_store::DynStore;
use o2_strategy::{random_delay, StrategyRegistry};
use o2_telemetry::Metrics;
use o2_venue::{DynVenue, MarketCache};
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Driver wake-up when nothing is scheduled.
const IDLE_WAIT_MS: u64 = 1_000;

// ============================================================================
// Settings
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineSettings {
    /// Retry delay after losing the transaction lock.
    #[serde(default = "default_lock_backoff_ms")]
    pub lock_backoff_ms: u64,
    /// Retry delay after a failed cycle.
    #[serde(default = "default_error_backoff_ms")]
    pub error_backoff_ms: u64,
    #[serde(default = "default_fill_poll_interval_ms")]
    pub fill_poll_interval_ms: u64,
}

fn default_lock_backoff_ms() -> u64 {
    2_500
}

fn default_error_backoff_ms() -> u64 {
    10_000
}

fn default_fill_poll_interval_ms() -> u64 {
    2_500
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            lock_backoff_ms: default_lock_backoff_ms(),
            error_backoff_ms: default_error_backoff_ms(),
            fill_poll_interval_ms: default_fill_poll_interval_ms(),
        }
    }
}

/// What one scheduled cycle did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleOutcome {
    /// Engine stopped or market no longer scheduled; nothing rescheduled.
    NotRunning,
    /// Transaction lock was held; retried after the lock backoff.
    Contended,
    /// Strategy placed at least one order.
    Executed,
    /// Strategy ran but had nothing to do.
    Idle,
    /// Strategy failed; retried after the error backoff.
    Failed,
}

#[derive(Debug, Clone)]
struct EngineIdentity {
    owner: OwnerAddress,
    trade_account_id: String,
    session_id: Option<String>,
}

#[derive(Debug, Clone)]
struct MarketSlot {
    market: Market,
    config: StrategyConfig,
}

// ============================================================================
// Engine
// ============================================================================

struct Inner {
    store: DynStore,
    markets: Arc<MarketCache>,
    registry: Arc<StrategyRegistry>,
    fills: FillTracker,
    clock: DynClock,
    settings: EngineSettings,
    identity: RwLock<Option<EngineIdentity>>,
    running: AtomicBool,
    lock: TransactionLock,
    scheduler: Scheduler,
    slots: RwLock<HashMap<String, MarketSlot>>,
    trade_cycles: AtomicU64,
    events: EngineEvents,
    shutdown: Mutex<CancellationToken>,
}

/// Cheap to clone; clones share one engine.
#[derive(Clone)]
pub struct TradingEngine {
    inner: Arc<Inner>,
}

impl TradingEngine {
    pub fn new(
        venue: DynVenue,
        store: DynStore,
        markets: Arc<MarketCache>,
        registry: Arc<StrategyRegistry>,
        clock: DynClock,
        settings: EngineSettings,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                fills: FillTracker::new(venue, store.clone()),
                store,
                markets,
                registry,
                events: EngineEvents::new(clock.clone()),
                clock,
                settings,
                identity: RwLock::new(None),
                running: AtomicBool::new(false),
                lock: TransactionLock::new(),
                scheduler: Scheduler::new(),
                slots: RwLock::new(HashMap::new()),
                trade_cycles: AtomicU64::new(0),
                shutdown: Mutex::new(CancellationToken::new()),
            }),
        }
    }

    /// Bind the engine to an owner and trade account. Trades are tagged with
    /// `session_id`. Resets the session cycle counter.
    pub fn initialize(
        &self,
        owner: OwnerAddress,
        trade_account_id: impl Into<String>,
        session_id: Option<String>,
    ) {
        let trade_account_id = trade_account_id.into();
        info!(owner = %owner, %trade_account_id, "Trading engine initialized");
        *self.inner.identity.write() = Some(EngineIdentity {
            owner,
            trade_account_id,
            session_id,
        });
        self.inner.trade_cycles.store(0, Ordering::Release);
    }

    /// Load active configs and start scheduling. No-op when running.
    ///
    /// With no usable config the engine still counts as started but idle.
    ///
    /// # Errors
    /// `NotInitialized` before [`initialize`](Self::initialize); store errors
    /// while loading configs.
    pub async fn start(&self) -> EngineResult<()> {
        let Some(token) = self.inner.load().await? else {
            return Ok(());
        };

        let tracked: Vec<String> = self
            .inner
            .slots
            .read()
            .values()
            .filter(|slot| slot.config.order_management.track_fill_prices)
            .map(|slot| slot.market.market_id.clone())
            .collect();
        for market_id in tracked {
            spawn_fill_poller(self.inner.clone(), market_id, token.clone());
        }
        if !self.inner.scheduler.is_empty() {
            spawn_driver(self.inner.clone(), token);
        }
        Ok(())
    }

    /// Stop scheduling and forget loaded configs. A cycle already past the
    /// lock finishes but does not reschedule. No-op when not running.
    pub fn stop(&self) {
        let inner = &self.inner;
        if !inner.running.swap(false, Ordering::AcqRel) {
            return;
        }
        inner.lock.force_release();
        inner.shutdown.lock().cancel();
        inner.scheduler.clear();
        inner.slots.write().clear();
        Metrics::set_active_markets(0);
        inner
            .events
            .emit(StatusLevel::Info, None, "Trading engine stopped");
    }

    /// Run one cycle for `market_id` now. The driver calls this for every
    /// due market.
    pub async fn run_cycle(&self, market_id: &str) -> CycleOutcome {
        self.inner.run_cycle(market_id).await
    }

    pub fn is_active(&self) -> bool {
        self.inner.running.load(Ordering::Acquire)
    }

    /// Earliest scheduled run across markets (epoch ms).
    pub fn next_run_time(&self) -> Option<u64> {
        self.inner.scheduler.next_due()
    }

    pub fn next_run_time_for(&self, market_id: &str) -> Option<u64> {
        self.inner.scheduler.due_at(market_id)
    }

    /// Cycles that placed orders since the last `initialize`.
    pub fn session_trade_cycles(&self) -> u64 {
        self.inner.trade_cycles.load(Ordering::Acquire)
    }

    /// Loaded markets, sorted.
    pub fn market_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.inner.slots.read().keys().cloned().collect();
        ids.sort();
        ids
    }

    /// In-memory config for a loaded market, including fill state.
    pub fn config(&self, market_id: &str) -> Option<StrategyConfig> {
        self.inner.slot(market_id).map(|slot| slot.config)
    }

    pub fn on_status<F>(&self, callback: F) -> Subscription
    where
        F: Fn(&StatusEvent) + Send + Sync + 'static,
    {
        self.inner.events.on_status(callback)
    }

    pub fn on_trade_completed<F>(&self, callback: F) -> Subscription
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.inner.events.on_trade_completed(callback)
    }
}

impl Inner {
    fn identity(&self) -> Option<EngineIdentity> {
        self.identity.read().clone()
    }

    fn slot(&self, market_id: &str) -> Option<MarketSlot> {
        self.slots.read().get(market_id).cloned()
    }

    fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Mark running, resolve markets and schedule each for now. `None` when
    /// already running.
    async fn load(&self) -> EngineResult<Option<CancellationToken>> {
        if self.identity.read().is_none() {
            return Err(EngineError::NotInitialized);
        }
        if self.running.swap(true, Ordering::AcqRel) {
            debug!("Trading engine already running");
            return Ok(None);
        }

        let records = match self.store.active_strategy_configs() {
            Ok(records) => records,
            Err(e) => {
                self.running.store(false, Ordering::Release);
                return Err(e.into());
            }
        };

        let mut slots = HashMap::new();
        for record in records {
            match self.markets.market(&record.market_id).await {
                Ok(market) => {
                    slots.insert(
                        record.market_id.clone(),
                        MarketSlot {
                            market,
                            config: record.config,
                        },
                    );
                }
                Err(e) => {
                    warn!(market_id = %record.market_id, error = %e, "Skipping config for unknown market")
                }
            }
        }

        let token = CancellationToken::new();
        *self.shutdown.lock() = token.clone();
        Metrics::set_active_markets(slots.len());

        if slots.is_empty() {
            self.events.emit(
                StatusLevel::Warning,
                None,
                "No active strategy configs; engine is idle",
            );
            return Ok(Some(token));
        }

        let now = self.clock.now_ms();
        let count = slots.len();
        let ids: Vec<String> = slots.keys().cloned().collect();
        *self.slots.write() = slots;
        for market_id in &ids {
            self.scheduler.schedule(market_id, now);
        }
        self.events.emit(
            StatusLevel::Info,
            None,
            format!("Trading engine started for {count} market(s)"),
        );
        Ok(Some(token))
    }

    async fn run_cycle(&self, market_id: &str) -> CycleOutcome {
        if !self.is_running() {
            return CycleOutcome::NotRunning;
        }
        let (Some(identity), Some(slot)) = (self.identity(), self.slot(market_id)) else {
            return CycleOutcome::NotRunning;
        };

        let Some(guard) = self.lock.try_acquire() else {
            debug!(market_id, "Transaction lock held, backing off");
            Metrics::lock_contention(market_id);
            self.reschedule(market_id, self.clock.now_ms() + self.settings.lock_backoff_ms);
            return CycleOutcome::Contended;
        };

        let (outcome, next_run_at) = match self.execute(&identity, slot).await {
            Ok(done) => done,
            Err(e) => {
                Metrics::cycle_error(market_id);
                self.events.emit(
                    StatusLevel::Error,
                    Some(market_id),
                    format!("Trade cycle failed: {e}"),
                );
                (
                    CycleOutcome::Failed,
                    self.clock.now_ms() + self.settings.error_backoff_ms,
                )
            }
        };
        drop(guard);

        self.reschedule(market_id, next_run_at);
        outcome
    }

    async fn execute(
        &self,
        identity: &EngineIdentity,
        slot: MarketSlot,
    ) -> EngineResult<(CycleOutcome, u64)> {
        let MarketSlot { market, mut config } = slot;
        let market_id = market.market_id.as_str();
        let tracking = config.order_management.track_fill_prices;

        if tracking {
            self.sync_fills(&market, identity).await;
            if let Some(fresh) = self.slot(market_id) {
                config = fresh.config;
            }
        }

        let strategy = self.registry.for_config(&config.strategy);
        let result = strategy
            .execute(&market, &config, &identity.owner, &identity.trade_account_id)
            .await?;

        for order in &result.orders {
            self.record_order(&market, identity, order);
        }
        Metrics::cycle(market_id, result.executed);

        if result.executed {
            self.trade_cycles.fetch_add(1, Ordering::AcqRel);
            self.events.trade_completed();
            // The poller may have folded fills into the slot meanwhile
            if tracking {
                if let Some(current) = self.slot(market_id) {
                    self.persist_config(&current.config)?;
                }
            }
        }

        let next_run_at = result.next_run_at.unwrap_or_else(|| {
            self.clock.now_ms() + random_delay(&config.effective_timing())
        });
        let outcome = if result.executed {
            CycleOutcome::Executed
        } else {
            CycleOutcome::Idle
        };
        Ok((outcome, next_run_at))
    }

    /// Store a trade row and publish a status line for one placement.
    fn record_order(&self, market: &Market, identity: &EngineIdentity, order: &OrderExecution) {
        let market_id = market.market_id.as_str();
        let side = order.side.to_string();
        let price = order.price_display.unwrap_or_default();
        let quantity = order.quantity_display.unwrap_or_default();

        if order.success {
            Metrics::order_placed(market_id, &side);
            self.events.emit(
                StatusLevel::Success,
                Some(market_id),
                format!(
                    "{side} {quantity} {} @ {price} {}",
                    market.base.symbol, market.quote.symbol
                ),
            );
        } else {
            Metrics::order_failed(market_id, &side);
            self.events.emit(
                StatusLevel::Error,
                Some(market_id),
                format!(
                    "{side} order failed: {}",
                    order.error.as_deref().unwrap_or("unknown error")
                ),
            );
        }

        let trade = Trade {
            id: 0,
            timestamp: self.clock.now_ms(),
            market_id: market_id.to_string(),
            order_id: order.order_id.clone(),
            session_id: identity.session_id.clone(),
            side: order.side,
            price,
            quantity,
            success: order.success,
            error: order.error.clone(),
            value_usd: None,
            fee_usd: None,
            fill_price: None,
        };
        if let Err(e) = self.store.insert_trade(&trade) {
            warn!(market_id, order_id = %order.order_id, error = %e, "Failed to record trade");
        }
    }

    /// Poll fills for `market` and fold them into its loaded config.
    /// Failures are logged only.
    async fn sync_fills(&self, market: &Market, identity: &EngineIdentity) {
        let market_id = market.market_id.as_str();
        let orders = match self
            .fills
            .fetch(market, &identity.owner, &identity.trade_account_id)
            .await
        {
            Ok(orders) => orders,
            Err(e) => {
                warn!(market_id, error = %e, "Fill poll failed");
                return;
            }
        };

        let updated = {
            let mut slots = self.slots.write();
            let Some(slot) = slots.get_mut(market_id) else {
                return;
            };
            match self.fills.apply(&mut slot.config.fill_state, market, &orders) {
                Ok(0) => None,
                Ok(_) => Some(slot.config.clone()),
                Err(e) => {
                    warn!(market_id, error = %e, "Failed to fold fills");
                    None
                }
            }
        };
        if let Some(config) = updated {
            if let Err(e) = self.persist_config(&config) {
                warn!(market_id, error = %e, "Failed to persist fill state");
            }
        }
    }

    fn persist_config(&self, config: &StrategyConfig) -> EngineResult<()> {
        let now = self.clock.now_ms();
        let record = match self.store.get_strategy_config(&config.market_id)? {
            Some(mut record) => {
                record.config = config.clone();
                record.updated_at = now;
                record
            }
            None => StrategyConfigRecord::new(config.clone(), true, now),
        };
        self.store.put_strategy_config(&record)?;
        Ok(())
    }

    fn reschedule(&self, market_id: &str, due_at: u64) {
        if self.is_running() && self.slots.read().contains_key(market_id) {
            self.scheduler.schedule(market_id, due_at);
        }
    }
}

// ============================================================================
// Background tasks
// ============================================================================

/// Pop due markets and run each cycle on its own task.
fn spawn_driver(inner: Arc<Inner>, token: CancellationToken) {
    tokio::spawn(async move {
        info!("Scheduler started");
        loop {
            if token.is_cancelled() {
                break;
            }
            for market_id in inner.scheduler.pop_due(inner.clock.now_ms()) {
                let inner = inner.clone();
                tokio::spawn(async move {
                    inner.run_cycle(&market_id).await;
                });
            }

            let wait_ms = inner
                .scheduler
                .next_due()
                .map(|due| due.saturating_sub(inner.clock.now_ms()))
                .unwrap_or(IDLE_WAIT_MS);
            tokio::select! {
                () = token.cancelled() => break,
                () = tokio::time::sleep(Duration::from_millis(wait_ms)) => {}
                () = inner.scheduler.changed() => {}
            }
        }
        info!("Scheduler stopped");
    });
}

fn spawn_fill_poller(inner: Arc<Inner>, market_id: String, token: CancellationToken) {
    tokio::spawn(async move {
        let interval = Duration::from_millis(inner.settings.fill_poll_interval_ms);
        debug!(market_id = %market_id, "Fill poller started");
        loop {
            tokio::select! {
                () = token.cancelled() => break,
                () = tokio::time::sleep(interval) => {}
            }
            let (Some(identity), Some(slot)) = (inner.identity(), inner.slot(&market_id)) else {
                break;
            };
            inner.sync_fills(&slot.market, &identity).await;
        }
        debug!(market_id = %market_id, "Fill poller stopped");
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::SessionGateway;
    use crate::test_support::{market, owner};
    use o2_core::{ManualClock, OrderSide, StrategyKind, SystemClock, Timing, TradingAccount};
    use o2_session::SessionSigner;
    use o2_store::{DurableStore, LocalStore};
    use o2_strategy::MockGateway;
    use o2_venue::mock::MockVenue;
    use o2_venue::{BalanceCache, VenueApi};
    use rust_decimal_macros::dec;

    struct Fixture {
        venue: Arc<MockVenue>,
        store: Arc<LocalStore>,
        gateway: Arc<MockGateway>,
        clock: Arc<ManualClock>,
        engine: TradingEngine,
    }

    fn market_named(id: &str) -> Market {
        Market {
            market_id: id.to_string(),
            ..market()
        }
    }

    fn fixture(market_ids: &[&str]) -> Fixture {
        let venue = Arc::new(MockVenue::new());
        let store = Arc::new(LocalStore::in_memory());
        let gateway = Arc::new(MockGateway::new());
        let clock = Arc::new(ManualClock::new(1_000_000));
        for id in market_ids {
            venue.add_market(market_named(id));
            gateway.set_ticker(id, dec!(2000000));
            gateway.set_balances(id, dec!(0), dec!(100000000));
            let config = StrategyConfig::new(
                *id,
                StrategyKind::MarketMaking(Default::default()),
            );
            store
                .put_strategy_config(&StrategyConfigRecord::new(config, true, 0))
                .unwrap();
        }
        let engine = TradingEngine::new(
            venue.clone(),
            store.clone(),
            Arc::new(MarketCache::new(venue.clone())),
            Arc::new(StrategyRegistry::new(gateway.clone(), clock.clone())),
            clock.clone(),
            EngineSettings::default(),
        );
        engine.initialize(owner(), "0xacc", Some("0xsession".to_string()));
        Fixture {
            venue,
            store,
            gateway,
            clock,
            engine,
        }
    }

    fn collect_status(engine: &TradingEngine) -> Arc<Mutex<Vec<StatusEvent>>> {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        // Subscription handle dropped on purpose; the callback stays registered.
        let _ = engine.on_status(move |e| sink.lock().push(e.clone()));
        seen
    }

    #[tokio::test]
    async fn test_start_requires_initialize() {
        let venue = Arc::new(MockVenue::new());
        let clock = Arc::new(ManualClock::new(0));
        let engine = TradingEngine::new(
            venue.clone(),
            Arc::new(LocalStore::in_memory()),
            Arc::new(MarketCache::new(venue)),
            Arc::new(StrategyRegistry::new(Arc::new(MockGateway::new()), clock.clone())),
            clock,
            EngineSettings::default(),
        );
        assert!(matches!(engine.start().await, Err(EngineError::NotInitialized)));
        assert!(!engine.is_active());
    }

    #[tokio::test]
    async fn test_load_schedules_markets_immediately() {
        let f = fixture(&["0xa", "0xb"]);
        f.inner_load().await;

        assert!(f.engine.is_active());
        assert_eq!(f.engine.market_ids(), vec!["0xa", "0xb"]);
        assert_eq!(f.engine.next_run_time(), Some(1_000_000));
        assert_eq!(f.engine.next_run_time_for("0xb"), Some(1_000_000));
    }

    #[tokio::test]
    async fn test_unknown_market_is_skipped() {
        let f = fixture(&["0xa"]);
        let orphan = StrategyConfig::new("0xgone", StrategyKind::MarketMaking(Default::default()));
        f.store
            .put_strategy_config(&StrategyConfigRecord::new(orphan, true, 0))
            .unwrap();

        f.inner_load().await;
        assert_eq!(f.engine.market_ids(), vec!["0xa"]);
    }

    #[tokio::test]
    async fn test_no_configs_is_started_but_idle() {
        let f = fixture(&[]);
        let status = collect_status(&f.engine);

        f.engine.start().await.unwrap();
        assert!(f.engine.is_active());
        assert!(f.engine.market_ids().is_empty());
        assert_eq!(f.engine.next_run_time(), None);
        assert!(status
            .lock()
            .iter()
            .any(|e| e.level == StatusLevel::Warning));

        // Second start is a no-op
        f.engine.start().await.unwrap();
        f.engine.stop();
        assert!(!f.engine.is_active());
    }

    #[tokio::test]
    async fn test_cycle_places_records_and_reschedules() {
        let f = fixture(&["0xa"]);
        let status = collect_status(&f.engine);
        let completed = Arc::new(AtomicU64::new(0));
        let counter = completed.clone();
        let _ = f.engine.on_trade_completed(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        f.inner_load().await;

        assert_eq!(f.engine.run_cycle("0xa").await, CycleOutcome::Executed);

        let placed = f.gateway.placed();
        assert_eq!(placed.len(), 1);
        assert_eq!(placed[0].1.side, OrderSide::Buy);

        let trades = f.store.trades(Some("0xa"), 10).unwrap();
        assert_eq!(trades.len(), 1);
        assert!(trades[0].success);
        assert_eq!(trades[0].session_id.as_deref(), Some("0xsession"));
        assert_eq!(trades[0].price, dec!(2.002));

        assert_eq!(f.engine.session_trade_cycles(), 1);
        assert_eq!(completed.load(Ordering::SeqCst), 1);
        assert!(status
            .lock()
            .iter()
            .any(|e| e.level == StatusLevel::Success && e.market_id.as_deref() == Some("0xa")));

        // Market making default window is 3-5 s
        let next = f.engine.next_run_time_for("0xa").unwrap();
        assert!((1_003_000..=1_005_000).contains(&next));
    }

    #[tokio::test]
    async fn test_failed_intent_is_recorded_not_retried() {
        let f = fixture(&["0xa"]);
        f.gateway.set_balances("0xa", dec!(10000000000), dec!(100000000));
        f.gateway.fail_side(OrderSide::Sell, "book closed");
        let status = collect_status(&f.engine);
        f.inner_load().await;

        assert_eq!(f.engine.run_cycle("0xa").await, CycleOutcome::Executed);

        let trades = f.store.trades(Some("0xa"), 10).unwrap();
        assert_eq!(trades.len(), 2);
        let failed = trades.iter().find(|t| !t.success).unwrap();
        assert_eq!(failed.side, OrderSide::Sell);
        assert!(failed.error.as_deref().unwrap().contains("book closed"));
        assert_eq!(f.gateway.placed().len(), 1);
        assert!(status.lock().iter().any(|e| e.level == StatusLevel::Error));
    }

    #[tokio::test]
    async fn test_idle_cycle_without_ticker() {
        let f = fixture(&["0xa"]);
        let fresh = Arc::new(MockGateway::new());
        let engine = TradingEngine::new(
            f.venue.clone(),
            f.store.clone(),
            Arc::new(MarketCache::new(f.venue.clone())),
            Arc::new(StrategyRegistry::new(fresh, f.clock.clone())),
            f.clock.clone(),
            EngineSettings::default(),
        );
        engine.initialize(owner(), "0xacc", None);
        engine.inner.load().await.unwrap();

        assert_eq!(engine.run_cycle("0xa").await, CycleOutcome::Idle);
        assert_eq!(engine.session_trade_cycles(), 0);
        assert!(engine.next_run_time_for("0xa").unwrap() > 1_000_000);
    }

    #[tokio::test]
    async fn test_contended_cycle_backs_off() {
        let f = fixture(&["0xa"]);
        f.inner_load().await;

        let guard = f.engine.inner.lock.try_acquire().unwrap();
        assert_eq!(f.engine.run_cycle("0xa").await, CycleOutcome::Contended);
        assert_eq!(f.engine.next_run_time_for("0xa"), Some(1_002_500));
        assert!(f.gateway.placed().is_empty());
        drop(guard);

        assert_eq!(f.engine.run_cycle("0xa").await, CycleOutcome::Executed);
    }

    #[tokio::test]
    async fn test_failure_releases_lock_and_backs_off() {
        let f = fixture(&["0xa"]);
        f.gateway.fail_balances(Some("venue down"));
        f.inner_load().await;

        assert_eq!(f.engine.run_cycle("0xa").await, CycleOutcome::Failed);
        assert!(!f.engine.inner.lock.is_held());
        assert_eq!(f.engine.next_run_time_for("0xa"), Some(1_010_000));

        f.gateway.fail_balances(None);
        assert_eq!(f.engine.run_cycle("0xa").await, CycleOutcome::Executed);
    }

    #[tokio::test]
    async fn test_concurrent_cycles_are_serialized() {
        let f = fixture(&["0xa", "0xb", "0xc"]);
        f.gateway.set_place_delay(50);
        f.inner_load().await;

        let (a, b, c) = tokio::join!(
            f.engine.run_cycle("0xa"),
            f.engine.run_cycle("0xb"),
            f.engine.run_cycle("0xc"),
        );
        let outcomes = [a, b, c];
        assert_eq!(
            outcomes.iter().filter(|o| **o == CycleOutcome::Executed).count(),
            1
        );
        assert_eq!(
            outcomes.iter().filter(|o| **o == CycleOutcome::Contended).count(),
            2
        );
        assert_eq!(f.gateway.max_concurrent_placements(), 1);
    }

    #[tokio::test]
    async fn test_stop_clears_and_blocks_reschedule() {
        let f = fixture(&["0xa"]);
        f.gateway.set_place_delay(50);
        f.inner_load().await;

        let engine = f.engine.clone();
        let in_flight = tokio::spawn(async move { engine.run_cycle("0xa").await });
        tokio::time::sleep(Duration::from_millis(10)).await;
        f.engine.stop();

        assert_eq!(in_flight.await.unwrap(), CycleOutcome::Executed);
        assert!(!f.engine.is_active());
        assert!(f.engine.market_ids().is_empty());
        assert_eq!(f.engine.next_run_time(), None);
        assert!(!f.engine.inner.lock.is_held());
        assert_eq!(f.engine.run_cycle("0xa").await, CycleOutcome::NotRunning);

        // Stopping twice is harmless
        f.engine.stop();
    }

    #[tokio::test]
    async fn test_stale_cycle_does_not_unlock_restarted_engine() {
        let f = fixture(&["0xa"]);
        f.gateway.set_place_delay(50);
        f.inner_load().await;

        let engine = f.engine.clone();
        let stale = tokio::spawn(async move { engine.run_cycle("0xa").await });
        tokio::time::sleep(Duration::from_millis(10)).await;
        f.engine.stop();
        f.inner_load().await;

        let guard = f.engine.inner.lock.try_acquire().unwrap();
        assert_eq!(stale.await.unwrap(), CycleOutcome::Executed);
        assert!(f.engine.inner.lock.is_held());
        assert_eq!(f.engine.run_cycle("0xa").await, CycleOutcome::Contended);
        drop(guard);
        assert_eq!(f.engine.run_cycle("0xa").await, CycleOutcome::Executed);
    }

    #[tokio::test]
    async fn test_cycle_persists_fills_folded_while_placing() {
        let f = fixture(&["0xa"]);
        let mut config = StrategyConfig::new("0xa", StrategyKind::MarketMaking(Default::default()));
        config.order_management.track_fill_prices = true;
        f.store
            .put_strategy_config(&StrategyConfigRecord::new(config, true, 0))
            .unwrap();
        f.gateway.set_place_delay(50);
        f.inner_load().await;

        let engine = f.engine.clone();
        let cycle = tokio::spawn(async move { engine.run_cycle("0xa").await });
        tokio::time::sleep(Duration::from_millis(10)).await;
        {
            let mut slots = f.engine.inner.slots.write();
            let slot = slots.get_mut("0xa").unwrap();
            assert!(slot
                .config
                .fill_state
                .record_fill("0xfilled", OrderSide::Buy, dec!(1), dec!(2)));
        }
        assert_eq!(cycle.await.unwrap(), CycleOutcome::Executed);

        let stored = f.store.get_strategy_config("0xa").unwrap().unwrap();
        assert_eq!(stored.config.fill_state.counted_fill("0xfilled"), dec!(1));
        assert_eq!(stored.config.fill_state.average_buy_price(), Some(dec!(2)));
    }

    #[tokio::test]
    async fn test_fill_tracking_end_to_end() {
        let venue = Arc::new(MockVenue::new());
        let store = Arc::new(LocalStore::in_memory());
        let clock = Arc::new(ManualClock::new(5_000));
        let market = market();
        venue.add_market(market.clone());
        venue.set_ticker(&market.market_id, dec!(2000000));
        venue.set_balance(&market.quote.asset, dec!(100000000));

        let owner = owner();
        let account_id = venue.create_account(&owner).await.unwrap();
        store
            .put_trading_account(&TradingAccount {
                id: account_id.clone(),
                owner_address: owner.clone(),
                nonce: 0,
                created_at: 0,
            })
            .unwrap();
        let gateway = Arc::new(SessionGateway::new(
            venue.clone(),
            Arc::new(BalanceCache::new(venue.clone(), clock.clone(), 5_000)),
            SessionSigner::generate(),
            account_id.clone(),
            0,
            store.clone(),
        ));

        let mut config =
            StrategyConfig::new(&market.market_id, StrategyKind::MarketMaking(Default::default()));
        config.order_management.track_fill_prices = true;
        store
            .put_strategy_config(&StrategyConfigRecord::new(config, true, 0))
            .unwrap();

        let engine = TradingEngine::new(
            venue.clone(),
            store.clone(),
            Arc::new(MarketCache::new(venue.clone())),
            Arc::new(StrategyRegistry::new(gateway, clock.clone())),
            clock.clone(),
            EngineSettings::default(),
        );
        engine.initialize(owner, account_id.clone(), None);
        engine.inner.load().await.unwrap();

        assert_eq!(engine.run_cycle(&market.market_id).await, CycleOutcome::Executed);
        let order = venue.orders().pop().unwrap();
        assert_eq!(venue.account_nonce(&account_id), Some(1));

        // Half the order fills at 2.01
        venue.fill_order(&order.order_id, order.quantity / dec!(2), dec!(2010000));
        engine.run_cycle(&market.market_id).await;

        let fills = engine.config(&market.market_id).unwrap().fill_state;
        assert_eq!(fills.average_buy_price(), Some(dec!(2.01)));
        let stored = store.get_strategy_config(&market.market_id).unwrap().unwrap();
        assert_eq!(stored.config.fill_state, fills);
        let trade = store.trade_by_order_id(&order.order_id).unwrap().unwrap();
        assert_eq!(trade.fill_price, Some(dec!(2.01)));
    }

    #[tokio::test]
    async fn test_driver_runs_cycles_until_stopped() {
        let venue = Arc::new(MockVenue::new());
        let store = Arc::new(LocalStore::in_memory());
        let gateway = Arc::new(MockGateway::new());
        let clock: DynClock = Arc::new(SystemClock);
        venue.add_market(market_named("0xa"));
        gateway.set_ticker("0xa", dec!(2000000));
        gateway.set_balances("0xa", dec!(0), dec!(100000000));
        let mut config = StrategyConfig::new("0xa", StrategyKind::MarketMaking(Default::default()));
        config.timing = Some(Timing {
            cycle_interval_min_ms: 10,
            cycle_interval_max_ms: 20,
        });
        store
            .put_strategy_config(&StrategyConfigRecord::new(config, true, 0))
            .unwrap();

        let engine = TradingEngine::new(
            venue.clone(),
            store.clone(),
            Arc::new(MarketCache::new(venue)),
            Arc::new(StrategyRegistry::new(gateway.clone(), clock.clone())),
            clock,
            EngineSettings::default(),
        );
        engine.initialize(owner(), "0xacc", None);
        engine.start().await.unwrap();

        tokio::time::sleep(Duration::from_millis(200)).await;
        engine.stop();
        let placed = gateway.placed().len();
        assert!(placed >= 3, "only {placed} cycles ran");

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(gateway.placed().len(), placed);
    }

    impl Fixture {
        async fn inner_load(&self) {
            self.engine.inner.load().await.unwrap();
        }
    }
}
