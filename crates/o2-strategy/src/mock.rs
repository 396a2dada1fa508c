//! In-memory exchange gateway for tests.
//!
//! Records placed intents and can be told to fail per side, fail balance
//! reads, or delay placements to expose overlapping submissions.

use crate::error::{StrategyError, StrategyResult};
use crate::gateway::ExchangeGateway;
use async_trait::async_trait;
use o2_core::{Balance, Market, MarketBalances, OrderIntent, OrderSide, OwnerAddress, Ticker};
use parking_lot::Mutex;
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;

#[derive(Default)]
struct GatewayState {
    tickers: HashMap<String, Ticker>,
    balances: HashMap<String, (Decimal, Decimal)>,
    side_failures: HashMap<OrderSide, String>,
    balance_failure: Option<String>,
    placed: Vec<(String, OrderIntent)>,
}

#[derive(Default)]
pub struct MockGateway {
    state: Mutex<GatewayState>,
    next_order: AtomicU64,
    invalidations: AtomicUsize,
    place_delay_ms: AtomicU64,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl MockGateway {
    pub fn new() -> Self {
        Self::default()
    }

    /// Last price, scaled by quote decimals.
    pub fn set_ticker(&self, market_id: &str, last_price: Decimal) {
        self.state.lock().tickers.insert(
            market_id.to_string(),
            Ticker {
                market_id: market_id.to_string(),
                last_price,
                bid: None,
                ask: None,
            },
        );
    }

    /// Unlocked base and quote (scaled) for `market_id`.
    pub fn set_balances(&self, market_id: &str, base: Decimal, quote: Decimal) {
        self.state
            .lock()
            .balances
            .insert(market_id.to_string(), (base, quote));
    }

    pub fn fail_side(&self, side: OrderSide, message: &str) {
        self.state
            .lock()
            .side_failures
            .insert(side, message.to_string());
    }

    pub fn fail_balances(&self, message: Option<&str>) {
        self.state.lock().balance_failure = message.map(str::to_string);
    }

    pub fn set_place_delay(&self, ms: u64) {
        self.place_delay_ms.store(ms, Ordering::SeqCst);
    }

    /// (market id, intent) of every successful placement.
    pub fn placed(&self) -> Vec<(String, OrderIntent)> {
        self.state.lock().placed.clone()
    }

    pub fn invalidations(&self) -> usize {
        self.invalidations.load(Ordering::SeqCst)
    }

    /// Highest number of placements observed in flight at once.
    pub fn max_concurrent_placements(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }
}

fn balance(asset: &o2_core::AssetInfo, unlocked: Decimal) -> Balance {
    Balance {
        asset_id: asset.asset.clone(),
        symbol: asset.symbol.clone(),
        unlocked,
        locked: Decimal::ZERO,
        total: unlocked,
        decimals: asset.decimals,
    }
}

#[async_trait]
impl ExchangeGateway for MockGateway {
    async fn ticker(&self, market: &Market) -> StrategyResult<Option<Ticker>> {
        Ok(self.state.lock().tickers.get(&market.market_id).cloned())
    }

    async fn market_balances(
        &self,
        market: &Market,
        _owner: &OwnerAddress,
        _trade_account_id: &str,
    ) -> StrategyResult<MarketBalances> {
        let state = self.state.lock();
        if let Some(message) = &state.balance_failure {
            return Err(StrategyError::Placement(format!("balance read failed: {message}")));
        }
        let (base, quote) = state
            .balances
            .get(&market.market_id)
            .copied()
            .unwrap_or_default();
        Ok(MarketBalances {
            base: balance(&market.base, base),
            quote: balance(&market.quote, quote),
        })
    }

    fn invalidate_balances(&self) {
        self.invalidations.fetch_add(1, Ordering::SeqCst);
    }

    async fn place_order(
        &self,
        market: &Market,
        intent: &OrderIntent,
        _owner: &OwnerAddress,
        _trade_account_id: &str,
    ) -> StrategyResult<String> {
        let open = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(open, Ordering::SeqCst);
        let delay = self.place_delay_ms.load(Ordering::SeqCst);
        if delay > 0 {
            tokio::time::sleep(Duration::from_millis(delay)).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        let mut state = self.state.lock();
        if let Some(message) = state.side_failures.get(&intent.side) {
            return Err(StrategyError::Placement(message.clone()));
        }
        state
            .placed
            .push((market.market_id.clone(), intent.clone()));
        let n = self.next_order.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(format!("0xorder{n:0>8}"))
    }
}
