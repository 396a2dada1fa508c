//! Per-market strategy configuration.
//!
//! The two strategy families carry different parameters, so the config is a
//! tagged sum type. Shared sections (timing, order management, tracked fill
//! state) sit next to the tagged part.

use crate::order::{OrderSide, OrderType};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

// ============================================================================
// Strategy parameters
// ============================================================================

/// Aggressive two-sided quoting around the last price.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MarketMakingParams {
    /// Percent above mid for the buy (0.1 = 0.1%).
    #[serde(default = "default_adjustment_pct")]
    pub buy_price_adjustment_pct: Decimal,
    /// Percent below mid for the sell.
    #[serde(default = "default_adjustment_pct")]
    pub sell_price_adjustment_pct: Decimal,
    #[serde(default = "default_min_order_usd")]
    pub min_order_usd: Decimal,
    /// Display-unit quantity is floored to this many places.
    #[serde(default = "default_quantity_decimals")]
    pub quantity_decimals: u32,
    #[serde(default = "default_mm_order_type")]
    pub order_type: OrderType,
}

fn default_adjustment_pct() -> Decimal {
    dec!(0.1)
}

fn default_min_order_usd() -> Decimal {
    dec!(5)
}

fn default_quantity_decimals() -> u32 {
    3
}

fn default_mm_order_type() -> OrderType {
    OrderType::Market
}

impl Default for MarketMakingParams {
    fn default() -> Self {
        Self {
            buy_price_adjustment_pct: default_adjustment_pct(),
            sell_price_adjustment_pct: default_adjustment_pct(),
            min_order_usd: default_min_order_usd(),
            quantity_decimals: default_quantity_decimals(),
            order_type: default_mm_order_type(),
        }
    }
}

/// Sell or buy whatever exceeds a fixed balance threshold.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BalanceThresholdParams {
    /// Base balance (display units) kept in the account.
    #[serde(default = "default_base_threshold")]
    pub base_threshold: Decimal,
    /// Quote balance (display units) kept in the account.
    #[serde(default = "default_quote_threshold")]
    pub quote_threshold: Decimal,
    #[serde(default = "default_sell_multiplier")]
    pub sell_price_multiplier: Decimal,
    #[serde(default = "default_buy_multiplier")]
    pub buy_price_multiplier: Decimal,
    #[serde(default = "default_min_order_usd")]
    pub min_order_usd: Decimal,
    #[serde(default = "default_bt_order_type")]
    pub order_type: OrderType,
}

fn default_base_threshold() -> Decimal {
    dec!(1000)
}

fn default_quote_threshold() -> Decimal {
    dec!(100)
}

fn default_sell_multiplier() -> Decimal {
    dec!(0.99)
}

fn default_buy_multiplier() -> Decimal {
    dec!(1.01)
}

fn default_bt_order_type() -> OrderType {
    OrderType::Spot
}

impl Default for BalanceThresholdParams {
    fn default() -> Self {
        Self {
            base_threshold: default_base_threshold(),
            quote_threshold: default_quote_threshold(),
            sell_price_multiplier: default_sell_multiplier(),
            buy_price_multiplier: default_buy_multiplier(),
            min_order_usd: default_min_order_usd(),
            order_type: default_bt_order_type(),
        }
    }
}

/// Strategy family plus its parameters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum StrategyKind {
    MarketMaking(MarketMakingParams),
    BalanceThreshold(BalanceThresholdParams),
}

impl StrategyKind {
    pub fn label(&self) -> &'static str {
        match self {
            Self::MarketMaking(_) => "MarketMaking",
            Self::BalanceThreshold(_) => "BalanceThreshold",
        }
    }

    /// Cycle interval used when the config does not override it.
    pub fn default_timing(&self) -> Timing {
        match self {
            Self::MarketMaking(_) => Timing {
                cycle_interval_min_ms: 3_000,
                cycle_interval_max_ms: 5_000,
            },
            Self::BalanceThreshold(_) => Timing {
                cycle_interval_min_ms: 5_000,
                cycle_interval_max_ms: 10_000,
            },
        }
    }
}

// ============================================================================
// Shared sections
// ============================================================================

/// Jitter window between cycles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Timing {
    pub cycle_interval_min_ms: u64,
    pub cycle_interval_max_ms: u64,
}

impl Timing {
    /// Bounds with `min <= max` guaranteed.
    pub fn bounds(&self) -> (u64, u64) {
        let min = self.cycle_interval_min_ms.min(self.cycle_interval_max_ms);
        let max = self.cycle_interval_min_ms.max(self.cycle_interval_max_ms);
        (min, max)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderManagement {
    #[serde(default)]
    pub track_fill_prices: bool,
    /// Skip sells priced under the tracked average buy.
    #[serde(default)]
    pub only_sell_above_buy_price: bool,
}

/// Running fill totals for one side.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SideFills {
    /// Filled quantity (display units).
    pub quantity: Decimal,
    /// Sum of price * quantity (display units).
    pub notional: Decimal,
}

impl SideFills {
    pub fn average_price(&self) -> Option<Decimal> {
        if self.quantity.is_zero() {
            None
        } else {
            Some(self.notional / self.quantity)
        }
    }
}

/// Fill-derived state the engine folds into a config.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FillState {
    #[serde(default)]
    pub buy: SideFills,
    #[serde(default)]
    pub sell: SideFills,
    /// Filled quantity already counted, per order.
    #[serde(default)]
    pub order_fills: BTreeMap<String, Decimal>,
}

impl FillState {
    /// Fold in the fill progress of one order.
    ///
    /// `filled_quantity` is the order's cumulative fill; only the part not
    /// seen before is added, at `price`. Returns `false` when nothing new
    /// was filled.
    pub fn record_fill(
        &mut self,
        order_id: &str,
        side: OrderSide,
        filled_quantity: Decimal,
        price: Decimal,
    ) -> bool {
        let previous = self
            .order_fills
            .get(order_id)
            .copied()
            .unwrap_or(Decimal::ZERO);
        let delta = filled_quantity - previous;
        if delta <= Decimal::ZERO {
            return false;
        }
        self.order_fills.insert(order_id.to_string(), filled_quantity);
        let fills = match side {
            OrderSide::Buy => &mut self.buy,
            OrderSide::Sell => &mut self.sell,
        };
        fills.quantity += delta;
        fills.notional += delta * price;
        true
    }

    /// Cumulative fill already counted for `order_id`.
    pub fn counted_fill(&self, order_id: &str) -> Decimal {
        self.order_fills.get(order_id).copied().unwrap_or(Decimal::ZERO)
    }

    pub fn average_buy_price(&self) -> Option<Decimal> {
        self.buy.average_price()
    }

    pub fn average_sell_price(&self) -> Option<Decimal> {
        self.sell.average_price()
    }
}

// ============================================================================
// Config and persisted row
// ============================================================================

/// Live strategy configuration for one market.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StrategyConfig {
    pub market_id: String,
    #[serde(default)]
    pub name: String,
    pub strategy: StrategyKind,
    #[serde(default)]
    pub timing: Option<Timing>,
    #[serde(default)]
    pub order_management: OrderManagement,
    #[serde(default)]
    pub fill_state: FillState,
}

impl StrategyConfig {
    pub fn new(market_id: impl Into<String>, strategy: StrategyKind) -> Self {
        Self {
            market_id: market_id.into(),
            name: strategy.label().to_string(),
            strategy,
            timing: None,
            order_management: OrderManagement::default(),
            fill_state: FillState::default(),
        }
    }

    /// Configured timing, or the family default.
    pub fn effective_timing(&self) -> Timing {
        self.timing.unwrap_or_else(|| self.strategy.default_timing())
    }
}

/// Persisted config row; `id` is the market id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StrategyConfigRecord {
    pub id: String,
    pub market_id: String,
    pub config: StrategyConfig,
    pub is_active: bool,
    pub created_at: u64,
    pub updated_at: u64,
}

impl StrategyConfigRecord {
    pub fn new(config: StrategyConfig, is_active: bool, now_ms: u64) -> Self {
        Self {
            id: config.market_id.clone(),
            market_id: config.market_id.clone(),
            config,
            is_active,
            created_at: now_ms,
            updated_at: now_ms,
        }
    }
}
