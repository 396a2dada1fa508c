//! Order-related types.
//!
//! Provides order side/type enums plus the intent and execution records
//! exchanged between strategies and the trading engine.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Order side: buy or sell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OrderSide {
    #[serde(alias = "buy")]
    Buy,
    #[serde(alias = "sell")]
    Sell,
}

impl OrderSide {
    /// Returns the opposite side.
    pub fn opposite(&self) -> Self {
        match self {
            Self::Buy => Self::Sell,
            Self::Sell => Self::Buy,
        }
    }
}

impl fmt::Display for OrderSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Buy => write!(f, "Buy"),
            Self::Sell => write!(f, "Sell"),
        }
    }
}

/// Order type accepted by the order book.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OrderType {
    Spot,
    Market,
    Limit,
    FillOrKill,
    PostOnly,
}

impl fmt::Display for OrderType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Spot => "Spot",
            Self::Market => "Market",
            Self::Limit => "Limit",
            Self::FillOrKill => "FillOrKill",
            Self::PostOnly => "PostOnly",
        };
        write!(f, "{s}")
    }
}

/// An order a strategy wants placed. Amounts are scaled integers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderIntent {
    pub side: OrderSide,
    pub order_type: OrderType,
    /// Price scaled by quote decimals.
    pub price: Decimal,
    /// Quantity scaled by base decimals.
    pub quantity: Decimal,
    /// Display-unit price, for status lines.
    pub price_display: Decimal,
    /// Display-unit quantity, for status lines.
    pub quantity_display: Decimal,
}

impl OrderIntent {
    /// Notional value in quote display units.
    pub fn notional(&self) -> Decimal {
        self.price_display * self.quantity_display
    }
}

/// Outcome of one placement attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderExecution {
    /// Venue order id; empty when placement failed.
    pub order_id: String,
    pub side: OrderSide,
    pub success: bool,
    #[serde(default)]
    pub price: Option<Decimal>,
    #[serde(default)]
    pub quantity: Option<Decimal>,
    #[serde(default)]
    pub price_display: Option<Decimal>,
    #[serde(default)]
    pub quantity_display: Option<Decimal>,
    #[serde(default)]
    pub error: Option<String>,
}

impl OrderExecution {
    /// Successful placement of `intent` under `order_id`.
    pub fn placed(intent: &OrderIntent, order_id: impl Into<String>) -> Self {
        Self {
            order_id: order_id.into(),
            side: intent.side,
            success: true,
            price: Some(intent.price),
            quantity: Some(intent.quantity),
            price_display: Some(intent.price_display),
            quantity_display: Some(intent.quantity_display),
            error: None,
        }
    }

    /// Failed placement of `intent`.
    pub fn failed(intent: &OrderIntent, error: impl Into<String>) -> Self {
        Self {
            order_id: String::new(),
            side: intent.side,
            success: false,
            price: Some(intent.price),
            quantity: Some(intent.quantity),
            price_display: Some(intent.price_display),
            quantity_display: Some(intent.quantity_display),
            error: Some(error.into()),
        }
    }
}

/// What a strategy run produced.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StrategyExecutionResult {
    pub executed: bool,
    pub orders: Vec<OrderExecution>,
    /// Preferred next run (ms since epoch); `None` lets the engine jitter.
    #[serde(default)]
    pub next_run_at: Option<u64>,
}

impl StrategyExecutionResult {
    /// Nothing attempted this cycle.
    pub fn idle(next_run_at: Option<u64>) -> Self {
        Self {
            executed: false,
            orders: Vec::new(),
            next_run_at,
        }
    }

    /// Wrap placement outcomes; `executed` is true when anything was attempted.
    pub fn from_orders(orders: Vec<OrderExecution>, next_run_at: Option<u64>) -> Self {
        Self {
            executed: !orders.is_empty(),
            orders,
            next_run_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn intent() -> OrderIntent {
        OrderIntent {
            side: OrderSide::Buy,
            order_type: OrderType::Market,
            price: dec!(1501000),
            quantity: dec!(66600000000),
            price_display: dec!(1.501),
            quantity_display: dec!(66.6),
        }
    }

    #[test]
    fn test_side_accepts_lowercase() {
        let side: OrderSide = serde_json::from_str("\"sell\"").unwrap();
        assert_eq!(side, OrderSide::Sell);
        assert_eq!(serde_json::to_string(&OrderSide::Buy).unwrap(), "\"Buy\"");
        assert_eq!(OrderSide::Buy.opposite(), OrderSide::Sell);
    }

    #[test]
    fn test_notional() {
        assert_eq!(intent().notional(), dec!(99.9666));
    }

    #[test]
    fn test_execution_constructors() {
        let ok = OrderExecution::placed(&intent(), "0xorder");
        assert!(ok.success);
        assert_eq!(ok.order_id, "0xorder");

        let failed = OrderExecution::failed(&intent(), "rejected");
        assert!(!failed.success);
        assert!(failed.order_id.is_empty());
        assert_eq!(failed.error.as_deref(), Some("rejected"));
    }

    #[test]
    fn test_result_executed_flag() {
        assert!(!StrategyExecutionResult::from_orders(vec![], None).executed);
        let r = StrategyExecutionResult::from_orders(
            vec![OrderExecution::failed(&intent(), "x")],
            Some(10),
        );
        assert!(r.executed);
        assert_eq!(r.next_run_at, Some(10));
    }
}
