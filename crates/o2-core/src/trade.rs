//! Trade history records.

use crate::order::OrderSide;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Record of one order placement attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Trade {
    /// Assigned by the store on insert.
    #[serde(default)]
    pub id: u64,
    pub timestamp: u64,
    pub market_id: String,
    #[serde(default)]
    pub order_id: String,
    #[serde(default)]
    pub session_id: Option<String>,
    pub side: OrderSide,
    /// Display-unit price.
    pub price: Decimal,
    /// Display-unit quantity.
    pub quantity: Decimal,
    pub success: bool,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub value_usd: Option<Decimal>,
    #[serde(default)]
    pub fee_usd: Option<Decimal>,
    /// Average fill price once the order has filled.
    #[serde(default)]
    pub fill_price: Option<Decimal>,
}

/// Fill-derived fields attached after the fact.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TradeUpdate {
    pub value_usd: Option<Decimal>,
    pub fee_usd: Option<Decimal>,
    pub fill_price: Option<Decimal>,
}

impl Trade {
    /// Apply the set fields of `update`.
    pub fn apply(&mut self, update: &TradeUpdate) {
        if let Some(v) = update.value_usd {
            self.value_usd = Some(v);
        }
        if let Some(v) = update.fee_usd {
            self.fee_usd = Some(v);
        }
        if let Some(v) = update.fill_price {
            self.fill_price = Some(v);
        }
    }

    /// Notional in quote display units, falling back to price * quantity.
    pub fn volume_usd(&self) -> Decimal {
        self.value_usd.unwrap_or(self.price * self.quantity)
    }
}

/// Aggregate over a set of trades.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TradeStats {
    pub total: usize,
    pub successful: usize,
    pub failed: usize,
    /// Sum over successful trades only.
    pub volume_usd: Decimal,
}

impl TradeStats {
    pub fn from_trades<'a>(trades: impl IntoIterator<Item = &'a Trade>) -> Self {
        trades.into_iter().fold(Self::default(), |mut acc, t| {
            acc.total += 1;
            if t.success {
                acc.successful += 1;
                acc.volume_usd += t.volume_usd();
            } else {
                acc.failed += 1;
            }
            acc
        })
    }
}
