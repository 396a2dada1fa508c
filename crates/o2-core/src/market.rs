//! Market definitions, tickers and balances.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// One side of a trading pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssetInfo {
    /// Asset id (b256).
    pub asset: String,
    pub symbol: String,
    /// Scaling exponent of on-chain amounts.
    pub decimals: u32,
    /// Maximum significant fractional digits accepted by the order book.
    pub max_precision: u32,
}

/// A spot market on the venue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Market {
    pub market_id: String,
    /// Order book contract id; also the scope entry for sessions.
    pub contract_id: String,
    pub base: AssetInfo,
    pub quote: AssetInfo,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tick_size: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub step_size: Option<String>,
}

impl Market {
    /// Human-readable pair, e.g. `ETH/USDC`.
    pub fn pair(&self) -> String {
        format!("{}/{}", self.base.symbol, self.quote.symbol)
    }
}

/// Latest market statistics.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ticker {
    pub market_id: String,
    /// Last traded price, scaled by quote decimals.
    pub last_price: Decimal,
    #[serde(default)]
    pub bid: Option<Decimal>,
    #[serde(default)]
    pub ask: Option<Decimal>,
}

/// Balance of one asset as seen from one market (scaled units).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Balance {
    pub asset_id: String,
    pub symbol: String,
    /// Spendable in this market: trading account + this book's unlocked funds.
    pub unlocked: Decimal,
    pub locked: Decimal,
    pub total: Decimal,
    pub decimals: u32,
}

/// Base and quote balances for a market.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MarketBalances {
    pub base: Balance,
    pub quote: Balance,
}

#[cfg(test)]
pub(crate) mod fixtures {
    use super::*;

    pub fn eth_usdc() -> Market {
        Market {
            market_id: "0xmarket".to_string(),
            contract_id: format!("0x{}", "11".repeat(32)),
            base: AssetInfo {
                asset: format!("0x{}", "aa".repeat(32)),
                symbol: "ETH".to_string(),
                decimals: 9,
                max_precision: 3,
            },
            quote: AssetInfo {
                asset: format!("0x{}", "bb".repeat(32)),
                symbol: "USDC".to_string(),
                decimals: 6,
                max_precision: 3,
            },
            tick_size: None,
            step_size: None,
        }
    }
}
