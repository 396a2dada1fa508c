//! Short-lived balance cache.
//!
//! Entries are keyed by (trade account, asset) and live for a fixed TTL. When
//! a refresh fails, a stale entry is served instead of the error.

use crate::client::DynVenue;
use crate::error::VenueResult;
use crate::types::BalanceResponse;
use dashmap::DashMap;
use o2_core::{AssetInfo, Balance, DynClock, Market, MarketBalances, OwnerAddress};
use tracing::warn;

/// Default cache lifetime.
pub const DEFAULT_BALANCE_TTL_MS: u64 = 5_000;

#[derive(Debug, Clone)]
struct CachedBalance {
    response: BalanceResponse,
    fetched_at_ms: u64,
}

pub struct BalanceCache {
    venue: DynVenue,
    clock: DynClock,
    ttl_ms: u64,
    entries: DashMap<(String, String), CachedBalance>,
}

impl BalanceCache {
    pub fn new(venue: DynVenue, clock: DynClock, ttl_ms: u64) -> Self {
        Self {
            venue,
            clock,
            ttl_ms,
            entries: DashMap::new(),
        }
    }

    /// Raw balance of `asset_id` for the account.
    pub async fn balance(
        &self,
        asset_id: &str,
        trade_account_id: &str,
        owner: &OwnerAddress,
    ) -> VenueResult<BalanceResponse> {
        let key = (trade_account_id.to_string(), asset_id.to_string());
        let now = self.clock.now_ms();

        let cached = self.entries.get(&key).map(|e| e.clone());
        if let Some(entry) = &cached {
            if now.saturating_sub(entry.fetched_at_ms) < self.ttl_ms {
                return Ok(entry.response.clone());
            }
        }

        match self.venue.get_balance(asset_id, trade_account_id, owner).await {
            Ok(response) => {
                self.entries.insert(
                    key,
                    CachedBalance {
                        response: response.clone(),
                        fetched_at_ms: self.clock.now_ms(),
                    },
                );
                Ok(response)
            }
            Err(e) => match cached {
                Some(entry) => {
                    warn!(asset_id, error = %e, "Balance refresh failed, serving stale value");
                    Ok(entry.response)
                }
                None => Err(e),
            },
        }
    }

    /// Base and quote balances as spendable in `market`.
    pub async fn market_balances(
        &self,
        market: &Market,
        trade_account_id: &str,
        owner: &OwnerAddress,
    ) -> VenueResult<MarketBalances> {
        let (base, quote) = tokio::try_join!(
            self.balance(&market.base.asset, trade_account_id, owner),
            self.balance(&market.quote.asset, trade_account_id, owner),
        )?;

        Ok(MarketBalances {
            base: to_market_balance(&base, &market.base, &market.contract_id),
            quote: to_market_balance(&quote, &market.quote, &market.contract_id),
        })
    }

    /// Account-wide balance of every asset traded in `markets`. Assets whose
    /// fetch fails are skipped.
    pub async fn all_balances(
        &self,
        markets: &[Market],
        trade_account_id: &str,
        owner: &OwnerAddress,
    ) -> Vec<Balance> {
        let mut seen = std::collections::BTreeSet::new();
        let mut balances = Vec::new();
        for asset in markets.iter().flat_map(|m| [&m.base, &m.quote]) {
            if !seen.insert(asset.asset.clone()) {
                continue;
            }
            match self.balance(&asset.asset, trade_account_id, owner).await {
                Ok(response) => balances.push(Balance {
                    asset_id: asset.asset.clone(),
                    symbol: asset.symbol.clone(),
                    unlocked: response.total_unlocked,
                    locked: response.total_locked,
                    total: response.total(),
                    decimals: asset.decimals,
                }),
                Err(e) => warn!(asset_id = %asset.asset, error = %e, "Failed to fetch balance"),
            }
        }
        balances
    }

    /// Drop every cached entry.
    pub fn clear(&self) {
        self.entries.clear();
    }
}

fn to_market_balance(response: &BalanceResponse, asset: &AssetInfo, contract_id: &str) -> Balance {
    Balance {
        asset_id: asset.asset.clone(),
        symbol: asset.symbol.clone(),
        unlocked: response.available_in(contract_id),
        locked: response.total_locked,
        total: response.total(),
        decimals: asset.decimals,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::VenueError;
    use crate::mock::MockVenue;
    use crate::types::OrderBookBalance;
    use o2_core::ManualClock;
    use rust_decimal_macros::dec;
    use std::sync::Arc;

    fn owner() -> OwnerAddress {
        OwnerAddress::parse(&format!("0x{}", "ab".repeat(20))).unwrap()
    }

    fn market() -> Market {
        Market {
            market_id: "m1".to_string(),
            contract_id: "0xbook".to_string(),
            base: AssetInfo {
                asset: "0xeth".to_string(),
                symbol: "ETH".to_string(),
                decimals: 9,
                max_precision: 3,
            },
            quote: AssetInfo {
                asset: "0xusdc".to_string(),
                symbol: "USDC".to_string(),
                decimals: 6,
                max_precision: 3,
            },
            tick_size: None,
            step_size: None,
        }
    }

    fn cache(venue: Arc<MockVenue>, clock: Arc<ManualClock>) -> BalanceCache {
        BalanceCache::new(venue, clock, DEFAULT_BALANCE_TTL_MS)
    }

    #[tokio::test]
    async fn test_market_balances_use_book_unlocked() {
        let venue = Arc::new(MockVenue::new());
        let mut books = std::collections::HashMap::new();
        books.insert(
            "0xbook".to_string(),
            OrderBookBalance {
                unlocked: dec!(25),
                ..Default::default()
            },
        );
        books.insert(
            "0xother".to_string(),
            OrderBookBalance {
                unlocked: dec!(1000),
                ..Default::default()
            },
        );
        venue.set_balance_response(
            "0xusdc",
            BalanceResponse {
                total_unlocked: dec!(1025),
                total_locked: dec!(3),
                trading_account_balance: dec!(100),
                order_books: books,
            },
        );
        venue.set_balance("0xeth", dec!(7));

        let balances = cache(venue, Arc::new(ManualClock::new(0)))
            .market_balances(&market(), "0xacc", &owner())
            .await
            .unwrap();
        assert_eq!(balances.quote.unlocked, dec!(125));
        assert_eq!(balances.quote.locked, dec!(3));
        assert_eq!(balances.quote.total, dec!(1125));
        assert_eq!(balances.base.unlocked, dec!(7));
        assert_eq!(balances.base.decimals, 9);
    }

    #[tokio::test]
    async fn test_ttl_and_clear() {
        let venue = Arc::new(MockVenue::new());
        let clock = Arc::new(ManualClock::new(0));
        let cache = cache(venue.clone(), clock.clone());

        cache.balance("0xeth", "0xacc", &owner()).await.unwrap();
        clock.advance(4_999);
        cache.balance("0xeth", "0xacc", &owner()).await.unwrap();
        assert_eq!(venue.call_count("get_balance"), 1);

        clock.advance(1);
        cache.balance("0xeth", "0xacc", &owner()).await.unwrap();
        assert_eq!(venue.call_count("get_balance"), 2);

        cache.clear();
        cache.balance("0xeth", "0xacc", &owner()).await.unwrap();
        assert_eq!(venue.call_count("get_balance"), 3);
    }

    #[tokio::test]
    async fn test_stale_value_served_on_failure() {
        let venue = Arc::new(MockVenue::new());
        venue.set_balance("0xeth", dec!(42));
        let clock = Arc::new(ManualClock::new(0));
        let cache = cache(venue.clone(), clock.clone());

        cache.balance("0xeth", "0xacc", &owner()).await.unwrap();
        venue.fail_balances(Some(VenueError::Network("down".to_string())));
        clock.advance(60_000);

        let stale = cache.balance("0xeth", "0xacc", &owner()).await.unwrap();
        assert_eq!(stale.trading_account_balance, dec!(42));
        assert!(cache
            .balance("0xusdc", "0xacc", &owner())
            .await
            .unwrap_err()
            .is_network());
    }
}
