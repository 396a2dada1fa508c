//! Market catalog cache.
//!
//! Markets rarely change, so the catalog is fetched once and refreshed only
//! on demand or when a lookup misses.

use crate::client::DynVenue;
use crate::error::{VenueError, VenueResult};
use dashmap::DashMap;
use o2_core::Market;
use parking_lot::RwLock;
use tracing::{debug, info};

/// Registry ids published next to the market list.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CatalogMeta {
    pub books_whitelist_id: Option<String>,
    pub books_registry_id: Option<String>,
    pub accounts_registry_id: Option<String>,
}

pub struct MarketCache {
    venue: DynVenue,
    markets: DashMap<String, Market>,
    meta: RwLock<Option<CatalogMeta>>,
}

impl MarketCache {
    pub fn new(venue: DynVenue) -> Self {
        Self {
            venue,
            markets: DashMap::new(),
            meta: RwLock::new(None),
        }
    }

    pub fn is_loaded(&self) -> bool {
        self.meta.read().is_some()
    }

    /// Fetch the catalog and replace the cached copy.
    pub async fn refresh(&self) -> VenueResult<()> {
        let response = self.venue.get_markets().await?;
        self.markets.clear();
        for market in response.markets {
            self.markets.insert(market.market_id.clone(), market);
        }
        *self.meta.write() = Some(CatalogMeta {
            books_whitelist_id: response.books_whitelist_id,
            books_registry_id: response.books_registry_id,
            accounts_registry_id: response.accounts_registry_id,
        });
        info!(markets = self.markets.len(), "Market catalog refreshed");
        Ok(())
    }

    async fn ensure_loaded(&self) -> VenueResult<()> {
        if self.is_loaded() {
            return Ok(());
        }
        self.refresh().await
    }

    /// All markets, sorted by id.
    pub async fn markets(&self) -> VenueResult<Vec<Market>> {
        self.ensure_loaded().await?;
        let mut markets: Vec<Market> = self.markets.iter().map(|e| e.value().clone()).collect();
        markets.sort_by(|a, b| a.market_id.cmp(&b.market_id));
        Ok(markets)
    }

    /// Look up one market, refreshing once on a miss.
    pub async fn market(&self, market_id: &str) -> VenueResult<Market> {
        self.ensure_loaded().await?;
        if let Some(market) = self.markets.get(market_id) {
            return Ok(market.clone());
        }
        debug!(market_id, "Market not cached, refreshing catalog");
        self.refresh().await?;
        self.markets
            .get(market_id)
            .map(|m| m.clone())
            .ok_or_else(|| VenueError::MarketNotFound(market_id.to_string()))
    }

    /// Order book contract ids of every market (the session scope).
    pub async fn contract_ids(&self) -> VenueResult<Vec<String>> {
        Ok(self
            .markets()
            .await?
            .into_iter()
            .map(|m| m.contract_id)
            .collect())
    }

    pub async fn meta(&self) -> VenueResult<CatalogMeta> {
        self.ensure_loaded().await?;
        Ok(self.meta.read().clone().unwrap_or_default())
    }

    /// Whitelist registry contract, if the venue publishes one.
    pub async fn books_whitelist_id(&self) -> VenueResult<Option<String>> {
        Ok(self.meta().await?.books_whitelist_id)
    }
}
