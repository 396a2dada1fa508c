//! Trading account bootstrap.
//!
//! Lookup order is memory cache, then the store's owner index, then the
//! venue's idempotent create call. A cached or stored account is trusted
//! as-is unless `trust_cached` is off, in which case it is re-confirmed
//! with `GET /accounts` and its nonce refreshed.

use crate::error::AuthResult;
use dashmap::DashMap;
use o2_core::{DynClock, OwnerAddress, TradingAccount};
use o2_store::DynStore;
use o2_venue::DynVenue;
use tracing::{debug, info, warn};

pub struct TradingAccountService {
    venue: DynVenue,
    store: DynStore,
    clock: DynClock,
    trust_cached: bool,
    /// owner address -> trade account id
    cache: DashMap<String, String>,
}

impl TradingAccountService {
    pub fn new(venue: DynVenue, store: DynStore, clock: DynClock, trust_cached: bool) -> Self {
        Self {
            venue,
            store,
            clock,
            trust_cached,
            cache: DashMap::new(),
        }
    }

    pub fn trusts_cache(&self) -> bool {
        self.trust_cached
    }

    /// Return the owner's trade account, creating it on the venue if no
    /// local record exists.
    pub async fn get_or_create(&self, owner: &OwnerAddress) -> AuthResult<TradingAccount> {
        if let Some(account) = self.get(owner)? {
            if let Some(account) = self.confirm(account).await? {
                return Ok(account);
            }
        }

        let id = self.venue.create_account(owner).await?;
        let account = TradingAccount {
            id,
            owner_address: owner.clone(),
            nonce: 0,
            created_at: self.clock.now_ms(),
        };
        self.store.put_trading_account(&account)?;
        self.cache
            .insert(owner.as_str().to_string(), account.id.clone());
        info!(owner = %owner, trade_account_id = %account.id, "Trading account ready");
        Ok(account)
    }

    /// Locally known account for `owner`, without touching the venue.
    pub fn get(&self, owner: &OwnerAddress) -> AuthResult<Option<TradingAccount>> {
        let cached_id = self.cache.get(owner.as_str()).map(|id| id.clone());
        if let Some(id) = cached_id {
            if let Some(account) = self.store.get_trading_account(&id)? {
                return Ok(Some(account));
            }
            debug!(owner = %owner, "Cached account id has no stored record");
            self.cache.remove(owner.as_str());
        }

        let stored = self.store.find_trading_account_by_owner(owner)?;
        if let Some(account) = &stored {
            self.cache
                .insert(owner.as_str().to_string(), account.id.clone());
        }
        Ok(stored)
    }

    pub fn update_nonce(&self, account_id: &str, nonce: u64) -> AuthResult<()> {
        if let Some(mut account) = self.store.get_trading_account(account_id)? {
            account.nonce = nonce;
            self.store.put_trading_account(&account)?;
        }
        Ok(())
    }

    /// `None` when the venue no longer knows the account.
    async fn confirm(&self, mut account: TradingAccount) -> AuthResult<Option<TradingAccount>> {
        if self.trust_cached {
            return Ok(Some(account));
        }
        match self
            .venue
            .get_account(&account.id, &account.owner_address)
            .await
        {
            Ok(info) => {
                if info.nonce != account.nonce {
                    debug!(
                        trade_account_id = %account.id,
                        local = account.nonce,
                        venue = info.nonce,
                        "Refreshing cached nonce"
                    );
                    account.nonce = info.nonce;
                    self.store.put_trading_account(&account)?;
                }
                Ok(Some(account))
            }
            Err(e) if e.is_rejected() => {
                warn!(trade_account_id = %account.id, error = %e, "Cached account rejected by venue");
                self.cache.remove(account.owner_address.as_str());
                Ok(None)
            }
            Err(e) => Err(e.into()),
        }
    }
}
