//! The [`DurableStore`] trait and its local implementation.

use crate::collections::{Collection, Collections};
use crate::error::StoreResult;
use crate::file::FilePersistence;
use o2_core::{
    OwnerAddress, Session, SessionKeyRecord, StrategyConfigRecord, TermsAcceptance, Trade,
    TradeStats, TradeUpdate, TradingAccount,
};
use parking_lot::RwLock;
use std::path::Path;
use std::sync::Arc;

/// Per-collection CRUD with owner/order lookups.
///
/// Last writer wins per key; there is no versioning.
pub trait DurableStore: Send + Sync {
    // Trading accounts
    fn get_trading_account(&self, id: &str) -> StoreResult<Option<TradingAccount>>;
    fn find_trading_account_by_owner(&self, owner: &OwnerAddress)
        -> StoreResult<Option<TradingAccount>>;
    fn put_trading_account(&self, account: &TradingAccount) -> StoreResult<()>;

    // Sessions
    fn get_session(&self, id: &str) -> StoreResult<Option<Session>>;
    fn sessions_by_owner(&self, owner: &OwnerAddress) -> StoreResult<Vec<Session>>;
    fn put_session(&self, session: &Session) -> StoreResult<()>;
    fn delete_session(&self, id: &str) -> StoreResult<bool>;

    // Session keys
    fn get_session_key(&self, id: &str) -> StoreResult<Option<SessionKeyRecord>>;
    fn put_session_key(&self, key: &SessionKeyRecord) -> StoreResult<()>;
    fn delete_session_key(&self, id: &str) -> StoreResult<bool>;

    // Strategy configs
    fn get_strategy_config(&self, market_id: &str) -> StoreResult<Option<StrategyConfigRecord>>;
    fn strategy_configs(&self) -> StoreResult<Vec<StrategyConfigRecord>>;
    fn put_strategy_config(&self, record: &StrategyConfigRecord) -> StoreResult<()>;
    fn delete_strategy_config(&self, market_id: &str) -> StoreResult<bool>;

    fn active_strategy_configs(&self) -> StoreResult<Vec<StrategyConfigRecord>> {
        Ok(self
            .strategy_configs()?
            .into_iter()
            .filter(|r| r.is_active)
            .collect())
    }

    // Trades
    /// Insert and return the assigned id.
    fn insert_trade(&self, trade: &Trade) -> StoreResult<u64>;
    /// Newest first, optionally filtered by market.
    fn trades(&self, market_id: Option<&str>, limit: usize) -> StoreResult<Vec<Trade>>;
    fn trades_by_session(&self, session_id: &str) -> StoreResult<Vec<Trade>>;
    fn trade_by_order_id(&self, order_id: &str) -> StoreResult<Option<Trade>>;
    /// Returns `false` when no trade carries `order_id`.
    fn update_trade_by_order_id(&self, order_id: &str, update: &TradeUpdate) -> StoreResult<bool>;
    fn trade_stats(&self, market_id: Option<&str>) -> StoreResult<TradeStats>;

    // Terms
    fn get_terms_acceptance(&self, owner: &OwnerAddress) -> StoreResult<Option<TermsAcceptance>>;
    fn put_terms_acceptance(&self, acceptance: &TermsAcceptance) -> StoreResult<()>;
    fn delete_terms_acceptance(&self, owner: &OwnerAddress) -> StoreResult<bool>;
}

/// Shared store handle.
pub type DynStore = Arc<dyn DurableStore>;

/// In-process store, optionally mirrored to a directory.
pub struct LocalStore {
    state: RwLock<Collections>,
    persistence: Option<FilePersistence>,
}

impl LocalStore {
    /// Volatile store.
    pub fn in_memory() -> Self {
        Self {
            state: RwLock::new(Collections::new()),
            persistence: None,
        }
    }

    /// Store backed by files under `dir`; existing data is loaded.
    pub fn open(dir: impl AsRef<Path>) -> StoreResult<Self> {
        let (persistence, collections) = FilePersistence::open(dir)?;
        Ok(Self {
            state: RwLock::new(collections),
            persistence: Some(persistence),
        })
    }

    pub fn is_persistent(&self) -> bool {
        self.persistence.is_some()
    }

    /// Mirror `collection` to disk. Called with the write lock held so
    /// snapshots land in mutation order.
    fn persist(&self, state: &Collections, collection: Collection) -> StoreResult<()> {
        let Some(p) = &self.persistence else {
            return Ok(());
        };
        match collection {
            Collection::TradingAccounts => {
                p.write_snapshot(collection, state.trading_accounts.values())
            }
            Collection::Sessions => p.write_snapshot(collection, state.sessions.values()),
            Collection::SessionKeys => p.write_snapshot(collection, state.session_keys.values()),
            Collection::StrategyConfigs => {
                p.write_snapshot(collection, state.strategy_configs.values())
            }
            Collection::Terms => p.write_snapshot(collection, state.terms.values()),
            // Trades are appended per record, see `append_trade`.
            Collection::Trades => Ok(()),
        }
    }

    fn append_trade(&self, trade: &Trade) -> StoreResult<()> {
        match &self.persistence {
            Some(p) => p.append_trade(trade),
            None => Ok(()),
        }
    }
}

impl DurableStore for LocalStore {
    fn get_trading_account(&self, id: &str) -> StoreResult<Option<TradingAccount>> {
        Ok(self.state.read().trading_accounts.get(id).cloned())
    }

    fn find_trading_account_by_owner(
        &self,
        owner: &OwnerAddress,
    ) -> StoreResult<Option<TradingAccount>> {
        let state = self.state.read();
        Ok(state
            .accounts_by_owner
            .get(owner)
            .and_then(|id| state.trading_accounts.get(id))
            .cloned())
    }

    fn put_trading_account(&self, account: &TradingAccount) -> StoreResult<()> {
        let mut state = self.state.write();
        state.insert_account(account.clone());
        self.persist(&state, Collection::TradingAccounts)
    }

    fn get_session(&self, id: &str) -> StoreResult<Option<Session>> {
        Ok(self.state.read().sessions.get(id).cloned())
    }

    fn sessions_by_owner(&self, owner: &OwnerAddress) -> StoreResult<Vec<Session>> {
        let state = self.state.read();
        Ok(state
            .sessions_by_owner
            .get(owner)
            .map(|ids| {
                ids.iter()
                    .filter_map(|id| state.sessions.get(id).cloned())
                    .collect()
            })
            .unwrap_or_default())
    }

    fn put_session(&self, session: &Session) -> StoreResult<()> {
        let mut state = self.state.write();
        state.insert_session(session.clone());
        self.persist(&state, Collection::Sessions)
    }

    fn delete_session(&self, id: &str) -> StoreResult<bool> {
        let mut state = self.state.write();
        let removed = state.remove_session(id).is_some();
        if removed {
            self.persist(&state, Collection::Sessions)?;
        }
        Ok(removed)
    }

    fn get_session_key(&self, id: &str) -> StoreResult<Option<SessionKeyRecord>> {
        Ok(self.state.read().session_keys.get(id).cloned())
    }

    fn put_session_key(&self, key: &SessionKeyRecord) -> StoreResult<()> {
        let mut state = self.state.write();
        state.session_keys.insert(key.id.clone(), key.clone());
        self.persist(&state, Collection::SessionKeys)
    }

    fn delete_session_key(&self, id: &str) -> StoreResult<bool> {
        let mut state = self.state.write();
        let removed = state.session_keys.remove(id).is_some();
        if removed {
            self.persist(&state, Collection::SessionKeys)?;
        }
        Ok(removed)
    }

    fn get_strategy_config(&self, market_id: &str) -> StoreResult<Option<StrategyConfigRecord>> {
        Ok(self.state.read().strategy_configs.get(market_id).cloned())
    }

    fn strategy_configs(&self) -> StoreResult<Vec<StrategyConfigRecord>> {
        Ok(self.state.read().strategy_configs.values().cloned().collect())
    }

    fn put_strategy_config(&self, record: &StrategyConfigRecord) -> StoreResult<()> {
        let mut state = self.state.write();
        state
            .strategy_configs
            .insert(record.id.clone(), record.clone());
        self.persist(&state, Collection::StrategyConfigs)
    }

    fn delete_strategy_config(&self, market_id: &str) -> StoreResult<bool> {
        let mut state = self.state.write();
        let removed = state.strategy_configs.remove(market_id).is_some();
        if removed {
            self.persist(&state, Collection::StrategyConfigs)?;
        }
        Ok(removed)
    }

    fn insert_trade(&self, trade: &Trade) -> StoreResult<u64> {
        let mut state = self.state.write();
        let mut stored = trade.clone();
        stored.id = 0;
        let id = state.insert_trade(stored);
        if let Some(saved) = state.trades.get(&id) {
            self.append_trade(saved)?;
        }
        Ok(id)
    }

    fn trades(&self, market_id: Option<&str>, limit: usize) -> StoreResult<Vec<Trade>> {
        let state = self.state.read();
        Ok(state
            .trades_newest_first(|t| market_id.map_or(true, |m| t.market_id == m))
            .into_iter()
            .take(limit)
            .cloned()
            .collect())
    }

    fn trades_by_session(&self, session_id: &str) -> StoreResult<Vec<Trade>> {
        let state = self.state.read();
        Ok(state
            .trades_newest_first(|t| t.session_id.as_deref() == Some(session_id))
            .into_iter()
            .cloned()
            .collect())
    }

    fn trade_by_order_id(&self, order_id: &str) -> StoreResult<Option<Trade>> {
        let state = self.state.read();
        Ok(state
            .trades_by_order
            .get(order_id)
            .and_then(|id| state.trades.get(id))
            .cloned())
    }

    fn update_trade_by_order_id(&self, order_id: &str, update: &TradeUpdate) -> StoreResult<bool> {
        let mut state = self.state.write();
        let Some(id) = state.trades_by_order.get(order_id).copied() else {
            return Ok(false);
        };
        let Some(trade) = state.trades.get_mut(&id) else {
            return Ok(false);
        };
        trade.apply(update);
        let updated = trade.clone();
        self.append_trade(&updated)?;
        Ok(true)
    }

    fn trade_stats(&self, market_id: Option<&str>) -> StoreResult<TradeStats> {
        let state = self.state.read();
        Ok(TradeStats::from_trades(state.trades.values().filter(|t| {
            market_id.map_or(true, |m| t.market_id == m)
        })))
    }

    fn get_terms_acceptance(&self, owner: &OwnerAddress) -> StoreResult<Option<TermsAcceptance>> {
        Ok(self.state.read().terms.get(owner).cloned())
    }

    fn put_terms_acceptance(&self, acceptance: &TermsAcceptance) -> StoreResult<()> {
        let mut state = self.state.write();
        state
            .terms
            .insert(acceptance.owner_address.clone(), acceptance.clone());
        self.persist(&state, Collection::Terms)
    }

    fn delete_terms_acceptance(&self, owner: &OwnerAddress) -> StoreResult<bool> {
        let mut state = self.state.write();
        let removed = state.terms.remove(owner).is_some();
        if removed {
            self.persist(&state, Collection::Terms)?;
        }
        Ok(removed)
    }
}
