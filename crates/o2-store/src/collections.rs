//! In-memory collections and their secondary indexes.

use o2_core::{
    OwnerAddress, Session, SessionKeyRecord, StrategyConfigRecord, TermsAcceptance, Trade,
    TradingAccount,
};
use std::collections::{BTreeMap, BTreeSet, HashMap};

/// Named collection; also the on-disk file stem.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Collection {
    TradingAccounts,
    Sessions,
    SessionKeys,
    StrategyConfigs,
    Trades,
    Terms,
}

impl Collection {
    pub const ALL: [Collection; 6] = [
        Collection::TradingAccounts,
        Collection::Sessions,
        Collection::SessionKeys,
        Collection::StrategyConfigs,
        Collection::Trades,
        Collection::Terms,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Self::TradingAccounts => "tradingAccounts",
            Self::Sessions => "sessions",
            Self::SessionKeys => "sessionKeys",
            Self::StrategyConfigs => "strategyConfigs",
            Self::Trades => "trades",
            Self::Terms => "terms",
        }
    }
}

#[derive(Debug, Default)]
pub(crate) struct Collections {
    pub trading_accounts: BTreeMap<String, TradingAccount>,
    pub accounts_by_owner: HashMap<OwnerAddress, String>,

    pub sessions: BTreeMap<String, Session>,
    pub sessions_by_owner: HashMap<OwnerAddress, BTreeSet<String>>,

    pub session_keys: BTreeMap<String, SessionKeyRecord>,

    pub strategy_configs: BTreeMap<String, StrategyConfigRecord>,

    pub trades: BTreeMap<u64, Trade>,
    pub trades_by_order: HashMap<String, u64>,
    pub next_trade_id: u64,

    pub terms: BTreeMap<OwnerAddress, TermsAcceptance>,
}

impl Collections {
    pub fn new() -> Self {
        Self {
            next_trade_id: 1,
            ..Default::default()
        }
    }

    pub fn insert_account(&mut self, account: TradingAccount) {
        // One account per owner: a new id supersedes the old index entry.
        self.accounts_by_owner
            .insert(account.owner_address.clone(), account.id.clone());
        self.trading_accounts.insert(account.id.clone(), account);
    }

    pub fn insert_session(&mut self, session: Session) {
        if let Some(previous) = self.sessions.get(&session.id) {
            if previous.owner_address != session.owner_address {
                if let Some(ids) = self.sessions_by_owner.get_mut(&previous.owner_address) {
                    ids.remove(&session.id);
                }
            }
        }
        self.sessions_by_owner
            .entry(session.owner_address.clone())
            .or_default()
            .insert(session.id.clone());
        self.sessions.insert(session.id.clone(), session);
    }

    pub fn remove_session(&mut self, id: &str) -> Option<Session> {
        let removed = self.sessions.remove(id)?;
        if let Some(ids) = self.sessions_by_owner.get_mut(&removed.owner_address) {
            ids.remove(id);
            if ids.is_empty() {
                self.sessions_by_owner.remove(&removed.owner_address);
            }
        }
        Some(removed)
    }

    /// Store `trade`, assigning it the next id when it has none.
    pub fn insert_trade(&mut self, mut trade: Trade) -> u64 {
        if trade.id == 0 {
            trade.id = self.next_trade_id;
        }
        self.next_trade_id = self.next_trade_id.max(trade.id + 1);
        if !trade.order_id.is_empty() {
            self.trades_by_order.insert(trade.order_id.clone(), trade.id);
        }
        let id = trade.id;
        self.trades.insert(id, trade);
        id
    }

    /// Newest first: by timestamp, then by insertion order.
    pub fn trades_newest_first(&self, filter: impl Fn(&Trade) -> bool) -> Vec<&Trade> {
        let mut matched: Vec<&Trade> = self.trades.values().filter(|t| filter(*t)).collect();
        matched.sort_by(|a, b| b.timestamp.cmp(&a.timestamp).then(b.id.cmp(&a.id)));
        matched
    }
}
