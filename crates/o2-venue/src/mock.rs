//! In-memory venue for tests.
//!
//! Keeps accounts with nonces, markets, tickers, balances and orders, and
//! records every call so tests can assert on traffic.

use crate::client::VenueApi;
use crate::error::{VenueError, VenueResult};
use crate::types::{
    AccountInfo, AssignCodeRequest, AssignCodeResponse, BalanceResponse, CreateSessionRequest,
    Identity, MarketsResponse, OrdersQuery, SessionAction, SessionActionsRequest,
    SessionActionsResponse, VenueOrder, VenueTrade, VerifyAccessRequest, VerifyAccessResponse,
};
use async_trait::async_trait;
use o2_core::{Market, OwnerAddress, Ticker};
use parking_lot::Mutex;
use rust_decimal::Decimal;
use std::collections::{HashMap, VecDeque};
use std::str::FromStr;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;

#[derive(Debug, Clone)]
struct MockAccount {
    id: String,
    owner_b256: String,
    nonce: u64,
}

#[derive(Debug, Default)]
struct MockState {
    accounts: Vec<MockAccount>,
    markets: Vec<Market>,
    books_whitelist_id: Option<String>,
    tickers: HashMap<String, Ticker>,
    balances: HashMap<String, BalanceResponse>,
    orders: Vec<VenueOrder>,
    sessions: Vec<CreateSessionRequest>,
    submissions: Vec<SessionActionsRequest>,
    submit_failures: VecDeque<VenueError>,
    session_failure: Option<VenueError>,
    markets_failure: Option<VenueError>,
    balance_failure: Option<VenueError>,
    verify_response: Option<VerifyAccessResponse>,
    assign_response: Option<VenueResult<AssignCodeResponse>>,
    calls: Vec<String>,
}

/// Stateful fake venue.
#[derive(Debug, Default)]
pub struct MockVenue {
    state: Mutex<MockState>,
    next_id: AtomicU64,
    submit_delay_ms: AtomicU64,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl MockVenue {
    pub fn new() -> Self {
        Self::default()
    }

    // ------------------------------------------------------------------
    // Setup
    // ------------------------------------------------------------------

    pub fn add_market(&self, market: Market) {
        self.state.lock().markets.push(market);
    }

    pub fn set_books_whitelist_id(&self, id: Option<String>) {
        self.state.lock().books_whitelist_id = id;
    }

    /// Set the last price (scaled) of a market.
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

    /// Make `amount` (scaled) of `asset_id` sit in the trading account.
    pub fn set_balance(&self, asset_id: &str, amount: Decimal) {
        self.state.lock().balances.insert(
            asset_id.to_string(),
            BalanceResponse {
                trading_account_balance: amount,
                ..Default::default()
            },
        );
    }

    pub fn set_balance_response(&self, asset_id: &str, response: BalanceResponse) {
        self.state
            .lock()
            .balances
            .insert(asset_id.to_string(), response);
    }

    /// Fail the next submission with `error`.
    pub fn fail_next_submit(&self, error: VenueError) {
        self.state.lock().submit_failures.push_back(error);
    }

    pub fn fail_session_creation(&self, error: Option<VenueError>) {
        self.state.lock().session_failure = error;
    }

    pub fn fail_markets(&self, error: Option<VenueError>) {
        self.state.lock().markets_failure = error;
    }

    pub fn fail_balances(&self, error: Option<VenueError>) {
        self.state.lock().balance_failure = error;
    }

    pub fn set_verify_response(&self, response: VerifyAccessResponse) {
        self.state.lock().verify_response = Some(response);
    }

    pub fn set_assign_response(&self, response: VenueResult<AssignCodeResponse>) {
        self.state.lock().assign_response = Some(response);
    }

    /// Hold each submission open for `ms` to widen race windows.
    pub fn set_submit_delay(&self, ms: u64) {
        self.submit_delay_ms.store(ms, Ordering::SeqCst);
    }

    /// Mark an order as (partially) filled.
    pub fn fill_order(&self, order_id: &str, quantity_fill: Decimal, price_fill: Decimal) {
        let mut state = self.state.lock();
        if let Some(order) = state.orders.iter_mut().find(|o| o.order_id == order_id) {
            order.quantity_fill = quantity_fill;
            order.price_fill = price_fill;
            order.close = quantity_fill >= order.quantity;
        }
    }

    /// Force the stored nonce of an account.
    pub fn set_account_nonce(&self, trade_account_id: &str, nonce: u64) {
        let mut state = self.state.lock();
        if let Some(acc) = state.accounts.iter_mut().find(|a| a.id == trade_account_id) {
            acc.nonce = nonce;
        }
    }

    // ------------------------------------------------------------------
    // Inspection
    // ------------------------------------------------------------------

    pub fn calls(&self) -> Vec<String> {
        self.state.lock().calls.clone()
    }

    pub fn call_count(&self, name: &str) -> usize {
        self.state.lock().calls.iter().filter(|c| *c == name).count()
    }

    pub fn sessions(&self) -> Vec<CreateSessionRequest> {
        self.state.lock().sessions.clone()
    }

    pub fn submissions(&self) -> Vec<SessionActionsRequest> {
        self.state.lock().submissions.clone()
    }

    pub fn orders(&self) -> Vec<VenueOrder> {
        self.state.lock().orders.clone()
    }

    pub fn account_nonce(&self, trade_account_id: &str) -> Option<u64> {
        self.state
            .lock()
            .accounts
            .iter()
            .find(|a| a.id == trade_account_id)
            .map(|a| a.nonce)
    }

    /// Highest number of submissions that were open at once.
    pub fn max_concurrent_submissions(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    fn record(&self, call: &str) {
        self.state.lock().calls.push(call.to_string());
    }

    fn fresh_id(&self, prefix: &str) -> String {
        let n = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
        format!("0x{prefix}{n:0>8}")
    }

    /// Check and bump the nonce of `trade_account_id`.
    fn consume_nonce(&self, trade_account_id: &str, nonce: &str) -> VenueResult<()> {
        let presented = u64::from_str(nonce).map_err(|_| VenueError::Rejected {
            status: 400,
            message: format!("Invalid nonce format: {nonce}"),
        })?;
        let mut state = self.state.lock();
        let account = state
            .accounts
            .iter_mut()
            .find(|a| a.id == trade_account_id)
            .ok_or_else(|| VenueError::Rejected {
                status: 404,
                message: format!("unknown trade account {trade_account_id}"),
            })?;
        if account.nonce != presented {
            return Err(VenueError::Rejected {
                status: 400,
                message: format!("Invalid nonce: expected {}, got {presented}", account.nonce),
            });
        }
        account.nonce += 1;
        Ok(())
    }
}

#[async_trait]
impl VenueApi for MockVenue {
    async fn create_account(&self, owner: &OwnerAddress) -> VenueResult<String> {
        self.record("create_account");
        let owner_b256 = owner.to_b256();
        if let Some(existing) = self
            .state
            .lock()
            .accounts
            .iter()
            .find(|a| a.owner_b256 == owner_b256)
        {
            return Ok(existing.id.clone());
        }
        let id = format!("0x{:0>64}", self.next_id.fetch_add(1, Ordering::SeqCst) + 1);
        self.state.lock().accounts.push(MockAccount {
            id: id.clone(),
            owner_b256,
            nonce: 0,
        });
        Ok(id)
    }

    async fn get_account(
        &self,
        trade_account_id: &str,
        _owner: &OwnerAddress,
    ) -> VenueResult<AccountInfo> {
        self.record("get_account");
        let state = self.state.lock();
        let account = state
            .accounts
            .iter()
            .find(|a| a.id == trade_account_id)
            .ok_or_else(|| VenueError::Rejected {
                status: 404,
                message: format!("trade account {trade_account_id} not found"),
            })?;
        Ok(AccountInfo {
            nonce: account.nonce,
            owner: Some(Identity::Address(account.owner_b256.clone())),
            synced_with_network: true,
        })
    }

    async fn create_session(
        &self,
        request: &CreateSessionRequest,
        _owner: &OwnerAddress,
    ) -> VenueResult<serde_json::Value> {
        self.record("create_session");
        if let Some(err) = self.state.lock().session_failure.clone() {
            return Err(err);
        }
        self.consume_nonce(&request.contract_id, &request.nonce)?;
        self.state.lock().sessions.push(request.clone());
        Ok(serde_json::json!({"tx_id": self.fresh_id("tx")}))
    }

    async fn submit_actions(
        &self,
        request: &SessionActionsRequest,
        _owner: &OwnerAddress,
    ) -> VenueResult<SessionActionsResponse> {
        self.record("submit_actions");
        let open = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(open, Ordering::SeqCst);

        let delay = self.submit_delay_ms.load(Ordering::SeqCst);
        if delay > 0 {
            tokio::time::sleep(Duration::from_millis(delay)).await;
        }
        let result = self.apply_submission(request);
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        result
    }

    async fn get_markets(&self) -> VenueResult<MarketsResponse> {
        self.record("get_markets");
        let state = self.state.lock();
        if let Some(err) = state.markets_failure.clone() {
            return Err(err);
        }
        Ok(MarketsResponse {
            markets: state.markets.clone(),
            books_whitelist_id: state.books_whitelist_id.clone(),
            books_registry_id: None,
            accounts_registry_id: None,
            chain_id: None,
        })
    }

    async fn get_ticker(&self, market_id: &str) -> VenueResult<Ticker> {
        self.record("get_ticker");
        self.state
            .lock()
            .tickers
            .get(market_id)
            .cloned()
            .ok_or_else(|| VenueError::Rejected {
                status: 404,
                message: format!("no ticker data for market {market_id}"),
            })
    }

    async fn get_balance(
        &self,
        asset_id: &str,
        _trade_account_id: &str,
        _owner: &OwnerAddress,
    ) -> VenueResult<BalanceResponse> {
        self.record("get_balance");
        let state = self.state.lock();
        if let Some(err) = state.balance_failure.clone() {
            return Err(err);
        }
        Ok(state.balances.get(asset_id).cloned().unwrap_or_default())
    }

    async fn get_orders(
        &self,
        query: &OrdersQuery,
        _owner: &OwnerAddress,
    ) -> VenueResult<Vec<VenueOrder>> {
        self.record("get_orders");
        let state = self.state.lock();
        let mut orders: Vec<VenueOrder> = state
            .orders
            .iter()
            .filter(|o| query.market_id.as_ref().map_or(true, |m| &o.market_id == m))
            .filter(|o| query.is_open.map_or(true, |open| open != o.close))
            .cloned()
            .collect();
        if query.direction.as_deref() == Some("desc") {
            orders.reverse();
        }
        if let Some(count) = query.count {
            orders.truncate(count as usize);
        }
        Ok(orders)
    }

    async fn get_order(&self, order_id: &str, _owner: &OwnerAddress) -> VenueResult<VenueOrder> {
        self.record("get_order");
        self.state
            .lock()
            .orders
            .iter()
            .find(|o| o.order_id == order_id)
            .cloned()
            .ok_or_else(|| VenueError::Rejected {
                status: 404,
                message: format!("order {order_id} not found"),
            })
    }

    async fn get_trades(&self, _market_id: &str, _count: u32) -> VenueResult<Vec<VenueTrade>> {
        self.record("get_trades");
        Ok(Vec::new())
    }

    async fn verify_access_queue(
        &self,
        _request: &VerifyAccessRequest,
        _owner: &OwnerAddress,
    ) -> VenueResult<VerifyAccessResponse> {
        self.record("verify_access_queue");
        self.state
            .lock()
            .verify_response
            .clone()
            .ok_or_else(|| VenueError::Network("access queue unavailable".to_string()))
    }

    async fn assign_invitation_code(
        &self,
        _request: &AssignCodeRequest,
    ) -> VenueResult<AssignCodeResponse> {
        self.record("assign_invitation_code");
        self.state
            .lock()
            .assign_response
            .clone()
            .unwrap_or_else(|| {
                Err(VenueError::Rejected {
                    status: 400,
                    message: "Invalid invite code".to_string(),
                })
            })
    }
}

impl MockVenue {
    fn apply_submission(
        &self,
        request: &SessionActionsRequest,
    ) -> VenueResult<SessionActionsResponse> {
        if let Some(err) = self.state.lock().submit_failures.pop_front() {
            return Err(err);
        }
        self.consume_nonce(&request.trade_account_id, &request.nonce)?;

        let mut placed = Vec::new();
        for market_actions in &request.actions {
            for action in &market_actions.actions {
                if let SessionAction::CreateOrder {
                    side,
                    price,
                    quantity,
                    ..
                } = action
                {
                    placed.push(VenueOrder {
                        order_id: self.fresh_id("order"),
                        side: *side,
                        market_id: market_actions.market_id.clone(),
                        price: Decimal::from_str(price).unwrap_or_default(),
                        price_fill: Decimal::ZERO,
                        quantity: Decimal::from_str(quantity).unwrap_or_default(),
                        quantity_fill: Decimal::ZERO,
                        timestamp: None,
                        close: false,
                        cancel: false,
                    });
                }
            }
        }

        let mut state = self.state.lock();
        state.submissions.push(request.clone());
        state.orders.extend(placed.iter().cloned());
        Ok(SessionActionsResponse {
            tx_id: self.fresh_id("tx"),
            orders: placed,
        })
    }
}
