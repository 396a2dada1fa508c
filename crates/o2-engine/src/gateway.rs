//! Order gateway backed by a delegated session.
//!
//! Each order is one signed `POST /session/actions` batch carrying the
//! account nonce. The nonce is read, signed over, submitted and committed
//! under a submit mutex so two batches never share a value.

use async_trait::async_trait;
use o2_core::{decimal::format_scaled, Market, MarketBalances, OrderIntent, OwnerAddress, Ticker};
use o2_session::{NonceCounter, SessionSigner};
use o2_store::DynStore;
use o2_strategy::{ExchangeGateway, StrategyError, StrategyResult};
use o2_venue::{
    BalanceCache, DynVenue, MarketActions, SessionAction, SessionActionsRequest, VenueError,
};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, warn};

pub struct SessionGateway {
    venue: DynVenue,
    balances: Arc<BalanceCache>,
    signer: SessionSigner,
    trade_account_id: String,
    nonce: NonceCounter,
    store: DynStore,
    submit: Mutex<()>,
}

impl SessionGateway {
    /// `nonce` is the account's next unused nonce.
    pub fn new(
        venue: DynVenue,
        balances: Arc<BalanceCache>,
        signer: SessionSigner,
        trade_account_id: impl Into<String>,
        nonce: u64,
        store: DynStore,
    ) -> Self {
        Self {
            venue,
            balances,
            signer,
            trade_account_id: trade_account_id.into(),
            nonce: NonceCounter::new(nonce),
            store,
            submit: Mutex::new(()),
        }
    }

    pub fn session_id(&self) -> &str {
        self.signer.session_id()
    }

    pub fn current_nonce(&self) -> u64 {
        self.nonce.current()
    }

    fn persist_nonce(&self, next: u64) {
        let result = self
            .store
            .get_trading_account(&self.trade_account_id)
            .and_then(|account| match account {
                Some(mut account) => {
                    account.nonce = next;
                    self.store.put_trading_account(&account)
                }
                None => Ok(()),
            });
        if let Err(e) = result {
            warn!(trade_account_id = %self.trade_account_id, error = %e, "Failed to persist nonce");
        }
    }

    async fn resync_nonce(&self, owner: &OwnerAddress) {
        match self.venue.get_account(&self.trade_account_id, owner).await {
            Ok(info) => {
                self.nonce.resync(info.nonce);
                self.persist_nonce(info.nonce);
            }
            Err(e) => warn!(error = %e, "Nonce resync failed"),
        }
    }
}

#[async_trait]
impl ExchangeGateway for SessionGateway {
    async fn ticker(&self, market: &Market) -> StrategyResult<Option<Ticker>> {
        match self.venue.get_ticker(&market.market_id).await {
            Ok(ticker) => Ok(Some(ticker)),
            Err(VenueError::Rejected { status: 404, .. }) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn market_balances(
        &self,
        market: &Market,
        owner: &OwnerAddress,
        trade_account_id: &str,
    ) -> StrategyResult<MarketBalances> {
        Ok(self
            .balances
            .market_balances(market, trade_account_id, owner)
            .await?)
    }

    fn invalidate_balances(&self) {
        self.balances.clear();
    }

    async fn place_order(
        &self,
        market: &Market,
        intent: &OrderIntent,
        owner: &OwnerAddress,
        trade_account_id: &str,
    ) -> StrategyResult<String> {
        if trade_account_id != self.trade_account_id {
            return Err(StrategyError::Placement(format!(
                "session is bound to account {}",
                self.trade_account_id
            )));
        }

        let actions = vec![MarketActions {
            market_id: market.market_id.clone(),
            actions: vec![SessionAction::CreateOrder {
                side: intent.side,
                order_type: intent.order_type,
                price: format_scaled(intent.price),
                quantity: format_scaled(intent.quantity),
            }],
        }];

        let _submit = self.submit.lock().await;
        let nonce = self.nonce.current();
        let signature = self
            .signer
            .sign_actions(nonce, &actions)
            .await
            .map_err(|e| StrategyError::Placement(e.to_string()))?;
        let request = SessionActionsRequest {
            actions,
            signature,
            nonce: nonce.to_string(),
            trade_account_id: self.trade_account_id.clone(),
            session_id: self.signer.identity(),
            variable_outputs: None,
            collect_orders: Some(true),
        };

        match self.venue.submit_actions(&request, owner).await {
            Ok(response) => {
                let next = self.nonce.commit(nonce);
                self.persist_nonce(next);
                // The venue lists placed orders only when it collected them.
                let order_id = response
                    .orders
                    .first()
                    .map(|o| o.order_id.clone())
                    .unwrap_or(response.tx_id);
                debug!(market_id = %market.market_id, nonce, %order_id, "Batch accepted");
                Ok(order_id)
            }
            Err(e) if e.is_invalid_nonce() => {
                warn!(nonce, error = %e, "Nonce rejected, resyncing");
                self.resync_nonce(owner).await;
                Err(e.into())
            }
            Err(e) => Err(e.into()),
        }
    }
}
