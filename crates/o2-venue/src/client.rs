//! REST client for the O2 venue.
//!
//! Every call is a single attempt bounded by the client timeout; retry and
//! backoff belong to the callers. Calls that act for an owner send the
//! owner's b256 form in the `O2-Owner-Id` header.

use crate::error::{VenueError, VenueResult};
use crate::types::{
    AccountInfo, AssignCodeRequest, AssignCodeResponse, BalanceResponse, CreateAccountRequest,
    CreateAccountResponse, CreateSessionRequest, GetAccountResponse, Identity, MarketsResponse,
    OrdersQuery, OrdersResponse, SessionActionsRequest, SessionActionsResponse, TickerRow,
    TradesResponse, VenueOrder, VenueTrade, VerifyAccessRequest, VerifyAccessResponse,
};
use async_trait::async_trait;
use o2_core::{OwnerAddress, Ticker};
use reqwest::{Client, RequestBuilder};
use serde::de::DeserializeOwned;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Default timeout for venue requests.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Default production endpoint.
pub const DEFAULT_BASE_URL: &str = "https://api.o2.app/v1";

/// Header carrying the owner's b256 address.
pub const OWNER_ID_HEADER: &str = "O2-Owner-Id";

/// Venue operations used by the agent.
#[async_trait]
pub trait VenueApi: Send + Sync {
    /// Create (or return the existing) trade account for `owner`.
    async fn create_account(&self, owner: &OwnerAddress) -> VenueResult<String>;

    async fn get_account(
        &self,
        trade_account_id: &str,
        owner: &OwnerAddress,
    ) -> VenueResult<AccountInfo>;

    async fn create_session(
        &self,
        request: &CreateSessionRequest,
        owner: &OwnerAddress,
    ) -> VenueResult<serde_json::Value>;

    async fn submit_actions(
        &self,
        request: &SessionActionsRequest,
        owner: &OwnerAddress,
    ) -> VenueResult<SessionActionsResponse>;

    async fn get_markets(&self) -> VenueResult<MarketsResponse>;

    async fn get_ticker(&self, market_id: &str) -> VenueResult<Ticker>;

    async fn get_balance(
        &self,
        asset_id: &str,
        trade_account_id: &str,
        owner: &OwnerAddress,
    ) -> VenueResult<BalanceResponse>;

    async fn get_orders(
        &self,
        query: &OrdersQuery,
        owner: &OwnerAddress,
    ) -> VenueResult<Vec<VenueOrder>>;

    async fn get_order(&self, order_id: &str, owner: &OwnerAddress) -> VenueResult<VenueOrder>;

    async fn get_trades(&self, market_id: &str, count: u32) -> VenueResult<Vec<VenueTrade>>;

    async fn verify_access_queue(
        &self,
        request: &VerifyAccessRequest,
        owner: &OwnerAddress,
    ) -> VenueResult<VerifyAccessResponse>;

    async fn assign_invitation_code(
        &self,
        request: &AssignCodeRequest,
    ) -> VenueResult<AssignCodeResponse>;
}

/// Shared venue handle.
pub type DynVenue = Arc<dyn VenueApi>;

/// HTTP implementation of [`VenueApi`].
pub struct O2Client {
    client: Client,
    base_url: String,
}

impl O2Client {
    /// Create a client with the default 30 s timeout.
    pub fn new(base_url: impl Into<String>) -> VenueResult<Self> {
        Self::with_timeout(base_url, DEFAULT_TIMEOUT)
    }

    pub fn with_timeout(base_url: impl Into<String>, timeout: Duration) -> VenueResult<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| VenueError::Network(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Send `request` and decode a JSON body.
    async fn send<T: DeserializeOwned>(&self, request: RequestBuilder, what: &str) -> VenueResult<T> {
        let response = request
            .send()
            .await
            .map_err(|e| VenueError::Network(format!("{what}: {e}")))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| VenueError::Network(format!("{what}: failed to read body: {e}")))?;

        if !status.is_success() {
            let message = rejection_message(&body);
            warn!(%status, what, %message, "Venue rejected request");
            return Err(VenueError::Rejected {
                status: status.as_u16(),
                message,
            });
        }

        debug!(what, bytes = body.len(), "Venue response received");
        serde_json::from_str(&body).map_err(|e| VenueError::Decode(format!("{what}: {e}")))
    }
}

/// Pull `error` or `message` out of an error body, else use the raw text.
fn rejection_message(body: &str) -> String {
    let from_json = serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|v| {
            ["error", "message"]
                .iter()
                .find_map(|k| v.get(*k).and_then(|m| m.as_str()).map(str::to_string))
        });
    match from_json {
        Some(message) => message,
        None if body.trim().is_empty() => "empty response body".to_string(),
        None => body.trim().to_string(),
    }
}

#[async_trait]
impl VenueApi for O2Client {
    async fn create_account(&self, owner: &OwnerAddress) -> VenueResult<String> {
        let owner_id = owner.to_b256();
        let body = CreateAccountRequest {
            identity: Identity::Address(owner_id.clone()),
        };
        let request = self
            .client
            .post(self.url("/accounts"))
            .header(OWNER_ID_HEADER, owner_id)
            .json(&body);
        let response: CreateAccountResponse = self.send(request, "create account").await?;
        Ok(response.trade_account_id)
    }

    async fn get_account(
        &self,
        trade_account_id: &str,
        owner: &OwnerAddress,
    ) -> VenueResult<AccountInfo> {
        let request = self
            .client
            .get(self.url("/accounts"))
            .query(&[("trade_account_id", trade_account_id)])
            .header(OWNER_ID_HEADER, owner.to_b256());
        let response: GetAccountResponse = self.send(request, "get account").await?;
        response.trade_account.ok_or_else(|| VenueError::Rejected {
            status: 404,
            message: format!("trade account {trade_account_id} not found"),
        })
    }

    async fn create_session(
        &self,
        request: &CreateSessionRequest,
        owner: &OwnerAddress,
    ) -> VenueResult<serde_json::Value> {
        let http = self
            .client
            .put(self.url("/session"))
            .header(OWNER_ID_HEADER, owner.to_b256())
            .json(request);
        self.send(http, "create session").await
    }

    async fn submit_actions(
        &self,
        request: &SessionActionsRequest,
        owner: &OwnerAddress,
    ) -> VenueResult<SessionActionsResponse> {
        let http = self
            .client
            .post(self.url("/session/actions"))
            .header(OWNER_ID_HEADER, owner.to_b256())
            .json(request);
        self.send(http, "submit actions").await
    }

    async fn get_markets(&self) -> VenueResult<MarketsResponse> {
        let request = self.client.get(self.url("/markets"));
        self.send(request, "get markets").await
    }

    async fn get_ticker(&self, market_id: &str) -> VenueResult<Ticker> {
        let request = self
            .client
            .get(self.url("/markets/ticker"))
            .query(&[("market_id", market_id)]);
        let rows: Vec<TickerRow> = self.send(request, "get ticker").await?;
        rows.into_iter()
            .next()
            .map(|row| row.into_ticker(market_id))
            .ok_or_else(|| VenueError::Rejected {
                status: 404,
                message: format!("no ticker data for market {market_id}"),
            })
    }

    async fn get_balance(
        &self,
        asset_id: &str,
        trade_account_id: &str,
        owner: &OwnerAddress,
    ) -> VenueResult<BalanceResponse> {
        let request = self
            .client
            .get(self.url("/balance"))
            .query(&[("asset_id", asset_id), ("contract", trade_account_id)])
            .header(OWNER_ID_HEADER, owner.to_b256());
        self.send(request, "get balance").await
    }

    async fn get_orders(
        &self,
        query: &OrdersQuery,
        owner: &OwnerAddress,
    ) -> VenueResult<Vec<VenueOrder>> {
        let request = self
            .client
            .get(self.url("/orders"))
            .query(query)
            .header(OWNER_ID_HEADER, owner.to_b256());
        let response: OrdersResponse = self.send(request, "get orders").await?;
        Ok(response.orders)
    }

    async fn get_order(&self, order_id: &str, owner: &OwnerAddress) -> VenueResult<VenueOrder> {
        let request = self
            .client
            .get(self.url(&format!("/orders/{order_id}")))
            .header(OWNER_ID_HEADER, owner.to_b256());
        self.send(request, "get order").await
    }

    async fn get_trades(&self, market_id: &str, count: u32) -> VenueResult<Vec<VenueTrade>> {
        let count = count.to_string();
        let request = self.client.get(self.url("/trades")).query(&[
            ("market_id", market_id),
            ("count", count.as_str()),
            ("direction", "desc"),
        ]);
        let response: TradesResponse = self.send(request, "get trades").await?;
        Ok(response.trades)
    }

    async fn verify_access_queue(
        &self,
        request: &VerifyAccessRequest,
        owner: &OwnerAddress,
    ) -> VenueResult<VerifyAccessResponse> {
        let http = self
            .client
            .post(self.url("/access-queue/verify"))
            .header(OWNER_ID_HEADER, owner.to_b256())
            .json(request);
        self.send(http, "verify access queue").await
    }

    async fn assign_invitation_code(
        &self,
        request: &AssignCodeRequest,
    ) -> VenueResult<AssignCodeResponse> {
        let http = self.client.put(self.url("/assign-code")).json(request);
        self.send(http, "assign invitation code").await
    }
}
