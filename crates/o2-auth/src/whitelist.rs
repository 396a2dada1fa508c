//! On-chain whitelist lookup.
//!
//! The order book whitelist contract mints one asset per approved trade
//! account, with asset id `sha256(whitelist_id || trade_account_id)`. Any
//! positive balance of that asset held by the contract means the account
//! is whitelisted.

use crate::error::{AuthError, AuthResult};
use async_trait::async_trait;
use o2_core::b256_bytes;
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use sha2::{Digest, Sha256};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

#[cfg(test)]
use mockall::automock;

pub const DEFAULT_PROVIDER_URL: &str = "https://mainnet.fuel.network/v1/graphql";

/// Asset id marking `trade_account_id` as whitelisted by `whitelist_id`.
pub fn whitelist_asset_id(whitelist_id: &str, trade_account_id: &str) -> AuthResult<String> {
    let mut hasher = Sha256::new();
    hasher.update(b256_bytes(whitelist_id)?);
    hasher.update(b256_bytes(trade_account_id)?);
    Ok(format!("0x{}", hex::encode(hasher.finalize())))
}

#[cfg_attr(test, automock)]
#[async_trait]
pub trait WhitelistRegistry: Send + Sync {
    async fn is_whitelisted(&self, trade_account_id: &str, whitelist_id: &str) -> AuthResult<bool>;
}

pub type DynWhitelist = Arc<dyn WhitelistRegistry>;

/// Reads the whitelist contract balance through a Fuel GraphQL node.
pub struct GraphqlWhitelist {
    client: Client,
    provider_url: String,
}

const CONTRACT_BALANCE_QUERY: &str =
    "query ContractBalance($contract: ContractId!, $asset: AssetId!) { \
     contractBalance(contract: $contract, asset: $asset) { amount } }";

#[derive(Deserialize)]
struct GraphqlResponse {
    data: Option<BalanceData>,
    #[serde(default)]
    errors: Vec<GraphqlError>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct BalanceData {
    contract_balance: ContractBalance,
}

#[derive(Deserialize)]
struct ContractBalance {
    amount: String,
}

#[derive(Deserialize)]
struct GraphqlError {
    message: String,
}

impl GraphqlWhitelist {
    pub fn new(provider_url: impl Into<String>, timeout: Duration) -> AuthResult<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| AuthError::Whitelist(format!("Failed to create HTTP client: {e}")))?;
        Ok(Self {
            client,
            provider_url: provider_url.into(),
        })
    }
}

#[async_trait]
impl WhitelistRegistry for GraphqlWhitelist {
    async fn is_whitelisted(&self, trade_account_id: &str, whitelist_id: &str) -> AuthResult<bool> {
        let asset = whitelist_asset_id(whitelist_id, trade_account_id)?;
        let body = json!({
            "query": CONTRACT_BALANCE_QUERY,
            "variables": { "contract": whitelist_id, "asset": asset },
        });

        let response = self
            .client
            .post(&self.provider_url)
            .json(&body)
            .send()
            .await
            .map_err(|e| AuthError::Whitelist(e.to_string()))?;
        if !response.status().is_success() {
            return Err(AuthError::Whitelist(format!(
                "provider returned {}",
                response.status()
            )));
        }
        let parsed: GraphqlResponse = response
            .json()
            .await
            .map_err(|e| AuthError::Whitelist(format!("undecodable response: {e}")))?;

        if let Some(error) = parsed.errors.first() {
            return Err(AuthError::Whitelist(error.message.clone()));
        }
        let data = parsed
            .data
            .ok_or_else(|| AuthError::Whitelist("response has no data".to_string()))?;
        let amount: u64 = data
            .contract_balance
            .amount
            .parse()
            .map_err(|_| AuthError::Whitelist(format!("bad amount {}", data.contract_balance.amount)))?;

        debug!(trade_account_id, %asset, amount, "Whitelist balance");
        Ok(amount > 0)
    }
}
