//! What a strategy may ask of the exchange.

use crate::error::StrategyResult;
use async_trait::async_trait;
use o2_core::{Market, MarketBalances, OrderExecution, OrderIntent, OwnerAddress, Ticker};
use std::sync::Arc;
use tracing::{info, warn};

/// Market data and order placement for one trading account.
#[async_trait]
pub trait ExchangeGateway: Send + Sync {
    /// Latest ticker; `None` when the venue has no data for the market.
    async fn ticker(&self, market: &Market) -> StrategyResult<Option<Ticker>>;

    /// Spendable base and quote balances in `market` (scaled units).
    async fn market_balances(
        &self,
        market: &Market,
        owner: &OwnerAddress,
        trade_account_id: &str,
    ) -> StrategyResult<MarketBalances>;

    /// Force the next balance read to hit the venue.
    fn invalidate_balances(&self);

    /// Submit one order, returning the venue order id.
    async fn place_order(
        &self,
        market: &Market,
        intent: &OrderIntent,
        owner: &OwnerAddress,
        trade_account_id: &str,
    ) -> StrategyResult<String>;
}

pub type DynGateway = Arc<dyn ExchangeGateway>;

/// Place every intent in order. A failed placement is recorded and the
/// remaining intents are still attempted.
pub async fn place_intents(
    gateway: &dyn ExchangeGateway,
    market: &Market,
    intents: Vec<OrderIntent>,
    owner: &OwnerAddress,
    trade_account_id: &str,
) -> Vec<OrderExecution> {
    let mut executions = Vec::with_capacity(intents.len());
    for intent in intents {
        match gateway
            .place_order(market, &intent, owner, trade_account_id)
            .await
        {
            Ok(order_id) => {
                info!(
                    market_id = %market.market_id,
                    side = %intent.side,
                    order_id = %order_id,
                    price = %intent.price_display,
                    quantity = %intent.quantity_display,
                    "Order placed"
                );
                executions.push(OrderExecution::placed(&intent, order_id));
            }
            Err(e) => {
                warn!(
                    market_id = %market.market_id,
                    side = %intent.side,
                    error = %e,
                    "Order placement failed"
                );
                executions.push(OrderExecution::failed(&intent, e.to_string()));
            }
        }
    }
    executions
}
