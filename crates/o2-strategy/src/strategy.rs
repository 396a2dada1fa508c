//! Strategy capability.

use crate::error::{StrategyError, StrategyResult};
use async_trait::async_trait;
use o2_core::{Market, OrderIntent, OrderSide, OwnerAddress, StrategyConfig, StrategyExecutionResult};
use rust_decimal::Decimal;
use std::sync::Arc;
use tracing::debug;

/// A trading algorithm run once per scheduling cycle.
///
/// `execute` returns `executed = false` for expected conditions such as a
/// missing ticker or an empty balance. An `Err` means the cycle itself failed
/// and the caller should back off.
#[async_trait]
pub trait Strategy: Send + Sync {
    fn name(&self) -> &'static str;

    fn description(&self) -> &'static str;

    fn default_config(&self, market_id: &str) -> StrategyConfig;

    async fn execute(
        &self,
        market: &Market,
        config: &StrategyConfig,
        owner: &OwnerAddress,
        trade_account_id: &str,
    ) -> StrategyResult<StrategyExecutionResult>;
}

pub type DynStrategy = Arc<dyn Strategy>;

/// Reject an order whose notional is under `minimum`.
pub fn check_minimum(notional: Decimal, minimum: Decimal) -> StrategyResult<()> {
    if notional < minimum {
        return Err(StrategyError::BelowMinimum { notional, minimum });
    }
    Ok(())
}

/// Keep planned intents; log and drop skipped sides; fail on anything else.
pub(crate) fn collect_intents(
    market_id: &str,
    planned: impl IntoIterator<Item = (OrderSide, StrategyResult<OrderIntent>)>,
) -> StrategyResult<Vec<OrderIntent>> {
    let mut intents = Vec::new();
    for (side, result) in planned {
        match result {
            Ok(intent) => intents.push(intent),
            Err(e) if e.is_skip() => debug!(market_id, %side, reason = %e, "Order side skipped"),
            Err(e) => return Err(e),
        }
    }
    Ok(intents)
}
