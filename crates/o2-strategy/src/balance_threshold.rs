//! Balance threshold: trade away whatever exceeds a configured reserve.
//!
//! Base above `base_threshold` is sold just under the last price; quote
//! above `quote_threshold` buys base just over it.

use crate::error::{StrategyError, StrategyResult};
use crate::gateway::{place_intents, DynGateway};
use crate::jitter::random_delay;
use crate::strategy::{check_minimum, collect_intents, Strategy};
use async_trait::async_trait;
use o2_core::decimal::{to_display, to_scaled_floor};
use o2_core::{
    BalanceThresholdParams, DynClock, Market, OrderIntent, OrderSide, OwnerAddress,
    StrategyConfig, StrategyExecutionResult, StrategyKind,
};
use rust_decimal::Decimal;
use tracing::{info, warn};

const NAME: &str = "Balance Threshold";

/// `mid * multiplier` as (scaled, display), floored to quote units.
fn priced(market: &Market, mid: Decimal, multiplier: Decimal) -> StrategyResult<(Decimal, Decimal)> {
    let scaled = to_scaled_floor(mid * multiplier, market.quote.decimals)?;
    if scaled <= Decimal::ZERO {
        return Err(StrategyError::NoPrice(market.market_id.clone()));
    }
    Ok((scaled, to_display(scaled, market.quote.decimals)?))
}

/// Sell the base held above the threshold. `mid` is a display price.
pub fn plan_excess_sell(
    market: &Market,
    params: &BalanceThresholdParams,
    mid: Decimal,
    base_unlocked: Decimal,
) -> StrategyResult<OrderIntent> {
    let base = &market.base;
    let held = to_display(base_unlocked, base.decimals)?;
    if held <= params.base_threshold {
        return Err(StrategyError::InsufficientBalance(format!(
            "{held} {} within threshold {}",
            base.symbol, params.base_threshold
        )));
    }
    let quantity = to_scaled_floor(held - params.base_threshold, base.decimals)?;
    let quantity_display = to_display(quantity, base.decimals)?;
    let (price, price_display) = priced(market, mid, params.sell_price_multiplier)?;
    check_minimum(price_display * quantity_display, params.min_order_usd)?;

    Ok(OrderIntent {
        side: OrderSide::Sell,
        order_type: params.order_type,
        price,
        quantity,
        price_display,
        quantity_display,
    })
}

/// Spend the quote held above the threshold on base.
pub fn plan_excess_buy(
    market: &Market,
    params: &BalanceThresholdParams,
    mid: Decimal,
    quote_unlocked: Decimal,
) -> StrategyResult<OrderIntent> {
    let quote = &market.quote;
    let held = to_display(quote_unlocked, quote.decimals)?;
    if held <= params.quote_threshold {
        return Err(StrategyError::InsufficientBalance(format!(
            "{held} {} within threshold {}",
            quote.symbol, params.quote_threshold
        )));
    }
    let (price, price_display) = priced(market, mid, params.buy_price_multiplier)?;
    let excess = held - params.quote_threshold;
    let quantity = to_scaled_floor(excess / price_display, market.base.decimals)?;
    if quantity <= Decimal::ZERO {
        return Err(StrategyError::InsufficientBalance(format!(
            "{excess} {} buys no {}",
            quote.symbol, market.base.symbol
        )));
    }
    let quantity_display = to_display(quantity, market.base.decimals)?;
    check_minimum(price_display * quantity_display, params.min_order_usd)?;

    Ok(OrderIntent {
        side: OrderSide::Buy,
        order_type: params.order_type,
        price,
        quantity,
        price_display,
        quantity_display,
    })
}

pub struct BalanceThresholdStrategy {
    gateway: DynGateway,
    clock: DynClock,
}

impl BalanceThresholdStrategy {
    pub fn new(gateway: DynGateway, clock: DynClock) -> Self {
        Self { gateway, clock }
    }
}

#[async_trait]
impl Strategy for BalanceThresholdStrategy {
    fn name(&self) -> &'static str {
        NAME
    }

    fn description(&self) -> &'static str {
        "Sells base above the base threshold and buys with quote above the quote threshold."
    }

    fn default_config(&self, market_id: &str) -> StrategyConfig {
        let mut config = StrategyConfig::new(
            market_id,
            StrategyKind::BalanceThreshold(BalanceThresholdParams::default()),
        );
        config.name = NAME.to_string();
        config
    }

    async fn execute(
        &self,
        market: &Market,
        config: &StrategyConfig,
        owner: &OwnerAddress,
        trade_account_id: &str,
    ) -> StrategyResult<StrategyExecutionResult> {
        let StrategyKind::BalanceThreshold(params) = &config.strategy else {
            return Err(StrategyError::ConfigMismatch {
                strategy: NAME,
                config: config.strategy.label(),
            });
        };
        let next_run_at = self.clock.now_ms() + random_delay(&config.effective_timing());

        let balances = self
            .gateway
            .market_balances(market, owner, trade_account_id)
            .await?;
        let Some(ticker) = self.gateway.ticker(market).await? else {
            warn!(market_id = %market.market_id, "No ticker data available");
            return Ok(StrategyExecutionResult::idle(Some(next_run_at)));
        };
        let mid = to_display(ticker.last_price, market.quote.decimals)?;
        if mid <= Decimal::ZERO {
            return Ok(StrategyExecutionResult::idle(Some(next_run_at)));
        }

        let intents = collect_intents(
            &market.market_id,
            [
                (
                    OrderSide::Sell,
                    plan_excess_sell(market, params, mid, balances.base.unlocked),
                ),
                (
                    OrderSide::Buy,
                    plan_excess_buy(market, params, mid, balances.quote.unlocked),
                ),
            ],
        )?;
        if !intents.is_empty() {
            info!(market_id = %market.market_id, intents = intents.len(), "Threshold exceeded");
        }
        let orders = place_intents(&*self.gateway, market, intents, owner, trade_account_id).await;
        Ok(StrategyExecutionResult::from_orders(orders, Some(next_run_at)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockGateway;
    use o2_core::{AssetInfo, ManualClock};
    use rust_decimal_macros::dec;
    use std::sync::Arc;

    fn market() -> Market {
        let asset = |symbol: &str, decimals| AssetInfo {
            asset: format!("0x{symbol}"),
            symbol: symbol.to_string(),
            decimals,
            max_precision: 3,
        };
        Market {
            market_id: "m1".to_string(),
            contract_id: "0xbook".to_string(),
            base: asset("FUEL", 9),
            quote: asset("USDC", 6),
            tick_size: None,
            step_size: None,
        }
    }

    fn owner() -> OwnerAddress {
        OwnerAddress::parse(&format!("0x{}", "ab".repeat(32))).unwrap()
    }

    fn params() -> BalanceThresholdParams {
        BalanceThresholdParams {
            base_threshold: dec!(100),
            quote_threshold: dec!(50),
            ..Default::default()
        }
    }

    #[test]
    fn test_sells_only_the_excess() {
        // 150 held, 100 kept, mid 2.00
        let intent = plan_excess_sell(&market(), &params(), dec!(2), dec!(150000000000)).unwrap();
        assert_eq!(intent.quantity, dec!(50000000000));
        assert_eq!(intent.price, dec!(1980000));
        assert_eq!(intent.price_display, dec!(1.98));
        assert_eq!(intent.order_type, o2_core::OrderType::Spot);
    }

    #[test]
    fn test_price_is_scaled_once() {
        let intent = plan_excess_buy(&market(), &params(), dec!(2), dec!(70000000)).unwrap();
        // 2.00 * 1.01 in quote units, not scaled twice
        assert_eq!(intent.price, dec!(2020000));
        // 20 / 2.02 = 9.900990099
        assert_eq!(intent.quantity, dec!(9900990099));
    }

    #[test]
    fn test_within_threshold_is_skip() {
        let err = plan_excess_sell(&market(), &params(), dec!(2), dec!(100000000000)).unwrap_err();
        assert!(err.is_skip());
        let err = plan_excess_buy(&market(), &params(), dec!(2), dec!(50000000)).unwrap_err();
        assert!(err.is_skip());
    }

    #[test]
    fn test_small_excess_below_minimum() {
        // 2 USDC over the threshold
        let err = plan_excess_buy(&market(), &params(), dec!(2), dec!(52000000)).unwrap_err();
        assert!(matches!(err, StrategyError::BelowMinimum { .. }));
    }

    #[tokio::test]
    async fn test_execute_handles_both_thresholds() {
        let gateway = Arc::new(MockGateway::new());
        gateway.set_ticker("m1", dec!(2000000));
        gateway.set_balances("m1", dec!(150000000000), dec!(70000000));
        let strategy = BalanceThresholdStrategy::new(gateway.clone(), Arc::new(ManualClock::new(0)));
        let mut config = strategy.default_config("m1");
        config.strategy = StrategyKind::BalanceThreshold(params());

        let result = strategy
            .execute(&market(), &config, &owner(), "0xacc")
            .await
            .unwrap();
        assert!(result.executed);
        let sides: Vec<_> = gateway.placed().iter().map(|(_, i)| i.side).collect();
        assert_eq!(sides, vec![OrderSide::Sell, OrderSide::Buy]);
        assert!((5_000..=10_000).contains(&result.next_run_at.unwrap()));
        assert_eq!(gateway.invalidations(), 0);
    }

    #[test]
    fn test_nothing_to_do() {
        let gateway = Arc::new(MockGateway::new());
        gateway.set_ticker("m1", dec!(2000000));
        gateway.set_balances("m1", dec!(1000000000), dec!(1000000));
        let strategy = BalanceThresholdStrategy::new(gateway.clone(), Arc::new(ManualClock::new(0)));
        let config = strategy.default_config("m1");
        let result = tokio_test::assert_ok!(tokio_test::block_on(strategy.execute(
            &market(),
            &config,
            &owner(),
            "0xacc"
        )));
        assert!(!result.executed);
        assert!(gateway.placed().is_empty());
    }
}
