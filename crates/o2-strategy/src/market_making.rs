//! Market making: one aggressive buy and one aggressive sell per cycle.
//!
//! Prices sit a small percentage through the last trade so both sides fill
//! quickly. The buy spends the whole available quote balance and the sell
//! the whole available base balance. Every conversion floors, so an order
//! never needs more than the balance it was sized from.

use crate::error::{StrategyError, StrategyResult};
use crate::gateway::{place_intents, DynGateway};
use crate::jitter::random_delay;
use crate::strategy::{check_minimum, collect_intents, Strategy};
use async_trait::async_trait;
use o2_core::decimal::{floor_to_places, pow10, to_display, to_scaled_floor, truncate_to_precision};
use o2_core::{
    DynClock, Market, MarketMakingParams, OrderIntent, OrderSide, OwnerAddress, StrategyConfig,
    StrategyExecutionResult, StrategyKind,
};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use tracing::{info, warn};

const NAME: &str = "Market Making";

/// Price `pct` percent away from `mid`, truncated to the quote precision.
/// Returns (scaled, display).
fn adjusted_price(market: &Market, mid: Decimal, pct: Decimal, side: OrderSide) -> StrategyResult<(Decimal, Decimal)> {
    let factor = match side {
        OrderSide::Buy => Decimal::ONE + pct / dec!(100),
        OrderSide::Sell => Decimal::ONE - pct / dec!(100),
    };
    let quote = &market.quote;
    let scaled = truncate_to_precision(mid * factor, quote.decimals, quote.max_precision)?;
    if scaled <= Decimal::ZERO {
        return Err(StrategyError::NoPrice(market.market_id.clone()));
    }
    Ok((scaled, to_display(scaled, quote.decimals)?))
}

/// Buy sized from `quote_unlocked` (scaled) at `mid` (display) plus the
/// configured adjustment.
pub fn plan_buy(
    market: &Market,
    params: &MarketMakingParams,
    mid: Decimal,
    quote_unlocked: Decimal,
) -> StrategyResult<OrderIntent> {
    let base = &market.base;
    let (price, price_display) =
        adjusted_price(market, mid, params.buy_price_adjustment_pct, OrderSide::Buy)?;

    // price * quantity / 10^base_decimals <= quote_unlocked
    let max_quantity = (quote_unlocked.max(Decimal::ZERO) * pow10(base.decimals)? / price).floor();
    let quantity_display = floor_to_places(to_display(max_quantity, base.decimals)?, params.quantity_decimals);
    let quantity = to_scaled_floor(quantity_display, base.decimals)?;
    if quantity <= Decimal::ZERO {
        return Err(StrategyError::InsufficientBalance(format!(
            "{} {} buys no {}",
            to_display(quote_unlocked, market.quote.decimals)?,
            market.quote.symbol,
            base.symbol
        )));
    }
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

/// Sell of the whole `base_unlocked` (scaled) at `mid` minus the configured
/// adjustment. With `average_buy` set, a sell priced under it is skipped.
pub fn plan_sell(
    market: &Market,
    params: &MarketMakingParams,
    mid: Decimal,
    base_unlocked: Decimal,
    average_buy: Option<Decimal>,
) -> StrategyResult<OrderIntent> {
    let base = &market.base;
    let (price, price_display) =
        adjusted_price(market, mid, params.sell_price_adjustment_pct, OrderSide::Sell)?;

    let quantity_display = floor_to_places(
        to_display(base_unlocked.max(Decimal::ZERO), base.decimals)?,
        params.quantity_decimals,
    );
    let quantity = to_scaled_floor(quantity_display, base.decimals)?;
    if quantity <= Decimal::ZERO {
        return Err(StrategyError::InsufficientBalance(format!(
            "no {} to sell",
            base.symbol
        )));
    }
    check_minimum(price_display * quantity_display, params.min_order_usd)?;

    if let Some(average) = average_buy {
        if price_display < average {
            return Err(StrategyError::BelowAverageBuy {
                price: price_display,
                average,
            });
        }
    }

    Ok(OrderIntent {
        side: OrderSide::Sell,
        order_type: params.order_type,
        price,
        quantity,
        price_display,
        quantity_display,
    })
}

pub struct MarketMakingStrategy {
    gateway: DynGateway,
    clock: DynClock,
}

impl MarketMakingStrategy {
    pub fn new(gateway: DynGateway, clock: DynClock) -> Self {
        Self { gateway, clock }
    }
}

#[async_trait]
impl Strategy for MarketMakingStrategy {
    fn name(&self) -> &'static str {
        NAME
    }

    fn description(&self) -> &'static str {
        "Places an aggressive buy just above and an aggressive sell just below the last \
         price each cycle, sized from the full available balances."
    }

    fn default_config(&self, market_id: &str) -> StrategyConfig {
        let mut config = StrategyConfig::new(
            market_id,
            StrategyKind::MarketMaking(MarketMakingParams::default()),
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
        let StrategyKind::MarketMaking(params) = &config.strategy else {
            return Err(StrategyError::ConfigMismatch {
                strategy: NAME,
                config: config.strategy.label(),
            });
        };
        // Interval measured from cycle start, not end.
        let next_run_at = self.clock.now_ms() + random_delay(&config.effective_timing());

        let Some(ticker) = self.gateway.ticker(market).await? else {
            warn!(market_id = %market.market_id, "No ticker data available");
            return Ok(StrategyExecutionResult::idle(Some(next_run_at)));
        };
        let mid = to_display(ticker.last_price, market.quote.decimals)?;
        if mid <= Decimal::ZERO {
            warn!(market_id = %market.market_id, last = %ticker.last_price, "Ticker has no usable price");
            return Ok(StrategyExecutionResult::idle(Some(next_run_at)));
        }

        self.gateway.invalidate_balances();
        let balances = self
            .gateway
            .market_balances(market, owner, trade_account_id)
            .await?;

        let average_buy = if config.order_management.only_sell_above_buy_price {
            config.fill_state.average_buy_price()
        } else {
            None
        };

        let intents = collect_intents(
            &market.market_id,
            [
                (OrderSide::Buy, plan_buy(market, params, mid, balances.quote.unlocked)),
                (
                    OrderSide::Sell,
                    plan_sell(market, params, mid, balances.base.unlocked, average_buy),
                ),
            ],
        )?;

        info!(
            market_id = %market.market_id,
            mid = %mid,
            intents = intents.len(),
            "Market making cycle"
        );
        let orders = place_intents(&*self.gateway, market, intents, owner, trade_account_id).await;
        Ok(StrategyExecutionResult::from_orders(orders, Some(next_run_at)))
    }
}
