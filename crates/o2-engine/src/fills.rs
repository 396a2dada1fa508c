//! Fill tracking.
//!
//! Orders are re-read from the venue and their cumulative fills folded into
//! the market's [`FillState`]. Only the part of a fill not seen before is
//! counted, so polling the same orders twice is harmless.

use crate::error::EngineResult;
use o2_core::decimal::to_display;
use o2_core::{FillState, Market, OrderSide, OwnerAddress, TradeUpdate};
use o2_store::DynStore;
use o2_telemetry::Metrics;
use o2_venue::{DynVenue, OrdersQuery, VenueOrder};
use rust_decimal::Decimal;
use tracing::{debug, warn};

/// Orders fetched per poll, newest first.
pub const FILL_QUERY_COUNT: u32 = 50;

/// A newly observed fill, in display units.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FillUpdate {
    pub order_id: String,
    pub side: OrderSide,
    /// Cumulative filled quantity.
    pub filled_quantity: Decimal,
    pub fill_price: Decimal,
}

/// Fold venue orders into `state`, returning the orders whose fill grew.
pub fn fold_fills(
    state: &mut FillState,
    market: &Market,
    orders: &[VenueOrder],
) -> EngineResult<Vec<FillUpdate>> {
    let mut updates = Vec::new();
    for order in orders.iter().filter(|o| o.has_fill()) {
        let filled_quantity = to_display(order.quantity_fill, market.base.decimals)?;
        let fill_price = to_display(order.effective_fill_price(), market.quote.decimals)?;
        if state.record_fill(&order.order_id, order.side, filled_quantity, fill_price) {
            updates.push(FillUpdate {
                order_id: order.order_id.clone(),
                side: order.side,
                filled_quantity,
                fill_price,
            });
        }
    }
    Ok(updates)
}

pub struct FillTracker {
    venue: DynVenue,
    store: DynStore,
}

impl FillTracker {
    pub fn new(venue: DynVenue, store: DynStore) -> Self {
        Self { venue, store }
    }

    /// Recent orders of the account in `market`.
    pub async fn fetch(
        &self,
        market: &Market,
        owner: &OwnerAddress,
        trade_account_id: &str,
    ) -> EngineResult<Vec<VenueOrder>> {
        let query = OrdersQuery {
            market_id: Some(market.market_id.clone()),
            contract: Some(trade_account_id.to_string()),
            is_open: None,
            direction: Some("desc".to_string()),
            count: Some(FILL_QUERY_COUNT),
        };
        Ok(self.venue.get_orders(&query, owner).await?)
    }

    /// Fold `orders` into `state` and attach fill prices to the matching
    /// trade records. Returns the number of new fills.
    pub fn apply(
        &self,
        state: &mut FillState,
        market: &Market,
        orders: &[VenueOrder],
    ) -> EngineResult<usize> {
        let updates = fold_fills(state, market, orders)?;
        for update in &updates {
            Metrics::fill_recorded(&market.market_id, &update.side.to_string());
            let trade_update = TradeUpdate {
                value_usd: Some(update.filled_quantity * update.fill_price),
                fee_usd: None,
                fill_price: Some(update.fill_price),
            };
            match self
                .store
                .update_trade_by_order_id(&update.order_id, &trade_update)
            {
                Ok(true) => {}
                Ok(false) => debug!(order_id = %update.order_id, "Fill for untracked order"),
                Err(e) => warn!(order_id = %update.order_id, error = %e, "Failed to update trade"),
            }
        }
        if !updates.is_empty() {
            debug!(
                market_id = %market.market_id,
                fills = updates.len(),
                avg_buy = ?state.average_buy_price(),
                avg_sell = ?state.average_sell_price(),
                "Fills recorded"
            );
        }
        Ok(updates.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::market;
    use o2_core::Trade;
    use o2_store::{DurableStore, LocalStore};
    use o2_venue::mock::MockVenue;
    use rust_decimal_macros::dec;
    use std::sync::Arc;

    fn order(id: &str, side: OrderSide, quantity_fill: Decimal, price_fill: Decimal) -> VenueOrder {
        VenueOrder {
            order_id: id.to_string(),
            side,
            market_id: "m1".to_string(),
            price: dec!(2000000),
            price_fill,
            quantity: dec!(10000000000),
            quantity_fill,
            timestamp: None,
            close: false,
            cancel: false,
        }
    }

    #[test]
    fn test_fold_counts_only_new_fill() {
        let mut state = FillState::default();
        let market = market();

        // 4 of 10 filled at 2.00
        let first = [order("0x1", OrderSide::Buy, dec!(4000000000), dec!(2000000))];
        assert_eq!(fold_fills(&mut state, &market, &first).unwrap().len(), 1);
        assert_eq!(state.buy.quantity, dec!(4));

        // Same snapshot again: nothing new
        assert!(fold_fills(&mut state, &market, &first).unwrap().is_empty());

        // 10 of 10 filled, average now 2.30
        let second = [order("0x1", OrderSide::Buy, dec!(10000000000), dec!(2300000))];
        fold_fills(&mut state, &market, &second).unwrap();
        assert_eq!(state.buy.quantity, dec!(10));
        assert_eq!(state.buy.notional, dec!(8) + dec!(13.8));
    }

    #[test]
    fn test_unfilled_orders_ignored_and_limit_price_fallback() {
        let mut state = FillState::default();
        let orders = [
            order("0x1", OrderSide::Sell, Decimal::ZERO, Decimal::ZERO),
            order("0x2", OrderSide::Sell, dec!(1000000000), Decimal::ZERO),
        ];
        let updates = fold_fills(&mut state, &market(), &orders).unwrap();
        assert_eq!(updates.len(), 1);
        assert_eq!(updates[0].fill_price, dec!(2));
        assert_eq!(state.average_sell_price(), Some(dec!(2)));
    }

    #[tokio::test]
    async fn test_apply_updates_trade_record() {
        let venue = Arc::new(MockVenue::new());
        let store = Arc::new(LocalStore::in_memory());
        store
            .insert_trade(&Trade {
                id: 0,
                timestamp: 1,
                market_id: "m1".to_string(),
                order_id: "0x1".to_string(),
                session_id: None,
                side: OrderSide::Buy,
                price: dec!(2),
                quantity: dec!(10),
                success: true,
                error: None,
                value_usd: None,
                fee_usd: None,
                fill_price: None,
            })
            .unwrap();
        let tracker = FillTracker::new(venue, store.clone());
        let mut state = FillState::default();

        let orders = [order("0x1", OrderSide::Buy, dec!(5000000000), dec!(2100000))];
        assert_eq!(tracker.apply(&mut state, &market(), &orders).unwrap(), 1);

        let trade = store.trade_by_order_id("0x1").unwrap().unwrap();
        assert_eq!(trade.fill_price, Some(dec!(2.1)));
        assert_eq!(trade.value_usd, Some(dec!(10.5)));
    }

    #[tokio::test]
    async fn test_fetch_queries_account_orders() {
        let venue = Arc::new(MockVenue::new());
        let tracker = FillTracker::new(venue.clone(), Arc::new(LocalStore::in_memory()));
        let owner = OwnerAddress::parse(&format!("0x{}", "ab".repeat(32))).unwrap();
        assert!(tracker.fetch(&market(), &owner, "0xacc").await.unwrap().is_empty());
        assert_eq!(venue.call_count("get_orders"), 1);
    }
}
