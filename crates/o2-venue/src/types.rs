//! Wire types for the venue REST API.
//!
//! Amounts travel as decimal strings of scaled integers. Some endpoints send
//! bare numbers instead, so amount and nonce fields accept either.

use o2_core::decimal::parse_amount;
use o2_core::{Market, OrderSide, OrderType, Ticker};
use rust_decimal::Decimal;
use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::HashMap;

// ============================================================================
// Flexible scalar decoding
// ============================================================================

#[derive(Deserialize)]
#[serde(untagged)]
enum RawScalar {
    Str(String),
    Int(u64),
    Float(f64),
}

fn de_amount<'de, D: Deserializer<'de>>(d: D) -> Result<Decimal, D::Error> {
    match Option::<RawScalar>::deserialize(d)? {
        None => Ok(Decimal::ZERO),
        Some(RawScalar::Str(s)) => parse_amount(&s).map_err(D::Error::custom),
        Some(RawScalar::Int(n)) => Ok(Decimal::from(n)),
        Some(RawScalar::Float(f)) => Decimal::try_from(f).map_err(D::Error::custom),
    }
}

fn de_opt_amount<'de, D: Deserializer<'de>>(d: D) -> Result<Option<Decimal>, D::Error> {
    match Option::<RawScalar>::deserialize(d)? {
        None => Ok(None),
        Some(RawScalar::Str(s)) if s.trim().is_empty() => Ok(None),
        Some(RawScalar::Str(s)) => parse_amount(&s).map(Some).map_err(D::Error::custom),
        Some(RawScalar::Int(n)) => Ok(Some(Decimal::from(n))),
        Some(RawScalar::Float(f)) => Decimal::try_from(f).map(Some).map_err(D::Error::custom),
    }
}

fn de_u64<'de, D: Deserializer<'de>>(d: D) -> Result<u64, D::Error> {
    match Option::<RawScalar>::deserialize(d)? {
        None => Ok(0),
        Some(RawScalar::Str(s)) => s.trim().parse().map_err(D::Error::custom),
        Some(RawScalar::Int(n)) => Ok(n),
        Some(RawScalar::Float(f)) if f >= 0.0 && f.fract() == 0.0 => Ok(f as u64),
        Some(RawScalar::Float(f)) => Err(D::Error::custom(format!("not a u64: {f}"))),
    }
}

// ============================================================================
// Identities and signatures
// ============================================================================

/// Account or contract identity, encoded `{"Address": "0x.."}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Identity {
    Address(String),
    ContractId(String),
}

/// Signature envelope, encoded `{"Secp256k1": "0x.."}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Signature {
    Secp256k1(String),
}

// ============================================================================
// Accounts
// ============================================================================

#[derive(Debug, Clone, Serialize)]
pub struct CreateAccountRequest {
    pub identity: Identity,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreateAccountResponse {
    pub trade_account_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct AccountInfo {
    #[serde(default, deserialize_with = "de_u64")]
    pub nonce: u64,
    #[serde(default)]
    pub owner: Option<Identity>,
    #[serde(default)]
    pub synced_with_network: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GetAccountResponse {
    #[serde(default)]
    pub trade_account: Option<AccountInfo>,
    #[serde(default)]
    pub trade_account_id: Option<String>,
}

// ============================================================================
// Sessions and actions
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CreateSessionRequest {
    pub nonce: String,
    /// Trade account the session acts for.
    pub contract_id: String,
    pub session_id: Identity,
    pub contract_ids: Vec<String>,
    pub signature: Signature,
    pub expiry: String,
}

/// One order-book action. Externally tagged, e.g. `{"CreateOrder": {..}}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SessionAction {
    CreateOrder {
        side: OrderSide,
        order_type: OrderType,
        price: String,
        quantity: String,
    },
    CancelOrder {
        order_id: String,
    },
    SettleBalance {
        to: Identity,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MarketActions {
    pub market_id: String,
    pub actions: Vec<SessionAction>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SessionActionsRequest {
    pub actions: Vec<MarketActions>,
    pub signature: Signature,
    pub nonce: String,
    pub trade_account_id: String,
    pub session_id: Identity,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub variable_outputs: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub collect_orders: Option<bool>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SessionActionsResponse {
    pub tx_id: String,
    #[serde(default)]
    pub orders: Vec<VenueOrder>,
}

// ============================================================================
// Markets
// ============================================================================

#[derive(Debug, Clone, Deserialize)]
pub struct MarketsResponse {
    #[serde(default)]
    pub markets: Vec<Market>,
    #[serde(default)]
    pub books_whitelist_id: Option<String>,
    #[serde(default)]
    pub books_registry_id: Option<String>,
    #[serde(default)]
    pub accounts_registry_id: Option<String>,
    #[serde(default)]
    pub chain_id: Option<String>,
}

/// Raw ticker row; only the fields the agent reads.
#[derive(Debug, Clone, Deserialize)]
pub struct TickerRow {
    #[serde(deserialize_with = "de_amount")]
    pub last: Decimal,
    #[serde(default, deserialize_with = "de_opt_amount")]
    pub bid: Option<Decimal>,
    #[serde(default, deserialize_with = "de_opt_amount")]
    pub ask: Option<Decimal>,
}

impl TickerRow {
    pub fn into_ticker(self, market_id: &str) -> Ticker {
        Ticker {
            market_id: market_id.to_string(),
            last_price: self.last,
            bid: self.bid,
            ask: self.ask,
        }
    }
}

// ============================================================================
// Balances
// ============================================================================

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct OrderBookBalance {
    #[serde(default, deserialize_with = "de_amount")]
    pub unlocked: Decimal,
    #[serde(default, deserialize_with = "de_amount")]
    pub locked: Decimal,
    #[serde(default, deserialize_with = "de_amount")]
    pub fee: Decimal,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct BalanceResponse {
    #[serde(default, deserialize_with = "de_amount")]
    pub total_unlocked: Decimal,
    #[serde(default, deserialize_with = "de_amount")]
    pub total_locked: Decimal,
    #[serde(default, deserialize_with = "de_amount")]
    pub trading_account_balance: Decimal,
    #[serde(default)]
    pub order_books: HashMap<String, OrderBookBalance>,
}

impl BalanceResponse {
    /// Spendable in the book `contract_id`: account balance plus that
    /// book's unlocked funds.
    pub fn available_in(&self, contract_id: &str) -> Decimal {
        let book_unlocked = self
            .order_books
            .get(contract_id)
            .map(|b| b.unlocked)
            .unwrap_or(Decimal::ZERO);
        self.trading_account_balance + book_unlocked
    }

    pub fn total(&self) -> Decimal {
        self.trading_account_balance + self.total_unlocked
    }
}

// ============================================================================
// Orders and trades
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct VenueOrder {
    pub order_id: String,
    pub side: OrderSide,
    #[serde(default)]
    pub market_id: String,
    #[serde(default, deserialize_with = "de_amount")]
    pub price: Decimal,
    /// Average fill price (scaled), zero until filled.
    #[serde(default, deserialize_with = "de_amount")]
    pub price_fill: Decimal,
    #[serde(default, deserialize_with = "de_amount")]
    pub quantity: Decimal,
    /// Cumulative filled quantity (scaled).
    #[serde(default, deserialize_with = "de_amount")]
    pub quantity_fill: Decimal,
    #[serde(default)]
    pub timestamp: Option<String>,
    #[serde(default)]
    pub close: bool,
    #[serde(default)]
    pub cancel: bool,
}

impl VenueOrder {
    pub fn has_fill(&self) -> bool {
        self.quantity_fill > Decimal::ZERO
    }

    /// Fill price, falling back to the limit price when the venue has not
    /// reported an average yet.
    pub fn effective_fill_price(&self) -> Decimal {
        if self.price_fill > Decimal::ZERO {
            self.price_fill
        } else {
            self.price
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct OrdersResponse {
    #[serde(default)]
    pub orders: Vec<VenueOrder>,
}

/// Query for `GET /orders`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct OrdersQuery {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub market_id: Option<String>,
    /// Trade account id.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub contract: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_open: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub direction: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub count: Option<u32>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct VenueTrade {
    #[serde(default)]
    pub trade_id: String,
    #[serde(default, deserialize_with = "de_amount")]
    pub price: Decimal,
    #[serde(default, deserialize_with = "de_amount")]
    pub quantity: Decimal,
    pub side: OrderSide,
    #[serde(default)]
    pub timestamp: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TradesResponse {
    #[serde(default)]
    pub trades: Vec<VenueTrade>,
}

// ============================================================================
// Access queue and invitations
// ============================================================================

#[derive(Debug, Clone, Serialize)]
pub struct VerifyAccessRequest {
    pub trading_account: String,
    pub wallet_address: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccessQueueEntry {
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub queue_position: Option<u64>,
    #[serde(default)]
    pub invitation_code: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub telegram: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifyAccessResponse {
    #[serde(default)]
    pub success: bool,
    /// Present for a newly created entry.
    #[serde(default)]
    pub auto_approved: Option<bool>,
    #[serde(default)]
    pub queue_position: Option<u64>,
    #[serde(default)]
    pub invitation_code: Option<String>,
    /// Present when an existing entry was looked up.
    #[serde(default)]
    pub found: Option<bool>,
    #[serde(default)]
    pub entry: Option<AccessQueueEntry>,
}

#[derive(Debug, Clone, Serialize)]
pub struct AssignCodeRequest {
    pub invitation_code: String,
    pub trade_account_id: String,
    pub wallet_address: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct AssignCodeResponse {
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub error: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_action_encoding() {
        let action = SessionAction::CreateOrder {
            side: OrderSide::Buy,
            order_type: OrderType::Market,
            price: "1501000".to_string(),
            quantity: "66600000000".to_string(),
        };
        let json = serde_json::to_value(&action).unwrap();
        assert_eq!(json["CreateOrder"]["side"], "Buy");
        assert_eq!(json["CreateOrder"]["order_type"], "Market");

        let identity = serde_json::to_value(Identity::Address("0x01".to_string())).unwrap();
        assert_eq!(identity["Address"], "0x01");
    }

    #[test]
    fn test_balance_available_in_book() {
        let json = r#"{
            "total_unlocked": "700",
            "total_locked": "50",
            "trading_account_balance": "1000",
            "order_books": {"0xbook": {"unlocked": "200", "locked": "50", "fee": "0"}}
        }"#;
        let balance: BalanceResponse = serde_json::from_str(json).unwrap();
        assert_eq!(balance.available_in("0xbook"), dec!(1200));
        assert_eq!(balance.available_in("0xother"), dec!(1000));
        assert_eq!(balance.total(), dec!(1700));
    }

    #[test]
    fn test_account_nonce_accepts_string_or_number() {
        let a: GetAccountResponse =
            serde_json::from_str(r#"{"trade_account":{"nonce":"7"},"trade_account_id":"0x1"}"#)
                .unwrap();
        let b: GetAccountResponse =
            serde_json::from_str(r#"{"trade_account":{"nonce":7},"trade_account_id":"0x1"}"#)
                .unwrap();
        assert_eq!(a.trade_account.unwrap().nonce, 7);
        assert_eq!(b.trade_account.unwrap().nonce, 7);
    }

    #[test]
    fn test_order_fill_fields() {
        let json = r#"{"order_id":"0xo","side":"buy","price":"1500","price_fill":"","quantity":"10","quantity_fill":"4"}"#;
        let order: VenueOrder = serde_json::from_str(json).unwrap();
        assert!(order.has_fill());
        assert_eq!(order.effective_fill_price(), dec!(1500));
    }

    #[test]
    fn test_verify_response_shapes() {
        let queued: VerifyAccessResponse =
            serde_json::from_str(r#"{"success":true,"autoApproved":false,"queuePosition":7}"#)
                .unwrap();
        assert_eq!(queued.auto_approved, Some(false));
        assert_eq!(queued.queue_position, Some(7));

        let found: VerifyAccessResponse = serde_json::from_str(
            r#"{"success":true,"found":true,"entry":{"status":"pending","queuePosition":3}}"#,
        )
        .unwrap();
        assert_eq!(found.entry.unwrap().queue_position, Some(3));
    }
}
