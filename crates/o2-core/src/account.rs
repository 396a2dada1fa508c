//! Trading accounts, delegated sessions and their encrypted keys.

use crate::address::OwnerAddress;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// On-chain trading account bound to one owner wallet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TradingAccount {
    /// Venue trade account id (b256).
    pub id: String,
    pub owner_address: OwnerAddress,
    /// Replay-protection counter; bumped after every signed submission.
    pub nonce: u64,
    pub created_at: u64,
}

/// Delegated signing credential scoped to a set of contracts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    /// Session signer address (b256); also the key record id.
    pub id: String,
    pub trade_account_id: String,
    pub owner_address: OwnerAddress,
    pub contract_ids: Vec<String>,
    /// Absolute expiry, ms since epoch.
    pub expiry: u64,
    pub created_at: u64,
    pub is_active: bool,
}

impl Session {
    /// Active and not yet expired at `now_ms`.
    pub fn is_live(&self, now_ms: u64) -> bool {
        self.is_active && self.expiry > now_ms
    }

    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        DateTime::from_timestamp_millis(self.expiry as i64)
    }
}

/// Encrypted session private key. All fields are base64.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionKeyRecord {
    /// Same as [`Session::id`].
    pub id: String,
    pub encrypted_private_key: String,
    pub salt: String,
    pub iv: String,
    pub created_at: u64,
}

/// Recorded terms-of-use acceptance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TermsAcceptance {
    pub owner_address: OwnerAddress,
    pub accepted_at: u64,
}
