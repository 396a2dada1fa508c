//! Session registration payload.
//!
//! The owner signs the canonical encoding
//! `nonce || expiry || session_id || trade_account_id || count || contract_id*`
//! (integers as big-endian u64, ids as 32 raw bytes). That signature is what
//! authorizes the session key to act for the owner.

use crate::error::{SessionError, SessionResult};
use crate::owner::OwnerSigner;
use o2_core::{b256_bytes, normalize_b256};
use o2_venue::{CreateSessionRequest, Identity, Signature};

/// Unsigned session registration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionRegistration {
    pub nonce: u64,
    /// Absolute expiry, ms since epoch.
    pub expiry: u64,
    pub session_id: String,
    pub trade_account_id: String,
    pub contract_ids: Vec<String>,
}

impl SessionRegistration {
    /// Build a registration. Ids are normalized to b256.
    ///
    /// # Errors
    /// `EmptyContractSet` if `contract_ids` is empty, `Core` for malformed ids.
    pub fn new(
        nonce: u64,
        expiry: u64,
        session_id: &str,
        trade_account_id: &str,
        contract_ids: &[String],
    ) -> SessionResult<Self> {
        if contract_ids.is_empty() {
            return Err(SessionError::EmptyContractSet);
        }
        let contract_ids = contract_ids
            .iter()
            .map(|id| normalize_b256(id))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            nonce,
            expiry,
            session_id: normalize_b256(session_id)?,
            trade_account_id: normalize_b256(trade_account_id)?,
            contract_ids,
        })
    }

    /// Bytes the owner signs.
    pub fn canonical_bytes(&self) -> SessionResult<Vec<u8>> {
        let mut data = Vec::with_capacity(8 * 3 + 32 * (2 + self.contract_ids.len()));
        data.extend_from_slice(&self.nonce.to_be_bytes());
        data.extend_from_slice(&self.expiry.to_be_bytes());
        data.extend_from_slice(&b256_bytes(&self.session_id)?);
        data.extend_from_slice(&b256_bytes(&self.trade_account_id)?);
        data.extend_from_slice(&(self.contract_ids.len() as u64).to_be_bytes());
        for id in &self.contract_ids {
            data.extend_from_slice(&b256_bytes(id)?);
        }
        Ok(data)
    }

    /// Have the owner sign the registration and build the venue request.
    pub async fn sign(&self, owner: &dyn OwnerSigner) -> SessionResult<CreateSessionRequest> {
        let signature = owner.sign_message(&self.canonical_bytes()?).await?;
        Ok(CreateSessionRequest {
            nonce: self.nonce.to_string(),
            contract_id: self.trade_account_id.clone(),
            session_id: Identity::Address(self.session_id.clone()),
            contract_ids: self.contract_ids.clone(),
            signature: Signature::Secp256k1(signature),
            expiry: self.expiry.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::owner::MockOwnerSigner;

    fn id(byte: &str) -> String {
        format!("0x{}", byte.repeat(32))
    }

    #[test]
    fn test_empty_contract_set_rejected() {
        let err = SessionRegistration::new(0, 1, &id("aa"), &id("bb"), &[]).unwrap_err();
        assert!(matches!(err, SessionError::EmptyContractSet));
    }

    #[test]
    fn test_canonical_layout() {
        let reg =
            SessionRegistration::new(3, 9, &id("aa"), &id("bb"), &[id("01"), id("02")]).unwrap();
        let bytes = reg.canonical_bytes().unwrap();
        assert_eq!(bytes.len(), 8 + 8 + 32 + 32 + 8 + 64);
        assert_eq!(&bytes[..8], &3u64.to_be_bytes());
        assert_eq!(&bytes[8..16], &9u64.to_be_bytes());
        assert_eq!(bytes[16], 0xaa);
        assert_eq!(bytes[48], 0xbb);
        assert_eq!(&bytes[80..88], &2u64.to_be_bytes());
        assert_eq!(bytes[88], 0x01);
        assert_eq!(bytes[120], 0x02);
    }

    #[test]
    fn test_short_ids_are_padded() {
        let reg = SessionRegistration::new(0, 0, "0xabc", &id("bb"), &["0x1".to_string()]).unwrap();
        assert_eq!(reg.session_id, format!("0x{:0>64}", "abc"));
        assert_eq!(reg.contract_ids[0], format!("0x{:0>64}", "1"));
    }

    #[tokio::test]
    async fn test_sign_builds_request() {
        let reg = SessionRegistration::new(4, 1_000, &id("aa"), &id("bb"), &[id("01")]).unwrap();
        let expected = reg.canonical_bytes().unwrap();

        let mut owner = MockOwnerSigner::new();
        owner
            .expect_sign_message()
            .withf(move |msg: &[u8]| msg == expected.as_slice())
            .times(1)
            .returning(|_| Ok("0xsig".to_string()));

        let request = reg.sign(&owner).await.unwrap();
        assert_eq!(request.nonce, "4");
        assert_eq!(request.expiry, "1000");
        assert_eq!(request.contract_id, id("bb"));
        assert_eq!(request.signature, Signature::Secp256k1("0xsig".to_string()));
    }
}
