//! Session key signing.
//!
//! A session key is a fresh secp256k1 key that the owner authorizes once.
//! Afterwards it signs every action batch on the owner's behalf.
//!
//! Security notes:
//! - The raw key never leaves this module except as [`Zeroizing`] bytes for
//!   encryption.
//! - Never log private key material or signatures.

use crate::error::{SessionError, SessionResult};
use alloy::primitives::{keccak256, Address, PrimitiveSignature, B256};
use alloy::signers::local::PrivateKeySigner;
use alloy::signers::Signer as AlloySigner;
use o2_venue::{Identity, MarketActions, Signature};
use zeroize::Zeroizing;

/// Hex-encode a 65-byte recoverable signature.
pub fn signature_hex(signature: &PrimitiveSignature) -> String {
    format!("0x{}", hex::encode(signature.as_bytes()))
}

/// Left-pad a 20-byte signer address to the b256 session id.
pub fn session_id_for(address: Address) -> String {
    format!("0x{:0>64}", hex::encode(address.as_slice()))
}

/// Digest signed for an action batch:
/// `keccak256(nonce_be || count_be || msgpack(actions))`.
///
/// # Errors
/// Returns `SessionError::Signing` if the actions cannot be encoded.
pub fn action_digest(nonce: u64, actions: &[MarketActions]) -> SessionResult<B256> {
    let encoded = rmp_serde::to_vec_named(actions)
        .map_err(|e| SessionError::Signing(format!("action encoding failed: {e}")))?;

    let mut data = Vec::with_capacity(16 + encoded.len());
    data.extend_from_slice(&nonce.to_be_bytes());
    data.extend_from_slice(&(actions.len() as u64).to_be_bytes());
    data.extend_from_slice(&encoded);
    Ok(keccak256(&data))
}

/// Signer for one delegated session.
pub struct SessionSigner {
    signer: PrivateKeySigner,
    session_id: String,
}

impl SessionSigner {
    /// Generate a brand-new session key.
    pub fn generate() -> Self {
        Self::from_signer(PrivateKeySigner::random())
    }

    /// Restore a session key from raw secret bytes.
    ///
    /// # Errors
    /// Returns `SessionError::InvalidKey` if the bytes are not a valid scalar.
    pub fn from_bytes(secret: &[u8]) -> SessionResult<Self> {
        let signer = PrivateKeySigner::from_slice(secret)
            .map_err(|e| SessionError::InvalidKey(e.to_string()))?;
        Ok(Self::from_signer(signer))
    }

    fn from_signer(signer: PrivateKeySigner) -> Self {
        let session_id = session_id_for(signer.address());
        Self { signer, session_id }
    }

    /// Session id (signer address as b256).
    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn identity(&self) -> Identity {
        Identity::Address(self.session_id.clone())
    }

    pub fn address(&self) -> Address {
        self.signer.address()
    }

    /// Raw secret, for encryption at rest only.
    pub fn secret_bytes(&self) -> Zeroizing<Vec<u8>> {
        Zeroizing::new(self.signer.to_bytes().to_vec())
    }

    pub async fn sign_digest(&self, digest: &B256) -> SessionResult<Signature> {
        let signature = self
            .signer
            .sign_hash(digest)
            .await
            .map_err(|e| SessionError::Signing(e.to_string()))?;
        Ok(Signature::Secp256k1(signature_hex(&signature)))
    }

    /// Sign an action batch for submission with `nonce`.
    pub async fn sign_actions(
        &self,
        nonce: u64,
        actions: &[MarketActions],
    ) -> SessionResult<Signature> {
        let digest = action_digest(nonce, actions)?;
        self.sign_digest(&digest).await
    }
}

impl std::fmt::Debug for SessionSigner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionSigner")
            .field("session_id", &self.session_id)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use o2_core::{OrderSide, OrderType};
    use o2_venue::SessionAction;

    // Well-known test private key (DO NOT use in production)
    const TEST_PRIVATE_KEY: &str =
        "0x4c0883a69102937d6231471b5dbb6204fe5129617082792ae468d01a3f362318";

    fn test_signer() -> SessionSigner {
        let bytes = hex::decode(TEST_PRIVATE_KEY.trim_start_matches("0x")).unwrap();
        SessionSigner::from_bytes(&bytes).unwrap()
    }

    fn actions() -> Vec<MarketActions> {
        vec![MarketActions {
            market_id: "0xmarket".to_string(),
            actions: vec![SessionAction::CreateOrder {
                side: OrderSide::Buy,
                order_type: OrderType::Spot,
                price: "1500000".to_string(),
                quantity: "66000000000".to_string(),
            }],
        }]
    }

    #[test]
    fn test_generated_keys_are_unique() {
        let a = SessionSigner::generate();
        let b = SessionSigner::generate();
        assert_ne!(a.session_id(), b.session_id());
    }

    #[test]
    fn test_session_id_is_padded_address() {
        let signer = test_signer();
        let id = signer.session_id();
        assert_eq!(id.len(), 66);
        assert!(id.starts_with("0x000000000000000000000000"));
        assert!(id.ends_with(&hex::encode(signer.address().as_slice())));
    }

    #[test]
    fn test_secret_round_trips_to_same_signer() {
        let signer = SessionSigner::generate();
        let restored = SessionSigner::from_bytes(&signer.secret_bytes()).unwrap();
        assert_eq!(restored.address(), signer.address());
    }

    #[test]
    fn test_invalid_secret_rejected() {
        assert!(matches!(
            SessionSigner::from_bytes(&[0u8; 32]),
            Err(SessionError::InvalidKey(_))
        ));
    }

    #[test]
    fn test_action_digest_depends_on_nonce() {
        let a = action_digest(1, &actions()).unwrap();
        let b = action_digest(2, &actions()).unwrap();
        assert_ne!(a, b);
        assert_eq!(a, action_digest(1, &actions()).unwrap());
    }

    #[tokio::test]
    async fn test_signature_recovers_session_address() {
        let signer = test_signer();
        let digest = action_digest(5, &actions()).unwrap();
        let raw = signer.signer.sign_hash(&digest).await.unwrap();
        assert_eq!(
            raw.recover_address_from_prehash(&digest).unwrap(),
            signer.address()
        );

        let Signature::Secp256k1(hex_sig) = signer.sign_actions(5, &actions()).await.unwrap();
        assert_eq!(hex_sig.len(), 2 + 65 * 2);
    }
}
