//! Owner wallet signing.
//!
//! The owner wallet authorizes a session key by signing its registration.
//! Two schemes are supported: native wallets sign the SHA-256 digest of the
//! message, Ethereum wallets sign it as an EIP-191 personal message.

use crate::error::{SessionError, SessionResult};
use crate::signer::signature_hex;
use alloy::primitives::B256;
use alloy::signers::local::PrivateKeySigner;
use alloy::signers::Signer as AlloySigner;
use async_trait::async_trait;
use o2_core::{AddressKind, OwnerAddress};
use sha2::{Digest, Sha256};
use std::sync::Arc;

#[cfg(test)]
use mockall::automock;

/// The connected owner wallet.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait OwnerSigner: Send + Sync {
    /// Normalized wallet address.
    fn address(&self) -> OwnerAddress;

    /// Sign `message`, returning a `0x`-prefixed 65-byte signature.
    ///
    /// # Errors
    /// `SignatureDeclined` when the user rejects the prompt.
    async fn sign_message(&self, message: &[u8]) -> SessionResult<String>;
}

/// Shared owner handle.
pub type DynOwner = Arc<dyn OwnerSigner>;

/// Owner wallet backed by a local private key.
pub struct LocalOwnerSigner {
    signer: PrivateKeySigner,
    address: OwnerAddress,
}

impl LocalOwnerSigner {
    /// Ethereum wallet; the address is derived from the key.
    pub fn ethereum(signer: PrivateKeySigner) -> SessionResult<Self> {
        let address = OwnerAddress::parse(&format!("0x{}", hex::encode(signer.address())))?;
        Ok(Self { signer, address })
    }

    /// Native wallet at `address`.
    pub fn native(signer: PrivateKeySigner, address: OwnerAddress) -> Self {
        Self { signer, address }
    }

    /// Load a key from hex. Ethereum keys derive their address; native keys
    /// need it supplied.
    pub fn from_hex(
        key_hex: &str,
        kind: AddressKind,
        address: Option<&str>,
    ) -> SessionResult<Self> {
        let signer: PrivateKeySigner = key_hex
            .trim()
            .parse()
            .map_err(|e| SessionError::InvalidKey(format!("owner key: {e}")))?;
        match kind {
            AddressKind::Ethereum => Self::ethereum(signer),
            AddressKind::Fuel => {
                let raw = address.ok_or(SessionError::NoWalletConnected)?;
                Ok(Self::native(signer, OwnerAddress::parse(raw)?))
            }
        }
    }
}

#[async_trait]
impl OwnerSigner for LocalOwnerSigner {
    fn address(&self) -> OwnerAddress {
        self.address.clone()
    }

    async fn sign_message(&self, message: &[u8]) -> SessionResult<String> {
        let signature = match self.address.kind() {
            AddressKind::Ethereum => self.signer.sign_message(message).await,
            AddressKind::Fuel => {
                let digest = B256::from_slice(&Sha256::digest(message));
                self.signer.sign_hash(&digest).await
            }
        }
        .map_err(|e| SessionError::from_wallet_message(e.to_string()))?;
        Ok(signature_hex(&signature))
    }
}
