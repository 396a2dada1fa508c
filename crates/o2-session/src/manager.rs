//! Session key manager.
//!
//! Creates delegated sessions for a trading account and keeps their keys
//! encrypted in the durable store. The password lives only in memory; every
//! operation that touches key material fails with `PasswordNotSet` until
//! [`SessionKeyManager::set_password`] has been called.

use crate::encryption::{EncryptedKey, KeyCipher, MIN_PBKDF2_ITERATIONS};
use crate::error::{SessionError, SessionResult};
use crate::owner::OwnerSigner;
use crate::registration::SessionRegistration;
use crate::signer::SessionSigner;
use dashmap::DashMap;
use o2_core::{DynClock, OwnerAddress, Session, SessionKeyRecord, TradingAccount};
use o2_store::DynStore;
use o2_venue::DynVenue;
use parking_lot::RwLock;
use tracing::{debug, info, warn};
use zeroize::Zeroizing;

/// Default session lifetime: 30 days.
pub const DEFAULT_SESSION_EXPIRY_MS: u64 = 30 * 24 * 60 * 60 * 1000;

#[derive(Debug, Clone, Copy)]
pub struct SessionSettings {
    pub expiry_ms: u64,
    pub pbkdf2_iterations: u32,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            expiry_ms: DEFAULT_SESSION_EXPIRY_MS,
            pbkdf2_iterations: MIN_PBKDF2_ITERATIONS,
        }
    }
}

pub struct SessionKeyManager {
    venue: DynVenue,
    store: DynStore,
    clock: DynClock,
    settings: SessionSettings,
    password: RwLock<Option<Zeroizing<String>>>,
    /// Latest session per trade account id.
    cache: DashMap<String, Session>,
}

impl SessionKeyManager {
    pub fn new(
        venue: DynVenue,
        store: DynStore,
        clock: DynClock,
        settings: SessionSettings,
    ) -> Self {
        Self {
            venue,
            store,
            clock,
            settings,
            password: RwLock::new(None),
            cache: DashMap::new(),
        }
    }

    pub fn set_password(&self, password: impl Into<String>) {
        *self.password.write() = Some(Zeroizing::new(password.into()));
    }

    pub fn has_password(&self) -> bool {
        self.password.read().is_some()
    }

    fn cipher(&self) -> SessionResult<KeyCipher> {
        let password = self
            .password
            .read()
            .clone()
            .ok_or(SessionError::PasswordNotSet)?;
        Ok(KeyCipher::new(password, self.settings.pbkdf2_iterations))
    }

    /// Create and register a new session for `account`.
    ///
    /// Steps: fetch the venue nonce, have the owner sign the registration,
    /// register it, bump the stored account nonce, then persist the encrypted
    /// key and the session row. A failed nonce update is logged only; every
    /// other failure aborts.
    ///
    /// # Errors
    /// `PasswordNotSet`, `EmptyContractSet`, `SignatureDeclined`, venue or
    /// store errors.
    pub async fn create_session(
        &self,
        owner: &dyn OwnerSigner,
        account: &TradingAccount,
        contract_ids: &[String],
        expiry: Option<u64>,
    ) -> SessionResult<Session> {
        let cipher = self.cipher()?;
        if contract_ids.is_empty() {
            return Err(SessionError::EmptyContractSet);
        }
        let owner_address = account.owner_address.clone();

        let key = SessionSigner::generate();
        let nonce = self
            .venue
            .get_account(&account.id, &owner_address)
            .await?
            .nonce;
        let expiry = expiry.unwrap_or_else(|| self.clock.now_ms() + self.settings.expiry_ms);

        let registration =
            SessionRegistration::new(nonce, expiry, key.session_id(), &account.id, contract_ids)?;
        let request = registration.sign(owner).await?;
        self.venue.create_session(&request, &owner_address).await?;
        info!(
            session_id = %key.session_id(),
            trade_account_id = %account.id,
            contracts = contract_ids.len(),
            "Session registered"
        );

        let updated = TradingAccount {
            nonce: nonce + 1,
            ..account.clone()
        };
        if let Err(e) = self.store.put_trading_account(&updated) {
            warn!(error = %e, trade_account_id = %account.id, "Failed to persist account nonce");
        }

        let now = self.clock.now_ms();
        let address = format!("0x{}", hex::encode(key.address()));
        let encrypted = cipher.encrypt_blocking(key.secret_bytes(), address).await?;
        self.store.put_session_key(&SessionKeyRecord {
            id: key.session_id().to_string(),
            encrypted_private_key: encrypted.ciphertext,
            salt: encrypted.salt,
            iv: encrypted.iv,
            created_at: now,
        })?;

        let session = Session {
            id: key.session_id().to_string(),
            trade_account_id: account.id.clone(),
            owner_address,
            contract_ids: contract_ids.to_vec(),
            expiry,
            created_at: now,
            is_active: true,
        };
        self.store.put_session(&session)?;
        self.cache.insert(account.id.clone(), session.clone());
        Ok(session)
    }

    pub fn get_session(&self, session_id: &str) -> SessionResult<Option<Session>> {
        Ok(self.store.get_session(session_id)?)
    }

    /// Most recently created live session for `owner`.
    pub fn get_active_session(&self, owner: &OwnerAddress) -> SessionResult<Option<Session>> {
        let now = self.clock.now_ms();
        let session = self
            .store
            .sessions_by_owner(owner)?
            .into_iter()
            .filter(|s| s.is_live(now))
            .max_by_key(|s| s.created_at);
        if let Some(s) = &session {
            self.cache.insert(s.trade_account_id.clone(), s.clone());
        }
        Ok(session)
    }

    pub fn has_active_session(&self, owner: &OwnerAddress) -> SessionResult<bool> {
        Ok(self.get_active_session(owner)?.is_some())
    }

    /// Cached session for a trade account, if still live.
    pub fn cached_session(&self, trade_account_id: &str) -> Option<Session> {
        let now = self.clock.now_ms();
        self.cache
            .get(trade_account_id)
            .map(|s| s.clone())
            .filter(|s| s.is_live(now))
    }

    /// Decrypt the signing key of `session_id`.
    ///
    /// # Errors
    /// `PasswordNotSet` before anything is read; `EncryptionFailure` for a
    /// wrong password or a key that does not belong to the session.
    pub async fn get_session_key(&self, session_id: &str) -> SessionResult<Option<SessionSigner>> {
        let cipher = self.cipher()?;
        let Some(record) = self.store.get_session_key(session_id)? else {
            return Ok(None);
        };
        let decrypted = cipher
            .decrypt_blocking(EncryptedKey {
                ciphertext: record.encrypted_private_key,
                salt: record.salt,
                iv: record.iv,
            })
            .await?;
        let signer = SessionSigner::from_bytes(&decrypted.private_key)?;
        if signer.session_id() != session_id {
            return Err(SessionError::EncryptionFailure(format!(
                "stored key does not belong to session {session_id}"
            )));
        }
        Ok(Some(signer))
    }

    /// Signer for the active session of `owner`.
    pub async fn active_signer(
        &self,
        owner: &OwnerAddress,
    ) -> SessionResult<(Session, SessionSigner)> {
        let session = self
            .get_active_session(owner)?
            .ok_or(SessionError::NoActiveSession)?;
        let signer = self
            .get_session_key(&session.id)
            .await?
            .ok_or(SessionError::NoActiveSession)?;
        Ok((session, signer))
    }

    /// Mark a session inactive. Returns false if it does not exist.
    pub fn deactivate_session(&self, session_id: &str) -> SessionResult<bool> {
        let Some(mut session) = self.store.get_session(session_id)? else {
            return Ok(false);
        };
        session.is_active = false;
        self.store.put_session(&session)?;
        self.cache.remove_if(&session.trade_account_id, |_, s| s.id == session_id);
        debug!(session_id, "Session deactivated");
        Ok(true)
    }

    /// Delete a session together with its key.
    pub fn delete_session(&self, session_id: &str) -> SessionResult<()> {
        if let Some(session) = self.store.get_session(session_id)? {
            self.cache.remove_if(&session.trade_account_id, |_, s| s.id == session_id);
        }
        self.store.delete_session_key(session_id)?;
        self.store.delete_session(session_id)?;
        debug!(session_id, "Session deleted");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::owner::{LocalOwnerSigner, MockOwnerSigner};
    use o2_core::{AddressKind, ManualClock};
    use o2_store::{DurableStore, LocalStore};
    use o2_venue::mock::MockVenue;
    use o2_venue::{VenueApi, VenueError};
    use std::sync::Arc;

    const OWNER_KEY: &str = "0x4c0883a69102937d6231471b5dbb6204fe5129617082792ae468d01a3f362318";

    struct Fixture {
        venue: Arc<MockVenue>,
        store: Arc<LocalStore>,
        clock: Arc<ManualClock>,
        manager: SessionKeyManager,
        owner: LocalOwnerSigner,
        account: TradingAccount,
    }

    async fn fixture() -> Fixture {
        let venue = Arc::new(MockVenue::new());
        let store = Arc::new(LocalStore::in_memory());
        let clock = Arc::new(ManualClock::new(1_000_000));
        let owner = LocalOwnerSigner::from_hex(OWNER_KEY, AddressKind::Ethereum, None).unwrap();
        let id = venue.create_account(&owner.address()).await.unwrap();
        let account = TradingAccount {
            id,
            owner_address: owner.address(),
            nonce: 0,
            created_at: 0,
        };
        store.put_trading_account(&account).unwrap();
        let manager = SessionKeyManager::new(
            venue.clone(),
            store.clone(),
            clock.clone(),
            SessionSettings::default(),
        );
        Fixture {
            venue,
            store,
            clock,
            manager,
            owner,
            account,
        }
    }

    fn contracts() -> Vec<String> {
        vec![format!("0x{}", "0b".repeat(32))]
    }

    #[tokio::test]
    async fn test_password_required_before_anything_happens() {
        let f = fixture().await;
        let err = f
            .manager
            .create_session(&f.owner, &f.account, &contracts(), None)
            .await
            .unwrap_err();
        assert!(matches!(err, SessionError::PasswordNotSet));
        assert_eq!(f.venue.call_count("create_session"), 0);
        assert!(matches!(
            f.manager.get_session_key("0x1").await,
            Err(SessionError::PasswordNotSet)
        ));
    }

    #[tokio::test]
    async fn test_create_session_persists_everything() {
        let f = fixture().await;
        f.manager.set_password("pw");

        let session = f
            .manager
            .create_session(&f.owner, &f.account, &contracts(), None)
            .await
            .unwrap();

        assert!(session.is_active);
        assert_eq!(session.expiry, 1_000_000 + DEFAULT_SESSION_EXPIRY_MS);
        assert_eq!(f.venue.account_nonce(&f.account.id), Some(1));
        assert_eq!(
            f.store.get_trading_account(&f.account.id).unwrap().unwrap().nonce,
            1
        );

        let record = f.store.get_session_key(&session.id).unwrap().unwrap();
        assert_eq!(record.id, session.id);

        let signer = f.manager.get_session_key(&session.id).await.unwrap().unwrap();
        assert_eq!(signer.session_id(), session.id);
        assert_eq!(f.manager.cached_session(&f.account.id), Some(session.clone()));

        let sessions = f.venue.sessions();
        let sent = &sessions[0];
        assert_eq!(sent.nonce, "0");
        assert_eq!(sent.contract_id, f.account.id);
    }

    #[tokio::test]
    async fn test_empty_contract_set_fails_fast() {
        let f = fixture().await;
        f.manager.set_password("pw");
        let err = f
            .manager
            .create_session(&f.owner, &f.account, &[], None)
            .await
            .unwrap_err();
        assert!(matches!(err, SessionError::EmptyContractSet));
        assert_eq!(f.venue.call_count("get_account"), 0);
    }

    #[tokio::test]
    async fn test_declined_signature_is_distinct() {
        let f = fixture().await;
        f.manager.set_password("pw");
        let mut owner = MockOwnerSigner::new();
        owner
            .expect_sign_message()
            .returning(|_| Err(SessionError::SignatureDeclined("User rejected".to_string())));

        let err = f
            .manager
            .create_session(&owner, &f.account, &contracts(), None)
            .await
            .unwrap_err();
        assert!(err.is_declined());
        assert_eq!(f.venue.call_count("create_session"), 0);
        assert!(f.manager.get_active_session(&f.account.owner_address).unwrap().is_none());
    }

    #[tokio::test]
    async fn test_venue_rejection_stores_nothing() {
        let f = fixture().await;
        f.manager.set_password("pw");
        f.venue.fail_session_creation(Some(VenueError::Rejected {
            status: 400,
            message: "bad session".to_string(),
        }));
        let err = f
            .manager
            .create_session(&f.owner, &f.account, &contracts(), None)
            .await
            .unwrap_err();
        assert!(matches!(err, SessionError::Venue(VenueError::Rejected { .. })));
        assert!(f.store.sessions_by_owner(&f.account.owner_address).unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_active_session_is_newest_live() {
        let f = fixture().await;
        f.manager.set_password("pw");
        let first = f
            .manager
            .create_session(&f.owner, &f.account, &contracts(), None)
            .await
            .unwrap();
        f.clock.advance(10);
        let second = f
            .manager
            .create_session(&f.owner, &f.account, &contracts(), Some(1_000_000 + 20))
            .await
            .unwrap();

        let active = f.manager.get_active_session(&f.account.owner_address).unwrap();
        assert_eq!(active.unwrap().id, second.id);

        f.clock.advance(100);
        let active = f.manager.get_active_session(&f.account.owner_address).unwrap();
        assert_eq!(active.unwrap().id, first.id);

        assert!(f.manager.deactivate_session(&first.id).unwrap());
        assert!(!f.manager.has_active_session(&f.account.owner_address).unwrap());
    }

    #[tokio::test]
    async fn test_delete_removes_session_and_key() {
        let f = fixture().await;
        f.manager.set_password("pw");
        let session = f
            .manager
            .create_session(&f.owner, &f.account, &contracts(), None)
            .await
            .unwrap();

        f.manager.delete_session(&session.id).unwrap();
        assert!(f.manager.get_session(&session.id).unwrap().is_none());
        assert!(f.store.get_session_key(&session.id).unwrap().is_none());
        assert!(f.manager.cached_session(&f.account.id).is_none());
    }

    #[tokio::test]
    async fn test_wrong_password_cannot_decrypt() {
        let f = fixture().await;
        f.manager.set_password("pw");
        let session = f
            .manager
            .create_session(&f.owner, &f.account, &contracts(), None)
            .await
            .unwrap();

        f.manager.set_password("other");
        assert!(matches!(
            f.manager.get_session_key(&session.id).await,
            Err(SessionError::EncryptionFailure(_))
        ));
    }
}
