//! Password-based encryption of session private keys.
//!
//! The key is derived with PBKDF2-HMAC-SHA256 from the in-process password
//! and a per-record random salt, then used for AES-256-GCM with a random
//! 96-bit IV. Salt, IV and ciphertext are stored base64-encoded. Async
//! callers go through the `*_blocking` variants, which derive the key on
//! tokio's blocking pool.

use crate::error::{SessionError, SessionResult};
use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::{Aes256Gcm, Nonce};
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use zeroize::Zeroizing;

/// Lowest accepted PBKDF2 iteration count.
pub const MIN_PBKDF2_ITERATIONS: u32 = 100_000;

const SALT_LEN: usize = 16;
const IV_LEN: usize = 12;
const KEY_LEN: usize = 32;

/// Encrypted payload, all fields base64.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncryptedKey {
    pub ciphertext: String,
    pub salt: String,
    pub iv: String,
}

/// Plaintext layout of an encrypted session key.
#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct KeyPayload {
    private_key: String,
    address: String,
}

/// Decrypted session key material.
pub struct DecryptedKey {
    pub private_key: Zeroizing<Vec<u8>>,
    pub address: String,
}

impl std::fmt::Debug for DecryptedKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DecryptedKey")
            .field("address", &self.address)
            .finish_non_exhaustive()
    }
}

/// Encrypts and decrypts session keys under one password.
#[derive(Clone)]
pub struct KeyCipher {
    password: Zeroizing<String>,
    iterations: u32,
}

impl KeyCipher {
    /// Iteration counts below [`MIN_PBKDF2_ITERATIONS`] are raised to it.
    pub fn new(password: Zeroizing<String>, iterations: u32) -> Self {
        Self {
            password,
            iterations: iterations.max(MIN_PBKDF2_ITERATIONS),
        }
    }

    pub fn iterations(&self) -> u32 {
        self.iterations
    }

    fn derive_key(&self, salt: &[u8]) -> Zeroizing<[u8; KEY_LEN]> {
        let mut key = Zeroizing::new([0u8; KEY_LEN]);
        pbkdf2::pbkdf2_hmac::<Sha256>(self.password.as_bytes(), salt, self.iterations, &mut *key);
        key
    }

    fn cipher(&self, salt: &[u8]) -> SessionResult<Aes256Gcm> {
        let key = self.derive_key(salt);
        Aes256Gcm::new_from_slice(&*key)
            .map_err(|e| SessionError::EncryptionFailure(format!("bad key length: {e}")))
    }

    /// Encrypt `private_key` together with its derived `address`.
    pub fn encrypt(&self, private_key: &[u8], address: &str) -> SessionResult<EncryptedKey> {
        let mut salt = [0u8; SALT_LEN];
        let mut iv = [0u8; IV_LEN];
        let mut rng = rand::thread_rng();
        rng.fill_bytes(&mut salt);
        rng.fill_bytes(&mut iv);

        let payload = Zeroizing::new(
            serde_json::to_vec(&KeyPayload {
                private_key: format!("0x{}", hex::encode(private_key)),
                address: address.to_string(),
            })
            .map_err(|e| SessionError::EncryptionFailure(e.to_string()))?,
        );

        let ciphertext = self
            .cipher(&salt)?
            .encrypt(Nonce::from_slice(&iv), payload.as_slice())
            .map_err(|_| SessionError::EncryptionFailure("AES-GCM encryption failed".to_string()))?;

        Ok(EncryptedKey {
            ciphertext: STANDARD.encode(ciphertext),
            salt: STANDARD.encode(salt),
            iv: STANDARD.encode(iv),
        })
    }

    /// [`encrypt`](Self::encrypt) on the blocking pool.
    pub async fn encrypt_blocking(
        &self,
        private_key: Zeroizing<Vec<u8>>,
        address: String,
    ) -> SessionResult<EncryptedKey> {
        let cipher = self.clone();
        tokio::task::spawn_blocking(move || cipher.encrypt(&private_key, &address))
            .await
            .map_err(join_failure)?
    }

    /// [`decrypt`](Self::decrypt) on the blocking pool.
    pub async fn decrypt_blocking(&self, encrypted: EncryptedKey) -> SessionResult<DecryptedKey> {
        let cipher = self.clone();
        tokio::task::spawn_blocking(move || cipher.decrypt(&encrypted))
            .await
            .map_err(join_failure)?
    }

    /// Decrypt a record produced by [`KeyCipher::encrypt`].
    ///
    /// # Errors
    /// `EncryptionFailure` for malformed base64, a wrong password or tampered
    /// ciphertext.
    pub fn decrypt(&self, encrypted: &EncryptedKey) -> SessionResult<DecryptedKey> {
        let decode = |field: &str, value: &str| {
            STANDARD
                .decode(value)
                .map_err(|e| SessionError::EncryptionFailure(format!("invalid {field}: {e}")))
        };
        let salt = decode("salt", &encrypted.salt)?;
        let iv = decode("iv", &encrypted.iv)?;
        let ciphertext = decode("ciphertext", &encrypted.ciphertext)?;
        if iv.len() != IV_LEN {
            return Err(SessionError::EncryptionFailure(format!(
                "invalid iv length {}",
                iv.len()
            )));
        }

        let plaintext = Zeroizing::new(
            self.cipher(&salt)?
                .decrypt(Nonce::from_slice(&iv), ciphertext.as_slice())
                .map_err(|_| {
                    SessionError::EncryptionFailure(
                        "decryption failed (wrong password or corrupted data)".to_string(),
                    )
                })?,
        );

        let payload: KeyPayload = serde_json::from_slice(&plaintext)
            .map_err(|e| SessionError::EncryptionFailure(format!("invalid payload: {e}")))?;
        let private_key = Zeroizing::new(
            hex::decode(payload.private_key.trim_start_matches("0x"))
                .map_err(|e| SessionError::EncryptionFailure(format!("invalid key hex: {e}")))?,
        );
        Ok(DecryptedKey {
            private_key,
            address: payload.address,
        })
    }
}

fn join_failure(e: tokio::task::JoinError) -> SessionError {
    SessionError::EncryptionFailure(format!("key derivation task failed: {e}"))
}
