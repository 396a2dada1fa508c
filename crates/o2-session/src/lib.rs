//! Delegated session keys for the O2 trading agent.
//!
//! - `SessionKeyManager`: creates, restores, deactivates and deletes sessions
//! - `SessionSigner`: per-session secp256k1 key that signs action batches
//! - `OwnerSigner`: the owner wallet that authorizes a session
//! - `KeyCipher`: PBKDF2 + AES-256-GCM encryption of keys at rest
//! - `NonceCounter`: monotonic trade account nonce

pub mod encryption;
pub mod error;
pub mod manager;
pub mod nonce;
pub mod owner;
pub mod registration;
pub mod signer;

pub use encryption::{DecryptedKey, EncryptedKey, KeyCipher, MIN_PBKDF2_ITERATIONS};
pub use error::{SessionError, SessionResult};
pub use manager::{SessionKeyManager, SessionSettings, DEFAULT_SESSION_EXPIRY_MS};
pub use nonce::NonceCounter;
pub use owner::{DynOwner, LocalOwnerSigner, OwnerSigner};
pub use registration::SessionRegistration;
pub use signer::{action_digest, session_id_for, signature_hex, SessionSigner};
