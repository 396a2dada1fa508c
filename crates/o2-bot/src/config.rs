//! Application configuration.
//!
//! Loaded from a TOML file and overlaid with `O2__SECTION__KEY` environment
//! variables. Secrets are never stored in the file; the file names the
//! environment variables that hold them.

use crate::error::{AppError, AppResult};
use config::{Config, Environment, File};
use o2_core::{AddressKind, StrategyConfig};
use o2_engine::EngineSettings;
use o2_session::{SessionSettings, MIN_PBKDF2_ITERATIONS};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Default config file, relative to the working directory.
pub const DEFAULT_CONFIG_PATH: &str = "config/default.toml";

const DAY_MS: u64 = 24 * 60 * 60 * 1000;

// ============================================================================
// Sections
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VenueConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_base_url() -> String {
    o2_venue::DEFAULT_BASE_URL.to_string()
}

fn default_timeout_secs() -> u64 {
    30
}

impl Default for VenueConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

/// Fuel node used for the on-chain whitelist lookup.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChainConfig {
    #[serde(default = "default_provider_url")]
    pub provider_url: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_provider_url() -> String {
    o2_auth::DEFAULT_PROVIDER_URL.to_string()
}

impl Default for ChainConfig {
    fn default() -> Self {
        Self {
            provider_url: default_provider_url(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Directory for the JSON store. Unset keeps everything in memory.
    #[serde(default)]
    pub data_dir: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Environment variable holding the key encryption password.
    #[serde(default = "default_password_env")]
    pub password_env: String,
    #[serde(default = "default_expiry_days")]
    pub expiry_days: u64,
    #[serde(default = "default_pbkdf2_iterations")]
    pub pbkdf2_iterations: u32,
}

fn default_password_env() -> String {
    "O2_SESSION_PASSWORD".to_string()
}

fn default_expiry_days() -> u64 {
    30
}

fn default_pbkdf2_iterations() -> u32 {
    MIN_PBKDF2_ITERATIONS
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            password_env: default_password_env(),
            expiry_days: default_expiry_days(),
            pbkdf2_iterations: default_pbkdf2_iterations(),
        }
    }
}

impl SessionConfig {
    pub fn settings(&self) -> SessionSettings {
        SessionSettings {
            expiry_ms: self.expiry_days.saturating_mul(DAY_MS),
            pbkdf2_iterations: self.pbkdf2_iterations,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    /// Use a locally stored trading account without asking the venue.
    #[serde(default = "default_trust_cached_account")]
    pub trust_cached_account: bool,
    #[serde(default)]
    pub invite_code: Option<String>,
}

fn default_trust_cached_account() -> bool {
    true
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            trust_cached_account: default_trust_cached_account(),
            invite_code: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WalletConfig {
    /// Environment variable holding the owner private key (hex).
    #[serde(default = "default_private_key_env")]
    pub private_key_env: String,
    #[serde(default = "default_wallet_kind")]
    pub kind: AddressKind,
    /// Owner address; required for native wallets.
    #[serde(default)]
    pub address: Option<String>,
}

fn default_private_key_env() -> String {
    "O2_OWNER_KEY".to_string()
}

fn default_wallet_kind() -> AddressKind {
    AddressKind::Ethereum
}

impl Default for WalletConfig {
    fn default() -> Self {
        Self {
            private_key_env: default_private_key_env(),
            kind: default_wallet_kind(),
            address: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    #[serde(default = "default_lock_backoff_ms")]
    pub lock_backoff_ms: u64,
    #[serde(default = "default_error_backoff_ms")]
    pub error_backoff_ms: u64,
    #[serde(default = "default_fill_poll_interval_ms")]
    pub fill_poll_interval_ms: u64,
    #[serde(default = "default_balance_cache_ttl_ms")]
    pub balance_cache_ttl_ms: u64,
}

fn default_lock_backoff_ms() -> u64 {
    EngineSettings::default().lock_backoff_ms
}

fn default_error_backoff_ms() -> u64 {
    EngineSettings::default().error_backoff_ms
}

fn default_fill_poll_interval_ms() -> u64 {
    EngineSettings::default().fill_poll_interval_ms
}

fn default_balance_cache_ttl_ms() -> u64 {
    o2_venue::DEFAULT_BALANCE_TTL_MS
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            lock_backoff_ms: default_lock_backoff_ms(),
            error_backoff_ms: default_error_backoff_ms(),
            fill_poll_interval_ms: default_fill_poll_interval_ms(),
            balance_cache_ttl_ms: default_balance_cache_ttl_ms(),
        }
    }
}

impl EngineConfig {
    pub fn settings(&self) -> EngineSettings {
        EngineSettings {
            lock_backoff_ms: self.lock_backoff_ms,
            error_backoff_ms: self.error_backoff_ms,
            fill_poll_interval_ms: self.fill_poll_interval_ms,
        }
    }
}

// ============================================================================
// AppConfig
// ============================================================================

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub venue: VenueConfig,
    #[serde(default)]
    pub chain: ChainConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub session: SessionConfig,
    #[serde(default)]
    pub auth: AuthConfig,
    #[serde(default)]
    pub wallet: WalletConfig,
    #[serde(default)]
    pub engine: EngineConfig,
    /// Strategy configs stored as active on first run. A market that
    /// already has a stored config keeps it.
    #[serde(default)]
    pub strategies: Vec<StrategyConfig>,
}

impl AppConfig {
    /// Load `path` (optional if missing) and apply `O2__` overrides.
    pub fn load(path: impl AsRef<Path>) -> AppResult<Self> {
        let path = path.as_ref();
        let config = Config::builder()
            .add_source(File::from(path).required(false))
            .add_source(
                Environment::with_prefix("O2")
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .map_err(|e| AppError::Config(format!("Failed to read config: {e}")))?;

        let config: Self = config
            .try_deserialize()
            .map_err(|e| AppError::Config(format!("Failed to parse config: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> AppResult<()> {
        if self.session.pbkdf2_iterations < MIN_PBKDF2_ITERATIONS {
            return Err(AppError::Config(format!(
                "session.pbkdf2_iterations must be at least {MIN_PBKDF2_ITERATIONS}"
            )));
        }
        if self.session.expiry_days == 0 {
            return Err(AppError::Config("session.expiry_days must be positive".to_string()));
        }
        if self.wallet.kind == AddressKind::Fuel && self.wallet.address.is_none() {
            return Err(AppError::Config(
                "wallet.address is required for fuel wallets".to_string(),
            ));
        }
        for strategy in &self.strategies {
            if strategy.market_id.trim().is_empty() {
                return Err(AppError::Config("strategy with empty market_id".to_string()));
            }
        }
        Ok(())
    }

    pub fn venue_timeout(&self) -> Duration {
        Duration::from_secs(self.venue.timeout_secs)
    }

    pub fn chain_timeout(&self) -> Duration {
        Duration::from_secs(self.chain.timeout_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use o2_core::StrategyKind;
    use rust_decimal_macros::dec;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = AppConfig::default();
        assert_eq!(config.venue.timeout_secs, 30);
        assert!(config.auth.trust_cached_account);
        assert_eq!(config.session.pbkdf2_iterations, 100_000);
        assert_eq!(config.session.settings().expiry_ms, 30 * DAY_MS);
        assert_eq!(config.engine.settings(), EngineSettings::default());
        assert_eq!(config.engine.balance_cache_ttl_ms, 5_000);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_missing_file_uses_defaults() {
        let config = AppConfig::load("/nonexistent/o2.toml").unwrap();
        assert_eq!(config.venue.base_url, o2_venue::DEFAULT_BASE_URL);
        assert!(config.strategies.is_empty());
    }

    #[test]
    fn test_load_file_with_strategies() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        write!(
            file,
            r#"
[venue]
base_url = "http://localhost:9000"

[auth]
trust_cached_account = false
invite_code = "FRIEND"

[engine]
lock_backoff_ms = 1000

[[strategies]]
market_id = "0xmarket"

[strategies.strategy]
type = "BalanceThreshold"
base_threshold = "250"

[strategies.order_management]
track_fill_prices = true
"#
        )
        .unwrap();

        let config = AppConfig::load(file.path()).unwrap();
        assert_eq!(config.venue.base_url, "http://localhost:9000");
        assert!(!config.auth.trust_cached_account);
        assert_eq!(config.auth.invite_code.as_deref(), Some("FRIEND"));
        assert_eq!(config.engine.lock_backoff_ms, 1000);
        assert_eq!(config.engine.error_backoff_ms, 10_000);

        let strategy = &config.strategies[0];
        assert!(strategy.order_management.track_fill_prices);
        match &strategy.strategy {
            StrategyKind::BalanceThreshold(params) => {
                assert_eq!(params.base_threshold, dec!(250));
                assert_eq!(params.quote_threshold, dec!(100));
            }
            other => panic!("unexpected strategy {other:?}"),
        }
    }

    #[test]
    fn test_weak_pbkdf2_rejected() {
        let mut config = AppConfig::default();
        config.session.pbkdf2_iterations = 1_000;
        assert!(matches!(config.validate(), Err(AppError::Config(_))));
    }

    #[test]
    fn test_fuel_wallet_needs_address() {
        let mut config = AppConfig::default();
        config.wallet.kind = AddressKind::Fuel;
        assert!(config.validate().is_err());
        config.wallet.address = Some(format!("0x{}", "ab".repeat(32)));
        assert!(config.validate().is_ok());
    }
}
