//! O2 DEX trading agent - Entry Point

use anyhow::{Context, Result};
use clap::Parser;
use o2_bot::config::DEFAULT_CONFIG_PATH;
use o2_bot::{AppConfig, Application};
use o2_session::LocalOwnerSigner;
use std::sync::Arc;
use tracing::info;
use zeroize::Zeroizing;

/// O2 DEX trading agent
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// Configuration file path (can also be set via O2_CONFIG env var)
    #[arg(short, long)]
    config: Option<String>,

    /// Invitation code to redeem if the owner is not yet eligible
    #[arg(long)]
    invite: Option<String>,

    /// Accept the terms of use on behalf of the owner
    #[arg(long)]
    accept_terms: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    o2_telemetry::init_logging()?;

    info!("Starting O2 agent v{}", env!("CARGO_PKG_VERSION"));

    // CLI arg > O2_CONFIG env var > default
    let config_path = args
        .config
        .or_else(|| std::env::var("O2_CONFIG").ok())
        .unwrap_or_else(|| DEFAULT_CONFIG_PATH.to_string());

    info!(config_path = %config_path, "Loading configuration");

    let mut config = AppConfig::load(&config_path)?;
    if args.invite.is_some() {
        config.auth.invite_code = args.invite;
    }
    info!(
        base_url = %config.venue.base_url,
        strategies = config.strategies.len(),
        "Configuration loaded"
    );

    let key_env = config.wallet.private_key_env.clone();
    let key = Zeroizing::new(
        std::env::var(&key_env).with_context(|| format!("owner key not set in {key_env}"))?,
    );
    let wallet = LocalOwnerSigner::from_hex(
        key.as_str(),
        config.wallet.kind,
        config.wallet.address.as_deref(),
    )?;

    let app = Application::new(config)?;
    app.run(Arc::new(wallet), args.accept_terms).await?;

    Ok(())
}
