//! Application wiring.
//!
//! Builds the venue client, store, session manager, auth flow and trading
//! engine from [`AppConfig`], authenticates one owner wallet and runs the
//! engine until Ctrl-C.

use crate::config::AppConfig;
use crate::error::{AppError, AppResult};
use o2_auth::{
    AuthFlow, AuthFlowState, DynWhitelist, EligibilityResolver, GraphqlWhitelist, TermsService,
    TradingAccountService,
};
use o2_core::{DynClock, OwnerAddress, StrategyConfigRecord, SystemClock};
use o2_engine::{SessionGateway, TradingEngine};
use o2_session::{DynOwner, SessionKeyManager};
use o2_store::{DynStore, LocalStore};
use o2_strategy::StrategyRegistry;
use o2_telemetry::Metrics;
use o2_venue::{BalanceCache, DynVenue, MarketCache, O2Client};
use std::sync::Arc;
use tracing::{debug, error, info, warn};
use zeroize::Zeroizing;

pub struct Application {
    config: AppConfig,
    venue: DynVenue,
    store: DynStore,
    clock: DynClock,
    markets: Arc<MarketCache>,
    sessions: Arc<SessionKeyManager>,
    auth: AuthFlow,
}

impl Application {
    /// Build every component from `config`.
    ///
    /// The session password is read from the environment variable named by
    /// `session.password_env`; without it no session key can be created or
    /// restored.
    pub fn new(config: AppConfig) -> AppResult<Self> {
        let venue: DynVenue = Arc::new(O2Client::with_timeout(
            config.venue.base_url.clone(),
            config.venue_timeout(),
        )?);
        let store: DynStore = match &config.storage.data_dir {
            Some(dir) => {
                info!(data_dir = %dir, "Opening local store");
                Arc::new(LocalStore::open(dir)?)
            }
            None => {
                warn!("No storage.data_dir configured, state will not survive restarts");
                Arc::new(LocalStore::in_memory())
            }
        };
        let whitelist: DynWhitelist = Arc::new(GraphqlWhitelist::new(
            config.chain.provider_url.clone(),
            config.chain_timeout(),
        )?);
        let password = std::env::var(&config.session.password_env)
            .ok()
            .map(Zeroizing::new);

        let app = Self::with_components(config, venue, store, whitelist, Arc::new(SystemClock));
        match password {
            Some(password) => app.set_session_password(password.as_str()),
            None => warn!(
                env = %app.config.session.password_env,
                "Session password not set, session keys are unavailable"
            ),
        }
        Ok(app)
    }

    /// Wire the application over caller-supplied infrastructure.
    pub fn with_components(
        config: AppConfig,
        venue: DynVenue,
        store: DynStore,
        whitelist: DynWhitelist,
        clock: DynClock,
    ) -> Self {
        let markets = Arc::new(MarketCache::new(venue.clone()));
        let sessions = Arc::new(SessionKeyManager::new(
            venue.clone(),
            store.clone(),
            clock.clone(),
            config.session.settings(),
        ));
        let accounts = Arc::new(TradingAccountService::new(
            venue.clone(),
            store.clone(),
            clock.clone(),
            config.auth.trust_cached_account,
        ));
        let eligibility = Arc::new(EligibilityResolver::new(
            venue.clone(),
            markets.clone(),
            whitelist,
        ));
        let auth = AuthFlow::new(
            accounts,
            eligibility,
            TermsService::new(store.clone(), clock.clone()),
            sessions.clone(),
            markets.clone(),
        );

        Self {
            config,
            venue,
            store,
            clock,
            markets,
            sessions,
            auth,
        }
    }

    pub fn set_session_password(&self, password: &str) {
        self.sessions.set_password(password);
    }

    pub fn auth(&self) -> &AuthFlow {
        &self.auth
    }

    pub fn store(&self) -> &DynStore {
        &self.store
    }

    /// Store the configured strategies as active. Markets that already have
    /// a stored config are left alone, so fill state survives restarts.
    /// Returns how many configs were inserted.
    pub fn seed_strategies(&self) -> AppResult<usize> {
        let now = self.clock.now_ms();
        let mut inserted = 0;
        for config in &self.config.strategies {
            if self.store.get_strategy_config(&config.market_id)?.is_some() {
                debug!(market_id = %config.market_id, "Strategy config already stored");
                continue;
            }
            self.store
                .put_strategy_config(&StrategyConfigRecord::new(config.clone(), true, now))?;
            info!(
                market_id = %config.market_id,
                strategy = config.strategy.label(),
                "Seeded strategy config"
            );
            inserted += 1;
        }
        Ok(inserted)
    }

    /// Walk the auth flow until a session is ready.
    ///
    /// Terms are accepted only when `accept_terms` is set. A configured
    /// invite code is offered both as the pending invite and, if the flow
    /// asks for one, as an explicit redemption.
    ///
    /// # Errors
    /// `NotReady` when the flow stops anywhere other than `Ready`.
    pub async fn authenticate(&self, wallet: DynOwner, accept_terms: bool) -> AppResult<String> {
        let invite = self.config.auth.invite_code.clone();
        let progress = self.auth.subscribe(|context| {
            info!(state = %context.state, error = ?context.error, "Auth flow");
        });
        let result = self.walk_flow(wallet, accept_terms, invite).await;
        progress.unsubscribe();
        result
    }

    async fn walk_flow(
        &self,
        wallet: DynOwner,
        accept_terms: bool,
        invite: Option<String>,
    ) -> AppResult<String> {
        self.auth.connect_wallet(wallet);
        self.auth.set_pending_invite(invite.clone());
        self.auth.start_flow().await?;

        if self.auth.state() == AuthFlowState::AwaitingTerms {
            if !accept_terms {
                self.auth.decline_terms();
                return Err(AppError::NotReady {
                    state: AuthFlowState::AwaitingTerms,
                    reason: "terms of use not accepted (pass --accept-terms)".to_string(),
                });
            }
            self.auth.accept_terms().await?;
        }

        if self.auth.state() == AuthFlowState::AwaitingInvitation {
            if let Some(code) = invite.as_deref() {
                self.auth.assign_invitation_code(code).await?;
            }
        }

        let context = self.auth.context();
        match (context.state, context.session_id) {
            (AuthFlowState::Ready, Some(session_id)) => {
                info!(%session_id, "Authenticated");
                Ok(session_id)
            }
            (state, _) => {
                let reason = match state {
                    AuthFlowState::DisplayingAccessQueue => match context.access_queue.queue_position
                    {
                        Some(position) => format!("waiting in access queue at position {position}"),
                        None => "waiting in access queue".to_string(),
                    },
                    AuthFlowState::AwaitingInvitation => context
                        .error
                        .unwrap_or_else(|| "an invitation code is required".to_string()),
                    _ => context
                        .error
                        .unwrap_or_else(|| "authentication incomplete".to_string()),
                };
                Err(AppError::NotReady { state, reason })
            }
        }
    }

    /// Engine bound to the owner's active session.
    pub async fn build_engine(&self, owner: &OwnerAddress) -> AppResult<TradingEngine> {
        let (session, signer) = self.sessions.active_signer(owner).await?;
        let nonce = self
            .venue
            .get_account(&session.trade_account_id, owner)
            .await?
            .nonce;

        let balances = Arc::new(BalanceCache::new(
            self.venue.clone(),
            self.clock.clone(),
            self.config.engine.balance_cache_ttl_ms,
        ));
        let gateway = Arc::new(SessionGateway::new(
            self.venue.clone(),
            balances,
            signer,
            session.trade_account_id.clone(),
            nonce,
            self.store.clone(),
        ));
        let registry = Arc::new(StrategyRegistry::new(gateway, self.clock.clone()));

        let engine = TradingEngine::new(
            self.venue.clone(),
            self.store.clone(),
            self.markets.clone(),
            registry,
            self.clock.clone(),
            self.config.engine.settings(),
        );
        engine.initialize(owner.clone(), session.trade_account_id, Some(session.id));
        Ok(engine)
    }

    /// Authenticate, seed strategies and trade until Ctrl-C.
    pub async fn run(self, wallet: DynOwner, accept_terms: bool) -> AppResult<()> {
        let owner = wallet.address();
        self.authenticate(wallet, accept_terms).await?;
        self.seed_strategies()?;

        let engine = self.build_engine(&owner).await?;
        let completed = engine.on_trade_completed(|| debug!("Trade cycle completed"));

        engine.start().await?;
        info!(markets = ?engine.market_ids(), "Trading started, press Ctrl-C to stop");

        tokio::signal::ctrl_c().await?;
        info!("Shutdown signal received");

        engine.stop();
        completed.unsubscribe();
        info!(
            trade_cycles = engine.session_trade_cycles(),
            "Trading stopped"
        );
        match Metrics::render() {
            Ok(metrics) => info!("Final metrics:\n{metrics}"),
            Err(e) => warn!(error = %e, "Failed to render metrics"),
        }
        Ok(())
    }
}
