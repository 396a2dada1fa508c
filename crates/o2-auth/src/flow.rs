//! Auth flow state machine.
//!
//! Takes a connected wallet from "unknown" to a registered trading session:
//!
//! ```text
//! Idle -> CheckingSituation -> CheckingTerms -> AwaitingTerms
//!      -> VerifyingAccessQueue -> DisplayingAccessQueue | AwaitingInvitation
//!      -> CreatingSession -> Ready
//! ```
//!
//! `Error` is reachable from any step, `Idle` via [`AuthFlow::reset`].
//! Failures inside a step land in [`AuthFlowContext::error`]; the public
//! entry points only return `Err` for a missing wallet or a chain already
//! in progress. Subscribers receive the full context after every change.

use crate::accounts::TradingAccountService;
use crate::eligibility::EligibilityResolver;
use crate::error::{AuthError, AuthResult};
use crate::terms::TermsService;
use o2_core::{Observers, OwnerAddress, Subscription, TradingAccount};
use o2_session::{DynOwner, OwnerSigner, SessionKeyManager};
use o2_telemetry::Metrics;
use o2_venue::MarketCache;
use parking_lot::RwLock;
use serde::Serialize;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum AuthFlowState {
    Idle,
    CheckingSituation,
    CheckingTerms,
    AwaitingTerms,
    VerifyingAccessQueue,
    DisplayingAccessQueue,
    AwaitingInvitation,
    CreatingSession,
    Ready,
    Error,
}

impl AuthFlowState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::CheckingSituation => "checkingSituation",
            Self::CheckingTerms => "checkingTerms",
            Self::AwaitingTerms => "awaitingTerms",
            Self::VerifyingAccessQueue => "verifyingAccessQueue",
            Self::DisplayingAccessQueue => "displayingAccessQueue",
            Self::AwaitingInvitation => "awaitingInvitation",
            Self::CreatingSession => "creatingSession",
            Self::Ready => "ready",
            Self::Error => "error",
        }
    }
}

impl fmt::Display for AuthFlowState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AccessQueue {
    pub queue_position: Option<u64>,
    pub email: Option<String>,
    pub telegram: Option<String>,
}

/// Observable progress toward a ready session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthFlowContext {
    pub state: AuthFlowState,
    pub error: Option<String>,
    /// `None` until checked.
    pub is_whitelisted: Option<bool>,
    pub terms_accepted: bool,
    pub trading_account: Option<TradingAccount>,
    pub access_queue: AccessQueue,
    pub invitation_code: Option<String>,
    pub session_id: Option<String>,
}

impl Default for AuthFlowContext {
    fn default() -> Self {
        Self {
            state: AuthFlowState::Idle,
            error: None,
            is_whitelisted: None,
            terms_accepted: false,
            trading_account: None,
            access_queue: AccessQueue::default(),
            invitation_code: None,
            session_id: None,
        }
    }
}

/// Held while a transition chain runs.
struct FlightGuard<'a>(&'a AtomicBool);

impl<'a> FlightGuard<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self(flag))
    }
}

impl Drop for FlightGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

pub struct AuthFlow {
    accounts: Arc<TradingAccountService>,
    eligibility: Arc<EligibilityResolver>,
    terms: TermsService,
    sessions: Arc<SessionKeyManager>,
    markets: Arc<MarketCache>,
    wallet: RwLock<Option<DynOwner>>,
    /// Invite code supplied out of band (CLI flag, link).
    pending_invite: RwLock<Option<String>>,
    context: RwLock<AuthFlowContext>,
    observers: Observers<AuthFlowContext>,
    in_flight: AtomicBool,
}

impl AuthFlow {
    pub fn new(
        accounts: Arc<TradingAccountService>,
        eligibility: Arc<EligibilityResolver>,
        terms: TermsService,
        sessions: Arc<SessionKeyManager>,
        markets: Arc<MarketCache>,
    ) -> Self {
        Self {
            accounts,
            eligibility,
            terms,
            sessions,
            markets,
            wallet: RwLock::new(None),
            pending_invite: RwLock::new(None),
            context: RwLock::new(AuthFlowContext::default()),
            observers: Observers::new(),
            in_flight: AtomicBool::new(false),
        }
    }

    // ------------------------------------------------------------------
    // Wallet and observation
    // ------------------------------------------------------------------

    /// Switching to a different owner discards the progress of the previous
    /// one.
    pub fn connect_wallet(&self, wallet: DynOwner) {
        let owner = wallet.address();
        info!(owner = %owner, "Wallet connected");
        let previous = self.wallet.write().replace(wallet);
        if previous.is_some_and(|p| p.address() != owner) {
            debug!(owner = %owner, "Different owner connected, resetting auth flow");
            self.reset();
        }
    }

    pub fn disconnect_wallet(&self) {
        *self.wallet.write() = None;
    }

    pub fn wallet(&self) -> Option<DynOwner> {
        self.wallet.read().clone()
    }

    pub fn set_pending_invite(&self, code: Option<String>) {
        *self.pending_invite.write() = code;
    }

    pub fn context(&self) -> AuthFlowContext {
        self.context.read().clone()
    }

    pub fn state(&self) -> AuthFlowState {
        self.context.read().state
    }

    pub fn subscribe<F>(&self, callback: F) -> Subscription
    where
        F: Fn(&AuthFlowContext) + Send + Sync + 'static,
    {
        self.observers.subscribe(callback)
    }

    fn connected(&self) -> AuthResult<DynOwner> {
        self.wallet().ok_or(AuthError::NoWalletConnected)
    }

    fn begin(&self) -> AuthResult<FlightGuard<'_>> {
        FlightGuard::acquire(&self.in_flight).ok_or(AuthError::FlowInProgress)
    }

    fn update(&self, apply: impl FnOnce(&mut AuthFlowContext)) {
        let (snapshot, changed) = {
            let mut context = self.context.write();
            let before = context.state;
            apply(&mut context);
            (context.clone(), context.state != before)
        };
        if changed {
            debug!(state = %snapshot.state, "Auth flow transition");
            Metrics::auth_transition(snapshot.state.as_str());
        }
        self.observers.notify(&snapshot);
    }

    fn fail(&self, error: &AuthError) {
        warn!(error = %error, "Auth flow failed");
        let message = error.user_message();
        self.update(|c| {
            c.state = AuthFlowState::Error;
            c.error = Some(message);
        });
    }

    // ------------------------------------------------------------------
    // Entry points
    // ------------------------------------------------------------------

    /// Resume an existing session or walk the flow from the start.
    ///
    /// # Errors
    /// `NoWalletConnected`, `FlowInProgress`.
    pub async fn start_flow(&self) -> AuthResult<()> {
        let wallet = self.connected()?;
        let _guard = self.begin()?;
        let owner = wallet.address();

        match self.sessions.get_active_session(&owner) {
            Ok(Some(session)) => {
                info!(owner = %owner, session_id = %session.id, "Resuming active session");
                self.refresh_eligibility(&owner).await;
                self.update(|c| {
                    c.state = AuthFlowState::Ready;
                    c.session_id = Some(session.id);
                    c.error = None;
                });
                return Ok(());
            }
            Ok(None) => {}
            Err(e) => warn!(owner = %owner, error = %e, "Active session lookup failed"),
        }

        self.update(|c| {
            c.state = AuthFlowState::CheckingSituation;
            c.error = None;
        });
        if let Err(e) = self.check_situation(&*wallet).await {
            self.fail(&e);
        }
        Ok(())
    }

    pub async fn accept_terms(&self) -> AuthResult<()> {
        let wallet = self.connected()?;
        let _guard = self.begin()?;

        let result = async {
            self.terms.accept(&wallet.address())?;
            self.update(|c| c.terms_accepted = true);
            self.after_terms(&*wallet).await
        }
        .await;
        if let Err(e) = result {
            self.fail(&e);
        }
        Ok(())
    }

    /// Declining terms returns the flow to its initial state.
    pub fn decline_terms(&self) {
        info!("Terms declined");
        self.reset();
    }

    /// Redeem an invitation code, creating the session if it is accepted.
    pub async fn assign_invitation_code(&self, code: &str) -> AuthResult<()> {
        let wallet = self.connected()?;
        let _guard = self.begin()?;
        let owner = wallet.address();

        self.update(|c| {
            c.state = AuthFlowState::VerifyingAccessQueue;
            c.invitation_code = Some(code.to_string());
        });

        let account = match self.ensure_account(&owner).await {
            Ok(account) => account,
            Err(e) => {
                let message = e.user_message();
                self.update(|c| {
                    c.state = AuthFlowState::AwaitingInvitation;
                    c.error = Some(message);
                });
                return Ok(());
            }
        };

        let eligibility = self
            .eligibility
            .check_off_chain(&owner, &account.id, Some(code))
            .await;
        if eligibility.is_eligible {
            self.create_session(&*wallet).await;
        } else {
            let message = eligibility
                .error
                .unwrap_or_else(|| "Invalid invitation code".to_string());
            self.update(|c| {
                c.state = AuthFlowState::AwaitingInvitation;
                c.error = Some(message);
            });
        }
        Ok(())
    }

    /// Back to the initial context from any state.
    pub fn reset(&self) {
        self.update(|c| *c = AuthFlowContext::default());
    }

    // ------------------------------------------------------------------
    // Steps
    // ------------------------------------------------------------------

    async fn check_situation(&self, wallet: &dyn OwnerSigner) -> AuthResult<()> {
        let owner = wallet.address();
        let account = self.accounts.get_or_create(&owner).await?;
        self.update(|c| c.trading_account = Some(account.clone()));

        let eligibility = self
            .eligibility
            .check_eligibility(&owner, &account.id, None)
            .await;
        let whitelisted = eligibility.is_eligible && eligibility.is_whitelisted;
        self.update(|c| c.is_whitelisted = Some(whitelisted));

        self.check_terms(wallet).await
    }

    async fn check_terms(&self, wallet: &dyn OwnerSigner) -> AuthResult<()> {
        self.update(|c| c.state = AuthFlowState::CheckingTerms);

        if self.terms.is_accepted(&wallet.address())? {
            self.update(|c| c.terms_accepted = true);
            self.after_terms(wallet).await
        } else {
            self.update(|c| {
                c.state = AuthFlowState::AwaitingTerms;
                c.terms_accepted = false;
            });
            Ok(())
        }
    }

    async fn after_terms(&self, wallet: &dyn OwnerSigner) -> AuthResult<()> {
        if self.context.read().is_whitelisted == Some(true) {
            self.create_session(wallet).await;
            Ok(())
        } else {
            self.verify_access_queue(wallet).await
        }
    }

    async fn verify_access_queue(&self, wallet: &dyn OwnerSigner) -> AuthResult<()> {
        if self.context.read().is_whitelisted == Some(true) {
            self.create_session(wallet).await;
            return Ok(());
        }
        self.update(|c| c.state = AuthFlowState::VerifyingAccessQueue);

        let owner = wallet.address();
        let account = self.ensure_account(&owner).await?;
        let eligibility = self
            .eligibility
            .check_off_chain(&owner, &account.id, None)
            .await;

        if eligibility.is_eligible {
            let invite = self.pending_invite.read().clone();
            if let Some(code) = invite {
                self.update(|c| c.invitation_code = Some(code));
            }
            self.create_session(wallet).await;
            return Ok(());
        }

        match eligibility.waitlist_position {
            Some(position) => {
                info!(owner = %owner, position, "Owner is on the access waitlist");
                self.update(|c| {
                    c.state = AuthFlowState::DisplayingAccessQueue;
                    c.access_queue = AccessQueue {
                        queue_position: Some(position),
                        email: eligibility.email,
                        telegram: eligibility.telegram,
                    };
                });
            }
            None => self.update(|c| c.state = AuthFlowState::AwaitingInvitation),
        }
        Ok(())
    }

    /// Errors land in the context; this step never auto-retries.
    async fn create_session(&self, wallet: &dyn OwnerSigner) {
        if let Err(e) = self.try_create_session(wallet).await {
            self.fail(&e);
        }
    }

    async fn try_create_session(&self, wallet: &dyn OwnerSigner) -> AuthResult<()> {
        self.update(|c| c.state = AuthFlowState::CreatingSession);

        let owner = wallet.address();
        let contract_ids = self.markets.contract_ids().await?;
        let account = self.ensure_account(&owner).await?;
        let session = self
            .sessions
            .create_session(wallet, &account, &contract_ids, None)
            .await?;
        Metrics::session_created();

        // The stored account now carries the bumped nonce.
        let account = self.accounts.get(&owner).ok().flatten().unwrap_or(account);
        info!(owner = %owner, session_id = %session.id, "Auth flow ready");
        self.update(|c| {
            c.state = AuthFlowState::Ready;
            c.session_id = Some(session.id);
            c.trading_account = Some(account);
            c.error = None;
        });
        Ok(())
    }

    async fn ensure_account(&self, owner: &OwnerAddress) -> AuthResult<TradingAccount> {
        let cached = self.context.read().trading_account.clone();
        if let Some(account) = cached.filter(|a| &a.owner_address == owner) {
            return Ok(account);
        }
        let account = self.accounts.get_or_create(owner).await?;
        self.update(|c| c.trading_account = Some(account.clone()));
        Ok(account)
    }

    /// Best-effort whitelist refresh for a resumed session.
    async fn refresh_eligibility(&self, owner: &OwnerAddress) {
        let account = match self.ensure_account(owner).await {
            Ok(account) => account,
            Err(e) => {
                warn!(owner = %owner, error = %e, "Eligibility refresh skipped");
                return;
            }
        };
        let eligibility = self
            .eligibility
            .check_eligibility(owner, &account.id, None)
            .await;
        self.update(|c| c.is_whitelisted = Some(eligibility.is_eligible && eligibility.is_whitelisted));
    }
}
