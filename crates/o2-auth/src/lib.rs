//! Authentication for the O2 trading agent.
//!
//! - [`TradingAccountService`]: fetch-or-create the owner's trade account
//! - [`EligibilityResolver`]: on-chain whitelist plus access queue
//! - [`TermsService`]: persisted terms acceptance
//! - [`AuthFlow`]: the state machine that ties them to session creation

pub mod accounts;
pub mod eligibility;
pub mod error;
pub mod flow;
pub mod terms;
pub mod whitelist;

pub use accounts::TradingAccountService;
pub use eligibility::{interpret_verify, Eligibility, EligibilityResolver};
pub use error::{AuthError, AuthResult};
pub use flow::{AccessQueue, AuthFlow, AuthFlowContext, AuthFlowState};
pub use terms::TermsService;
pub use whitelist::{
    whitelist_asset_id, DynWhitelist, GraphqlWhitelist, WhitelistRegistry, DEFAULT_PROVIDER_URL,
};
