//! Trading eligibility.
//!
//! The on-chain whitelist is authoritative and asked first. When it errors
//! or says no, the access queue service decides: an invite code is redeemed
//! if given, otherwise the owner's queue entry is looked up or created.

use crate::whitelist::DynWhitelist;
use o2_core::OwnerAddress;
use o2_venue::{AssignCodeRequest, DynVenue, MarketCache, VerifyAccessRequest, VerifyAccessResponse};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Combined verdict.
///
/// `is_whitelisted` implies `is_eligible`. Eligibility gates session
/// creation; the whitelist flag lets whitelisted owners skip the queue.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Eligibility {
    pub is_eligible: bool,
    pub is_whitelisted: bool,
    pub waitlist_position: Option<u64>,
    pub email: Option<String>,
    pub telegram: Option<String>,
    pub error: Option<String>,
}

impl Eligibility {
    fn whitelisted() -> Self {
        Self {
            is_eligible: true,
            is_whitelisted: true,
            ..Default::default()
        }
    }

    fn rejected(error: impl Into<String>) -> Self {
        Self {
            error: Some(error.into()),
            ..Default::default()
        }
    }
}

/// Read a verify response. `None` when it matches no known shape.
pub fn interpret_verify(response: &VerifyAccessResponse) -> Option<Eligibility> {
    if !response.success {
        return None;
    }
    if let Some(auto_approved) = response.auto_approved {
        return Some(if auto_approved {
            Eligibility::whitelisted()
        } else {
            Eligibility {
                waitlist_position: response.queue_position,
                ..Default::default()
            }
        });
    }
    if response.found == Some(true) {
        let entry = response.entry.clone().unwrap_or_default();
        return Some(if entry.status == "approved" {
            Eligibility::whitelisted()
        } else {
            Eligibility {
                waitlist_position: entry.queue_position,
                email: entry.email,
                telegram: entry.telegram,
                ..Default::default()
            }
        });
    }
    None
}

pub struct EligibilityResolver {
    venue: DynVenue,
    markets: Arc<MarketCache>,
    whitelist: DynWhitelist,
}

impl EligibilityResolver {
    pub fn new(venue: DynVenue, markets: Arc<MarketCache>, whitelist: DynWhitelist) -> Self {
        Self {
            venue,
            markets,
            whitelist,
        }
    }

    /// Full check: on-chain first, then the access queue. Never fails;
    /// problems end up in [`Eligibility::error`].
    pub async fn check_eligibility(
        &self,
        owner: &OwnerAddress,
        trade_account_id: &str,
        invite_code: Option<&str>,
    ) -> Eligibility {
        if self.check_on_chain(trade_account_id).await {
            return Eligibility::whitelisted();
        }
        self.check_off_chain(owner, trade_account_id, invite_code)
            .await
    }

    /// Whitelist membership. Errors and a missing whitelist contract count
    /// as "not whitelisted".
    pub async fn check_on_chain(&self, trade_account_id: &str) -> bool {
        let whitelist_id = match self.markets.books_whitelist_id().await {
            Ok(Some(id)) => id,
            Ok(None) => {
                debug!("Venue publishes no whitelist contract");
                return false;
            }
            Err(e) => {
                warn!(error = %e, "Could not load whitelist contract id");
                return false;
            }
        };
        match self
            .whitelist
            .is_whitelisted(trade_account_id, &whitelist_id)
            .await
        {
            Ok(whitelisted) => whitelisted,
            Err(e) => {
                warn!(trade_account_id, error = %e, "On-chain whitelist check failed");
                false
            }
        }
    }

    /// Access queue and invitation service.
    pub async fn check_off_chain(
        &self,
        owner: &OwnerAddress,
        trade_account_id: &str,
        invite_code: Option<&str>,
    ) -> Eligibility {
        if let Some(code) = invite_code {
            return self.redeem(owner, trade_account_id, code).await;
        }

        let request = VerifyAccessRequest {
            trading_account: trade_account_id.to_string(),
            wallet_address: owner.as_str().to_string(),
        };
        match self.venue.verify_access_queue(&request, owner).await {
            Ok(response) => interpret_verify(&response).unwrap_or_else(|| {
                debug!(?response, "Unrecognized access queue response");
                Eligibility::rejected("Not whitelisted and no valid invite code")
            }),
            Err(e) => {
                warn!(owner = %owner, error = %e, "Access queue check failed");
                Eligibility::rejected("Not whitelisted and no valid invite code")
            }
        }
    }

    async fn redeem(&self, owner: &OwnerAddress, trade_account_id: &str, code: &str) -> Eligibility {
        let request = AssignCodeRequest {
            invitation_code: code.to_string(),
            trade_account_id: trade_account_id.to_string(),
            wallet_address: owner.as_str().to_string(),
        };
        match self.venue.assign_invitation_code(&request).await {
            Ok(response) if response.success => {
                info!(owner = %owner, "Invitation code redeemed");
                // Eligible now; the whitelist asset is minted later on-chain.
                Eligibility {
                    is_eligible: true,
                    ..Default::default()
                }
            }
            Ok(response) => Eligibility::rejected(
                response
                    .error
                    .unwrap_or_else(|| "Invalid invite code".to_string()),
            ),
            Err(e) => Eligibility::rejected(e.user_message()),
        }
    }
}
