//! Terms-of-use acceptance, keyed by normalized owner address.

use crate::error::AuthResult;
use o2_core::{DynClock, OwnerAddress, TermsAcceptance};
use o2_store::DynStore;

pub struct TermsService {
    store: DynStore,
    clock: DynClock,
}

impl TermsService {
    pub fn new(store: DynStore, clock: DynClock) -> Self {
        Self { store, clock }
    }

    pub fn is_accepted(&self, owner: &OwnerAddress) -> AuthResult<bool> {
        Ok(self.store.get_terms_acceptance(owner)?.is_some())
    }

    pub fn accept(&self, owner: &OwnerAddress) -> AuthResult<TermsAcceptance> {
        let acceptance = TermsAcceptance {
            owner_address: owner.clone(),
            accepted_at: self.clock.now_ms(),
        };
        self.store.put_terms_acceptance(&acceptance)?;
        Ok(acceptance)
    }

    /// Forget a previous acceptance. Returns whether one existed.
    pub fn revoke(&self, owner: &OwnerAddress) -> AuthResult<bool> {
        Ok(self.store.delete_terms_acceptance(owner)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use o2_core::ManualClock;
    use o2_store::LocalStore;
    use std::sync::Arc;

    #[test]
    fn test_accept_and_revoke() {
        let terms = TermsService::new(Arc::new(LocalStore::in_memory()), Arc::new(ManualClock::new(7)));
        let owner = OwnerAddress::parse(&format!("0x{}", "EF".repeat(20))).unwrap();
        let same_owner = OwnerAddress::parse(&format!("0x{}", "ef".repeat(20))).unwrap();

        assert!(!terms.is_accepted(&owner).unwrap());
        assert_eq!(terms.accept(&owner).unwrap().accepted_at, 7);
        assert!(terms.is_accepted(&same_owner).unwrap());
        assert!(terms.revoke(&owner).unwrap());
        assert!(!terms.is_accepted(&owner).unwrap());
    }
}
