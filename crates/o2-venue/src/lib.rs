//! O2 venue access.
//!
//! - [`O2Client`]: REST client implementing [`VenueApi`]
//! - [`MarketCache`]: market catalog and registry ids
//! - [`BalanceCache`]: short-lived per-asset balance cache
//! - `mock::MockVenue`: stateful in-memory venue for tests (`test-util`)

pub mod balances;
pub mod client;
pub mod error;
pub mod markets;
#[cfg(any(test, feature = "test-util"))]
pub mod mock;
pub mod types;

pub use balances::{BalanceCache, DEFAULT_BALANCE_TTL_MS};
pub use client::{DynVenue, O2Client, VenueApi, DEFAULT_BASE_URL, DEFAULT_TIMEOUT, OWNER_ID_HEADER};
pub use error::{VenueError, VenueResult};
pub use markets::{CatalogMeta, MarketCache};
pub use types::*;
