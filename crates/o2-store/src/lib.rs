//! Durable store for the O2 trading agent.
//!
//! Holds trading accounts, sessions, encrypted session keys, strategy
//! configs, trade history and terms acceptances. [`LocalStore`] keeps
//! everything in memory and can mirror it to a directory of JSON files.

mod collections;
pub mod error;
mod file;
pub mod store;

pub use collections::Collection;
pub use error::{StoreError, StoreResult};
pub use store::{DurableStore, DynStore, LocalStore};
