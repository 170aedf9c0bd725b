//! Allot Pools - pool storage contracts and subscription reconciliation.
//!
//! This crate defines the collaborators the policy engine reads pools
//! through:
//! - a pool store and an entitlement store (system of record)
//! - the external subscription feed and product catalogue
//! - the reconciler that syncs pools with the feed
//! - the curator that reconciles before serving product queries
//!
//! [`memory`] holds deterministic in-memory adapters for all four traits.

#![deny(unsafe_code)]
#![cfg_attr(feature = "strict-docs", warn(missing_docs))]
#![cfg_attr(not(feature = "strict-docs"), allow(missing_docs))]
#![warn(rust_2018_idioms)]

mod curator;
mod error;
pub mod memory;
mod reconcile;
mod traits;

pub use curator::PoolCurator;
pub use error::{PoolError, PoolResult};
pub use reconcile::{PoolReconciler, ReconcileReport};
pub use traits::{EntitlementStore, PoolStore, ProductSource, SubscriptionSource};
