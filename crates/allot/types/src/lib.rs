//! Allot Types - entitlement domain model
//!
//! Pools, consumers, products, subscriptions and entitlements, together with
//! the capacity invariants of a pool and the read-only views that rule
//! evaluation is allowed to see.

#![deny(unsafe_code)]
#![cfg_attr(feature = "strict-docs", warn(missing_docs))]
#![cfg_attr(not(feature = "strict-docs"), allow(missing_docs))]
#![warn(rust_2018_idioms)]

mod clock;
mod entitlement;
mod ids;
mod model;
mod pool;
mod validation;
pub mod views;

pub use clock::{DateSource, FixedDateSource, SystemDateSource};
pub use entitlement::Entitlement;
pub use ids::{ConsumerId, EntitlementId, OwnerId, PoolId, ProductId, SubscriptionId};
pub use model::{Consumer, Owner, Product, Subscription};
pub use pool::EntitlementPool;
pub use validation::{ValidationError, ValidationResult, ValidationWarning};
pub use views::{ReadOnlyConsumer, ReadOnlyEntitlement, ReadOnlyPool, ReadOnlyProduct};
