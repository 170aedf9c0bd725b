//! Allot Policy - entitlement policy enforcement
//!
//! This crate provides:
//! - Pre-entitlement checks (rule errors and warnings plus expiration)
//! - Post-entitlement evaluation returning recorded side effects
//! - Best-pool selection with default-first fallback
//! - Grant orchestration and revocation over the pool stores
//! - Engine configuration
//!
//! # Example
//!
//! ```rust,ignore
//! let enforcer = RuleEnforcer::from_source(&FileRuleSource::new(path), products, curator, clock)?;
//! match enforcer.select_pool(&consumer, &product_id).await? {
//!     PoolSelection::Default(pool) | PoolSelection::Selected { pool, .. } => grant(pool),
//!     PoolSelection::NoCandidates | PoolSelection::NoMatch { .. } => reject(),
//! }
//! ```

#![deny(unsafe_code)]
#![cfg_attr(feature = "strict-docs", warn(missing_docs))]
#![cfg_attr(not(feature = "strict-docs"), allow(missing_docs))]
#![warn(rust_2018_idioms)]

mod config;
mod enforcer;
mod entitler;
mod error;

pub use config::EngineConfig;
pub use enforcer::{Enforcer, PoolSelection, PostCheckResult, PreCheckResult, RuleEnforcer};
pub use entitler::{EntitleOutcome, Entitler, RevokeReport};
pub use error::{EnforcerError, EnforcerResult};
