//! Error types for policy enforcement

use allot_pools::PoolError;
use allot_rules::RuleError;
use allot_types::{EntitlementId, PoolId, ProductId};
use thiserror::Error;

/// Policy enforcement errors.
///
/// Validation failures are not errors; they come back as data in
/// [`PreCheckResult`](crate::PreCheckResult).
#[derive(Debug, Error)]
pub enum EnforcerError {
    /// Rule loading or execution failed
    #[error(transparent)]
    Rule(#[from] RuleError),

    /// Pool store, catalogue or subscription feed failed
    #[error(transparent)]
    Pools(#[from] PoolError),

    /// A selection rule ran over candidates but picked none
    #[error("rule {function} did not select a pool for product {product_id}")]
    SelectionContract {
        function: String,
        product_id: ProductId,
    },

    #[error("product not found: {0}")]
    ProductNotFound(ProductId),

    #[error("pool not found: {0}")]
    PoolNotFound(PoolId),

    #[error("entitlement not found: {0}")]
    EntitlementNotFound(EntitlementId),

    /// Invalid engine configuration
    #[error("configuration error: {0}")]
    Config(String),
}

impl EnforcerError {
    /// True when the engine could not have been constructed.
    pub fn is_boot_fatal(&self) -> bool {
        match self {
            Self::Rule(e) => e.is_boot_fatal(),
            Self::Config(_) => true,
            _ => false,
        }
    }
}

/// Result type for policy operations
pub type EnforcerResult<T> = Result<T, EnforcerError>;
