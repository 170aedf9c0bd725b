use allot_types::{OwnerId, ProductId};
use thiserror::Error;

/// Result type for pool operations.
pub type PoolResult<T> = Result<T, PoolError>;

/// Pool store and reconciliation errors.
#[derive(Debug, Error)]
pub enum PoolError {
    #[error("record not found: {0}")]
    NotFound(String),

    #[error("conflict: {0}")]
    Conflict(String),

    /// Reconciliation cannot proceed without the authoritative subscription list.
    #[error("subscription source unavailable for owner {owner}, product {product}: {reason}")]
    SubscriptionSourceUnavailable {
        owner: OwnerId,
        product: ProductId,
        reason: String,
    },

    #[error("backend error: {0}")]
    Backend(String),
}
