use crate::PoolResult;
use allot_types::{
    Entitlement, EntitlementId, EntitlementPool, OwnerId, PoolId, Product, ProductId,
    Subscription,
};
use async_trait::async_trait;

/// Persistence for entitlement pools.
///
/// Listing methods return pools in insertion order; selection falls back to
/// the first pool of that order when no rule picks one.
#[async_trait]
pub trait PoolStore: Send + Sync {
    async fn list_by_owner(&self, owner: &OwnerId) -> PoolResult<Vec<EntitlementPool>>;

    /// Raw query. Callers serving requests go through
    /// [`PoolCurator`](crate::PoolCurator), which reconciles first.
    async fn list_by_owner_and_product(
        &self,
        owner: &OwnerId,
        product_id: &ProductId,
    ) -> PoolResult<Vec<EntitlementPool>>;

    /// Pools spawned as a side effect of granting `entitlement`.
    async fn list_by_source_entitlement(
        &self,
        entitlement: &EntitlementId,
    ) -> PoolResult<Vec<EntitlementPool>>;

    async fn get(&self, id: &PoolId) -> PoolResult<Option<EntitlementPool>>;

    async fn create(&self, pool: EntitlementPool) -> PoolResult<EntitlementPool>;

    /// Overwrite a stored pool with the same id.
    async fn merge(&self, pool: EntitlementPool) -> PoolResult<EntitlementPool>;
}

/// Persistence for granted entitlements.
#[async_trait]
pub trait EntitlementStore: Send + Sync {
    async fn create(&self, entitlement: Entitlement) -> PoolResult<Entitlement>;
    async fn get(&self, id: &EntitlementId) -> PoolResult<Option<Entitlement>>;
    async fn list_by_pool(&self, pool_id: &PoolId) -> PoolResult<Vec<Entitlement>>;
    async fn remove(&self, id: &EntitlementId) -> PoolResult<Option<Entitlement>>;
}

/// Authoritative, external list of subscriptions.
#[async_trait]
pub trait SubscriptionSource: Send + Sync {
    async fn get_subscriptions(
        &self,
        owner: &OwnerId,
        product_id: &ProductId,
    ) -> PoolResult<Vec<Subscription>>;
}

/// External product catalogue.
#[async_trait]
pub trait ProductSource: Send + Sync {
    async fn get_product_by_id(&self, id: &ProductId) -> PoolResult<Option<Product>>;
}
