//! In-memory reference implementations of the pool collaborators.
//!
//! Deterministic and test-friendly: stores keep insertion order, and the
//! subscription source can be switched offline to exercise the
//! reconciliation failure path. The CLI loads its YAML fixture into these.

use crate::traits::{EntitlementStore, PoolStore, ProductSource, SubscriptionSource};
use crate::{PoolError, PoolResult};
use allot_types::{
    Entitlement, EntitlementId, EntitlementPool, OwnerId, PoolId, Product, ProductId,
    Subscription, SubscriptionId,
};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{PoisonError, RwLock};

/// In-memory pool store.
#[derive(Default)]
pub struct InMemoryPoolStore {
    pools: RwLock<Vec<EntitlementPool>>,
}

impl InMemoryPoolStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every stored pool, in insertion order.
    pub fn snapshot(&self) -> Vec<EntitlementPool> {
        self.pools
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn filtered(
        &self,
        predicate: impl Fn(&EntitlementPool) -> bool,
    ) -> PoolResult<Vec<EntitlementPool>> {
        let guard = self
            .pools
            .read()
            .map_err(|_| PoolError::Backend("pools lock poisoned".to_string()))?;
        Ok(guard.iter().filter(|p| predicate(p)).cloned().collect())
    }
}

#[async_trait]
impl PoolStore for InMemoryPoolStore {
    async fn list_by_owner(&self, owner: &OwnerId) -> PoolResult<Vec<EntitlementPool>> {
        self.filtered(|p| &p.owner_id == owner)
    }

    async fn list_by_owner_and_product(
        &self,
        owner: &OwnerId,
        product_id: &ProductId,
    ) -> PoolResult<Vec<EntitlementPool>> {
        self.filtered(|p| &p.owner_id == owner && &p.product_id == product_id)
    }

    async fn list_by_source_entitlement(
        &self,
        entitlement: &EntitlementId,
    ) -> PoolResult<Vec<EntitlementPool>> {
        self.filtered(|p| p.source_entitlement.as_ref() == Some(entitlement))
    }

    async fn get(&self, id: &PoolId) -> PoolResult<Option<EntitlementPool>> {
        let guard = self
            .pools
            .read()
            .map_err(|_| PoolError::Backend("pools lock poisoned".to_string()))?;
        Ok(guard.iter().find(|p| &p.id == id).cloned())
    }

    async fn create(&self, pool: EntitlementPool) -> PoolResult<EntitlementPool> {
        let mut guard = self
            .pools
            .write()
            .map_err(|_| PoolError::Backend("pools lock poisoned".to_string()))?;
        if guard.iter().any(|p| p.id == pool.id) {
            return Err(PoolError::Conflict(format!("pool {} already exists", pool.id)));
        }
        guard.push(pool.clone());
        Ok(pool)
    }

    async fn merge(&self, pool: EntitlementPool) -> PoolResult<EntitlementPool> {
        let mut guard = self
            .pools
            .write()
            .map_err(|_| PoolError::Backend("pools lock poisoned".to_string()))?;
        let slot = guard
            .iter_mut()
            .find(|p| p.id == pool.id)
            .ok_or_else(|| PoolError::NotFound(format!("pool {} not found", pool.id)))?;
        *slot = pool.clone();
        Ok(pool)
    }
}

/// In-memory entitlement store.
#[derive(Default)]
pub struct InMemoryEntitlementStore {
    entitlements: RwLock<Vec<Entitlement>>,
}

impl InMemoryEntitlementStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl EntitlementStore for InMemoryEntitlementStore {
    async fn create(&self, entitlement: Entitlement) -> PoolResult<Entitlement> {
        let mut guard = self
            .entitlements
            .write()
            .map_err(|_| PoolError::Backend("entitlements lock poisoned".to_string()))?;
        if guard.iter().any(|e| e.id == entitlement.id) {
            return Err(PoolError::Conflict(format!(
                "entitlement {} already exists",
                entitlement.id
            )));
        }
        guard.push(entitlement.clone());
        Ok(entitlement)
    }

    async fn get(&self, id: &EntitlementId) -> PoolResult<Option<Entitlement>> {
        let guard = self
            .entitlements
            .read()
            .map_err(|_| PoolError::Backend("entitlements lock poisoned".to_string()))?;
        Ok(guard.iter().find(|e| &e.id == id).cloned())
    }

    async fn list_by_pool(&self, pool_id: &PoolId) -> PoolResult<Vec<Entitlement>> {
        let guard = self
            .entitlements
            .read()
            .map_err(|_| PoolError::Backend("entitlements lock poisoned".to_string()))?;
        Ok(guard
            .iter()
            .filter(|e| &e.pool.id == pool_id)
            .cloned()
            .collect())
    }

    async fn remove(&self, id: &EntitlementId) -> PoolResult<Option<Entitlement>> {
        let mut guard = self
            .entitlements
            .write()
            .map_err(|_| PoolError::Backend("entitlements lock poisoned".to_string()))?;
        Ok(guard
            .iter()
            .position(|e| &e.id == id)
            .map(|index| guard.remove(index)))
    }
}

/// In-memory subscription feed.
pub struct InMemorySubscriptionSource {
    subscriptions: RwLock<Vec<Subscription>>,
    available: AtomicBool,
}

impl Default for InMemorySubscriptionSource {
    fn default() -> Self {
        Self {
            subscriptions: RwLock::new(Vec::new()),
            available: AtomicBool::new(true),
        }
    }
}

impl InMemorySubscriptionSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_subscriptions(subscriptions: Vec<Subscription>) -> Self {
        Self {
            subscriptions: RwLock::new(subscriptions),
            available: AtomicBool::new(true),
        }
    }

    pub fn add(&self, subscription: Subscription) {
        self.subscriptions
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(subscription);
    }

    /// Drop a subscription from the feed. Returns whether it was present.
    pub fn remove(&self, id: &SubscriptionId) -> bool {
        let mut guard = self
            .subscriptions
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        let before = guard.len();
        guard.retain(|s| &s.id != id);
        guard.len() != before
    }

    /// Simulate the feed going offline.
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }
}

#[async_trait]
impl SubscriptionSource for InMemorySubscriptionSource {
    async fn get_subscriptions(
        &self,
        owner: &OwnerId,
        product_id: &ProductId,
    ) -> PoolResult<Vec<Subscription>> {
        if !self.available.load(Ordering::SeqCst) {
            return Err(PoolError::SubscriptionSourceUnavailable {
                owner: owner.clone(),
                product: product_id.clone(),
                reason: "source offline".to_string(),
            });
        }
        let guard = self
            .subscriptions
            .read()
            .map_err(|_| PoolError::Backend("subscriptions lock poisoned".to_string()))?;
        Ok(guard
            .iter()
            .filter(|s| &s.owner_id == owner && &s.product_id == product_id)
            .cloned()
            .collect())
    }
}

/// In-memory product catalogue.
#[derive(Default)]
pub struct InMemoryProductSource {
    products: RwLock<HashMap<ProductId, Product>>,
}

impl InMemoryProductSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, product: Product) {
        self.products
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(product.id.clone(), product);
    }
}

#[async_trait]
impl ProductSource for InMemoryProductSource {
    async fn get_product_by_id(&self, id: &ProductId) -> PoolResult<Option<Product>> {
        let guard = self
            .products
            .read()
            .map_err(|_| PoolError::Backend("products lock poisoned".to_string()))?;
        Ok(guard.get(id).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use allot_types::Consumer;
    use chrono::{Duration, Utc};

    fn pool(owner: &str, product: &str) -> EntitlementPool {
        let now = Utc::now();
        EntitlementPool::new(
            OwnerId::new(owner),
            ProductId::new(product),
            5,
            now,
            now + Duration::days(30),
        )
    }

    #[tokio::test]
    async fn listing_keeps_insertion_order() {
        let store = InMemoryPoolStore::new();
        let a = store.create(pool("acme", "p")).await.unwrap();
        store.create(pool("acme", "q")).await.unwrap();
        let c = store.create(pool("acme", "p")).await.unwrap();
        store.create(pool("other", "p")).await.unwrap();

        let listed = store
            .list_by_owner_and_product(&OwnerId::new("acme"), &ProductId::new("p"))
            .await
            .unwrap();
        let ids: Vec<_> = listed.iter().map(|p| p.id.clone()).collect();
        assert_eq!(ids, vec![a.id, c.id]);

        assert_eq!(store.list_by_owner(&OwnerId::new("acme")).await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn create_rejects_duplicate_ids() {
        let store = InMemoryPoolStore::new();
        let p = store.create(pool("acme", "p")).await.unwrap();
        let result = store.create(p).await;
        assert!(matches!(result, Err(PoolError::Conflict(_))));
    }

    #[tokio::test]
    async fn merge_requires_existing_pool() {
        let store = InMemoryPoolStore::new();
        let result = store.merge(pool("acme", "p")).await;
        assert!(matches!(result, Err(PoolError::NotFound(_))));

        let mut p = store.create(pool("acme", "p")).await.unwrap();
        p.current_members = 3;
        store.merge(p.clone()).await.unwrap();
        assert_eq!(store.get(&p.id).await.unwrap().unwrap().current_members, 3);
    }

    #[tokio::test]
    async fn entitlements_are_listed_by_pool() {
        let store = InMemoryEntitlementStore::new();
        let p = pool("acme", "p");
        let consumer = Consumer::new("c1", "box", "system", OwnerId::new("acme"));
        let ent = store
            .create(Entitlement::new(p.clone(), consumer, Utc::now()))
            .await
            .unwrap();

        assert_eq!(store.list_by_pool(&p.id).await.unwrap().len(), 1);
        assert!(store.remove(&ent.id).await.unwrap().is_some());
        assert!(store.get(&ent.id).await.unwrap().is_none());
        assert!(store.remove(&ent.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn offline_subscription_source_fails() {
        let source = InMemorySubscriptionSource::new();
        source.set_available(false);
        let result = source
            .get_subscriptions(&OwnerId::new("acme"), &ProductId::new("p"))
            .await;
        assert!(matches!(
            result,
            Err(PoolError::SubscriptionSourceUnavailable { .. })
        ));
    }
}
