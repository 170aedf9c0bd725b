//! Subscription reconciliation.
//!
//! Brings the local pools of an owner/product pair in line with the
//! subscription feed: one pool per subscription, capacity and validity
//! window copied from the subscription on every pass, and pools whose
//! subscription vanished marked inactive. Entitlements already granted from
//! a deactivated pool are left alone.

use crate::traits::{PoolStore, SubscriptionSource};
use crate::PoolResult;
use allot_types::{EntitlementPool, OwnerId, ProductId, SubscriptionId};
use serde::Serialize;
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

/// What a reconciliation pass changed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ReconcileReport {
    pub created: usize,
    pub refreshed: usize,
    pub deactivated: usize,
}

pub struct PoolReconciler {
    pools: Arc<dyn PoolStore>,
    subscriptions: Arc<dyn SubscriptionSource>,
}

impl PoolReconciler {
    pub fn new(pools: Arc<dyn PoolStore>, subscriptions: Arc<dyn SubscriptionSource>) -> Self {
        Self {
            pools,
            subscriptions,
        }
    }

    /// Sync local pools for `(owner, product_id)` with the subscription feed.
    ///
    /// Fails without touching any pool when the feed is unreachable. A store
    /// failure part-way leaves earlier writes in place; a retry converges.
    #[instrument(skip(self), fields(owner = %owner, product = %product_id))]
    pub async fn reconcile(
        &self,
        owner: &OwnerId,
        product_id: &ProductId,
    ) -> PoolResult<ReconcileReport> {
        let subscriptions = self
            .subscriptions
            .get_subscriptions(owner, product_id)
            .await?;
        let local = self
            .pools
            .list_by_owner_and_product(owner, product_id)
            .await?;

        let mut unmatched: BTreeMap<SubscriptionId, EntitlementPool> = local
            .into_iter()
            .filter_map(|pool| pool.subscription_id.clone().map(|id| (id, pool)))
            .collect();

        let mut report = ReconcileReport::default();
        let mut seen = HashSet::new();

        for subscription in subscriptions {
            if !seen.insert(subscription.id.clone()) {
                warn!(subscription = %subscription.id, "Duplicate subscription in feed, ignoring");
                continue;
            }

            match unmatched.remove(&subscription.id) {
                None => {
                    let pool = EntitlementPool::new(
                        owner.clone(),
                        product_id.clone(),
                        subscription.quantity,
                        subscription.start_date,
                        subscription.end_date,
                    )
                    .with_subscription(subscription.id.clone());
                    debug!(pool = %pool.id, subscription = %subscription.id, "Creating pool");
                    self.pools.create(pool).await?;
                    report.created += 1;
                }
                Some(mut pool) => {
                    // Always overwritten; there is no change detection.
                    pool.max_members = subscription.quantity;
                    pool.start_date = subscription.start_date;
                    pool.end_date = subscription.end_date;
                    self.pools.merge(pool).await?;
                    report.refreshed += 1;
                }
            }
        }

        for (subscription_id, mut pool) in unmatched {
            if !pool.active_subscription {
                continue;
            }
            debug!(pool = %pool.id, subscription = %subscription_id, "Deactivating pool");
            pool.active_subscription = false;
            self.pools.merge(pool).await?;
            report.deactivated += 1;
        }

        info!(
            created = report.created,
            refreshed = report.refreshed,
            deactivated = report.deactivated,
            "Pools reconciled"
        );
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::{InMemoryPoolStore, InMemorySubscriptionSource};
    use crate::PoolError;
    use allot_types::Subscription;
    use chrono::{Duration, Utc};

    fn subscription(id: &str, quantity: i64) -> Subscription {
        let now = Utc::now();
        Subscription {
            id: SubscriptionId::new(id),
            owner_id: OwnerId::new("O"),
            product_id: ProductId::new("P"),
            quantity,
            start_date: now - Duration::days(1),
            end_date: now + Duration::days(30),
        }
    }

    fn setup(
        subscriptions: Vec<Subscription>,
    ) -> (Arc<InMemoryPoolStore>, Arc<InMemorySubscriptionSource>, PoolReconciler) {
        let store = Arc::new(InMemoryPoolStore::new());
        let source = Arc::new(InMemorySubscriptionSource::with_subscriptions(subscriptions));
        let reconciler = PoolReconciler::new(store.clone(), source.clone());
        (store, source, reconciler)
    }

    fn owner() -> OwnerId {
        OwnerId::new("O")
    }

    fn product() -> ProductId {
        ProductId::new("P")
    }

    #[tokio::test]
    async fn new_subscription_creates_one_empty_pool() {
        let (store, _, reconciler) = setup(vec![subscription("S", 5)]);

        let report = reconciler.reconcile(&owner(), &product()).await.unwrap();
        assert_eq!(report.created, 1);

        let pools = store.snapshot();
        assert_eq!(pools.len(), 1);
        let pool = &pools[0];
        assert_eq!(pool.max_members, 5);
        assert_eq!(pool.current_members, 0);
        assert!(pool.active_subscription);
        assert_eq!(pool.subscription_id, Some(SubscriptionId::new("S")));
    }

    #[tokio::test]
    async fn vanished_subscription_deactivates_pool() {
        let (store, source, reconciler) = setup(vec![subscription("S", 5)]);
        reconciler.reconcile(&owner(), &product()).await.unwrap();

        assert!(source.remove(&SubscriptionId::new("S")));
        let report = reconciler.reconcile(&owner(), &product()).await.unwrap();
        assert_eq!(report.deactivated, 1);

        let pools = store.snapshot();
        assert_eq!(pools.len(), 1);
        assert!(!pools[0].active_subscription);
        assert_eq!(pools[0].max_members, 5);
    }

    #[tokio::test]
    async fn reconciliation_is_idempotent() {
        let (store, _, reconciler) = setup(vec![subscription("S1", 5), subscription("S2", 2)]);

        let first = reconciler.reconcile(&owner(), &product()).await.unwrap();
        let after_first = store.snapshot();
        let second = reconciler.reconcile(&owner(), &product()).await.unwrap();

        assert_eq!(first.created, 2);
        assert_eq!(second.created, 0);
        assert_eq!(second.deactivated, 0);
        assert_eq!(store.snapshot(), after_first);
    }

    #[tokio::test]
    async fn existing_pool_is_overwritten_but_keeps_members() {
        let (store, source, reconciler) = setup(vec![subscription("S", 5)]);
        reconciler.reconcile(&owner(), &product()).await.unwrap();

        let mut pool = store.snapshot().remove(0);
        pool.current_members = 3;
        store.merge(pool.clone()).await.unwrap();

        source.remove(&SubscriptionId::new("S"));
        let mut changed = subscription("S", 10);
        changed.end_date = pool.end_date + Duration::days(365);
        source.add(changed.clone());

        let report = reconciler.reconcile(&owner(), &product()).await.unwrap();
        assert_eq!(report.refreshed, 1);

        let refreshed = store.get(&pool.id).await.unwrap().unwrap();
        assert_eq!(refreshed.max_members, 10);
        assert_eq!(refreshed.end_date, changed.end_date);
        assert_eq!(refreshed.current_members, 3);
    }

    #[tokio::test]
    async fn pools_without_subscription_are_untouched() {
        let (store, _, reconciler) = setup(vec![]);
        let now = Utc::now();
        let manual = store
            .create(EntitlementPool::new(owner(), product(), 3, now, now + Duration::days(1)))
            .await
            .unwrap();

        let report = reconciler.reconcile(&owner(), &product()).await.unwrap();
        assert_eq!(report, ReconcileReport::default());
        assert!(store.get(&manual.id).await.unwrap().unwrap().active_subscription);
    }

    #[tokio::test]
    async fn deactivated_pool_is_not_reactivated() {
        let (store, source, reconciler) = setup(vec![subscription("S", 5)]);
        reconciler.reconcile(&owner(), &product()).await.unwrap();
        source.remove(&SubscriptionId::new("S"));
        reconciler.reconcile(&owner(), &product()).await.unwrap();

        source.add(subscription("S", 7));
        reconciler.reconcile(&owner(), &product()).await.unwrap();

        let pools = store.snapshot();
        assert_eq!(pools.len(), 1);
        assert!(!pools[0].active_subscription);
        assert_eq!(pools[0].max_members, 7);
    }

    #[tokio::test]
    async fn unreachable_source_fails_loudly() {
        let (store, source, reconciler) = setup(vec![subscription("S", 5)]);
        source.set_available(false);

        let result = reconciler.reconcile(&owner(), &product()).await;
        assert!(matches!(
            result,
            Err(PoolError::SubscriptionSourceUnavailable { .. })
        ));
        assert!(store.snapshot().is_empty());
    }

    #[tokio::test]
    async fn duplicate_feed_entries_create_one_pool() {
        let (store, _, reconciler) = setup(vec![subscription("S", 5), subscription("S", 5)]);
        let report = reconciler.reconcile(&owner(), &product()).await.unwrap();
        assert_eq!(report.created, 1);
        assert_eq!(store.snapshot().len(), 1);
    }
}
