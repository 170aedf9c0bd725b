//! Request-facing pool queries.

use crate::reconcile::PoolReconciler;
use crate::traits::{PoolStore, SubscriptionSource};
use crate::PoolResult;
use allot_types::{Consumer, EntitlementPool, OwnerId, ProductId};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::instrument;

/// Pool queries that reconcile against the subscription feed before
/// reading, so callers never see pools the feed no longer backs as active.
pub struct PoolCurator {
    store: Arc<dyn PoolStore>,
    reconciler: PoolReconciler,
    reconcile_on_query: bool,
    /// Held across reconcile so a new subscription yields exactly one pool.
    reconcile_lock: Mutex<()>,
}

impl PoolCurator {
    pub fn new(store: Arc<dyn PoolStore>, subscriptions: Arc<dyn SubscriptionSource>) -> Self {
        Self {
            reconciler: PoolReconciler::new(store.clone(), subscriptions),
            store,
            reconcile_on_query: true,
            reconcile_lock: Mutex::new(()),
        }
    }

    /// Skip reconciliation on product queries. Only for deployments that
    /// reconcile out of band.
    pub fn with_reconcile_on_query(mut self, enabled: bool) -> Self {
        self.reconcile_on_query = enabled;
        self
    }

    pub fn store(&self) -> &Arc<dyn PoolStore> {
        &self.store
    }

    pub fn reconciler(&self) -> &PoolReconciler {
        &self.reconciler
    }

    /// Every pool for the pair, active or not, in store order.
    #[instrument(skip(self), fields(owner = %owner, product = %product_id))]
    pub async fn list_by_owner_and_product(
        &self,
        owner: &OwnerId,
        product_id: &ProductId,
    ) -> PoolResult<Vec<EntitlementPool>> {
        if self.reconcile_on_query {
            let _guard = self.reconcile_lock.lock().await;
            self.reconciler.reconcile(owner, product_id).await?;
        }
        self.store.list_by_owner_and_product(owner, product_id).await
    }

    pub async fn list_by_owner(&self, owner: &OwnerId) -> PoolResult<Vec<EntitlementPool>> {
        self.store.list_by_owner(owner).await
    }

    /// Active pools of the consumer's owner that the consumer may draw from.
    pub async fn list_available(&self, consumer: &Consumer) -> PoolResult<Vec<EntitlementPool>> {
        let pools = self.store.list_by_owner(&consumer.owner_id).await?;
        Ok(pools
            .into_iter()
            .filter(|p| p.is_active() && p.is_available_to(&consumer.id))
            .collect())
    }
}
