//! Grant orchestration: select, check, consume capacity, apply post effects.

use crate::enforcer::{Enforcer, PostCheckResult};
use crate::error::{EnforcerError, EnforcerResult};
use allot_pools::{EntitlementStore, PoolStore};
use allot_rules::PostAction;
use allot_types::{
    Consumer, DateSource, Entitlement, EntitlementId, EntitlementPool, PoolId, ProductId,
    ValidationError, ValidationWarning,
};
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, instrument};

/// Result of one grant attempt.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum EntitleOutcome {
    Granted {
        entitlement: Entitlement,
        /// Pools created by post rules, restricted to the consumer.
        spawned_pools: Vec<EntitlementPool>,
        warnings: Vec<ValidationWarning>,
        post: PostCheckResult,
    },
    Rejected {
        pool_id: PoolId,
        errors: Vec<ValidationError>,
        warnings: Vec<ValidationWarning>,
    },
    NoPool {
        product_id: ProductId,
    },
}

impl EntitleOutcome {
    pub fn is_granted(&self) -> bool {
        matches!(self, Self::Granted { .. })
    }
}

/// Result of revoking an entitlement.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RevokeReport {
    pub entitlement: Entitlement,
    /// Spawned pools marked inactive.
    pub deactivated_pools: Vec<PoolId>,
}

pub struct Entitler {
    enforcer: Arc<dyn Enforcer>,
    pools: Arc<dyn PoolStore>,
    entitlements: Arc<dyn EntitlementStore>,
    clock: Arc<dyn DateSource>,
    /// Serializes the capacity read-check-write so concurrent grants cannot
    /// overrun a limited pool.
    grant_lock: Mutex<()>,
}

impl Entitler {
    pub fn new(
        enforcer: Arc<dyn Enforcer>,
        pools: Arc<dyn PoolStore>,
        entitlements: Arc<dyn EntitlementStore>,
        clock: Arc<dyn DateSource>,
    ) -> Self {
        Self {
            enforcer,
            pools,
            entitlements,
            clock,
            grant_lock: Mutex::new(()),
        }
    }

    /// Grant one entitlement of `product_id` to `consumer`.
    #[instrument(skip(self, consumer), fields(consumer = %consumer.id, product = %product_id))]
    pub async fn entitle(
        &self,
        consumer: &Consumer,
        product_id: &ProductId,
    ) -> EnforcerResult<EntitleOutcome> {
        let pool = match self.enforcer.select_best_pool(consumer, product_id).await? {
            Some(pool) => pool,
            None => {
                debug!("No pool to grant from");
                return Ok(EntitleOutcome::NoPool {
                    product_id: product_id.clone(),
                });
            }
        };

        let pre = self.enforcer.pre(consumer, &pool).await?;
        if !pre.is_successful() {
            info!(pool = %pool.id, errors = pre.validation.errors.len(), "Grant rejected");
            return Ok(EntitleOutcome::Rejected {
                pool_id: pool.id,
                errors: pre.validation.errors,
                warnings: pre.validation.warnings,
            });
        }

        let entitlement = {
            let _guard = self.grant_lock.lock().await;
            let mut live = self
                .pools
                .get(&pool.id)
                .await?
                .ok_or_else(|| EnforcerError::PoolNotFound(pool.id.clone()))?;

            if !live.entitlements_available() {
                return Ok(EntitleOutcome::Rejected {
                    pool_id: live.id,
                    errors: vec![ValidationError::new(format!(
                        "No free entitlements available for product {}",
                        product_id
                    ))],
                    warnings: pre.validation.warnings,
                });
            }

            live.bump_current_members();
            let live = self.pools.merge(live).await?;
            self.entitlements
                .create(Entitlement::new(live, consumer.clone(), self.clock.now()))
                .await?
        };

        let post = self.enforcer.post(&entitlement).await?;
        let spawned_pools = self.apply_post_actions(&entitlement, &post).await?;

        info!(
            entitlement = %entitlement.id,
            pool = %entitlement.pool.id,
            spawned = spawned_pools.len(),
            "Entitlement granted"
        );
        Ok(EntitleOutcome::Granted {
            entitlement,
            spawned_pools,
            warnings: pre.validation.warnings,
            post,
        })
    }

    async fn apply_post_actions(
        &self,
        entitlement: &Entitlement,
        post: &PostCheckResult,
    ) -> EnforcerResult<Vec<EntitlementPool>> {
        let mut spawned = Vec::new();
        for action in &post.actions {
            match action {
                PostAction::CreatePool {
                    product_id,
                    quantity,
                } => {
                    let source = &entitlement.pool;
                    let mut pool = EntitlementPool::new(
                        source.owner_id.clone(),
                        product_id.clone(),
                        *quantity,
                        entitlement.start_date,
                        source.end_date,
                    );
                    pool.consumer_id = Some(entitlement.consumer.id.clone());
                    pool.source_entitlement = Some(entitlement.id.clone());
                    spawned.push(self.pools.create(pool).await?);
                }
                PostAction::Record { key, value } => {
                    debug!(entitlement = %entitlement.id, %key, %value, "Post rule record");
                }
            }
        }
        Ok(spawned)
    }

    /// Remove an entitlement and deactivate the pools it spawned. Consumed
    /// capacity on the source pool is not returned.
    #[instrument(skip(self))]
    pub async fn revoke(&self, entitlement_id: &EntitlementId) -> EnforcerResult<RevokeReport> {
        let entitlement = self
            .entitlements
            .remove(entitlement_id)
            .await?
            .ok_or_else(|| EnforcerError::EntitlementNotFound(entitlement_id.clone()))?;

        let mut deactivated_pools = Vec::new();
        for mut pool in self.pools.list_by_source_entitlement(entitlement_id).await? {
            if !pool.active_subscription {
                continue;
            }
            pool.active_subscription = false;
            deactivated_pools.push(self.pools.merge(pool).await?.id);
        }

        info!(deactivated = deactivated_pools.len(), "Entitlement revoked");
        Ok(RevokeReport {
            entitlement,
            deactivated_pools,
        })
    }
}
