//! Rule-backed policy enforcement.
//!
//! The enforcer builds a fresh [`RuleContext`] for every call and hands it
//! to the rule set by reference, so one enforcer can serve concurrent
//! callers without serializing rule evaluation.

use crate::error::{EnforcerError, EnforcerResult};
use allot_pools::{PoolCurator, ProductSource};
use allot_rules::{Dispatch, Phase, PostAction, RuleContext, RuleLoader, RuleSet, RuleSource};
use allot_types::{
    Consumer, DateSource, Entitlement, EntitlementPool, PoolId, Product, ProductId,
    ReadOnlyConsumer, ReadOnlyEntitlement, ReadOnlyPool, ReadOnlyProduct, ValidationError,
    ValidationResult, ValidationWarning,
};
use async_trait::async_trait;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, instrument, warn};

/// Outcome of a pre-entitlement check.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PreCheckResult {
    /// Function that ran, if any.
    pub function: Option<String>,
    pub validation: ValidationResult,
}

impl PreCheckResult {
    pub fn errors(&self) -> &[ValidationError] {
        &self.validation.errors
    }

    pub fn warnings(&self) -> &[ValidationWarning] {
        &self.validation.warnings
    }

    /// Warnings alone do not block a grant.
    pub fn is_successful(&self) -> bool {
        self.validation.is_successful()
    }
}

/// Effects a post rule recorded. The caller applies them.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PostCheckResult {
    pub function: Option<String>,
    pub actions: Vec<PostAction>,
}

/// How a pool was chosen for a product.
#[derive(Debug, Clone, PartialEq)]
pub enum PoolSelection {
    /// No active pool exists for the consumer's owner and the product.
    NoCandidates,
    /// No selection rule exists; first candidate in query order.
    Default(EntitlementPool),
    /// A selection rule picked this candidate.
    Selected {
        pool: EntitlementPool,
        function: String,
    },
    /// A selection rule returned an id that is not a candidate.
    NoMatch { pool_id: PoolId },
}

impl PoolSelection {
    pub fn into_pool(self) -> Option<EntitlementPool> {
        match self {
            Self::Default(pool) | Self::Selected { pool, .. } => Some(pool),
            Self::NoCandidates | Self::NoMatch { .. } => None,
        }
    }
}

/// Policy enforcement contract exposed to callers.
#[async_trait]
pub trait Enforcer: Send + Sync {
    /// Validate granting `pool` to `consumer`.
    async fn pre(&self, consumer: &Consumer, pool: &EntitlementPool)
        -> EnforcerResult<PreCheckResult>;

    /// Collect side effects of a grant that already happened.
    async fn post(&self, entitlement: &Entitlement) -> EnforcerResult<PostCheckResult>;

    /// Pick the pool to grant `product_id` from.
    async fn select_best_pool(
        &self,
        consumer: &Consumer,
        product_id: &ProductId,
    ) -> EnforcerResult<Option<EntitlementPool>>;
}

/// [`Enforcer`] driven by a compiled [`RuleSet`].
pub struct RuleEnforcer {
    rules: Arc<RuleSet>,
    products: Arc<dyn ProductSource>,
    pools: Arc<PoolCurator>,
    clock: Arc<dyn DateSource>,
}

impl RuleEnforcer {
    pub fn new(
        rules: RuleSet,
        products: Arc<dyn ProductSource>,
        pools: Arc<PoolCurator>,
        clock: Arc<dyn DateSource>,
    ) -> Self {
        Self {
            rules: Arc::new(rules),
            products,
            pools,
            clock,
        }
    }

    /// Load rules from `source` and build the enforcer. Any load failure
    /// is boot-fatal.
    pub fn from_source(
        source: &dyn RuleSource,
        products: Arc<dyn ProductSource>,
        pools: Arc<PoolCurator>,
        clock: Arc<dyn DateSource>,
    ) -> EnforcerResult<Self> {
        let rules = RuleLoader::load_from(source)?;
        Ok(Self::new(rules, products, pools, clock))
    }

    pub fn rules(&self) -> &RuleSet {
        &self.rules
    }

    async fn product(&self, id: &ProductId) -> EnforcerResult<Product> {
        self.products
            .get_product_by_id(id)
            .await?
            .ok_or_else(|| EnforcerError::ProductNotFound(id.clone()))
    }

    /// Choose among the active pools of the consumer's owner for `product_id`,
    /// skipping pools restricted to another consumer.
    #[instrument(skip(self, consumer), fields(consumer = %consumer.id, product = %product_id))]
    pub async fn select_pool(
        &self,
        consumer: &Consumer,
        product_id: &ProductId,
    ) -> EnforcerResult<PoolSelection> {
        let mut candidates: Vec<EntitlementPool> = self
            .pools
            .list_by_owner_and_product(&consumer.owner_id, product_id)
            .await?
            .into_iter()
            .filter(|pool| pool.is_active() && pool.is_available_to(&consumer.id))
            .collect();

        if candidates.is_empty() {
            debug!("No candidate pools");
            return Ok(PoolSelection::NoCandidates);
        }

        let now = self.clock.now();
        let index: HashMap<PoolId, usize> = candidates
            .iter()
            .enumerate()
            .map(|(i, pool)| (pool.id.clone(), i))
            .collect();
        let views = candidates.iter().map(|p| ReadOnlyPool::new(p, now)).collect();
        let ctx = RuleContext::select_pool(now, ReadOnlyConsumer::from(consumer), views);

        match self.rules.invoke(Phase::SelectPool, product_id, &ctx)? {
            Dispatch::NotFound => {
                debug!(pool = %candidates[0].id, "No selection rule, using first candidate");
                Ok(PoolSelection::Default(candidates.swap_remove(0)))
            }
            Dispatch::Invoked { function, outcome } => {
                let pool_id = outcome.selected.ok_or_else(|| EnforcerError::SelectionContract {
                    function: function.clone(),
                    product_id: product_id.clone(),
                })?;
                match index.get(&pool_id) {
                    Some(&i) => Ok(PoolSelection::Selected {
                        pool: candidates.swap_remove(i),
                        function,
                    }),
                    None => {
                        warn!(pool = %pool_id, function = %function, "Selected pool is not a candidate");
                        Ok(PoolSelection::NoMatch { pool_id })
                    }
                }
            }
        }
    }
}

#[async_trait]
impl Enforcer for RuleEnforcer {
    #[instrument(skip(self, consumer, pool), fields(consumer = %consumer.id, pool = %pool.id))]
    async fn pre(
        &self,
        consumer: &Consumer,
        pool: &EntitlementPool,
    ) -> EnforcerResult<PreCheckResult> {
        let product = self.product(&pool.product_id).await?;
        let now = self.clock.now();
        let ctx = RuleContext::pre(
            now,
            ReadOnlyConsumer::from(consumer),
            ReadOnlyProduct::from(&product),
            ReadOnlyPool::new(pool, now),
        );

        let mut result = match self.rules.invoke(Phase::Pre, &pool.product_id, &ctx)? {
            Dispatch::Invoked { function, outcome } => PreCheckResult {
                function: Some(function),
                validation: outcome.validation,
            },
            Dispatch::NotFound => PreCheckResult::default(),
        };

        // Applies whether or not a rule ran.
        if pool.is_expired(now) {
            result.validation.add_error(ValidationError::new(format!(
                "Entitlements for {} expired on: {}",
                pool.product_id, pool.end_date
            )));
        }

        debug!(
            errors = result.validation.errors.len(),
            warnings = result.validation.warnings.len(),
            "Pre-check complete"
        );
        Ok(result)
    }

    #[instrument(skip(self, entitlement), fields(entitlement = %entitlement.id))]
    async fn post(&self, entitlement: &Entitlement) -> EnforcerResult<PostCheckResult> {
        let product = self.product(&entitlement.pool.product_id).await?;
        let ctx = RuleContext::post(
            self.clock.now(),
            ReadOnlyConsumer::from(&entitlement.consumer),
            ReadOnlyProduct::from(&product),
            ReadOnlyEntitlement::from(entitlement),
        );

        match self
            .rules
            .invoke(Phase::Post, &entitlement.pool.product_id, &ctx)?
        {
            Dispatch::Invoked { function, outcome } => Ok(PostCheckResult {
                function: Some(function),
                actions: outcome.actions,
            }),
            Dispatch::NotFound => Ok(PostCheckResult::default()),
        }
    }

    async fn select_best_pool(
        &self,
        consumer: &Consumer,
        product_id: &ProductId,
    ) -> EnforcerResult<Option<EntitlementPool>> {
        Ok(self.select_pool(consumer, product_id).await?.into_pool())
    }
}
