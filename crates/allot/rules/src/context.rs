//! Per-invocation input and output of a rule function.
//!
//! A [`RuleContext`] is built fresh for every dispatch and passed by
//! reference; nothing about an invocation is stored on the rule set. The
//! [`RuleOutcome`] is the only channel through which a rule affects the
//! caller.

use allot_types::{
    PoolId, ProductId, ReadOnlyConsumer, ReadOnlyEntitlement, ReadOnlyPool, ReadOnlyProduct,
    ValidationError, ValidationResult, ValidationWarning,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Immutable snapshot visible to one rule invocation.
#[derive(Clone, Debug)]
pub struct RuleContext {
    now: DateTime<Utc>,
    consumer: Option<ReadOnlyConsumer>,
    product: Option<ReadOnlyProduct>,
    pool: Option<ReadOnlyPool>,
    entitlement: Option<ReadOnlyEntitlement>,
    pools: Vec<ReadOnlyPool>,
}

impl RuleContext {
    /// Context for a pre-entitlement check.
    pub fn pre(
        now: DateTime<Utc>,
        consumer: ReadOnlyConsumer,
        product: ReadOnlyProduct,
        pool: ReadOnlyPool,
    ) -> Self {
        Self {
            now,
            consumer: Some(consumer),
            product: Some(product),
            pool: Some(pool),
            entitlement: None,
            pools: Vec::new(),
        }
    }

    /// Context for a post-entitlement evaluation.
    pub fn post(
        now: DateTime<Utc>,
        consumer: ReadOnlyConsumer,
        product: ReadOnlyProduct,
        entitlement: ReadOnlyEntitlement,
    ) -> Self {
        Self {
            now,
            consumer: Some(consumer),
            product: Some(product),
            pool: None,
            entitlement: Some(entitlement),
            pools: Vec::new(),
        }
    }

    /// Context for choosing among candidate pools.
    pub fn select_pool(
        now: DateTime<Utc>,
        consumer: ReadOnlyConsumer,
        pools: Vec<ReadOnlyPool>,
    ) -> Self {
        Self {
            now,
            consumer: Some(consumer),
            product: None,
            pool: None,
            entitlement: None,
            pools,
        }
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.now
    }

    pub fn consumer(&self) -> Option<&ReadOnlyConsumer> {
        self.consumer.as_ref()
    }

    pub fn product(&self) -> Option<&ReadOnlyProduct> {
        self.product.as_ref()
    }

    pub fn pool(&self) -> Option<&ReadOnlyPool> {
        self.pool.as_ref()
    }

    pub fn entitlement(&self) -> Option<&ReadOnlyEntitlement> {
        self.entitlement.as_ref()
    }

    pub fn pools(&self) -> &[ReadOnlyPool] {
        &self.pools
    }
}

/// A side effect recorded by a post rule for the caller to apply.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum PostAction {
    /// Spawn a pool of `product_id` backed by the new entitlement.
    CreatePool { product_id: ProductId, quantity: i64 },
    /// Free-form bookkeeping entry.
    Record { key: String, value: String },
}

/// Everything a rule reported back.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct RuleOutcome {
    pub validation: ValidationResult,
    pub actions: Vec<PostAction>,
    pub selected: Option<PoolId>,
}

impl RuleOutcome {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_error(&mut self, message: impl Into<String>) {
        self.validation.add_error(ValidationError::new(message));
    }

    pub fn add_warning(&mut self, message: impl Into<String>) {
        self.validation.add_warning(ValidationWarning::new(message));
    }

    pub fn create_pool(&mut self, product_id: ProductId, quantity: i64) {
        self.actions.push(PostAction::CreatePool {
            product_id,
            quantity,
        });
    }

    pub fn record(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.actions.push(PostAction::Record {
            key: key.into(),
            value: value.into(),
        });
    }

    /// Replace the current selection. `None` clears it.
    pub fn select(&mut self, pool_id: Option<PoolId>) {
        self.selected = pool_id;
    }
}
