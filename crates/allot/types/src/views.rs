//! Read-only snapshots handed to rule evaluation.
//!
//! Each view copies the fields a rule may read and nothing else. There are
//! no setters and no handles back to storage, so a rule can only influence
//! the outside world through the outcome it returns.

use crate::entitlement::Entitlement;
use crate::ids::{ConsumerId, EntitlementId, OwnerId, PoolId, ProductId, SubscriptionId};
use crate::model::{Consumer, Product};
use crate::pool::EntitlementPool;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ReadOnlyConsumer {
    id: ConsumerId,
    name: String,
    consumer_type: String,
    owner_id: OwnerId,
    facts: BTreeMap<String, String>,
}

impl ReadOnlyConsumer {
    pub fn id(&self) -> &ConsumerId {
        &self.id
    }
    pub fn name(&self) -> &str {
        &self.name
    }
    pub fn consumer_type(&self) -> &str {
        &self.consumer_type
    }
    pub fn owner_id(&self) -> &OwnerId {
        &self.owner_id
    }
    pub fn facts(&self) -> &BTreeMap<String, String> {
        &self.facts
    }
    pub fn fact(&self, key: &str) -> Option<&str> {
        self.facts.get(key).map(String::as_str)
    }
}

impl From<&Consumer> for ReadOnlyConsumer {
    fn from(consumer: &Consumer) -> Self {
        Self {
            id: consumer.id.clone(),
            name: consumer.name.clone(),
            consumer_type: consumer.consumer_type.clone(),
            owner_id: consumer.owner_id.clone(),
            facts: consumer.facts.clone(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ReadOnlyProduct {
    id: ProductId,
    name: String,
    attributes: BTreeMap<String, String>,
}

impl ReadOnlyProduct {
    pub fn id(&self) -> &ProductId {
        &self.id
    }
    pub fn name(&self) -> &str {
        &self.name
    }
    pub fn attributes(&self) -> &BTreeMap<String, String> {
        &self.attributes
    }
    pub fn attribute(&self, key: &str) -> Option<&str> {
        self.attributes.get(key).map(String::as_str)
    }
}

impl From<&Product> for ReadOnlyProduct {
    fn from(product: &Product) -> Self {
        Self {
            id: product.id.clone(),
            name: product.name.clone(),
            attributes: product.attributes.clone(),
        }
    }
}

/// Pool snapshot. Equality is by identifier only, which is what pool
/// selection matches on.
#[derive(Clone, Debug, Serialize)]
pub struct ReadOnlyPool {
    id: PoolId,
    owner_id: OwnerId,
    product_id: ProductId,
    consumer_id: Option<ConsumerId>,
    subscription_id: Option<SubscriptionId>,
    source_entitlement: Option<EntitlementId>,
    active: bool,
    max_members: i64,
    current_members: i64,
    unlimited: bool,
    available: bool,
    expired: bool,
    start_date: DateTime<Utc>,
    end_date: DateTime<Utc>,
    attributes: BTreeMap<String, String>,
}

impl ReadOnlyPool {
    /// Snapshot `pool` as seen at `now`.
    pub fn new(pool: &EntitlementPool, now: DateTime<Utc>) -> Self {
        Self {
            id: pool.id.clone(),
            owner_id: pool.owner_id.clone(),
            product_id: pool.product_id.clone(),
            consumer_id: pool.consumer_id.clone(),
            subscription_id: pool.subscription_id.clone(),
            source_entitlement: pool.source_entitlement.clone(),
            active: pool.is_active(),
            max_members: pool.max_members,
            current_members: pool.current_members,
            unlimited: pool.is_unlimited(),
            available: pool.entitlements_available(),
            expired: pool.is_expired(now),
            start_date: pool.start_date,
            end_date: pool.end_date,
            attributes: pool.attributes.clone(),
        }
    }

    pub fn id(&self) -> &PoolId {
        &self.id
    }
    pub fn owner_id(&self) -> &OwnerId {
        &self.owner_id
    }
    pub fn product_id(&self) -> &ProductId {
        &self.product_id
    }
    pub fn consumer_id(&self) -> Option<&ConsumerId> {
        self.consumer_id.as_ref()
    }
    pub fn subscription_id(&self) -> Option<&SubscriptionId> {
        self.subscription_id.as_ref()
    }
    pub fn source_entitlement(&self) -> Option<&EntitlementId> {
        self.source_entitlement.as_ref()
    }
    pub fn is_active(&self) -> bool {
        self.active
    }
    pub fn max_members(&self) -> i64 {
        self.max_members
    }
    pub fn current_members(&self) -> i64 {
        self.current_members
    }
    pub fn is_unlimited(&self) -> bool {
        self.unlimited
    }
    pub fn entitlements_available(&self) -> bool {
        self.available
    }
    pub fn is_expired(&self) -> bool {
        self.expired
    }
    pub fn start_date(&self) -> DateTime<Utc> {
        self.start_date
    }
    pub fn end_date(&self) -> DateTime<Utc> {
        self.end_date
    }
    pub fn attributes(&self) -> &BTreeMap<String, String> {
        &self.attributes
    }
}

impl PartialEq for ReadOnlyPool {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for ReadOnlyPool {}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ReadOnlyEntitlement {
    id: EntitlementId,
    pool_id: PoolId,
    product_id: ProductId,
    consumer_id: ConsumerId,
    start_date: DateTime<Utc>,
    quantity: i64,
}

impl ReadOnlyEntitlement {
    pub fn id(&self) -> &EntitlementId {
        &self.id
    }
    pub fn pool_id(&self) -> &PoolId {
        &self.pool_id
    }
    pub fn product_id(&self) -> &ProductId {
        &self.product_id
    }
    pub fn consumer_id(&self) -> &ConsumerId {
        &self.consumer_id
    }
    pub fn start_date(&self) -> DateTime<Utc> {
        self.start_date
    }
    pub fn quantity(&self) -> i64 {
        self.quantity
    }
}

impl From<&Entitlement> for ReadOnlyEntitlement {
    fn from(entitlement: &Entitlement) -> Self {
        Self {
            id: entitlement.id.clone(),
            pool_id: entitlement.pool.id.clone(),
            product_id: entitlement.pool.product_id.clone(),
            consumer_id: entitlement.consumer.id.clone(),
            start_date: entitlement.start_date,
            quantity: entitlement.quantity,
        }
    }
}
