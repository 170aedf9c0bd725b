//! Entitlement pools and their capacity bookkeeping.

use crate::ids::{ConsumerId, EntitlementId, OwnerId, PoolId, ProductId, SubscriptionId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A capacity grant of one product's entitlements for one owner.
///
/// `max_members < 0` means the pool is unlimited. `current_members` only
/// grows through [`EntitlementPool::bump_current_members`]; reconciliation is
/// the only other writer of capacity fields.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntitlementPool {
    pub id: PoolId,
    pub owner_id: OwnerId,
    /// Set when the pool may only be consumed by one consumer.
    #[serde(default)]
    pub consumer_id: Option<ConsumerId>,
    pub active_subscription: bool,
    #[serde(default)]
    pub subscription_id: Option<SubscriptionId>,
    /// The entitlement whose grant spawned this pool, if any.
    #[serde(default)]
    pub source_entitlement: Option<EntitlementId>,
    pub max_members: i64,
    pub current_members: i64,
    pub start_date: DateTime<Utc>,
    pub end_date: DateTime<Utc>,
    pub product_id: ProductId,
    #[serde(default)]
    pub attributes: BTreeMap<String, String>,
}

impl EntitlementPool {
    /// A fresh, active pool with no members.
    pub fn new(
        owner_id: OwnerId,
        product_id: ProductId,
        max_members: i64,
        start_date: DateTime<Utc>,
        end_date: DateTime<Utc>,
    ) -> Self {
        Self {
            id: PoolId::generate(),
            owner_id,
            consumer_id: None,
            active_subscription: true,
            subscription_id: None,
            source_entitlement: None,
            max_members,
            current_members: 0,
            start_date,
            end_date,
            product_id,
            attributes: BTreeMap::new(),
        }
    }

    pub fn with_id(mut self, id: PoolId) -> Self {
        self.id = id;
        self
    }

    pub fn with_subscription(mut self, subscription_id: SubscriptionId) -> Self {
        self.subscription_id = Some(subscription_id);
        self
    }

    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }

    pub fn is_unlimited(&self) -> bool {
        self.max_members < 0
    }

    pub fn entitlements_available(&self) -> bool {
        self.is_unlimited() || self.current_members < self.max_members
    }

    /// Strictly after the end date; the end instant itself is still valid.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.end_date < now
    }

    pub fn is_active(&self) -> bool {
        self.active_subscription
    }

    /// A pool restricted to one consumer is invisible to every other.
    pub fn is_available_to(&self, consumer: &ConsumerId) -> bool {
        self.consumer_id.as_ref().map_or(true, |id| id == consumer)
    }

    pub fn bump_current_members(&mut self) {
        self.current_members += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use proptest::prelude::*;

    fn pool(max_members: i64, current_members: i64) -> EntitlementPool {
        let now = Utc::now();
        let mut pool = EntitlementPool::new(
            OwnerId::new("acme"),
            ProductId::new("monitoring"),
            max_members,
            now - Duration::days(1),
            now + Duration::days(30),
        );
        pool.current_members = current_members;
        pool
    }

    #[test]
    fn test_new_pool_is_active_and_empty() {
        let pool = pool(5, 0);
        assert!(pool.is_active());
        assert_eq!(pool.current_members, 0);
        assert!(pool.subscription_id.is_none());
        assert!(pool.id.as_str().starts_with("pool-"));
    }

    #[test]
    fn test_restricted_pool_only_serves_its_consumer() {
        let open = pool(5, 0);
        assert!(open.is_available_to(&ConsumerId::new("anyone")));

        let mut restricted = pool(5, 0);
        restricted.consumer_id = Some(ConsumerId::new("host-1"));
        assert!(restricted.is_available_to(&ConsumerId::new("host-1")));
        assert!(!restricted.is_available_to(&ConsumerId::new("host-2")));
    }

    #[test]
    fn test_full_pool_has_no_entitlements() {
        assert!(!pool(1, 1).entitlements_available());
    }

    #[test]
    fn test_bump_consumes_capacity() {
        let mut pool = pool(2, 0);
        pool.bump_current_members();
        assert!(pool.entitlements_available());
        pool.bump_current_members();
        assert!(!pool.entitlements_available());
        assert_eq!(pool.current_members, 2);
    }

    #[test]
    fn test_expiration_boundary() {
        let pool = pool(5, 0);
        assert!(!pool.is_expired(pool.end_date));
        assert!(pool.is_expired(pool.end_date + Duration::milliseconds(1)));
        assert!(!pool.is_expired(pool.end_date - Duration::days(1)));
    }

    #[test]
    fn test_pool_serialization_defaults() {
        let pool = pool(3, 1).with_attribute("virt_only", "true");
        let json = serde_json::to_string(&pool).unwrap();
        let back: EntitlementPool = serde_json::from_str(&json).unwrap();
        assert_eq!(back, pool);
    }

    proptest! {
        #[test]
        fn property_unlimited_pools_always_available(
            max in i64::MIN..0i64,
            current in 0i64..i64::MAX,
        ) {
            prop_assert!(pool(max, current).entitlements_available());
        }

        #[test]
        fn property_limited_pools_available_below_max(
            max in 0i64..10_000,
            current in 0i64..10_000,
        ) {
            prop_assert_eq!(pool(max, current).entitlements_available(), current < max);
        }

        #[test]
        fn property_expired_iff_after_end(offset_secs in -100_000i64..100_000) {
            let pool = pool(1, 0);
            let now = pool.end_date + Duration::seconds(offset_secs);
            prop_assert_eq!(pool.is_expired(now), offset_secs > 0);
        }
    }
}
