//! Owners, consumers, products and externally sourced subscriptions.

use crate::ids::{ConsumerId, OwnerId, ProductId, SubscriptionId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Owner {
    pub id: OwnerId,
    pub name: String,
}

impl Owner {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: OwnerId::new(id),
            name: name.into(),
        }
    }
}

/// A system or person that consumes entitlements on behalf of an owner.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Consumer {
    pub id: ConsumerId,
    pub name: String,
    pub consumer_type: String,
    pub owner_id: OwnerId,
    #[serde(default)]
    pub facts: BTreeMap<String, String>,
}

impl Consumer {
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        consumer_type: impl Into<String>,
        owner_id: OwnerId,
    ) -> Self {
        Self {
            id: ConsumerId::new(id),
            name: name.into(),
            consumer_type: consumer_type.into(),
            owner_id,
            facts: BTreeMap::new(),
        }
    }

    pub fn with_fact(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.facts.insert(key.into(), value.into());
        self
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Product {
    pub id: ProductId,
    pub name: String,
    #[serde(default)]
    pub attributes: BTreeMap<String, String>,
}

impl Product {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: ProductId::new(id),
            name: name.into(),
            attributes: BTreeMap::new(),
        }
    }

    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }
}

/// A subscription as reported by the subscription source of record.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subscription {
    pub id: SubscriptionId,
    pub owner_id: OwnerId,
    pub product_id: ProductId,
    pub quantity: i64,
    pub start_date: DateTime<Utc>,
    pub end_date: DateTime<Utc>,
}
