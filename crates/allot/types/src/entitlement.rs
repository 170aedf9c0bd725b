use crate::ids::EntitlementId;
use crate::model::Consumer;
use crate::pool::EntitlementPool;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A consumer's realized claim against one pool.
///
/// Carries the pool and consumer as they were at grant time.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entitlement {
    pub id: EntitlementId,
    pub pool: EntitlementPool,
    pub consumer: Consumer,
    pub start_date: DateTime<Utc>,
    pub quantity: i64,
}

impl Entitlement {
    pub fn new(pool: EntitlementPool, consumer: Consumer, start_date: DateTime<Utc>) -> Self {
        Self {
            id: EntitlementId::generate(),
            pool,
            consumer,
            start_date,
            quantity: 1,
        }
    }
}
