//! YAML seed data and the in-memory engine built from it.

use allot_policy::{EngineConfig, Entitler, RuleEnforcer};
use allot_pools::memory::{
    InMemoryEntitlementStore, InMemoryPoolStore, InMemoryProductSource,
    InMemorySubscriptionSource,
};
use allot_pools::{PoolCurator, PoolStore};
use allot_rules::{FileRuleSource, RuleLoader, RuleSet, RuleSource};
use allot_types::{
    Consumer, ConsumerId, DateSource, EntitlementPool, Owner, Product, Subscription,
};
use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use tracing::{info, warn};

/// Seed data for the in-memory adapters.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Fixture {
    pub owners: Vec<Owner>,
    pub products: Vec<Product>,
    pub consumers: Vec<Consumer>,
    pub subscriptions: Vec<Subscription>,
    /// Pools that exist before the first reconciliation.
    pub pools: Vec<EntitlementPool>,
}

impl Fixture {
    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("reading fixture {}", path.display()))?;
        Self::from_yaml(&contents).with_context(|| format!("parsing fixture {}", path.display()))
    }

    pub fn from_yaml(contents: &str) -> Result<Self> {
        Ok(serde_yaml::from_str(contents)?)
    }
}

/// The engine wired over in-memory adapters.
pub struct World {
    pub pools: Arc<InMemoryPoolStore>,
    pub curator: Arc<PoolCurator>,
    pub enforcer: Arc<RuleEnforcer>,
    pub entitler: Entitler,
    consumers: HashMap<ConsumerId, Consumer>,
}

impl World {
    pub async fn build(
        fixture: Fixture,
        rules: RuleSet,
        config: &EngineConfig,
        clock: Arc<dyn DateSource>,
    ) -> Result<Self> {
        let known_owners: Vec<_> = fixture.owners.iter().map(|o| o.id.clone()).collect();
        if !known_owners.is_empty() {
            for consumer in &fixture.consumers {
                if !known_owners.contains(&consumer.owner_id) {
                    warn!(consumer = %consumer.id, owner = %consumer.owner_id, "Consumer belongs to an owner missing from the fixture");
                }
            }
        }

        let products = Arc::new(InMemoryProductSource::new());
        for product in fixture.products {
            products.insert(product);
        }

        let pools = Arc::new(InMemoryPoolStore::new());
        for pool in fixture.pools {
            pools.create(pool).await?;
        }

        let subscriptions = Arc::new(InMemorySubscriptionSource::with_subscriptions(
            fixture.subscriptions,
        ));
        let curator = Arc::new(
            PoolCurator::new(pools.clone(), subscriptions)
                .with_reconcile_on_query(config.reconcile_on_query),
        );
        let enforcer = Arc::new(RuleEnforcer::new(
            rules,
            products,
            curator.clone(),
            clock.clone(),
        ));
        let entitler = Entitler::new(
            enforcer.clone(),
            pools.clone(),
            Arc::new(InMemoryEntitlementStore::new()),
            clock,
        );

        let consumers = fixture
            .consumers
            .into_iter()
            .map(|c| (c.id.clone(), c))
            .collect();

        Ok(Self {
            pools,
            curator,
            enforcer,
            entitler,
            consumers,
        })
    }

    pub fn consumer(&self, id: &str) -> Result<&Consumer> {
        self.consumers
            .get(&ConsumerId::new(id))
            .ok_or_else(|| anyhow!("consumer {} is not in the fixture", id))
    }
}

/// Compile the configured rule file, or an empty rule set when none is set.
pub fn load_rules(path: Option<&Path>) -> Result<RuleSet> {
    match path {
        Some(path) => {
            let source = FileRuleSource::new(path);
            RuleLoader::load_from(&source)
                .with_context(|| format!("loading rules from {}", source.describe()))
        }
        None => {
            info!("No rule source configured, using built-in defaults only");
            Ok(RuleSet::empty())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use allot_types::{OwnerId, ProductId, SystemDateSource};

    const FIXTURE: &str = r#"
owners:
  - id: acme
    name: ACME Corp
products:
  - id: monitoring
    name: Monitoring
    attributes:
      sockets: "2"
consumers:
  - id: web-01
    name: web-01
    consumer_type: system
    owner_id: acme
    facts:
      cpu.sockets: "2"
subscriptions:
  - id: sub-1
    owner_id: acme
    product_id: monitoring
    quantity: 10
    start_date: 2026-01-01T00:00:00Z
    end_date: 2027-01-01T00:00:00Z
"#;

    #[test]
    fn test_parse_fixture() {
        let fixture = Fixture::from_yaml(FIXTURE).unwrap();
        assert_eq!(fixture.owners[0].id, OwnerId::new("acme"));
        assert_eq!(fixture.products[0].attributes["sockets"], "2");
        assert_eq!(fixture.consumers[0].facts["cpu.sockets"], "2");
        assert_eq!(fixture.subscriptions[0].quantity, 10);
        assert!(fixture.pools.is_empty());
    }

    #[test]
    fn test_empty_fixture() {
        let fixture = Fixture::from_yaml("{}").unwrap();
        assert!(fixture.products.is_empty());
    }

    #[tokio::test]
    async fn test_world_reconciles_fixture_subscriptions() {
        let fixture = Fixture::from_yaml(FIXTURE).unwrap();
        let world = World::build(
            fixture,
            RuleSet::empty(),
            &EngineConfig::default(),
            Arc::new(SystemDateSource),
        )
        .await
        .unwrap();

        let pools = world
            .curator
            .list_by_owner_and_product(&OwnerId::new("acme"), &ProductId::new("monitoring"))
            .await
            .unwrap();
        assert_eq!(pools.len(), 1);
        assert!(world.consumer("web-01").is_ok());
        assert!(world.consumer("missing").is_err());
    }
}
