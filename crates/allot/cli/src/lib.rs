//! Allot CLI - run entitlement policy against fixture data
//!
//! Loads the engine configuration, a rule file and a YAML fixture into the
//! in-memory adapters, then runs one operation and prints the result as
//! JSON:
//! - `check-rules`: compile the rule file and list its functions
//! - `reconcile`: sync pools of an owner/product with the fixture's subscriptions
//! - `select`: pick the best pool for a consumer and product
//! - `pre`: run the pre-entitlement check for a consumer and pool
//! - `entitle`: grant one or more entitlements

#![deny(unsafe_code)]
#![cfg_attr(feature = "strict-docs", warn(missing_docs))]
#![cfg_attr(not(feature = "strict-docs"), allow(missing_docs))]
#![warn(rust_2018_idioms)]

use allot_policy::{EngineConfig, Enforcer, PoolSelection};
use allot_pools::PoolStore;
use allot_types::{DateSource, FixedDateSource, OwnerId, PoolId, ProductId, SystemDateSource};
use anyhow::{anyhow, Result};
use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use serde::Serialize;
use serde_json::json;
use std::ffi::OsString;
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod fixture;

pub use fixture::{load_rules, Fixture, World};

/// Allot CLI application
#[derive(Parser)]
#[command(name = "allot")]
#[command(about = "Allot - entitlement pool policy enforcement", long_about = None)]
#[command(version)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, env = "ALLOT_CONFIG")]
    config: Option<PathBuf>,

    /// Rule source file (overrides the config file)
    #[arg(short, long, env = "ALLOT_RULES")]
    rules: Option<PathBuf>,

    /// YAML fixture with products, consumers, subscriptions and pools
    #[arg(short, long, env = "ALLOT_FIXTURE")]
    fixture: Option<PathBuf>,

    /// Evaluate as of this instant (RFC 3339) instead of the system clock
    #[arg(long)]
    now: Option<DateTime<Utc>>,

    /// Serve queries from the local store without reconciling
    #[arg(long)]
    no_reconcile: bool,

    /// Enable verbose output
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

/// Available commands
#[derive(Subcommand)]
enum Commands {
    /// Compile the rule source and list its functions
    CheckRules,

    /// Reconcile pools for an owner and product
    Reconcile {
        #[arg(long)]
        owner: String,
        #[arg(long)]
        product: String,
    },

    /// Select the best pool for a consumer and product
    Select {
        #[arg(long)]
        consumer: String,
        #[arg(long)]
        product: String,
    },

    /// Run the pre-entitlement check
    Pre {
        #[arg(long)]
        consumer: String,
        #[arg(long)]
        pool: String,
    },

    /// Grant entitlements
    Entitle {
        #[arg(long)]
        consumer: String,
        #[arg(long)]
        product: String,
        /// Number of grants to attempt
        #[arg(long, default_value = "1")]
        count: u32,
    },
}

/// Run using the current process arguments.
pub async fn run() -> Result<()> {
    run_with_args(std::env::args_os()).await
}

/// Run using the provided argument iterator.
pub async fn run_with_args<I, T>(args: I) -> Result<()>
where
    I: IntoIterator<Item = T>,
    T: Into<OsString> + Clone,
{
    let cli = Cli::parse_from(args);

    let mut config = EngineConfig::load(cli.config.as_deref())?;
    if let Some(rules) = cli.rules {
        config.rules_path = Some(rules);
    }
    if let Some(fixture) = cli.fixture {
        config.fixture_path = Some(fixture);
    }
    if cli.no_reconcile {
        config.reconcile_on_query = false;
    }

    // Initialize tracing
    let filter = if cli.verbose {
        "debug".to_string()
    } else {
        config.log_filter.clone()
    };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| filter.into()),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .without_time()
                .with_writer(std::io::stderr),
        )
        .try_init()
        .ok();

    let rules = load_rules(config.rules_path.as_deref())?;

    if let Commands::CheckRules = cli.command {
        let path = config
            .rules_path
            .as_ref()
            .ok_or_else(|| anyhow!("no rule source configured; pass --rules or set rules_path"))?;
        return print_json(&json!({
            "source": path.display().to_string(),
            "functions": rules.function_names(),
        }));
    }

    let fixture = match &config.fixture_path {
        Some(path) => Fixture::load(path)?,
        None => Fixture::default(),
    };
    let clock: Arc<dyn DateSource> = match cli.now {
        Some(now) => Arc::new(FixedDateSource::new(now)),
        None => Arc::new(SystemDateSource),
    };
    let world = World::build(fixture, rules, &config, clock).await?;

    match cli.command {
        Commands::CheckRules => Ok(()),
        Commands::Reconcile { owner, product } => {
            let owner = OwnerId::new(owner);
            let product = ProductId::new(product);
            let report = world.curator.reconciler().reconcile(&owner, &product).await?;
            let pools = world.pools.list_by_owner_and_product(&owner, &product).await?;
            print_json(&json!({ "report": report, "pools": pools }))
        }
        Commands::Select { consumer, product } => {
            let consumer = world.consumer(&consumer)?;
            let selection = world
                .enforcer
                .select_pool(consumer, &ProductId::new(product))
                .await?;
            print_json(&SelectionView::from(selection))
        }
        Commands::Pre { consumer, pool } => {
            let consumer = world.consumer(&consumer)?;
            let pool_id = PoolId::new(pool);
            let pool = world
                .pools
                .get(&pool_id)
                .await?
                .ok_or_else(|| anyhow!("pool {} not found", pool_id))?;
            let result = world.enforcer.pre(consumer, &pool).await?;
            print_json(&json!({
                "successful": result.is_successful(),
                "result": result,
            }))
        }
        Commands::Entitle {
            consumer,
            product,
            count,
        } => {
            let consumer = world.consumer(&consumer)?;
            let product = ProductId::new(product);
            let mut outcomes = Vec::with_capacity(count as usize);
            for _ in 0..count {
                outcomes.push(world.entitler.entitle(consumer, &product).await?);
            }
            print_json(&outcomes)
        }
    }
}

/// JSON shape of a pool selection.
#[derive(Serialize)]
#[serde(tag = "selection", rename_all = "snake_case")]
enum SelectionView {
    NoCandidates,
    Default {
        pool: allot_types::EntitlementPool,
    },
    Selected {
        pool: allot_types::EntitlementPool,
        function: String,
    },
    NoMatch {
        pool_id: PoolId,
    },
}

impl From<PoolSelection> for SelectionView {
    fn from(selection: PoolSelection) -> Self {
        match selection {
            PoolSelection::NoCandidates => Self::NoCandidates,
            PoolSelection::Default(pool) => Self::Default { pool },
            PoolSelection::Selected { pool, function } => Self::Selected { pool, function },
            PoolSelection::NoMatch { pool_id } => Self::NoMatch { pool_id },
        }
    }
}

fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
