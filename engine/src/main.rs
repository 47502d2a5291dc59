//! Farm Ledger maintenance CLI
//!
//! Runs migrations and prints ledger reports as JSON against the configured
//! PostgreSQL database.

use std::sync::Arc;

use anyhow::Context;
use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use serde::Serialize;
use shared::{DateRange, ValuationGroupBy};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use farm_stock_ledger::{Config, Engine, LedgerError, PgStore};

#[derive(Parser)]
#[command(name = "farm-ledger")]
#[command(about = "Maintenance and reporting tool for the farm stock ledger")]
#[command(version)]
struct Cli {
    /// Overrides database.url from configuration
    #[arg(long)]
    database_url: Option<String>,

    /// Log as JSON lines
    #[arg(long)]
    json_logs: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Apply pending schema migrations
    Migrate,

    /// Show the stock level of an item (id or SKU)
    Stock { item: String },

    /// List items at or below their reorder threshold
    LowStock,

    /// List batches expiring within a horizon
    Expiring {
        /// Days ahead (default from configuration)
        #[arg(long)]
        days: Option<i64>,
    },

    /// Value of stock on hand
    Valuation {
        /// none, item or category
        #[arg(long, default_value = "none")]
        group_by: ValuationGroupBy,
    },

    /// Stock consumed per module over a date range
    Consumption {
        #[arg(long)]
        module: Option<String>,

        /// First day, YYYY-MM-DD
        #[arg(long)]
        from: NaiveDate,

        /// Last day, YYYY-MM-DD (inclusive)
        #[arg(long)]
        to: NaiveDate,
    },

    /// Receipt and every movement of one batch
    Lifecycle { batch_id: i64 },

    /// Replay an item's ledger and check it against stored quantities
    Audit { item: String },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    let mut config = Config::load().context("failed to load configuration")?;

    // Initialize tracing
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.logging.filter.clone()));
    if cli.json_logs || config.logging.json {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init();
    }

    if let Some(url) = cli.database_url {
        config.database.url = url;
    }

    tracing::info!("Environment: {}", config.environment);
    tracing::info!("Connecting to database...");
    let store = PgStore::connect(&config.database, config.storage.clone()).await?;

    if let Commands::Migrate = cli.command {
        tracing::info!("Running database migrations...");
        store.migrate().await?;
        tracing::info!("Migrations completed");
        return Ok(());
    }

    let engine = Engine::new(Arc::new(store), config.ledger.clone());

    match cli.command {
        Commands::Migrate => {}
        Commands::Stock { item } => {
            let item_id = resolve_item(&engine, &item).await?;
            print_json(&engine.ledger.stock_level(item_id).await?)?;
        }
        Commands::LowStock => print_json(&engine.reports.low_stock_items().await?)?,
        Commands::Expiring { days } => print_json(&engine.reports.expiring_items(days).await?)?,
        Commands::Valuation { group_by } => {
            print_json(&engine.reports.inventory_valuation(group_by).await?)?
        }
        Commands::Consumption { module, from, to } => {
            let report = engine
                .reports
                .consumption_by_module(module.as_deref(), DateRange::new(from, to))
                .await?;
            print_json(&report)?;
        }
        Commands::Lifecycle { batch_id } => {
            print_json(&engine.ledger.batch_lifecycle(batch_id).await?)?
        }
        Commands::Audit { item } => {
            let item_id = resolve_item(&engine, &item).await?;
            let audit = engine.ledger.audit_item(item_id).await?;
            print_json(&audit)?;
            if !audit.is_consistent {
                anyhow::bail!("ledger for item {} is inconsistent", item_id);
            }
        }
    }

    Ok(())
}

/// Accept a numeric id or a SKU
async fn resolve_item(engine: &Engine, item: &str) -> anyhow::Result<i64> {
    if let Ok(id) = item.parse::<i64>() {
        return Ok(id);
    }
    let found = engine.catalog.find_item_by_sku(item).await?;
    found
        .map(|i| i.id)
        .ok_or_else(|| LedgerError::not_found(format!("Item with SKU {}", item)).into())
}

fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
