//! Warmup Cycle - one-shot runner for process-based job schedulers.
//!
//! Runs the limit updater and one scheduler cycle, then prints the cycle
//! result as JSON on stdout. Logs go to stderr.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::Utc;
use clap::Parser;
use serde_json::json;
use tracing::{error, info};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use warmup::models::{DomainConfig, PooledAddress};
use warmup::util::ThreadChance;
use warmup::{
    Config, CyclePolicy, LimitUpdater, LogMailer, Mailer, MemoryStore, PgStore, ResendMailer,
    Scheduler, WarmupStore,
};

#[derive(Debug, Parser)]
#[command(name = "warmup-cycle", version, about = "Run one warmup cycle")]
struct Args {
    /// Zero every address's daily send/receive counters and exit
    #[arg(long)]
    reset_daily: bool,

    /// Use an in-memory store and a logging mailer; nothing is sent
    #[arg(long)]
    dry_run: bool,

    /// Domains to seed into the in-memory store (dry run only)
    #[arg(long = "domain", value_name = "DOMAIN", requires = "dry_run")]
    domains: Vec<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().json().flatten_event(true).with_writer(std::io::stderr))
        .init();

    let args = Args::parse();
    let config = Config::from_env();
    if args.dry_run {
        config.validate_settings().context("Invalid configuration")?;
    } else {
        config.validate_cycle().context("Invalid configuration")?;
    }
    info!(dry_run = args.dry_run, reset_daily = args.reset_daily, "cycle_runner_starting");

    let (store, mailer): (Arc<dyn WarmupStore>, Arc<dyn Mailer>) = if args.dry_run {
        (Arc::new(seeded_store(&args.domains).await), Arc::new(LogMailer))
    } else {
        connect(&config).await?
    };

    if args.reset_daily {
        let reset = store
            .reset_daily_counters()
            .await
            .context("Failed to reset daily counters")?;
        info!(addresses = reset, "daily_counters_reset");
        println!("{}", json!({ "success": true, "addressesReset": reset }));
        return Ok(());
    }

    if let Err(e) = LimitUpdater::new(store.clone()).update_limits().await {
        error!(error = %e, "warmup_limit_update_failed");
    }

    let scheduler = Scheduler::new(
        store,
        mailer,
        Arc::new(ThreadChance),
        CyclePolicy::from(&config),
    );
    let result = scheduler.run_cycle().await;

    println!(
        "{}",
        serde_json::to_string(&result).context("Failed to serialize cycle result")?
    );

    if !result.success {
        anyhow::bail!("warmup cycle failed");
    }
    Ok(())
}

async fn connect(config: &Config) -> Result<(Arc<dyn WarmupStore>, Arc<dyn Mailer>)> {
    let database_url = config
        .database_url
        .as_deref()
        .context("DATABASE_URL is not set")?;
    let api_key = config
        .resend_api_key
        .clone()
        .context("RESEND_API_KEY is not set")?;

    let store = PgStore::connect(database_url, config.database_max_connections)
        .await
        .context("Failed to connect to database")?;
    store.migrate().await.context("Failed to run migrations")?;

    let mailer = ResendMailer::new(
        &config.resend_api_url,
        api_key,
        Duration::from_millis(config.request_timeout_ms),
    )
    .context("Failed to create Resend client")?;

    Ok((Arc::new(store), Arc::new(mailer)))
}

/// In-memory pool with two mailboxes per domain, each domain starting today.
async fn seeded_store(domains: &[String]) -> MemoryStore {
    let store = MemoryStore::new();
    let now = Utc::now();
    for domain in domains {
        store
            .insert_domain_config(DomainConfig::starting(domain, now))
            .await;
        for (local, alias) in [("hello", "Hello"), ("team", "Team")] {
            store
                .insert_address(PooledAddress::new(
                    &format!("{local}@{domain}"),
                    domain,
                    alias,
                ))
                .await;
        }
    }
    store
}
