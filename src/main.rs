//! plan-ledger - subscription plan service
//!
//! Serves the REST API and exposes the scheduler-facing operations
//! (sweep, expiring listing, sweep loop) as subcommands.

use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use tokio::sync::watch;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

use plan_ledger::adapters::http::{self, SubscriptionAppState};
use plan_ledger::adapters::{
    postgres, InMemorySubscriptionStore, PostgresPlanRepository, PostgresSubscriptionReader,
    PostgresSubscriptionStore, SystemClock,
};
use plan_ledger::application::{ExpirationSweeper, PlanCatalog, SubscriptionLedger};
use plan_ledger::config::AppConfig;
use plan_ledger::domain::foundation::{PlanId, Timestamp};
use plan_ledger::domain::subscription::Plan;
use plan_ledger::ports::{Clock, PlanRepository, SubscriptionReader, UnitOfWork};

/// plan-ledger - subscription plan service
#[derive(Parser, Debug)]
#[command(name = "plan-ledger")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Log filter; overrides `server.log_level` (RUST_LOG overrides both)
    #[arg(long, global = true)]
    log_level: Option<String>,

    /// Use the in-memory store instead of PostgreSQL
    #[arg(long, global = true)]
    in_memory: bool,

    /// Plan to seed into the in-memory store, as NAME:DAYS (repeatable)
    #[arg(long = "seed-plan", value_name = "NAME:DAYS", global = true)]
    seed_plans: Vec<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Serve the REST API
    Serve {
        /// Also run the expiration sweeper loop in this process
        #[arg(long)]
        with_sweeper: bool,
    },

    /// Run one expiration sweep and print the report as JSON
    Sweep {
        /// Sweep as of this RFC 3339 instant instead of now
        #[arg(long)]
        at: Option<String>,
    },

    /// Print active subscriptions expiring within a number of days as JSON
    Expiring {
        /// Window in days (defaults to `sweeper.default_expiring_days`)
        #[arg(long)]
        days: Option<u32>,
    },

    /// Run the expiration sweeper loop until interrupted
    RunSweeper,
}

/// Wired application services.
struct Services {
    ledger: Arc<SubscriptionLedger>,
    sweeper: Arc<ExpirationSweeper>,
    clock: Arc<dyn Clock>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = AppConfig::load().context("failed to load configuration")?;
    let validated = if cli.in_memory {
        config.validate_without_database()
    } else {
        config.validate()
    };
    validated.context("invalid configuration")?;

    init_tracing(&config, cli.log_level.as_deref())?;

    let services = build_services(&config, cli.in_memory, &cli.seed_plans).await?;

    match cli.command {
        Commands::Serve { with_sweeper } => serve(&config, services, with_sweeper).await,
        Commands::Sweep { at } => sweep_once(&services, at.as_deref()).await,
        Commands::Expiring { days } => list_expiring(&services, days).await,
        Commands::RunSweeper => run_sweeper(&services).await,
    }
}

fn init_tracing(config: &AppConfig, log_level: Option<&str>) -> Result<()> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => config
            .server
            .log_filter(log_level)
            .context("invalid --log-level")?,
    };

    let registry = tracing_subscriber::registry().with(filter);
    if config.is_production() {
        registry
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().with_target(false))
            .init();
    }
    Ok(())
}

async fn build_services(
    config: &AppConfig,
    in_memory: bool,
    seed_plans: &[String],
) -> Result<Services> {
    let plans: Arc<dyn PlanRepository>;
    let store: Arc<dyn UnitOfWork>;
    let reader: Arc<dyn SubscriptionReader>;

    if in_memory {
        let memory = InMemorySubscriptionStore::new();
        for raw in seed_plans {
            let plan = parse_seed_plan(raw)?;
            tracing::info!(plan_id = %plan.id, name = %plan.name, "seeded plan");
            memory.add_plan(plan);
        }
        plans = Arc::new(memory.clone());
        store = Arc::new(memory.clone());
        reader = Arc::new(memory);
    } else {
        if !seed_plans.is_empty() {
            bail!("--seed-plan only applies to the in-memory store");
        }
        let pool = postgres::connect(&config.database)
            .await
            .context("failed to open database pool")?;
        plans = Arc::new(PostgresPlanRepository::new(pool.clone()));
        store = Arc::new(PostgresSubscriptionStore::new(pool.clone()));
        reader = Arc::new(PostgresSubscriptionReader::new(pool));
    }

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let ledger = SubscriptionLedger::with_config(
        PlanCatalog::new(plans),
        store.clone(),
        reader.clone(),
        clock.clone(),
        config.ledger.to_ledger_config(),
    );
    let sweeper = ExpirationSweeper::with_config(
        store,
        reader,
        clock.clone(),
        config.sweeper.to_sweeper_config(),
    );

    Ok(Services {
        ledger: Arc::new(ledger),
        sweeper: Arc::new(sweeper),
        clock,
    })
}

fn parse_seed_plan(raw: &str) -> Result<Plan> {
    let (name, days) = raw
        .rsplit_once(':')
        .with_context(|| format!("seed plan '{raw}' is not NAME:DAYS"))?;
    let days: u32 = days
        .parse()
        .with_context(|| format!("seed plan '{raw}' has a non-numeric duration"))?;
    Plan::new(PlanId::new(), name, days).with_context(|| format!("seed plan '{raw}' is invalid"))
}

async fn serve(config: &AppConfig, services: Services, with_sweeper: bool) -> Result<()> {
    let addr = config.server.socket_addr();
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let sweeper_task = with_sweeper.then(|| {
        let sweeper = services.sweeper.clone();
        let rx = shutdown_rx.clone();
        tokio::spawn(async move { sweeper.run(rx).await })
    });

    let state = SubscriptionAppState {
        ledger: services.ledger,
        sweeper: services.sweeper,
        clock: services.clock,
    };
    let app = http::router(state, config.server.request_timeout());

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    tracing::info!(%addr, "listening");

    let mut server_shutdown = shutdown_rx.clone();
    tokio::spawn(forward_ctrl_c(shutdown_tx));

    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            let _ = server_shutdown.wait_for(|stop| *stop).await;
        })
        .await
        .context("server error")?;

    if let Some(task) = sweeper_task {
        task.await
            .context("sweeper task panicked")?
            .context("sweeper loop failed")?;
    }
    tracing::info!("shutdown complete");
    Ok(())
}

async fn sweep_once(services: &Services, at: Option<&str>) -> Result<()> {
    let now = match at {
        Some(raw) => Timestamp::parse_rfc3339(raw)
            .with_context(|| format!("'{raw}' is not an RFC 3339 instant"))?,
        None => services.clock.now(),
    };

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(forward_ctrl_c(shutdown_tx));

    let report = services
        .sweeper
        .sweep_interruptible(now, &shutdown_rx)
        .await
        .context("sweep failed")?;
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

async fn list_expiring(services: &Services, days: Option<u32>) -> Result<()> {
    let days = days.unwrap_or(services.sweeper.config().default_expiring_days);
    let subscriptions = services
        .sweeper
        .list_expiring_within(days)
        .await
        .context("failed to list expiring subscriptions")?;
    println!("{}", serde_json::to_string_pretty(&subscriptions)?);
    Ok(())
}

async fn run_sweeper(services: &Services) -> Result<()> {
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(forward_ctrl_c(shutdown_tx));

    services
        .sweeper
        .run(shutdown_rx)
        .await
        .context("sweeper loop failed")
}

async fn forward_ctrl_c(shutdown: watch::Sender<bool>) {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %err, "failed to listen for ctrl-c");
        return;
    }
    tracing::info!("shutdown requested");
    let _ = shutdown.send(true);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn global_flags_follow_the_subcommand() {
        let cli = Cli::try_parse_from([
            "plan-ledger",
            "serve",
            "--log-level",
            "debug",
            "--in-memory",
            "--seed-plan",
            "Monthly:30",
        ])
        .unwrap();

        assert_eq!(cli.log_level.as_deref(), Some("debug"));
        assert!(cli.in_memory);
        assert_eq!(cli.seed_plans, vec!["Monthly:30".to_string()]);
        assert!(matches!(cli.command, Commands::Serve { with_sweeper: false }));
    }

    #[test]
    fn parse_seed_plan_splits_on_last_colon() {
        let plan = parse_seed_plan("Pro: Annual:365").unwrap();
        assert_eq!(plan.name, "Pro: Annual");
        assert_eq!(plan.duration_days, 365);
        assert!(parse_seed_plan("Monthly").is_err());
        assert!(parse_seed_plan("Monthly:soon").is_err());
    }
}
