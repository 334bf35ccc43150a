//! Flash sale service binary.
//!
//! Startup sequence: load configuration, connect the durable store, run
//! migrations, connect the coordination store, reconcile the derived sale
//! counter, start the hourly sale scheduler, serve HTTP. Shutdown on
//! SIGHUP/SIGINT/SIGTERM/SIGQUIT stops the scheduler and drains in-flight
//! requests.

mod config;
mod scheduler;

use std::path::PathBuf;

use clap::Parser;
use tokio::signal::unix::{signal, SignalKind};
use tokio::sync::watch;
use tracing::{error, info, warn};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use flashsale_core::{Cache, SaleError, SaleStore, SystemClock};
use flashsale_postgres::{PgCheckoutStore, PgSaleStore};
use flashsale_redis::RedisCache;
use flashsale_web::{build_router, AppState};

use config::Config;
use scheduler::SaleScheduler;

/// Drain budget for in-flight requests after a shutdown signal.
const SHUTDOWN_DRAIN: std::time::Duration = std::time::Duration::from_secs(30);

#[derive(Debug, Parser)]
#[command(name = "flashsale-server", about = "Flash sale allocation service")]
struct Args {
    /// Path to the JSON configuration file.
    #[arg(long = "config", default_value = "config.json")]
    config: PathBuf,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "flashsale=info,flashsale_server=info,tower_http=warn".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = Args::parse();
    info!("Starting flash sale service");

    let config = Config::load(&args.config)?;

    info!("Connecting to database...");
    let pool = flashsale_postgres::connect(&config.db.url()).await?;
    flashsale_postgres::run_migrations(&pool, &config.db.migrations_path).await?;

    info!("Connecting to coordination store...");
    let cache = RedisCache::connect(&config.coord.url()).await?;

    let sales = PgSaleStore::new(pool.clone());
    let checkouts = PgCheckoutStore::new(pool);

    reconcile_sale_counter(&sales, &cache).await;

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let scheduler = SaleScheduler::new(
        sales.clone(),
        SystemClock,
        i32::try_from(config.limits.max_items_per_sale).unwrap_or(10_000),
    );
    let scheduler_task = tokio::spawn(scheduler.run(shutdown_rx));

    let state = AppState::new(sales, checkouts, cache, config.limits);
    let app = build_router(state);

    let address = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&address).await?;
    info!(address = %address, "Server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(shutdown_tx))
        .await?;

    if let Err(error) = scheduler_task.await {
        warn!(%error, "Scheduler task ended abnormally");
    }
    info!("Server stopped");
    Ok(())
}

/// Re-derive the active sale's sold counter from the durable store. The
/// coordination counter is advisory and may have drifted across restarts;
/// the durable count wins.
async fn reconcile_sale_counter(sales: &PgSaleStore, cache: &RedisCache) {
    match sales.active_sale().await {
        Ok(sale) => match sales.sold_item_count(&sale.id).await {
            Ok(sold) => {
                if let Err(error) = cache.set_sale_items_sold(&sale.id, sold).await {
                    warn!(%error, sale_id = %sale.id, "Failed to reconcile sale counter");
                } else {
                    info!(sale_id = %sale.id, sold, "Reconciled sale counter from database");
                }
            }
            Err(error) => warn!(%error, sale_id = %sale.id, "Failed to count sold items"),
        },
        Err(SaleError::SaleNotFound) => {}
        Err(error) => warn!(%error, "Failed to look up active sale for reconciliation"),
    }
}

/// Resolve when a termination signal arrives; flips the scheduler shutdown
/// flag and arms a hard exit in case draining exceeds its budget.
async fn shutdown_signal(shutdown_tx: watch::Sender<bool>) {
    let mut hangup = expect_signal(SignalKind::hangup());
    let mut interrupt = expect_signal(SignalKind::interrupt());
    let mut terminate = expect_signal(SignalKind::terminate());
    let mut quit = expect_signal(SignalKind::quit());

    tokio::select! {
        _ = hangup.recv() => info!("Received SIGHUP, shutting down..."),
        _ = interrupt.recv() => info!("Received SIGINT, shutting down..."),
        _ = terminate.recv() => info!("Received SIGTERM, shutting down..."),
        _ = quit.recv() => info!("Received SIGQUIT, shutting down..."),
    }

    let _ = shutdown_tx.send(true);

    // Bound the drain: if in-flight requests outlive the budget, leave anyway.
    tokio::spawn(async {
        tokio::time::sleep(SHUTDOWN_DRAIN).await;
        error!("Shutdown drain budget exceeded, exiting");
        std::process::exit(1);
    });
}

fn expect_signal(kind: SignalKind) -> tokio::signal::unix::Signal {
    match signal(kind) {
        Ok(stream) => stream,
        Err(error) => {
            error!(%error, "Failed to install signal handler");
            std::process::exit(1);
        }
    }
}
