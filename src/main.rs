//! transfer_gateway - money transfer service
//!
//! Resolves recipients by card, phone or account number, commits transfers
//! atomically and fans the resulting events out to the projection queues.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use transfer_gateway::api::{self, AppState};
use transfer_gateway::broker::{FanoutTopology, PgBroker, TransferEventPublisher};
use transfer_gateway::crypto::SivCipher;
use transfer_gateway::db;
use transfer_gateway::jobs::{JobScheduler, JobSchedulerConfig};
use transfer_gateway::ledger::PgStore;
use transfer_gateway::{Config, LogFormat};

/// Initialize tracing/logging
fn init_tracing(format: LogFormat) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "transfer_gateway=debug,tower_http=debug".into());

    let registry = tracing_subscriber::registry().with(filter);
    match format {
        LogFormat::Json => registry.with(tracing_subscriber::fmt::layer().json()).init(),
        LogFormat::Pretty => registry.with(tracing_subscriber::fmt::layer()).init(),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    // Load configuration
    let config = Config::from_env()?;
    init_tracing(config.log_format);

    let addr: SocketAddr = format!("{}:{}", config.host, config.port).parse()?;

    tracing::info!(environment = %config.environment, "Starting transfer_gateway server");
    tracing::debug!(config = ?config, "Configuration loaded");

    // Ledger store
    let pool = db::connect(&config.database_url, config.database_max_connections)
        .await
        .context("Failed to connect to ledger database")?;
    db::verify_connection(&pool)
        .await
        .context("Ledger database is not answering queries")?;
    if !db::check_schema(&pool, db::LEDGER_TABLES).await? {
        tracing::error!("Ledger schema is not complete. Please run migrations.");
        return Err(anyhow::anyhow!("Ledger schema incomplete"));
    }

    // Queue store; shares the pool when it lives in the same database
    let broker_pool = if config.broker_database_url == config.database_url {
        pool.clone()
    } else {
        db::connect(&config.broker_database_url, config.database_max_connections)
            .await
            .context("Failed to connect to broker database")?
    };
    db::verify_connection(&broker_pool)
        .await
        .context("Broker database is not answering queries")?;
    if !db::check_schema(&broker_pool, db::BROKER_TABLES).await? {
        tracing::error!("Broker schema is not complete. Please run migrations.");
        return Err(anyhow::anyhow!("Broker schema incomplete"));
    }

    tracing::info!("Database connected successfully");

    // Exchange and queues must exist before the first transfer is accepted
    let broker = Arc::new(PgBroker::new(broker_pool.clone()));
    let topology = FanoutTopology::new(
        config.exchange_name.clone(),
        config.projection_queues.clone(),
    )
    .declare(broker)
    .await
    .context("Failed to declare event topology")?;

    tracing::info!(
        exchange = %topology.exchange(),
        queues = ?topology.queues(),
        "Event topology declared"
    );

    let publisher = TransferEventPublisher::new(topology).with_timeout(config.publish_timeout);
    let cipher = Arc::new(SivCipher::new(&config.identifier_key)?);
    let store = Arc::new(PgStore::new(pool.clone()));

    let state = AppState::assemble(cipher, store.clone(), publisher.clone(), config.store_timeout);

    // Background outbox relay and purge
    let jobs = JobScheduler::with_config(
        store,
        publisher,
        JobSchedulerConfig {
            relay_interval: config.outbox_relay_interval,
            relay_batch_size: config.outbox_batch_size,
            retention: config.outbox_retention,
            ..JobSchedulerConfig::default()
        },
    )
    .start();

    let app = api::build_router(state).layer(TraceLayer::new_for_http());

    tracing::info!("Listening on http://{}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    // Cleanup
    tracing::info!("Server shutting down...");
    jobs.abort();
    pool.close().await;
    broker_pool.close().await;
    tracing::info!("Database connections closed. Goodbye!");

    Ok(())
}

/// Shutdown signal handler for graceful shutdown
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C, initiating graceful shutdown...");
        },
        _ = terminate => {
            tracing::info!("Received SIGTERM, initiating graceful shutdown...");
        },
    }
}
