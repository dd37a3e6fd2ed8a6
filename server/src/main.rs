//! Dispensary HTTP server.
//!
//! Loads configuration, connects to PostgreSQL (running migrations), wires the
//! Redpanda publisher and the appointment-service client into the runtime, and
//! serves the HTTP API until SIGINT/SIGTERM.

use anyhow::Context;
use dispensary_core::environment::SystemClock;
use dispensary_postgres::PgDispensaryStore;
use dispensary_redpanda::RedpandaPublisher;
use dispensary_runtime::DispensaryEnvironment;
use dispensary_server::{Config, HttpEncounterDirectory};
use dispensary_web::{AppState, router};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::future::IntoFuture;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tokio::sync::Notify;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,dispensary=debug,sqlx=warn".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting dispensary server");

    let config = Config::from_env();
    info!(
        redpanda_brokers = %config.redpanda.brokers,
        topic = %config.redpanda.topic,
        appointment_service = %config.appointments.base_url,
        "Configuration loaded"
    );

    let metrics_address: SocketAddr = config
        .server
        .metrics_address()
        .parse()
        .context("Invalid metrics address")?;
    PrometheusBuilder::new()
        .with_http_listener(metrics_address)
        .install()
        .context("Failed to install Prometheus exporter")?;
    info!(address = %metrics_address, "Prometheus metrics available at /metrics");

    info!("Connecting to database...");
    let store = PgDispensaryStore::connect(
        &config.postgres.url,
        config.postgres.max_connections,
        config.postgres.connect_timeout,
    )
    .await
    .context("Failed to connect to database")?;
    store.migrate().await.context("Failed to run migrations")?;
    info!("Database ready");

    let publisher = RedpandaPublisher::builder()
        .brokers(&config.redpanda.brokers)
        .topic(&config.redpanda.topic)
        .partitions(config.redpanda.partitions)
        .replication_factor(config.redpanda.replication_factor)
        .timeout(config.redpanda.publish_timeout())
        .build()
        .context("Invalid Redpanda configuration")?;

    let encounters = HttpEncounterDirectory::new(
        &config.appointments.base_url,
        config.appointments.timeout(),
    )
    .context("Failed to build appointment service client")?;

    let env = DispensaryEnvironment::new(
        Arc::new(store),
        Arc::new(publisher),
        Arc::new(encounters),
        Arc::new(SystemClock),
    );
    let app = router(AppState::new(env));

    let addr = config.server.address();
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {addr}"))?;
    info!(address = %addr, "Server listening");

    let shutdown = Arc::new(Notify::new());
    let trigger = Arc::clone(&shutdown);
    let server = axum::serve(listener, app).with_graceful_shutdown(async move {
        shutdown_signal().await;
        trigger.notify_one();
    });
    let drain_limit = Duration::from_secs(config.server.shutdown_timeout);

    tokio::select! {
        result = server.into_future() => result.context("HTTP server failed")?,
        () = async {
            shutdown.notified().await;
            tokio::time::sleep(drain_limit).await;
        } => {
            warn!(timeout_secs = drain_limit.as_secs(), "Shutdown timeout elapsed, dropping open connections");
        },
    }

    info!("Server stopped");
    Ok(())
}

/// Resolves on Ctrl+C (SIGINT) or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            },
            Err(e) => {
                warn!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            },
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            info!("Received Ctrl+C signal, shutting down gracefully...");
        },
        () = terminate => {
            info!("Received SIGTERM signal, shutting down gracefully...");
        },
    }
}
