use actix_web::{web, App, HttpResponse, HttpServer};
use anyhow::{Context, Result};
use config_core::{KafkaConfig, LoggingConfig};
use db_pool::{create_pool, DbConfig};
use resilience::{with_retry, RetryConfig};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use transactional_outbox::metrics::{metrics_handler, OutboxMetrics};
use transactional_outbox::{
    KafkaEventPublisher, OutboxEnvConfig, OutboxPoller, PgOutboxStore, MIGRATOR,
};

const SERVICE_NAME: &str = "outbox-poller";

#[actix_web::main]
async fn main() -> Result<()> {
    config_core::load_dotenv();
    let logging = LoggingConfig::from_env().context("Invalid logging configuration")?;
    config_core::init_tracing(&logging).context("Failed to initialize tracing")?;

    let settings = OutboxEnvConfig::from_env().context("Invalid poller configuration")?;
    let kafka = KafkaConfig::from_env().context("Invalid Kafka configuration")?;

    tracing::info!(
        topic = %kafka.topic,
        batch_size = settings.batch_size,
        poll_interval_seconds = settings.poll_interval_seconds,
        table = %settings.outbox_table,
        "Starting {}",
        SERVICE_NAME
    );

    let db_config = DbConfig::from_env(SERVICE_NAME).map_err(|e| anyhow::anyhow!(e))?;
    db_config.log_config();
    let pool = create_pool(db_config)
        .await
        .context("Failed to create database pool")?;

    if settings.run_migrations {
        tracing::info!("Running database migrations...");
        MIGRATOR
            .run(&pool)
            .await
            .context("Failed to run migrations")?;
        tracing::info!("Migrations completed successfully");
    }

    let publisher = Arc::new(
        KafkaEventPublisher::new(&kafka).context("Failed to create Kafka producer")?,
    );
    let brokers = with_retry(RetryConfig::default(), "kafka metadata", || {
        publisher.check_connectivity(Duration::from_secs(5))
    })
    .await
    .context("Kafka is unreachable")?;
    tracing::info!(brokers, bootstrap = %kafka.bootstrap, "Kafka reachable");

    let store = Arc::new(PgOutboxStore::new(pool.clone(), settings.outbox_table.clone())?);

    let metrics_server = match settings.metrics_port {
        Some(port) => {
            let server = HttpServer::new(|| {
                App::new()
                    .route(
                        "/health",
                        web::get().to(|| async { HttpResponse::Ok().body("OK") }),
                    )
                    .route("/metrics", web::get().to(metrics_handler))
            })
            .workers(1)
            .disable_signals()
            .bind(("0.0.0.0", port))
            .with_context(|| format!("Failed to bind metrics port {port}"))?
            .run();
            let handle = server.handle();
            actix_web::rt::spawn(server);
            tracing::info!(port, "Metrics endpoint listening");
            Some(handle)
        }
        None => None,
    };

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("Shutdown signal received");
            let _ = shutdown_tx.send(true);
        }
    });

    let mut poller = OutboxPoller::new(
        store,
        Arc::clone(&publisher),
        settings.poller_config(),
        shutdown_rx,
    )
    .with_metrics(OutboxMetrics::new(SERVICE_NAME)?);

    let result = poller.run().await;

    if let Err(e) = publisher.flush(Duration::from_secs(5)).await {
        tracing::warn!(error = %e, "Producer flush on exit failed");
    }
    if let Some(handle) = metrics_server {
        handle.stop(true).await;
    }
    pool.close().await;

    result.context("Outbox poller failed")?;
    tracing::info!(total_sent = poller.total_sent(), "Shutdown complete");
    Ok(())
}
