use actix_web::{web, App, HttpResponse, HttpServer};
use analytics_sink::metrics::{metrics_handler, SinkMetrics};
use analytics_sink::{
    AnalyticalStore, ClickHouseStore, KafkaMessageSource, SinkEnvConfig, SinkWriter,
};
use anyhow::{Context, Result};
use config_core::{ClickHouseConfig, KafkaConfig, LoggingConfig};
use resilience::{with_retry, RetryConfig};
use std::sync::Arc;
use tokio::sync::watch;

const SERVICE_NAME: &str = "analytics-sink";

#[actix_web::main]
async fn main() -> Result<()> {
    config_core::load_dotenv();
    let logging = LoggingConfig::from_env().context("Invalid logging configuration")?;
    config_core::init_tracing(&logging).context("Failed to initialize tracing")?;

    let settings = SinkEnvConfig::from_env().context("Invalid sink configuration")?;
    let kafka = KafkaConfig::from_env().context("Invalid Kafka configuration")?;
    let clickhouse = ClickHouseConfig::from_env().context("Invalid ClickHouse configuration")?;

    tracing::info!(
        topic = %kafka.topic,
        group_id = %kafka.group_id,
        table = %clickhouse.qualified_table(),
        batch_size = settings.batch_size,
        "Starting {}",
        SERVICE_NAME
    );

    let store = Arc::new(ClickHouseStore::new(&clickhouse));
    with_retry(RetryConfig::default(), "clickhouse schema", || store.ensure_schema())
        .await
        .context("Failed to ensure ClickHouse schema")?;

    let source = KafkaMessageSource::new(&kafka).context("Failed to create Kafka consumer")?;

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

    let mut writer = SinkWriter::new(source, store, settings.writer_config(), shutdown_rx)
        .with_metrics(SinkMetrics::new(SERVICE_NAME)?);

    let result = writer.run().await;

    if let Some(handle) = metrics_server {
        handle.stop(true).await;
    }

    result.context("Sink writer failed")?;
    tracing::info!(total_inserted = writer.total_inserted(), "Shutdown complete");
    Ok(())
}
