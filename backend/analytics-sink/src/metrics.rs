//! Prometheus metrics for the sink writer

use actix_web::HttpResponse;
use prometheus::{Encoder, IntCounter, IntGauge, Opts, TextEncoder};
use tracing::warn;

#[derive(Clone)]
pub struct SinkMetrics {
    /// Messages decoded and accepted into a batch
    pub consumed: IntCounter,
    /// Rows written to ClickHouse
    pub inserted: IntCounter,
    /// Successful insert + commit rounds
    pub flushes: IntCounter,
    pub flush_failures: IntCounter,
    /// Events currently buffered
    pub batch_fill: IntGauge,
}

impl SinkMetrics {
    pub fn new(service: &str) -> prometheus::Result<Self> {
        let opts = |name: &str, help: &str| {
            Opts::new(name, help).const_label("service", service.to_string())
        };

        let consumed = IntCounter::with_opts(opts(
            "sink_messages_consumed_total",
            "Total number of broker messages accepted into a batch",
        ))?;
        let inserted = IntCounter::with_opts(opts(
            "sink_rows_inserted_total",
            "Total number of rows inserted into ClickHouse",
        ))?;
        let flushes = IntCounter::with_opts(opts(
            "sink_flushes_total",
            "Total number of batches inserted and committed",
        ))?;
        let flush_failures = IntCounter::with_opts(opts(
            "sink_flush_failures_total",
            "Total number of failed batch flushes",
        ))?;
        let batch_fill = IntGauge::with_opts(opts(
            "sink_batch_fill",
            "Number of events buffered in the current batch",
        ))?;

        let registry = prometheus::default_registry();
        for metric in [
            Box::new(consumed.clone()) as Box<dyn prometheus::core::Collector>,
            Box::new(inserted.clone()),
            Box::new(flushes.clone()),
            Box::new(flush_failures.clone()),
            Box::new(batch_fill.clone()),
        ] {
            if let Err(e) = registry.register(metric) {
                warn!("Failed to register sink metric: {}", e);
            }
        }

        Ok(Self {
            consumed,
            inserted,
            flushes,
            flush_failures,
            batch_fill,
        })
    }
}

pub async fn metrics_handler() -> HttpResponse {
    let encoder = TextEncoder::new();
    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&prometheus::gather(), &mut buffer) {
        return HttpResponse::InternalServerError().body(format!("encode error: {e}"));
    }
    HttpResponse::Ok()
        .content_type(encoder.format_type())
        .body(buffer)
}
