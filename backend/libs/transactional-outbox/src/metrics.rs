use actix_web::HttpResponse;
use prometheus::{Encoder, IntCounter, IntGauge, Opts, TextEncoder};
use tracing::warn;

#[derive(Clone)]
pub struct OutboxMetrics {
    pub pending: IntGauge,
    pub oldest_pending_age_seconds: IntGauge,
    pub published: IntCounter,
    pub cycles: IntCounter,
    pub failed_cycles: IntCounter,
}

fn labeled(name: &str, help: &str, service: &str) -> Opts {
    Opts::new(name, help).const_label("service", service.to_string())
}

impl OutboxMetrics {
    pub fn new(service: &str) -> prometheus::Result<Self> {
        let pending = IntGauge::with_opts(labeled(
            "outbox_pending_count",
            "Number of unpublished outbox rows currently pending",
            service,
        ))?;
        let oldest_pending_age_seconds = IntGauge::with_opts(labeled(
            "outbox_oldest_pending_age_seconds",
            "Age in seconds of the oldest pending outbox row",
            service,
        ))?;
        let published = IntCounter::with_opts(labeled(
            "outbox_published_total",
            "Total number of outbox rows marked as published",
            service,
        ))?;
        let cycles = IntCounter::with_opts(labeled(
            "outbox_poll_cycles_total",
            "Total number of completed poll cycles, idle ones included",
            service,
        ))?;
        let failed_cycles = IntCounter::with_opts(labeled(
            "outbox_failed_cycles_total",
            "Total number of poll cycles rolled back after a failure",
            service,
        ))?;

        let registry = prometheus::default_registry();
        for metric in [
            Box::new(pending.clone()) as Box<dyn prometheus::core::Collector>,
            Box::new(oldest_pending_age_seconds.clone()),
            Box::new(published.clone()),
            Box::new(cycles.clone()),
            Box::new(failed_cycles.clone()),
        ] {
            if let Err(e) = registry.register(metric) {
                warn!("Failed to register outbox metric: {}", e);
            }
        }

        Ok(Self {
            pending,
            oldest_pending_age_seconds,
            published,
            cycles,
            failed_cycles,
        })
    }
}

/// `/metrics` handler: default registry in text exposition format
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
