use crate::config::{LogFormat, TelemetryConfig};
use metrics::{describe_counter, describe_histogram, Unit};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;
use tracing::Subscriber;
use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

pub const REQUESTS_ROUTED: &str = "statuser_requests_routed_total";
pub const REQUESTS_DROPPED: &str = "statuser_requests_dropped_total";
pub const RESULTS_SENT: &str = "statuser_results_sent_total";
pub const PROBE_DURATION: &str = "statuser_probe_duration_seconds";
pub const BATCH_FLUSHES: &str = "statuser_batch_flushes_total";
pub const BATCH_SEND_FAILURES: &str = "statuser_batch_send_failures_total";
pub const RESULTS_LOST: &str = "statuser_results_lost_total";

pub fn init(config: &TelemetryConfig) -> anyhow::Result<()> {
    // Initialize tracing
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    // Stdout carries the outbound status stream, so logs go to stderr.
    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer(config.log_format.clone(), std::io::stderr))
        .init();

    // Initialize metrics
    if config.metrics_enabled {
        install_exporter(config.metrics_port);
    }

    Ok(())
}

fn fmt_layer<S, W>(format: LogFormat, writer: W) -> Box<dyn Layer<S> + Send + Sync>
where
    S: Subscriber + for<'a> LookupSpan<'a> + 'static,
    W: for<'w> MakeWriter<'w> + Send + Sync + 'static,
{
    match format {
        LogFormat::Json => fmt::layer()
            .json()
            .with_current_span(true)
            .with_span_list(true)
            .with_writer(writer)
            .boxed(),
        LogFormat::Pretty => fmt::layer()
            .pretty()
            .with_thread_ids(true)
            .with_thread_names(true)
            .with_writer(writer)
            .boxed(),
    }
}

/// Start the Prometheus endpoint. A port that cannot be bound is logged and
/// the service keeps running without it.
fn install_exporter(port: u16) -> bool {
    let addr: SocketAddr = ([0, 0, 0, 0], port).into();
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => {
            describe_metrics();
            tracing::info!(
                port,
                "Metrics endpoint started at http://0.0.0.0:{}/metrics",
                port
            );
            true
        }
        Err(e) => {
            tracing::warn!(port, error = %e, "Metrics endpoint unavailable, continuing without it");
            false
        }
    }
}

pub fn describe_metrics() {
    describe_counter!(
        REQUESTS_ROUTED,
        "Availability requests forwarded to a provider queue"
    );
    describe_counter!(
        REQUESTS_DROPPED,
        "Availability requests dropped before probing, by reason"
    );
    describe_counter!(
        RESULTS_SENT,
        "Probe results handed to the batcher, by provider and status"
    );
    describe_histogram!(
        PROBE_DURATION,
        Unit::Seconds,
        "Duration of provider reachability probes"
    );
    describe_counter!(BATCH_FLUSHES, "Outbound batch flushes, by trigger");
    describe_counter!(BATCH_SEND_FAILURES, "Outbound batch sends that failed");
    describe_counter!(
        RESULTS_LOST,
        "Probe results lost to failed outbound sends or encoding errors"
    );
}

pub fn shutdown() {
    tracing::info!("Shutting down telemetry");
}

#[macro_export]
macro_rules! record_metric {
    (counter, $name:expr, $value:expr) => {
        metrics::counter!($name).increment($value);
    };
    (counter, $name:expr, $value:expr, $($label:tt = $label_value:expr),*) => {
        metrics::counter!($name, $($label => $label_value),*).increment($value);
    };
    (gauge, $name:expr, $value:expr, $($label:tt = $label_value:expr),*) => {
        metrics::gauge!($name, $($label => $label_value),*).set($value as f64);
    };
    (histogram, $name:expr, $value:expr, $($label:tt = $label_value:expr),*) => {
        metrics::histogram!($name, $($label => $label_value),*).record($value);
    };
}
