//! Logging and OpenTelemetry setup for handoff.
//!
//! Events always go to stderr through a compact fmt layer. With an OTLP
//! endpoint, unit spans, queue metrics and log records are exported too,
//! on a resource tagged with the queue bounds the run was started with.

pub mod metrics;
pub mod work;

use opentelemetry::KeyValue;
use opentelemetry_sdk::Resource;
use opentelemetry_sdk::logs::SdkLoggerProvider;
use opentelemetry_sdk::metrics::{PeriodicReader, SdkMeterProvider};
use opentelemetry_sdk::trace::SdkTracerProvider;
use std::time::Duration;
use tracing::{info, warn};

use crate::config::Config;
use crate::error::{Error, Result};

/// How often queue metrics are pushed when nothing else is configured.
pub const DEFAULT_METRIC_INTERVAL: Duration = Duration::from_secs(10);

/// Configuration for telemetry initialization.
pub struct TelemetryConfig {
    /// Optional OTLP endpoint (e.g. "http://localhost:4317").
    pub endpoint: Option<String>,
    pub service_name: String,
    /// Filter used when `RUST_LOG` is not set (e.g. "info", "handoff=debug").
    pub log_level: String,
    /// Push interval of the periodic metric reader.
    pub metric_interval: Duration,
    /// Resource attributes attached to every exported signal.
    pub attributes: Vec<KeyValue>,
}

impl TelemetryConfig {
    /// Telemetry settings for a run of the queue configured by `config`.
    pub fn from_config(service_name: impl Into<String>, config: &Config) -> Self {
        let mut attributes = vec![
            KeyValue::new(
                "handoff.queue.max_concurrency",
                config.max_concurrency as i64,
            ),
            KeyValue::new("handoff.journal.capacity", config.journal_capacity as i64),
        ];
        if let Some(max_pending) = config.max_pending {
            attributes.push(KeyValue::new("handoff.queue.max_pending", max_pending as i64));
        }
        Self {
            endpoint: config.otel_endpoint.clone(),
            service_name: service_name.into(),
            log_level: config.log_level.clone(),
            metric_interval: config.metric_interval,
            attributes,
        }
    }

    fn resource(&self) -> Resource {
        Resource::builder()
            .with_service_name(self.service_name.clone())
            .with_attributes(self.attributes.iter().cloned())
            .build()
    }
}

/// The three OTLP pipelines of an exporting run.
struct Exporters {
    tracer: SdkTracerProvider,
    meter: SdkMeterProvider,
    logger: SdkLoggerProvider,
}

impl Exporters {
    fn build(endpoint: &str, resource: Resource, metric_interval: Duration) -> Result<Self> {
        use opentelemetry_otlp::{LogExporter, MetricExporter, SpanExporter, WithExportConfig as _};

        let spans = SpanExporter::builder()
            .with_tonic()
            .with_endpoint(endpoint)
            .build()
            .map_err(|e| exporter_error("span", e))?;
        let metrics = MetricExporter::builder()
            .with_tonic()
            .with_endpoint(endpoint)
            .build()
            .map_err(|e| exporter_error("metric", e))?;
        let logs = LogExporter::builder()
            .with_tonic()
            .with_endpoint(endpoint)
            .build()
            .map_err(|e| exporter_error("log", e))?;

        let reader = PeriodicReader::builder(metrics)
            .with_interval(metric_interval)
            .build();

        Ok(Self {
            tracer: SdkTracerProvider::builder()
                .with_batch_exporter(spans)
                .with_resource(resource.clone())
                .build(),
            meter: SdkMeterProvider::builder()
                .with_reader(reader)
                .with_resource(resource.clone())
                .build(),
            logger: SdkLoggerProvider::builder()
                .with_batch_exporter(logs)
                .with_resource(resource)
                .build(),
        })
    }
}

fn exporter_error(signal: &str, e: impl std::fmt::Display) -> Error {
    Error::Other(format!("failed to create OTLP {signal} exporter: {e}"))
}

/// Holds the exporters of an exporting run; flushes and shuts them down on
/// drop. Empty when telemetry only logs to stderr.
pub struct TelemetryGuard {
    exporters: Option<Exporters>,
}

impl TelemetryGuard {
    pub fn is_exporting(&self) -> bool {
        self.exporters.is_some()
    }

    /// Push everything buffered so far.
    pub fn force_flush(&self) {
        let Some(exporters) = &self.exporters else {
            return;
        };
        if let Err(e) = exporters.tracer.force_flush() {
            warn!("span flush failed: {e:?}");
        }
        if let Err(e) = exporters.meter.force_flush() {
            warn!("metric flush failed: {e:?}");
        }
        if let Err(e) = exporters.logger.force_flush() {
            warn!("log flush failed: {e:?}");
        }
    }
}

impl Drop for TelemetryGuard {
    fn drop(&mut self) {
        if let Some(exporters) = self.exporters.take() {
            let _ = exporters.logger.shutdown();
            let _ = exporters.meter.shutdown();
            let _ = exporters.tracer.shutdown();
        }
    }
}

/// Install the global subscriber, and the OTLP pipelines if an endpoint is
/// configured.
///
/// # Errors
///
/// Fails if an exporter cannot be built or a global subscriber is already
/// installed.
pub fn init_telemetry(config: TelemetryConfig) -> Result<TelemetryGuard> {
    use opentelemetry::trace::TracerProvider as _;
    use opentelemetry_appender_tracing::layer::OpenTelemetryTracingBridge;
    use tracing_subscriber::EnvFilter;
    use tracing_subscriber::layer::SubscriberExt as _;
    use tracing_subscriber::util::SubscriberInitExt as _;

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));
    let stderr = tracing_subscriber::fmt::layer()
        .compact()
        .with_writer(std::io::stderr);

    let Some(endpoint) = config.endpoint.as_deref() else {
        tracing_subscriber::registry()
            .with(filter)
            .with(stderr)
            .try_init()
            .map_err(|e| Error::Other(format!("failed to init tracing subscriber: {e}")))?;
        return Ok(TelemetryGuard { exporters: None });
    };

    let exporters = Exporters::build(endpoint, config.resource(), config.metric_interval)?;
    opentelemetry::global::set_meter_provider(exporters.meter.clone());

    let traces = tracing_opentelemetry::layer().with_tracer(exporters.tracer.tracer("handoff"));
    let logs = OpenTelemetryTracingBridge::new(&exporters.logger);
    tracing_subscriber::registry()
        .with(filter)
        .with(stderr)
        .with(traces)
        .with(logs)
        .try_init()
        .map_err(|e| Error::Other(format!("failed to init tracing subscriber: {e}")))?;

    info!(
        endpoint,
        interval_ms = config.metric_interval.as_millis() as u64,
        "exporting telemetry over OTLP"
    );
    Ok(TelemetryGuard {
        exporters: Some(exporters),
    })
}
