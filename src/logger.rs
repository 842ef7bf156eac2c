use std::fs;
use std::future::Future;
use std::path::PathBuf;
use std::sync::OnceLock;
use std::time::Instant;

use anyhow::{Context, Result};
use opentelemetry::global;
use opentelemetry::metrics::{Counter, Histogram, Meter};
use opentelemetry_appender_tracing::layer::OpenTelemetryTracingBridge;
use opentelemetry_otlp::{LogExporter, MetricExporter, Protocol, WithExportConfig};
use opentelemetry_sdk::Resource;
use opentelemetry_sdk::{logs::SdkLoggerProvider, metrics::SdkMeterProvider};
use tracing::{error, info};
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::Registry;
use tracing_subscriber::filter::filter_fn;
use tracing_subscriber::fmt;
use tracing_subscriber::prelude::*;

pub const LOG_FILE: &str = "annotator.log";
pub const EVENT_FILE: &str = "annotator-events.json";
const SERVICE_NAME: &str = "annotator";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogSettings {
    /// `EnvFilter` directive, e.g. `info` or `annotator=debug,engine=warn`.
    pub log_level: String,
    /// Where the rolling text log and the JSON event log go. Stderr only when unset.
    pub log_dir: Option<PathBuf>,
    /// OTLP/HTTP endpoint for logs and metrics.
    pub otel_endpoint: Option<String>,
}

impl Default for LogSettings {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_dir: None,
            otel_endpoint: None,
        }
    }
}

/// Install the global subscriber and return the metric handles.
///
/// Stdout is reserved for annotated records, so human-readable logs go to
/// stderr. Events with target `request` are written as JSON lines to the
/// event log.
pub fn init_tracing(settings: &LogSettings) -> Result<Telemetry> {
    let env_filter = EnvFilter::try_new(&settings.log_level)
        .with_context(|| format!("invalid log level `{}`", settings.log_level))?;

    let stderr_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_thread_names(true)
        .with_filter(filter_fn(|meta| meta.target() != "request"));

    let (txt_layer, json_layer) = match &settings.log_dir {
        Some(dir) => {
            fs::create_dir_all(dir)
                .with_context(|| format!("could not create log dir {}", dir.display()))?;
            let txt_appender = RollingFileAppender::new(Rotation::DAILY, dir, LOG_FILE);
            let json_appender = RollingFileAppender::new(Rotation::DAILY, dir, EVENT_FILE);
            (
                Some(fmt::layer().with_writer(txt_appender).with_ansi(false)),
                Some(
                    fmt::layer()
                        .json()
                        .with_writer(json_appender)
                        .with_target(true)
                        .with_filter(EnvFilter::new("request=info")),
                ),
            )
        }
        None => (None, None),
    };

    let logger_provider = settings.otel_endpoint.as_deref().map(init_logs).transpose()?;
    let meter_provider = settings.otel_endpoint.as_deref().map(init_metrics).transpose()?;

    let otel_layer = match &logger_provider {
        Some(provider) => Some(
            OpenTelemetryTracingBridge::new(provider).with_filter(otel_filter(&settings.log_level)?),
        ),
        None => None,
    };

    Registry::default()
        .with(env_filter)
        .with(stderr_layer)
        .with(txt_layer)
        .with(json_layer)
        .with(otel_layer)
        .try_init()
        .context("tracing subscriber already installed")?;

    if let Some(provider) = &meter_provider {
        global::set_meter_provider(provider.clone());
    }

    Ok(Telemetry::new(
        global::meter(SERVICE_NAME),
        logger_provider,
        meter_provider,
    ))
}

fn otel_filter(log_level: &str) -> Result<EnvFilter> {
    let mut filter = EnvFilter::try_new(log_level)?;
    for directive in ["hyper=off", "tonic=off", "h2=off", "reqwest=off"] {
        filter = filter.add_directive(directive.parse()?);
    }
    Ok(filter)
}

static RESOURCE: OnceLock<Resource> = OnceLock::new();
fn get_resource() -> Resource {
    RESOURCE
        .get_or_init(|| Resource::builder().with_service_name(SERVICE_NAME).build())
        .clone()
}

fn init_logs(end_point: &str) -> Result<SdkLoggerProvider> {
    let exporter = LogExporter::builder()
        .with_http()
        .with_protocol(Protocol::HttpBinary)
        .with_endpoint(end_point)
        .build()
        .context("log exporter")?;
    Ok(SdkLoggerProvider::builder()
        .with_batch_exporter(exporter)
        .with_resource(get_resource())
        .build())
}

fn init_metrics(end_point: &str) -> Result<SdkMeterProvider> {
    let exporter = MetricExporter::builder()
        .with_http()
        .with_protocol(Protocol::HttpBinary)
        .with_endpoint(end_point)
        .build()
        .context("metric exporter")?;
    Ok(SdkMeterProvider::builder()
        .with_periodic_exporter(exporter)
        .with_resource(get_resource())
        .build())
}

/// Prediction counters and latency, plus the exporters to flush on exit.
pub struct Telemetry {
    logger_provider: Option<SdkLoggerProvider>,
    meter_provider: Option<SdkMeterProvider>,

    pub predictions_started: Counter<u64>,
    pub predictions_succeeded: Counter<u64>,
    pub predictions_failed: Counter<u64>,
    pub prediction_latency_ms: Histogram<f64>,
}

impl Telemetry {
    fn new(
        meter: Meter,
        logger_provider: Option<SdkLoggerProvider>,
        meter_provider: Option<SdkMeterProvider>,
    ) -> Self {
        Telemetry {
            logger_provider,
            meter_provider,
            predictions_started: meter
                .u64_counter("predictions_started")
                .with_description("Records sent to the engine")
                .build(),
            predictions_succeeded: meter.u64_counter("predictions_succeeded").build(),
            predictions_failed: meter.u64_counter("predictions_failed").build(),
            prediction_latency_ms: meter
                .f64_histogram("prediction_latency_ms")
                .with_description("Round trip per record in ms")
                .with_unit("ms")
                .build(),
        }
    }

    /// Metrics recorded against the global (no-op unless installed) meter.
    pub fn detached() -> Self {
        Self::new(global::meter(SERVICE_NAME), None, None)
    }

    /// Await `request`, recording latency and outcome, and emit one JSON
    /// event (target `request`) per call.
    pub async fn instrument_request<Fut, T, E>(&self, name: &str, request: Fut) -> Result<T, E>
    where
        Fut: Future<Output = Result<T, E>>,
        E: std::fmt::Display,
    {
        self.predictions_started.add(1, &[]);
        let start = Instant::now();

        let result = request.await;

        let elapsed = start.elapsed().as_secs_f64() * 1_000.0;
        self.prediction_latency_ms.record(elapsed, &[]);

        match &result {
            Ok(_) => self.predictions_succeeded.add(1, &[]),
            Err(err) => {
                self.predictions_failed.add(1, &[]);
                error!(error = %err, "request `{}` failed in {:.1} ms", name, elapsed);
            }
        }

        tracing::event!(
            target: "request",
            tracing::Level::INFO,
            request = name,
            latency_ms = elapsed,
            status = match &result {
                Ok(_) => "ok",
                Err(_) => "error",
            },
        );

        result
    }

    /// Flush exporters.
    pub fn shutdown(self) {
        if let Some(provider) = self.logger_provider {
            if let Err(err) = provider.shutdown() {
                eprintln!("could not flush log exporter: {err}");
            }
        }
        if let Some(provider) = self.meter_provider {
            if let Err(err) = provider.shutdown() {
                eprintln!("could not flush metric exporter: {err}");
            }
        }
        info!("telemetry flushed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn instrument_request_passes_results_through() {
        let telemetry = Telemetry::detached();
        let ok: Result<u32, String> = telemetry.instrument_request("predict", async { Ok(7) }).await;
        assert_eq!(ok, Ok(7));
        let err: Result<u32, String> = telemetry
            .instrument_request("predict", async { Err("boom".to_string()) })
            .await;
        assert_eq!(err, Err("boom".to_string()));
    }
}
