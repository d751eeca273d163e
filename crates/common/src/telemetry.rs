//! Logging and tracing initialization for the gateway.
//!
//! Installs a stdout layer filtered by `RUST_LOG`, daily-rolling JSON files for
//! the `queries` and `errors` targets, and (with the `telemetry` feature) an
//! OTLP/gRPC span exporter.

use crate::config::{LoggingConfig, TelemetryConfig};
use anyhow::Result;

#[cfg(feature = "telemetry")]
use {
    opentelemetry::trace::TracerProvider, opentelemetry::KeyValue,
    opentelemetry_otlp::WithExportConfig,
    opentelemetry_sdk::trace::TracerProvider as SdkTracerProvider, opentelemetry_sdk::Resource,
    tracing_opentelemetry::OpenTelemetryLayer,
};

use tracing_subscriber::layer::Layer;
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Target for one-line-per-query audit records.
pub const QUERIES_TARGET: &str = "queries";
/// Target for failures surfaced to clients or swallowed by background tasks.
pub const ERRORS_TARGET: &str = "errors";

pub fn init_telemetry<S>(
    service_name: &str,
    endpoint: &str,
) -> Result<Box<dyn Layer<S> + Send + Sync>>
where
    S: tracing::Subscriber + for<'span> LookupSpan<'span> + Send + Sync,
{
    #[cfg(feature = "telemetry")]
    {
        let exporter = opentelemetry_otlp::SpanExporter::builder()
            .with_tonic()
            .with_endpoint(endpoint)
            .build()?;

        let provider = SdkTracerProvider::builder()
            .with_batch_exporter(exporter, opentelemetry_sdk::runtime::Tokio)
            .with_resource(Resource::new(vec![KeyValue::new(
                "service.name",
                service_name.to_string(),
            )]))
            .build();

        let tracer = provider.tracer(service_name.to_string());
        opentelemetry::global::set_tracer_provider(provider);

        Ok(Box::new(OpenTelemetryLayer::new(tracer)))
    }
    #[cfg(not(feature = "telemetry"))]
    {
        if !service_name.is_empty() {
            tracing::debug!(
                "Telemetry requested for {} at {} but the `telemetry` feature is disabled",
                service_name,
                endpoint
            );
        }
        Ok(Box::new(tracing_subscriber::layer::Identity::new()))
    }
}

fn json_file_layer<S>(
    directory: &str,
    file_name: &str,
    target: &'static str,
) -> Box<dyn Layer<S> + Send + Sync>
where
    S: tracing::Subscriber + for<'span> LookupSpan<'span> + Send + Sync,
{
    let appender = tracing_appender::rolling::daily(directory, file_name);
    tracing_subscriber::fmt::layer()
        .json()
        .with_writer(appender)
        .with_filter(tracing_subscriber::filter::filter_fn(move |metadata| {
            metadata.target() == target
        }))
        .boxed()
}

/// Installs the global subscriber. A second call is a no-op.
pub fn init_tracing(logging: &LoggingConfig, telemetry: &TelemetryConfig) -> Result<()> {
    let otel_layer = if telemetry.enabled {
        init_telemetry(&telemetry.service_name, &telemetry.endpoint)?
    } else {
        Box::new(tracing_subscriber::layer::Identity::new())
    };

    let stdout_layer = tracing_subscriber::fmt::layer().with_filter(
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
    );

    let mut file_layers = Vec::new();
    if logging.json_files {
        std::fs::create_dir_all(&logging.directory)?;
        file_layers.push(json_file_layer(
            &logging.directory,
            "queries.jsonl",
            QUERIES_TARGET,
        ));
        file_layers.push(json_file_layer(
            &logging.directory,
            "errors.jsonl",
            ERRORS_TARGET,
        ));
    }

    tracing_subscriber::registry()
        .with(stdout_layer)
        .with(otel_layer)
        .with(file_layers)
        .try_init()
        .ok();

    Ok(())
}

pub fn shutdown_telemetry() {
    #[cfg(feature = "telemetry")]
    opentelemetry::global::shutdown_tracer_provider();
}
