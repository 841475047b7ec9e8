//! OpenTelemetry distributed tracing initialization, wired through `fastrace`.

use std::borrow::Cow;

use anyhow::Context;
use config::{OtlpProtocol, TelemetryConfig};
use fastrace_opentelemetry::OpenTelemetryReporter;
use opentelemetry::InstrumentationScope;
use opentelemetry_otlp::SpanExporter;
use opentelemetry_sdk::Resource;

pub(crate) fn init_tracing(config: &TelemetryConfig) -> anyhow::Result<()> {
    if !config.tracing_enabled() {
        log::debug!("Tracing export disabled");
        return Ok(());
    }

    let exporter_config = &config.exporters.otlp;

    let exporter: SpanExporter = match exporter_config.protocol {
        OtlpProtocol::Grpc => {
            use opentelemetry_otlp::WithTonicConfig;

            SpanExporter::builder()
                .with_tonic()
                .with_endpoint(exporter_config.endpoint.as_str())
                .with_timeout(exporter_config.timeout)
                .build()
                .context("Failed to create gRPC OTLP span exporter")?
        }
        OtlpProtocol::Http => {
            use opentelemetry_otlp::WithHttpConfig;

            SpanExporter::builder()
                .with_http()
                .with_endpoint(exporter_config.endpoint.as_str())
                .with_timeout(exporter_config.timeout)
                .build()
                .context("Failed to create HTTP OTLP span exporter")?
        }
    };

    let service_name = config.service_name().unwrap_or("gateway").to_string();
    let resource = Resource::builder().with_service_name(service_name.clone()).build();
    let scope = InstrumentationScope::builder(service_name).with_version(env!("CARGO_PKG_VERSION")).build();

    let reporter = OpenTelemetryReporter::new(exporter, Cow::Owned(resource), scope);

    fastrace::set_reporter(reporter, fastrace::collector::Config::default().report_interval(std::time::Duration::from_secs(1)));

    log::info!("Tracing initialized, sampling ratio {}", config.tracing.sampling);

    Ok(())
}

/// Flushes any buffered spans. Call on shutdown so the last request's spans
/// aren't dropped.
pub(crate) fn shutdown_tracing() {
    fastrace::flush();
}
