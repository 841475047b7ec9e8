//! OpenTelemetry metrics initialization.

use anyhow::Context;
use config::{OtlpProtocol, TelemetryConfig};
use opentelemetry::metrics::Meter;
use opentelemetry_otlp::MetricExporter;
use opentelemetry_sdk::{
    Resource,
    metrics::{PeriodicReader, SdkMeterProvider},
};

const METER_NAME: &str = "gateway";

/// Get the global meter for recording metrics (request counts, tool-call
/// durations, cache hit/miss) per `spec.md` §3's `RequestRecord`/`ToolCallRecord`.
pub fn meter() -> Meter {
    opentelemetry::global::meter(METER_NAME)
}

pub(crate) async fn init_metrics(config: &TelemetryConfig) -> anyhow::Result<SdkMeterProvider> {
    let resource = build_resource(config);
    let mut builder = SdkMeterProvider::builder().with_resource(resource);

    if config.metrics_enabled() {
        let exporter_config = &config.exporters.otlp;

        let exporter: MetricExporter = match exporter_config.protocol {
            OtlpProtocol::Grpc => {
                use opentelemetry_otlp::WithTonicConfig;

                MetricExporter::builder()
                    .with_tonic()
                    .with_endpoint(exporter_config.endpoint.as_str())
                    .with_timeout(exporter_config.timeout)
                    .build()
                    .context("Failed to create gRPC OTLP metric exporter")?
            }
            OtlpProtocol::Http => {
                use opentelemetry_otlp::WithHttpConfig;

                MetricExporter::builder()
                    .with_http()
                    .with_endpoint(exporter_config.endpoint.as_str())
                    .with_timeout(exporter_config.timeout)
                    .build()
                    .context("Failed to create HTTP OTLP metric exporter")?
            }
        };

        let reader = PeriodicReader::builder(exporter).build();
        builder = builder.with_reader(reader);

        log::debug!(
            "OTLP metrics exporter initialized to {} via {:?}",
            exporter_config.endpoint,
            exporter_config.protocol
        );
    } else {
        log::debug!("Metrics export disabled, metrics will not leave the process");
    }

    let provider = builder.build();
    opentelemetry::global::set_meter_provider(provider.clone());

    log::info!(
        "Telemetry metrics initialized for service '{}'",
        config.service_name().unwrap_or("gateway")
    );

    Ok(provider)
}

fn build_resource(config: &TelemetryConfig) -> Resource {
    let mut builder = Resource::builder();

    if let Some(service_name) = config.service_name() {
        builder = builder.with_service_name(service_name.to_string());
    }

    for (key, value) in &config.resource_attributes {
        use opentelemetry::KeyValue;
        builder = builder.with_attribute(KeyValue::new(key.clone(), value.clone()));
    }

    builder.build()
}
