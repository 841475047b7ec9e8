//! OpenTelemetry logs integration, exposed as a `logforth` appender so the
//! binary's own stderr logger can dispatch to both sinks from one filter.

use std::{sync::Arc, time::SystemTime};

use anyhow::Result;
use config::{OtlpProtocol, TelemetryConfig};
use fastrace::prelude::*;
use log::{Level, Record};
use logforth::{append::Append, diagnostic::Diagnostic};
use opentelemetry::{
    InstrumentationScope, KeyValue,
    logs::{LogRecord, Logger, LoggerProvider, Severity},
    trace::{SpanId, TraceId},
};
use opentelemetry_sdk::{Resource, logs::SdkLoggerProvider};

pub struct LogsGuard {
    provider: SdkLoggerProvider,
}

impl LogsGuard {
    pub fn force_flush(&self) -> Result<()> {
        self.provider.force_flush().map_err(|errs| anyhow::anyhow!("failed to flush logs: {errs:?}"))
    }
}

impl Drop for LogsGuard {
    fn drop(&mut self) {
        if let Err(e) = self.provider.shutdown() {
            log::error!("failed to shut down logs provider: {e}");
        }
    }
}

/// `logforth::append::Append` impl that forwards records to an OpenTelemetry
/// logger, stamping the current `fastrace` span context onto each record.
#[derive(Clone)]
pub struct OtelLogsAppender {
    provider: Arc<SdkLoggerProvider>,
    scope: InstrumentationScope,
}

impl std::fmt::Debug for OtelLogsAppender {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OtelLogsAppender").field("scope", &self.scope.name()).finish()
    }
}

impl OtelLogsAppender {
    fn new(provider: SdkLoggerProvider, service_name: String) -> Self {
        Self { provider: Arc::new(provider), scope: InstrumentationScope::builder(service_name).build() }
    }

    fn map_level(level: Level) -> Severity {
        match level {
            Level::Error => Severity::Error,
            Level::Warn => Severity::Warn,
            Level::Info => Severity::Info,
            Level::Debug => Severity::Debug,
            Level::Trace => Severity::Trace,
        }
    }
}

impl Append for OtelLogsAppender {
    fn append(&self, record: &Record<'_>, _diagnostics: &[Box<dyn Diagnostic>]) -> anyhow::Result<()> {
        let (trace_id, span_id) = match SpanContext::current_local_parent() {
            Some(span) => (TraceId::from_bytes(span.trace_id.0.to_be_bytes()), SpanId::from_bytes(span.span_id.0.to_be_bytes())),
            None => (TraceId::INVALID, SpanId::INVALID),
        };

        let logger = self.provider.logger_with_scope(self.scope.clone());
        let mut log_record = logger.create_log_record();

        log_record.set_observed_timestamp(SystemTime::now());
        log_record.set_severity_number(Self::map_level(record.level()));
        log_record.set_severity_text(record.level().as_str());
        log_record.set_body(record.args().to_string().into());

        if trace_id != TraceId::INVALID {
            log_record.set_trace_context(trace_id, span_id, None);
        }

        let mut attributes = Vec::new();
        if let Some(module) = record.module_path() {
            attributes.push(("code.namespace", module.to_string()));
        }
        if let Some(file) = record.file() {
            attributes.push(("code.filepath", file.to_string()));
            if let Some(line) = record.line() {
                attributes.push(("code.lineno", line.to_string()));
            }
        }
        if !attributes.is_empty() {
            log_record.add_attributes(attributes);
        }

        logger.emit(log_record);

        Ok(())
    }

    fn flush(&self) -> anyhow::Result<()> {
        self.provider.force_flush().map_err(|errs| anyhow::anyhow!("failed to flush logs: {errs:?}"))
    }
}

pub(crate) async fn init_logs(config: &TelemetryConfig) -> Result<(OtelLogsAppender, LogsGuard)> {
    let exporter_config = &config.exporters.otlp;

    let mut resource_builder = Resource::builder();
    resource_builder = resource_builder.with_attribute(KeyValue::new(
        opentelemetry_semantic_conventions::resource::SERVICE_NAME,
        config.service_name().unwrap_or("gateway").to_string(),
    ));
    for (key, value) in &config.resource_attributes {
        resource_builder = resource_builder.with_attribute(KeyValue::new(key.clone(), value.clone()));
    }
    let resource = resource_builder.build();

    let exporter = match exporter_config.protocol {
        OtlpProtocol::Grpc => {
            use opentelemetry_otlp::WithTonicConfig;

            opentelemetry_otlp::LogExporter::builder()
                .with_tonic()
                .with_endpoint(exporter_config.endpoint.to_string())
                .with_timeout(exporter_config.timeout)
                .build()?
        }
        OtlpProtocol::Http => {
            use opentelemetry_otlp::WithHttpConfig;

            opentelemetry_otlp::LogExporter::builder()
                .with_http()
                .with_endpoint(exporter_config.endpoint.to_string())
                .with_timeout(exporter_config.timeout)
                .build()?
        }
    };

    let provider = SdkLoggerProvider::builder().with_resource(resource).with_batch_exporter(exporter).build();

    let service_name = config.service_name().unwrap_or("gateway").to_string();
    let appender = OtelLogsAppender::new(provider.clone(), service_name);
    let guard = LogsGuard { provider };

    log::debug!("OTLP logs exporter initialized to {} via {:?}", exporter_config.endpoint, exporter_config.protocol);

    Ok((appender, guard))
}
