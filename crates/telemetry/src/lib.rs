//! Structured logging, metrics and distributed tracing for the gateway.
//!
//! Generalized from the gateway workspace's `crates/telemetry`: the console
//! (TUI) export paths are dropped along with the dashboard UI itself, and the
//! OTLP exporter configuration is flattened to the smaller surface in
//! `config::TelemetryConfig`. As in the original, installing the process-wide
//! `log` backend stays the server crate's job (`crates/server/src/logger.rs`)
//! — this crate only builds the OTLP pipelines and hands back a `logforth`
//! appender for the logger to dispatch into alongside its own stderr appender.

pub mod logs;
mod metrics;
mod tracing;

use config::TelemetryConfig;
use opentelemetry_sdk::metrics::SdkMeterProvider;

pub use logs::OtelLogsAppender;
pub use metrics::meter;
pub use opentelemetry::{
    KeyValue,
    metrics::{Counter, Gauge, Histogram, Meter, ObservableCounter, ObservableGauge, ObservableUpDownCounter, UpDownCounter},
};

/// Keeps the OpenTelemetry pipelines alive for the process lifetime. Dropping
/// it flushes and shuts down every exporter.
pub struct TelemetryGuard {
    meter_provider: SdkMeterProvider,
    logs_guard: Option<logs::LogsGuard>,
    logs_appender: Option<OtelLogsAppender>,
}

impl TelemetryGuard {
    /// Flushes pending metrics, traces and logs. Tests call this before
    /// asserting on exported data.
    pub fn force_flush(&self) -> anyhow::Result<()> {
        self.meter_provider.force_flush().map_err(|e| anyhow::anyhow!("failed to flush metrics: {e}"))?;

        tracing::shutdown_tracing();

        if let Some(guard) = &self.logs_guard {
            guard.force_flush()?;
        }

        Ok(())
    }

    /// The logforth appender to register alongside the stderr appender, if
    /// log export was enabled.
    pub fn logs_appender(&self) -> Option<&OtelLogsAppender> {
        self.logs_appender.as_ref()
    }
}

impl Drop for TelemetryGuard {
    fn drop(&mut self) {
        if let Err(e) = self.meter_provider.shutdown() {
            log::error!("failed to shut down meter provider: {e}");
        }

        tracing::shutdown_tracing();
    }
}

/// Initializes the metrics and tracing pipelines, and, if logs export is
/// enabled, the OTLP logs pipeline. Returns a guard the caller must hold for
/// the process lifetime.
pub async fn init(config: &TelemetryConfig) -> anyhow::Result<TelemetryGuard> {
    log::debug!(
        "telemetry config: tracing={} metrics={} logs={}",
        config.tracing_enabled(),
        config.metrics_enabled(),
        config.logs_enabled()
    );

    let meter_provider = metrics::init_metrics(config).await?;
    tracing::init_tracing(config)?;

    let (logs_appender, logs_guard) = if config.logs_enabled() {
        let (appender, guard) = logs::init_logs(config).await?;
        (Some(appender), Some(guard))
    } else {
        (None, None)
    };

    Ok(TelemetryGuard { meter_provider, logs_guard, logs_appender })
}
