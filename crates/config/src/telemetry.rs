//! Telemetry configuration, kept close to the gateway workspace's
//! `crates/config/src/telemetry.rs` but trimmed to the exporter shapes
//! `crates/telemetry` actually drives (a single global OTLP exporter plus
//! per-signal enable flags), rather than per-signal exporter overrides.

use std::{collections::BTreeMap, time::Duration};

use serde::Deserialize;
use url::Url;

/// Telemetry configuration for observability. Ambient (`SPEC_FULL.md` §2) —
/// not a named `spec.md` component, but every component logs and traces
/// through this configuration.
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default, deny_unknown_fields)]
pub struct TelemetryConfig {
    pub service_name: Option<String>,
    #[serde(default)]
    pub resource_attributes: BTreeMap<String, String>,
    #[serde(default)]
    pub exporters: ExportersConfig,
    #[serde(default)]
    pub tracing: TracingConfig,
    #[serde(default)]
    pub metrics: MetricsConfig,
    #[serde(default)]
    pub logs: LogsConfig,
}

impl TelemetryConfig {
    pub fn service_name(&self) -> Option<&str> {
        self.service_name.as_deref()
    }

    pub fn tracing_enabled(&self) -> bool {
        self.tracing.enabled && self.exporters.otlp.enabled
    }

    pub fn logs_enabled(&self) -> bool {
        self.logs.enabled && self.exporters.otlp.enabled
    }

    pub fn metrics_enabled(&self) -> bool {
        self.metrics.enabled && self.exporters.otlp.enabled
    }
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default, deny_unknown_fields)]
pub struct ExportersConfig {
    pub otlp: OtlpExporterConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct OtlpExporterConfig {
    pub enabled: bool,
    pub endpoint: Url,
    pub protocol: OtlpProtocol,
    #[serde(with = "duration_secs")]
    pub timeout: Duration,
}

impl Default for OtlpExporterConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            endpoint: Url::parse("http://localhost:4317").expect("default URL should be valid"),
            protocol: OtlpProtocol::default(),
            timeout: Duration::from_secs(60),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Default, PartialEq, Copy)]
#[serde(rename_all = "lowercase")]
pub enum OtlpProtocol {
    #[default]
    Grpc,
    Http,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TracingConfig {
    pub enabled: bool,
    /// Fraction of requests sampled, `0.0..=1.0`.
    pub sampling: f64,
}

impl Default for TracingConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            sampling: 0.15,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default, deny_unknown_fields)]
pub struct MetricsConfig {
    pub enabled: bool,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default, deny_unknown_fields)]
pub struct LogsConfig {
    pub enabled: bool,
}

mod duration_secs {
    use serde::{Deserialize, Deserializer};
    use std::time::Duration;

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        Ok(Duration::from_secs(u64::deserialize(deserializer)?))
    }
}

#[cfg(test)]
mod tests {
    use insta::assert_debug_snapshot;

    use super::TelemetryConfig;

    #[test]
    fn defaults() {
        let config: TelemetryConfig = toml::from_str("").unwrap();
        assert_debug_snapshot!(&config, @r#"
        TelemetryConfig {
            service_name: None,
            resource_attributes: {},
            exporters: ExportersConfig {
                otlp: OtlpExporterConfig {
                    enabled: false,
                    endpoint: Url {
                        scheme: "http",
                        cannot_be_a_base: false,
                        username: "",
                        password: None,
                        host: Some(
                            Domain(
                                "localhost",
                            ),
                        ),
                        port: Some(
                            4317,
                        ),
                        path: "/",
                        query: None,
                        fragment: None,
                    },
                    protocol: Grpc,
                    timeout: 60s,
                },
            },
            tracing: TracingConfig {
                enabled: false,
                sampling: 0.15,
            },
            metrics: MetricsConfig {
                enabled: false,
            },
            logs: LogsConfig {
                enabled: false,
            },
        }
        "#);
    }
}
