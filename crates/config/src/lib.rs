//! Gateway configuration structures mapping `gateway.toml`.

#![deny(missing_docs)]
#![allow(missing_docs)]

mod client_ip;
mod file_recall;
mod gateway;
mod health;
mod loader;
mod memory;
mod metrics;
mod sandbox;
mod server;
mod telemetry;

use std::path::Path;

pub use client_ip::ClientIpConfig;
pub use file_recall::FileRecallConfig;
pub use gateway::GatewayConfig;
pub use health::HealthConfig;
pub use memory::MemoryConfig;
pub use metrics::MetricsStoreConfig;
pub use sandbox::{SandboxConfig, SandboxResourceLimits};
use serde::Deserialize;
pub use server::ServerConfig;
pub use telemetry::{ExportersConfig, LogsConfig, MetricsConfig, OtlpExporterConfig, OtlpProtocol, TelemetryConfig, TracingConfig};

/// Main configuration structure for the gateway binary.
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub server: ServerConfig,
    pub gateway: GatewayConfig,
    pub sandbox: SandboxConfig,
    pub file_recall: FileRecallConfig,
    pub memory: MemoryConfig,
    pub metrics: MetricsStoreConfig,
    pub telemetry: TelemetryConfig,
}

impl Config {
    /// Load configuration from a TOML file path, expanding `{{ env.VAR }}`
    /// placeholders and applying the `spec.md` §6 environment-variable
    /// overrides on top.
    pub fn load<P: AsRef<Path>>(path: P) -> anyhow::Result<Config> {
        loader::load(path)
    }

    /// Validates cross-field invariants that a single section can't check on
    /// its own (e.g. the sandbox bridge network must exist before the manager
    /// will start).
    pub fn validate(&self) -> anyhow::Result<()> {
        loader::validate(self)
    }
}

#[cfg(test)]
mod tests {
    use insta::assert_debug_snapshot;

    use crate::Config;

    #[test]
    fn defaults() {
        let config: Config = toml::from_str("").unwrap();

        assert_debug_snapshot!(&config, @r#"
        Config {
            server: ServerConfig {
                listen_address: None,
                health: HealthConfig {
                    enabled: true,
                    listen: None,
                    path: "/health",
                },
                client_ip: ClientIpConfig {
                    x_real_ip: false,
                    x_forwarded_for_trusted_hops: None,
                },
                admin_secret: None,
                allowed_owui_instances: [],
            },
            gateway: GatewayConfig {
                max_tool_iterations: 5,
                max_input_tokens: 128000,
                max_user_message_tokens: 8000,
                compaction_token_threshold: 65536,
                compaction_max_summary_tokens: 1024,
                compaction_keep_tail_turns: 4,
                anthropic_max_tokens: 8192,
                request_timeout_secs: 600,
                compaction_model: "openai/gpt-4o-mini",
            },
            sandbox: SandboxConfig {
                enabled: false,
                image: "owui-sandbox-base:latest",
                network: "sandbox_network",
                idle_ttl_secs: 1800,
                exec_timeout_secs: 300,
                output_byte_cap: 65536,
                resources: SandboxResourceLimits {
                    memory_bytes: 1073741824,
                    cpu_shares: 2,
                    pids_limit: 100,
                },
                workspace_root: "data",
            },
            file_recall: FileRecallConfig {
                enabled: false,
                data_dir: "data/file-recall",
                database_path: "data/file-recall.db",
                vector_search_timeout: 60s,
                allowed_extensions: [
                    "pdf",
                    "docx",
                    "pptx",
                    "txt",
                    "md",
                    "html",
                    "json",
                    "tex",
                ],
            },
            memory: MemoryConfig {
                enabled: true,
                max_memory_chars: 2000,
                database_path: "data/memory.db",
            },
            metrics: MetricsStoreConfig {
                database_path: "data/metrics.sqlite3",
            },
            telemetry: TelemetryConfig {
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
            },
        }
        "#);
    }
}
