//! Sandbox Manager configuration (`spec.md` §4.2, §6 network/image contracts).

use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SandboxConfig {
    /// Gates `sandbox_*` tools in the registry (`spec.md` §4.1).
    pub enabled: bool,
    /// Tag of the base image every `SandboxInstance` is created from.
    pub image: String,
    /// The single isolated bridge network every instance attaches to.
    pub network: String,
    /// Idle TTL before an instance transitions `ready → evicted`.
    pub idle_ttl_secs: u64,
    /// Per-command hard timeout; on expiry `killedReason = "timeout"`.
    pub exec_timeout_secs: u64,
    /// Per-stream (stdout/stderr) byte cap for truncated output.
    pub output_byte_cap: usize,
    pub resources: SandboxResourceLimits,
    /// Host directory root under which `<user>/<conv>/…` workspaces are mounted.
    pub workspace_root: String,
}

impl Default for SandboxConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            image: "owui-sandbox-base:latest".to_owned(),
            network: "sandbox_network".to_owned(),
            idle_ttl_secs: 1_800,
            exec_timeout_secs: 300,
            output_byte_cap: 65_536,
            resources: SandboxResourceLimits::default(),
            workspace_root: "data".to_owned(),
        }
    }
}

/// Per-instance resource policy (`spec.md` §4.2: "1 GiB RAM, 2 CPU shares, 100 PIDs").
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SandboxResourceLimits {
    pub memory_bytes: i64,
    pub cpu_shares: i64,
    pub pids_limit: i64,
}

impl Default for SandboxResourceLimits {
    fn default() -> Self {
        Self {
            memory_bytes: 1 << 30,
            cpu_shares: 2,
            pids_limit: 100,
        }
    }
}

#[cfg(test)]
mod tests {
    use insta::assert_debug_snapshot;

    use super::SandboxConfig;

    #[test]
    fn defaults() {
        let config: SandboxConfig = toml::from_str("").unwrap();

        assert_debug_snapshot!(&config, @r#"
        SandboxConfig {
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
        }
        "#);
    }
}
