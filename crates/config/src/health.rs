use std::net::SocketAddr;

/// Liveness endpoint configuration, unchanged in shape from the gateway
/// workspace's `crates/config` (module source not retrieved; reconstructed
/// from its usage in `crates/server/src/lib.rs`).
#[derive(Debug, Clone, serde::Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct HealthConfig {
    pub enabled: bool,
    /// Bind the health endpoint on a separate listener instead of the main router.
    pub listen: Option<SocketAddr>,
    pub path: String,
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            listen: None,
            path: "/health".to_owned(),
        }
    }
}
