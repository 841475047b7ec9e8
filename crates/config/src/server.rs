//! HTTP server configuration settings.

use std::net::SocketAddr;

use secrecy::SecretString;
use serde::Deserialize;

use crate::{ClientIpConfig, HealthConfig};

/// HTTP server configuration settings (`spec.md` §6 — `PORT`/`HOST`,
/// `API_SECRET_KEY`, `ALLOWED_OWUI_INSTANCES`).
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ServerConfig {
    pub listen_address: Option<SocketAddr>,
    pub health: HealthConfig,
    pub client_ip: ClientIpConfig,
    /// Admin bearer secret (`API_SECRET_KEY`). Guards `/api/v1/file-recall/instances`
    /// and any other admin-auth route. `spec.md` §1 Non-goals: the core "does
    /// not implement its own user authentication beyond a shared bearer token
    /// and per-tenant access tokens" — this is that shared token.
    pub admin_secret: Option<SecretString>,
    /// IP allow-list for `/api/v1/chat` (`ALLOWED_OWUI_INSTANCES`), glob or
    /// literal entries matched against the extracted client IP.
    pub allowed_owui_instances: Vec<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_address: None,
            health: HealthConfig::default(),
            client_ip: ClientIpConfig::default(),
            admin_secret: None,
            allowed_owui_instances: Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use insta::assert_debug_snapshot;

    use super::ServerConfig;

    #[test]
    fn defaults() {
        let config: ServerConfig = toml::from_str("").unwrap();

        assert_debug_snapshot!(&config, @r#"
        ServerConfig {
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
        }
        "#);
    }
}
