use std::{sync::OnceLock, time::Duration};

use reqwest::Client;

/// A single pooled client shared by every adapter instance, built lazily on
/// first use. Per-request credentials are applied as headers on each call,
/// not baked into the client.
pub(crate) fn shared_client() -> Client {
    static CLIENT: OnceLock<Client> = OnceLock::new();

    CLIENT
        .get_or_init(|| {
            Client::builder()
                .timeout(Duration::from_secs(600))
                .pool_idle_timeout(Some(Duration::from_secs(5)))
                .tcp_nodelay(true)
                .tcp_keepalive(Some(Duration::from_secs(60)))
                .build()
                .expect("static reqwest client config is valid")
        })
        .clone()
}
