use std::{net::SocketAddr, path::PathBuf};

use clap::Parser;

/// Command line arguments for the gateway daemon.
#[derive(Debug, Parser)]
#[command(name = "gatewayd", version)]
pub struct Args {
    /// Path to the `gateway.toml` configuration file.
    #[arg(short, long, env = "GATEWAY_CONFIG_PATH", default_value = "gateway.toml")]
    pub config: PathBuf,

    /// Overrides the `server.listen_address` configuration value.
    #[arg(long, env = "LISTEN_ADDRESS")]
    pub listen_address: Option<SocketAddr>,

    /// Log filter passed to the logger (e.g. `info` or `server=debug,gateway=debug`).
    #[arg(long, env = "RUST_LOG", default_value = "info")]
    pub log_filter: String,
}
