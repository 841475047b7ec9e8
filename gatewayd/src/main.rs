use std::net::SocketAddr;

use args::Args;
use clap::Parser;
use tokio_util::sync::CancellationToken;

mod args;

const DEFAULT_LISTEN_ADDRESS: &str = "127.0.0.1:8080";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let mut config = config::Config::load(&args.config)?;

    if let Some(listen_address) = args.listen_address {
        config.server.listen_address = Some(listen_address);
    }

    let listen_address = config
        .server
        .listen_address
        .unwrap_or_else(|| DEFAULT_LISTEN_ADDRESS.parse::<SocketAddr>().expect("default listen address is valid"));

    let shutdown_signal = CancellationToken::new();
    let shutdown_signal_handle = shutdown_signal.clone();

    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            shutdown_signal_handle.cancel();
        }
    });

    server::serve(server::ServeConfig {
        listen_address,
        config,
        shutdown_signal,
        log_filter: args.log_filter,
        version: env!("CARGO_PKG_VERSION").to_owned(),
        bound_addr_sender: None,
    })
    .await?;

    fastrace::flush();

    Ok(())
}
