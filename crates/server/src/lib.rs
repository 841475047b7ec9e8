//! Gateway server library.
//!
//! Provides a reusable `serve` function wiring the HTTP router to the
//! Gateway, the Sandbox Manager, the File Recall Manager, the Memory Store,
//! and the Metrics Recorder, built from a single [`config::Config`].

#![deny(missing_docs)]
#![allow(missing_docs)]

mod allowlist;
mod auth;
mod logger;
mod routes;
mod state;
mod tracing;

use std::{net::SocketAddr, sync::Arc, time::Duration};

use allowlist::AllowlistLayer;
use anyhow::anyhow;
use auth::{AdminAuthLayer, TenantAuthLayer};
use axum::{
    Router,
    routing::{delete, get, post},
};
use config::Config;
use file_recall::{FileRecallManager, OpenAiVectorStoreProvider};
use gateway::{ConversationShaper, Gateway};
use memory::MemoryStore;
use metrics::MetricsRecorder;
use sandbox::{BollardRuntime, SandboxManager, SandboxManagerConfig};
use state::AppState;
use telemetry::TelemetryGuard;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tools::{ToolDispatcher, ToolRegistry, UnconfiguredExternalToolClient};
use tracing::TracingLayer;

/// Configuration for serving the gateway.
pub struct ServeConfig {
    /// The socket address (IP and port) the server will bind to.
    pub listen_address: SocketAddr,
    /// The deserialized `gateway.toml` configuration.
    pub config: Config,
    /// Cancellation token for graceful shutdown.
    pub shutdown_signal: CancellationToken,
    /// Log filter string (e.g. `"info"` or `"server=debug,gateway=debug"`).
    pub log_filter: String,
    /// The version string to log on startup.
    pub version: String,
    /// Optional oneshot sender to send back the bound address, useful if port 0 was specified.
    pub bound_addr_sender: Option<tokio::sync::oneshot::Sender<SocketAddr>>,
}

/// Starts and runs the gateway server with the provided configuration.
pub async fn serve(
    ServeConfig { listen_address, config, shutdown_signal, log_filter, version, bound_addr_sender }: ServeConfig,
) -> anyhow::Result<()> {
    let _telemetry_guard = init_otel(&config, log_filter).await;

    log::info!("owui-gateway {version}");

    let state = build_state(&config)?;

    if let Some(manager) = sandbox_manager(&state) {
        sandbox::spawn_eviction_loop(manager, Duration::from_secs(60));
    }

    let app = router(config, state);

    let listener = TcpListener::bind(listen_address).await.map_err(|e| anyhow!("failed to bind to {listen_address}: {e}"))?;

    if let Some(sender) = bound_addr_sender {
        sender.send(listener.local_addr()?).expect("failed to send back bound address");
    }

    log::info!("chat endpoint: http://{listen_address}/api/v1/chat");

    tokio::select! {
        result = axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>()) => {
            result.map_err(|e| anyhow!("server error: {e}"))?;
        }
        _ = shutdown_signal.cancelled() => {
            log::info!("received shutdown signal, shutting down gracefully...");
        }
    }

    Ok(())
}

fn sandbox_manager(state: &AppState) -> Option<Arc<SandboxManager>> {
    state.sandbox.clone()
}

fn router(config: Config, state: AppState) -> Router {
    let tracing = TracingLayer::with_config(Arc::new(config.telemetry.clone()));

    let chat_routes = Router::new()
        .route("/api/v1/chat", post(routes::chat::chat))
        .layer(AllowlistLayer::new(config.server.client_ip.clone(), config.server.allowed_owui_instances.clone()));

    let admin_routes = Router::new()
        .route("/api/v1/file-recall/instances", post(routes::file_recall::create_instance))
        .route(
            "/api/v1/file-recall/instances/{id}",
            get(routes::file_recall::get_instance).put(routes::file_recall::update_instance).delete(routes::file_recall::delete_instance),
        )
        .layer(AdminAuthLayer::new(config.server.admin_secret.clone()));

    let tenant_routes = Router::new()
        .route("/api/v1/file-recall/documents", post(routes::file_recall::upload).get(routes::file_recall::list))
        .route("/api/v1/file-recall/documents/{id}", delete(routes::file_recall::delete_document))
        .layer(TenantAuthLayer::new(state.file_recall.clone()));

    let health_routes = Router::new().route(&config.server.health.path, get(routes::health::health));

    Router::new()
        .merge(chat_routes)
        .merge(admin_routes)
        .merge(tenant_routes)
        .merge(health_routes)
        .layer(tracing)
        .with_state(state)
}

fn build_state(config: &Config) -> anyhow::Result<AppState> {
    let metrics = Arc::new(MetricsRecorder::new(&config.metrics.database_path)?);

    let memory = if config.memory.enabled {
        Some(Arc::new(MemoryStore::new(&config.memory.database_path, config.memory.max_memory_chars)?))
    } else {
        None
    };

    let file_recall = if config.file_recall.enabled {
        let provider = Arc::new(OpenAiVectorStoreProvider::new(None, config.file_recall.vector_search_timeout));
        Some(Arc::new(FileRecallManager::new(
            &config.file_recall.database_path,
            &config.file_recall.data_dir,
            config.file_recall.allowed_extensions.clone(),
            provider,
        )?))
    } else {
        None
    };

    let sandbox = if config.sandbox.enabled {
        let runtime = Arc::new(BollardRuntime::connect()?);
        let manager_config = SandboxManagerConfig {
            image: config.sandbox.image.clone(),
            network: config.sandbox.network.clone(),
            workspace_root: config.sandbox.workspace_root.clone().into(),
            resources: sandbox::ResourceLimits {
                memory_bytes: config.sandbox.resources.memory_bytes,
                cpu_shares: config.sandbox.resources.cpu_shares,
                pids_limit: config.sandbox.resources.pids_limit,
            },
            idle_ttl: Duration::from_secs(config.sandbox.idle_ttl_secs),
            default_exec_timeout: Duration::from_secs(config.sandbox.exec_timeout_secs),
        };
        Some(Arc::new(SandboxManager::new(manager_config, runtime)))
    } else {
        None
    };

    let registry = Arc::new(ToolRegistry::new());
    let dispatcher = Arc::new(ToolDispatcher::new(
        registry.clone(),
        sandbox.clone(),
        memory.clone(),
        file_recall.clone(),
        Arc::new(UnconfiguredExternalToolClient),
        metrics.clone(),
    ));
    let shaper = ConversationShaper::new(memory.clone());
    let gateway = Arc::new(Gateway::new(config.gateway.clone(), shaper, registry, dispatcher));

    Ok(AppState { config: Arc::new(config.clone()), gateway, file_recall, memory, metrics, sandbox })
}

async fn init_otel(config: &Config, log_filter: String) -> Option<TelemetryGuard> {
    match telemetry::init(&config.telemetry).await {
        Ok(guard) => {
            let otel_appender = guard.logs_appender().cloned();
            logger::init(&log_filter, otel_appender);
            Some(guard)
        }
        Err(e) => {
            eprintln!("failed to initialize telemetry: {e}");
            logger::init(&log_filter, None);
            None
        }
    }
}
