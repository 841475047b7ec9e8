//! Per-request context threaded through the dispatch loop, the tool
//! dispatcher, and the provider adapters (`spec.md` §4.8 cancellation;
//! generalized from the gateway workspace's `crates/llm/src/request.rs`
//! `RequestContext`).

use serde::Deserialize;
use tokio_util::sync::CancellationToken;

/// Identifies the caller of a chat request. Generalizes the gateway
/// workspace's `ClientIdentity` (`crates/context/src/client_identity.rs`) with
/// the tenant/conversation scoping the gateway's tools need.
#[derive(Debug, Clone, Default)]
pub struct RequestContext {
    pub conversation_id: String,
    pub user_id: String,
    /// Present only when the request carries a File Recall tenant id.
    pub tenant_id: Option<String>,
    /// Per-request credentials and base URLs forwarded by the caller as
    /// `tools_config` (`spec.md` §6 — "arrive per-request ... called valves by
    /// the caller"), not environment configuration.
    pub tools_config: ToolsConfig,
    /// Upstream model-provider credentials, also arriving per-request rather
    /// than from process configuration (`spec.md` §6).
    pub upstream: UpstreamCredentials,
    pub cancellation: CancellationToken,
}

/// Per-request credentials for the three upstream model families. A request
/// routes to exactly one provider (selected by `model`'s `provider/model`
/// prefix, mirroring the gateway workspace's `crates/llm/src/server.rs`
/// routing) but carries whichever credentials the caller configured.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct UpstreamCredentials {
    pub openai_api_key: Option<secrecy::SecretString>,
    pub openai_base_url: Option<String>,
    pub anthropic_api_key: Option<secrecy::SecretString>,
    pub anthropic_base_url: Option<String>,
    pub ollama_base_url: Option<String>,
}

/// The subset of per-request "valves" the core reads. Upstream credentials for
/// search/image/file-recall tools live here rather than in process
/// configuration (`spec.md` §6).
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ToolsConfig {
    pub date_time: bool,
    pub sandbox: bool,
    pub memory: bool,
    pub file_recall: bool,
    pub web_search: bool,
    pub image_generation: bool,
    pub search_api_key: Option<secrecy::SecretString>,
    pub image_backend_base_url: Option<String>,
}
