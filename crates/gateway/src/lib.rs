//! The Conversation Shaper and Dispatch Loop (`spec.md` §4.7, §4.8) plus the
//! provider router that ties a request's `model` string to a live
//! [`canonical::ProviderAdapter`].
//!
//! `crates/server`'s chat handler is the sole caller of [`Gateway::handle_chat`]:
//! it owns the per-request `tokio::sync::mpsc::Sender<GatewayEvent>` and the
//! `CancellationToken` wired into `RequestContext`, per `SPEC_FULL.md` §4.8.

mod dispatch_loop;
mod router;
mod shaper;

use std::sync::Arc;

use canonical::{CanonicalMessage, ChatOptions, GatewayError, GatewayEvent, RequestContext};
use config::GatewayConfig;
use tokio::sync::mpsc;
use tools::{ToolDispatcher, ToolRegistry};

pub use dispatch_loop::{LoopOutcome, done_payload};
pub use router::{ResolvedRoute, resolve as resolve_route};
pub use shaper::ConversationShaper;

pub struct Gateway {
    config: GatewayConfig,
    shaper: ConversationShaper,
    tool_registry: Arc<ToolRegistry>,
    dispatcher: Arc<ToolDispatcher>,
}

impl Gateway {
    pub fn new(config: GatewayConfig, shaper: ConversationShaper, tool_registry: Arc<ToolRegistry>, dispatcher: Arc<ToolDispatcher>) -> Self {
        Self { config, shaper, tool_registry, dispatcher }
    }

    /// Shapes the inbound history, resolves the requested model to a
    /// provider adapter, and drives the dispatch loop to completion.
    pub async fn handle_chat(
        &self,
        request_id: &str,
        model: &str,
        history: Vec<CanonicalMessage>,
        attached_file_count: usize,
        ctx: &RequestContext,
        events: &mpsc::Sender<GatewayEvent>,
    ) -> Result<LoopOutcome, GatewayError> {
        let route = router::resolve(model, &ctx.upstream, &self.config)?;
        let compaction_route = router::resolve(&self.config.compaction_model, &ctx.upstream, &self.config)?;

        let history = self
            .shaper
            .shape(&ctx.user_id, history, attached_file_count, &self.config, compaction_route.adapter.as_ref())
            .await?;

        let tools = self.tool_registry.list_enabled(ctx);
        let options = ChatOptions { model: route.model, ..Default::default() };

        dispatch_loop::run(
            request_id,
            history,
            &tools,
            &self.dispatcher,
            route.adapter.as_ref(),
            &options,
            ctx,
            self.config.max_tool_iterations,
            events,
        )
        .await
    }
}
