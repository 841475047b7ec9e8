//! The `ProviderAdapter` trait (`spec.md` §4.6), implemented once per upstream
//! in `crates/providers`.

use async_trait::async_trait;
use futures::stream::BoxStream;

use crate::{
    error::GatewayError,
    event::ProviderEvent,
    message::{CanonicalMessage, ToolDefinition},
};

/// Options that apply to a single `chat` call, independent of the canonical
/// history. Each provider adapter maps these onto its own request schema.
#[derive(Debug, Clone, Default)]
pub struct ChatOptions {
    pub model: String,
    pub temperature: Option<f32>,
    pub top_p: Option<f32>,
    /// Anthropic requires an explicit cap (`spec.md` §4.6); other adapters treat
    /// this as an optional hint.
    pub max_output_tokens: Option<u32>,
    /// When set, tool schemas gain `additionalProperties: false` at the top
    /// level (`spec.md` §4.1).
    pub strict_tools: bool,
}

/// A provider adapter translates the canonical message/tool stream to and from
/// one upstream model family.
#[async_trait]
pub trait ProviderAdapter: Send + Sync {
    /// A short, stable identifier (`"openai"`, `"anthropic"`, `"ollama"`), used
    /// for routing, metrics, and log context.
    fn name(&self) -> &'static str;

    /// Streams a chat completion. Partial tool-call fragments are buffered
    /// internally by the adapter and surfaced as a single
    /// [`ProviderEvent::ToolCallAssembled`] per call when the turn closes
    /// (`spec.md` §4.6) — callers never see mid-stream fragments.
    async fn chat(
        &self,
        messages: &[CanonicalMessage],
        tools: &[ToolDefinition],
        options: &ChatOptions,
    ) -> Result<BoxStream<'static, Result<ProviderEvent, GatewayError>>, GatewayError>;

    /// A non-streaming variant used by the Conversation Shaper's compaction
    /// pass, which needs a single summary string rather than an event stream.
    async fn chat_once(
        &self,
        messages: &[CanonicalMessage],
        options: &ChatOptions,
    ) -> Result<(String, crate::message::Usage), GatewayError>;
}
