//! The canonical message/tool/event algebra shared by every provider adapter,
//! the tool registry, and the dispatch loop.
//!
//! Generalized from the gateway workspace's `crates/llm/src/messages/unified.rs`
//! (the canonical message model) and `crates/llm/src/error.rs` (the error
//! enum shape), renamed to the vocabulary of `spec.md` §3/§4.6/§7.

mod adapter;
mod error;
mod event;
mod message;
mod request_context;

pub use adapter::{ChatOptions, ProviderAdapter};
pub use error::GatewayError;
pub use event::{DeltaPayload, DonePayload, ErrorPayload, GatewayEvent, ProviderEvent, RequestStatus, ToolMarker, ToolPhase};
pub use message::{
    CanonicalContent, CanonicalMessage, CanonicalRole, FinishReason, ImageSource, ToolCall, ToolDefinition, Usage,
};
pub use request_context::{RequestContext, ToolsConfig, UpstreamCredentials};
