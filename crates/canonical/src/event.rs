//! The canonical streaming event algebra (`spec.md` §4.6).
//!
//! One small enum per provider-emitted unit, decoded from the provider's wire
//! format by the adapter and never constructed anywhere else. REDESIGN FLAGS §9:
//! this replaces "dynamic per-provider payload shaping" with an explicit,
//! statically-typed algebra.

use crate::message::{FinishReason, Usage};

/// An event yielded by a [`crate::ProviderAdapter::chat`] stream.
///
/// Ordering guarantee (`spec.md` §4.6): within one turn, `TextDelta` events are
/// emitted in provider order; `ToolCallAssembled` events are emitted only after
/// all text for that turn; `TurnEnd` is always last.
#[derive(Debug, Clone)]
pub enum ProviderEvent {
    TextDelta(String),
    ReasoningDelta(String),
    ToolCallAssembled(crate::message::ToolCall),
    TurnEnd {
        finish_reason: FinishReason,
        usage: Usage,
    },
}

/// An event written to the per-request outbound channel that feeds the SSE
/// writer (`spec.md` §6). Distinct from [`ProviderEvent`]: this is the
/// gateway-facing shape after the Dispatch Loop has merged adapter output with
/// tool-call detail markers.
#[derive(Debug, Clone, serde::Serialize)]
#[serde(tag = "event", content = "data")]
pub enum GatewayEvent {
    #[serde(rename = "delta")]
    Delta(DeltaPayload),
    #[serde(rename = "tool")]
    Tool(ToolMarker),
    #[serde(rename = "done")]
    Done(DonePayload),
    #[serde(rename = "error")]
    Error(ErrorPayload),
}

#[derive(Debug, Clone, serde::Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DeltaPayload {
    Text { content: String },
    Reasoning { content: String },
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct ToolMarker {
    pub id: String,
    pub name: String,
    pub phase: ToolPhase,
    /// A short, human-readable summary of the call's arguments (begin) or
    /// outcome (end), rendered by the UI as an expandable detail block.
    pub summary: String,
}

#[derive(Debug, Clone, Copy, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolPhase {
    Begin,
    End,
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct DonePayload {
    pub usage: Usage,
    pub status: RequestStatus,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestStatus {
    Completed,
    Truncated,
    Cancelled,
    UpstreamError,
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct ErrorPayload {
    pub message: String,
}
