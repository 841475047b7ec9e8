//! Row types for the Metrics Recorder (`spec.md` §3 `RequestRecord`,
//! `ToolCallRecord`). Both tables are append-only: one row is written per
//! request/tool-call, never updated in place.

/// One row per chat request (`spec.md` §3).
#[derive(Debug, Clone)]
pub struct RequestRecord {
    pub id: String,
    pub conversation_id: String,
    pub user_id: String,
    /// The sandbox instance that served the request, if any sandbox tool ran.
    pub instance_id: Option<String>,
    pub model: String,
    pub provider: String,
    pub status: RequestStatus,
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub cached_input_tokens: u64,
    pub cost: f64,
    pub started_at: String,
    pub duration_ms: u64,
    pub error: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestStatus {
    Completed,
    Truncated,
    Cancelled,
    UpstreamError,
}

impl RequestStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            RequestStatus::Completed => "completed",
            RequestStatus::Truncated => "truncated",
            RequestStatus::Cancelled => "cancelled",
            RequestStatus::UpstreamError => "upstream_error",
        }
    }

    pub fn from_str(s: &str) -> Self {
        match s {
            "truncated" => RequestStatus::Truncated,
            "cancelled" => RequestStatus::Cancelled,
            "upstream_error" => RequestStatus::UpstreamError,
            _ => RequestStatus::Completed,
        }
    }
}

/// One row per tool call within a request (`spec.md` §3).
#[derive(Debug, Clone)]
pub struct ToolCallRecord {
    pub request_id: String,
    pub name: String,
    /// Hex sha256 over the call's JSON arguments — arguments themselves may
    /// carry sensitive content and are never stored verbatim.
    pub arguments_digest: String,
    pub duration_ms: u64,
    pub status: ToolCallStatus,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToolCallStatus {
    Ok,
    Error,
}

impl ToolCallStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            ToolCallStatus::Ok => "ok",
            ToolCallStatus::Error => "error",
        }
    }

    pub fn from_str(s: &str) -> Self {
        match s {
            "error" => ToolCallStatus::Error,
            _ => ToolCallStatus::Ok,
        }
    }
}
