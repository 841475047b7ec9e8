//! Canonical error kinds (`spec.md` §7), realized the way `LlmError` is in the
//! gateway workspace (`crates/llm/src/error.rs`): a `thiserror` enum with a
//! status-code mapping and an `IntoResponse` impl for the kinds that are ever
//! allowed to terminate an HTTP response directly.

use axum::{Json, http::StatusCode, response::IntoResponse};
use serde::Serialize;

#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    #[error("{0}")]
    RequestInvalid(String),

    #[error("authentication rejected")]
    AuthDenied,

    #[error("upstream unavailable: {0}")]
    UpstreamUnavailable(String),

    /// Schema validation failure. Never reaches `IntoResponse` — the dispatcher
    /// converts this into a tool-result string before it leaves `crates/tools`.
    #[error("tool '{tool}' received invalid arguments: {message}")]
    ToolArgumentInvalid { tool: String, message: String },

    /// Sandbox daemon failure, file-recall upstream failure. Never reaches
    /// `IntoResponse` for the same reason as `ToolArgumentInvalid`.
    #[error("tool '{tool}' failed: {message}")]
    ToolRuntimeError { tool: String, message: String },

    #[error("budget exceeded: {0}")]
    BudgetExceeded(String),

    #[error("request cancelled")]
    Cancelled,

    #[error("internal error: {0}")]
    Internal(String),
}

impl GatewayError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            GatewayError::RequestInvalid(_) => StatusCode::BAD_REQUEST,
            GatewayError::AuthDenied => StatusCode::UNAUTHORIZED,
            GatewayError::UpstreamUnavailable(_) => StatusCode::BAD_GATEWAY,
            GatewayError::ToolArgumentInvalid { .. } => StatusCode::BAD_REQUEST,
            GatewayError::ToolRuntimeError { .. } => StatusCode::INTERNAL_SERVER_ERROR,
            GatewayError::BudgetExceeded(_) => StatusCode::BAD_REQUEST,
            GatewayError::Cancelled => StatusCode::BAD_REQUEST,
            GatewayError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn error_type(&self) -> &'static str {
        match self {
            GatewayError::RequestInvalid(_) => "request_invalid",
            GatewayError::AuthDenied => "auth_denied",
            GatewayError::UpstreamUnavailable(_) => "upstream_unavailable",
            GatewayError::ToolArgumentInvalid { .. } => "tool_argument_invalid",
            GatewayError::ToolRuntimeError { .. } => "tool_runtime_error",
            GatewayError::BudgetExceeded(_) => "budget_exceeded",
            GatewayError::Cancelled => "cancelled",
            GatewayError::Internal(_) => "internal_error",
        }
    }

    /// The string placed in a tool-role message when this error is recoverable
    /// per `spec.md` §7's propagation policy.
    pub fn as_tool_result(&self) -> String {
        self.to_string()
    }
}

#[derive(Serialize)]
struct ErrorBody {
    error: ErrorDetails,
}

#[derive(Serialize)]
struct ErrorDetails {
    message: String,
    r#type: &'static str,
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> axum::response::Response {
        let status = self.status_code();
        let body = ErrorBody {
            error: ErrorDetails {
                message: self.to_string(),
                r#type: self.error_type(),
            },
        };

        (status, Json(body)).into_response()
    }
}
