//! Error kind for the Tool Registry and Tool Dispatcher (`spec.md` §4.1, §4.5).
//!
//! Every variant here ends up serialized into a tool-result string rather
//! than raised as a request failure (`spec.md` §7: "the dispatcher never
//! raises tool failures up the stack as request failures").

#[derive(Debug, thiserror::Error)]
pub enum ToolError {
    #[error("unknown tool '{0}'")]
    UnknownTool(String),

    #[error("tool '{0}' is not enabled for this request")]
    NotEnabled(String),

    #[error("tool '{tool}' received invalid arguments: {message}")]
    ArgumentInvalid { tool: String, message: String },

    #[error("tool '{tool}' failed: {message}")]
    Runtime { tool: String, message: String },
}

impl ToolError {
    pub fn runtime(tool: impl Into<String>, message: impl std::fmt::Display) -> Self {
        ToolError::Runtime { tool: tool.into(), message: message.to_string() }
    }
}
