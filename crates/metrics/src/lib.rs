//! The Metrics Recorder (`spec.md` §3 `RequestRecord`/`ToolCallRecord`, §5
//! single-writer policy): an append-only log of chat requests and their
//! tool calls, backed by `rusqlite`.

mod error;
mod pricing;
mod recorder;
mod types;

pub use error::MetricsError;
pub use recorder::{MetricsRecorder, ensure_schema};
pub use types::{RequestRecord, RequestStatus, ToolCallRecord, ToolCallStatus};
