//! The Tool Registry and Tool Dispatcher (`spec.md` §4.1, §4.5).

mod builtin;
mod dispatcher;
mod error;
mod registry;

pub use builtin::ToolCategory;
pub use dispatcher::{DispatchOutcome, ExternalToolClient, ToolDispatcher, UnconfiguredExternalToolClient};
pub use error::ToolError;
pub use registry::ToolRegistry;
