//! The Memory Store (`spec.md` §4.4): a per-user list of short facts injected
//! into the system prompt by the Conversation Shaper, under a per-user
//! character budget.

mod error;
mod store;

pub use error::MemoryError;
pub use store::{MemoryStore, UserMemory};
