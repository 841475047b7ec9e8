//! The File Recall Manager (`spec.md` §4.3): per-tenant, isolated document
//! search backed by an upstream vector-search provider, with deduplication by
//! content hash (`spec.md` §3 `FileRecallDocument`, §9 REDESIGN FLAGS "file
//! identity by path").

mod error;
mod manager;
mod types;
mod vector_store;

pub use error::FileRecallError;
pub use manager::FileRecallManager;
pub use types::{DocumentStatus, FileRecallDocument, FileRecallTenant, SearchHit, UploadFile, UploadOutcome};
pub use vector_store::{OpenAiVectorStoreProvider, VectorStoreProvider};
