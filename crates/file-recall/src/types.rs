//! Data types for the File Recall Manager (`spec.md` §3 `FileRecallTenant`,
//! `FileRecallDocument`).

use secrecy::SecretString;

/// `(tenant id, display name, upstream API key, upstream vector-store id
/// (nullable until first upload), dashboard access token, file count, total
/// bytes)` (`spec.md` §3).
#[derive(Debug, Clone)]
pub struct FileRecallTenant {
    pub id: String,
    pub name: String,
    pub upstream_api_key: SecretString,
    pub vector_store_id: Option<String>,
    pub access_token: SecretString,
    pub file_count: u64,
    pub total_bytes: u64,
}

/// `(tenant id, display filename, storage filename, content sha256, size,
/// mime, upstream file id, upstream vector-store file id, status)`
/// (`spec.md` §3). Identity is `(tenant id, content sha256)` — the storage
/// filename is derived from the hash, never from caller input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileRecallDocument {
    pub tenant_id: String,
    pub document_id: String,
    pub display_filename: String,
    pub storage_filename: String,
    pub content_sha256: String,
    pub size: u64,
    pub mime: String,
    pub upstream_file_id: String,
    pub upstream_vector_store_file_id: String,
    pub status: DocumentStatus,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentStatus {
    Processing,
    Ready,
    Error,
}

impl DocumentStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            DocumentStatus::Processing => "processing",
            DocumentStatus::Ready => "ready",
            DocumentStatus::Error => "error",
        }
    }

    pub fn from_str(s: &str) -> Self {
        match s {
            "ready" => DocumentStatus::Ready,
            "error" => DocumentStatus::Error,
            _ => DocumentStatus::Processing,
        }
    }
}

/// One file handed to [`crate::FileRecallManager::upload`].
#[derive(Debug, Clone)]
pub struct UploadFile {
    pub display_filename: String,
    pub bytes: Vec<u8>,
}

/// The outcome of uploading a single file (`spec.md` §4.3 `upload`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UploadOutcome {
    Uploaded { document_id: String, display_filename: String },
    Skipped { existing_display_filename: String },
    Error { message: String },
}

/// One hit returned by [`crate::FileRecallManager::search`].
#[derive(Debug, Clone)]
pub struct SearchHit {
    pub filename: String,
    pub score: f32,
    pub snippets: Vec<String>,
}
