//! Error kinds for the File Recall Manager (`spec.md` §4.3, §7).

#[derive(Debug, thiserror::Error)]
pub enum FileRecallError {
    #[error("tenant '{0}' not found")]
    TenantNotFound(String),

    #[error("document '{0}' not found")]
    DocumentNotFound(String),

    #[error("extension '{0}' is not in the allow-list")]
    ExtensionNotAllowed(String),

    #[error("upstream vector-search provider error: {0}")]
    Upstream(String),

    #[error("file recall store error: {0}")]
    Store(String),

    #[error("io error: {0}")]
    Io(String),
}

impl From<rusqlite::Error> for FileRecallError {
    fn from(err: rusqlite::Error) -> Self {
        FileRecallError::Store(err.to_string())
    }
}

impl From<std::io::Error> for FileRecallError {
    fn from(err: std::io::Error) -> Self {
        FileRecallError::Io(err.to_string())
    }
}
