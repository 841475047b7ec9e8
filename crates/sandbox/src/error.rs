//! Error kinds for the Sandbox Manager (`spec.md` §4.2, §7).

#[derive(Debug, thiserror::Error)]
pub enum SandboxError {
    /// Daemon errors and image-missing conditions — non-retryable at the
    /// manager level (`spec.md` §4.2 failure semantics).
    #[error("sandbox daemon error: {0}")]
    Daemon(String),

    #[error("sandbox network '{0}' does not exist; the manager refuses to start an instance without it")]
    NetworkMissing(String),

    #[error("sandbox instance for conversation '{0}' is gone")]
    InstanceGone(String),

    #[error("io error: {0}")]
    Io(String),
}

impl From<std::io::Error> for SandboxError {
    fn from(err: std::io::Error) -> Self {
        SandboxError::Io(err.to_string())
    }
}
