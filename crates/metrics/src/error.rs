//! Error kind for the Metrics Recorder.

#[derive(Debug, thiserror::Error)]
pub enum MetricsError {
    #[error("metrics store error: {0}")]
    Database(String),
}

impl From<rusqlite::Error> for MetricsError {
    fn from(err: rusqlite::Error) -> Self {
        MetricsError::Database(err.to_string())
    }
}
