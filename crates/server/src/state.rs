//! Shared application state handed to every route handler.

use std::sync::Arc;

use config::Config;
use file_recall::FileRecallManager;
use gateway::Gateway;
use memory::MemoryStore;
use metrics::MetricsRecorder;
use sandbox::SandboxManager;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub gateway: Arc<Gateway>,
    pub file_recall: Option<Arc<FileRecallManager>>,
    pub memory: Option<Arc<MemoryStore>>,
    pub metrics: Arc<MetricsRecorder>,
    pub sandbox: Option<Arc<SandboxManager>>,
}
