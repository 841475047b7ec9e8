//! Value types exchanged across the Sandbox Manager's public contract
//! (`spec.md` §4.2).

/// The `(tenant, conversation)` key a [`crate::SandboxManager`] instance is
/// scoped to (`spec.md` §3 `SandboxInstance`). The workspace mount path is
/// `<workspace_root>/<user_id>/<conversation_id>` (`spec.md` §6).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ConvKey {
    pub user_id: String,
    pub conversation_id: String,
}

impl ConvKey {
    pub fn new(user_id: impl Into<String>, conversation_id: impl Into<String>) -> Self {
        Self { user_id: user_id.into(), conversation_id: conversation_id.into() }
    }

    pub fn workspace_subpath(&self) -> String {
        format!("{}/{}", self.user_id, self.conversation_id)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SandboxState {
    Absent,
    Starting,
    Ready,
    Busy,
    Stopping,
    Evicted,
}

/// Why a running command was forcibly terminated (`spec.md` §4.2 `exec`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KilledReason {
    Timeout,
    OutOfMemory,
}

impl KilledReason {
    pub fn as_str(self) -> &'static str {
        match self {
            KilledReason::Timeout => "timeout",
            KilledReason::OutOfMemory => "oom",
        }
    }

    /// Best-effort distinction between OOM and timeout from an OS exit code
    /// (`spec.md` §4.2: "exit code indicating OS kill (e.g. 137)"). 137 = 128 + SIGKILL(9),
    /// which the OOM killer and a hard timeout both produce; callers that
    /// know the command was killed by the timeout path pass that directly
    /// instead of calling this.
    pub fn from_exit_code(exit_code: i64) -> Option<KilledReason> {
        match exit_code {
            137 => Some(KilledReason::OutOfMemory),
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ExecResult {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: Option<i64>,
    pub killed_reason: Option<KilledReason>,
}

#[derive(Debug, Clone)]
pub struct FileEntry {
    pub path: String,
    pub is_dir: bool,
    pub size: u64,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct InstanceStats {
    pub mem_bytes: u64,
    pub cpu_percent: f64,
    pub pid_count: u64,
    pub disk_bytes: u64,
}

/// Resource policy applied to every container (`spec.md` §4.2).
#[derive(Debug, Clone, Copy)]
pub struct ResourceLimits {
    pub memory_bytes: i64,
    pub cpu_shares: i64,
    pub pids_limit: i64,
}
