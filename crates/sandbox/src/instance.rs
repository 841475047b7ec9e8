//! A `SandboxInstance` is owned by exactly one task, reached only through a
//! request channel (`spec.md` §9 REDESIGN FLAGS: "one owner routine per
//! instance"). Commands are drained sequentially, so "at most one exec runs
//! at a time per conversation; concurrent calls queue FIFO" (`spec.md` §4.2)
//! falls out of the channel itself rather than an explicit lock.

use std::{path::PathBuf, sync::Arc, time::Duration};

use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;

use crate::{
    error::SandboxError,
    runtime::ContainerRuntime,
    types::{ConvKey, ExecResult, FileEntry, InstanceStats, ResourceLimits, SandboxState},
};

pub enum InstanceCommand {
    Exec {
        command: String,
        timeout: Duration,
        cancellation: CancellationToken,
        reply: oneshot::Sender<Result<ExecResult, SandboxError>>,
    },
    WriteFile { path: String, contents: Vec<u8>, reply: oneshot::Sender<Result<(), SandboxError>> },
    ReadFile { path: String, reply: oneshot::Sender<Result<Vec<u8>, SandboxError>> },
    ListFiles { path: String, reply: oneshot::Sender<Result<Vec<FileEntry>, SandboxError>> },
    DiffEdit { path: String, find: String, replace: String, all_occurrences: bool, reply: oneshot::Sender<Result<(), SandboxError>> },
    Stats { reply: oneshot::Sender<Result<InstanceStats, SandboxError>> },
    Stop { reply: oneshot::Sender<()> },
}

/// A handle callers hold; the actual state lives inside the actor's task.
pub struct InstanceHandle {
    pub key: ConvKey,
    sender: mpsc::Sender<InstanceCommand>,
    last_touched: std::sync::Mutex<std::time::Instant>,
}

impl InstanceHandle {
    pub fn touch(&self) {
        *self.last_touched.lock().expect("last_touched mutex poisoned") = std::time::Instant::now();
    }

    pub fn idle_for(&self) -> Duration {
        let last = *self.last_touched.lock().expect("last_touched mutex poisoned");
        last.elapsed()
    }

    async fn call<T>(&self, build: impl FnOnce(oneshot::Sender<T>) -> InstanceCommand) -> Result<T, SandboxError> {
        let (tx, rx) = oneshot::channel();
        self.sender.send(build(tx)).await.map_err(|_| SandboxError::InstanceGone(self.key.conversation_id.clone()))?;
        self.touch();
        rx.await.map_err(|_| SandboxError::InstanceGone(self.key.conversation_id.clone()))
    }

    pub async fn exec(&self, command: &str, timeout: Duration) -> Result<ExecResult, SandboxError> {
        self.exec_cancellable(command, timeout, CancellationToken::new()).await
    }

    pub async fn exec_cancellable(&self, command: &str, timeout: Duration, cancellation: CancellationToken) -> Result<ExecResult, SandboxError> {
        self.call(|reply| InstanceCommand::Exec { command: command.to_owned(), timeout, cancellation, reply }).await?
    }

    pub async fn write_file(&self, path: &str, contents: Vec<u8>) -> Result<(), SandboxError> {
        self.call(|reply| InstanceCommand::WriteFile { path: path.to_owned(), contents, reply }).await?
    }

    pub async fn read_file(&self, path: &str) -> Result<Vec<u8>, SandboxError> {
        self.call(|reply| InstanceCommand::ReadFile { path: path.to_owned(), reply }).await?
    }

    pub async fn list_files(&self, path: &str) -> Result<Vec<FileEntry>, SandboxError> {
        self.call(|reply| InstanceCommand::ListFiles { path: path.to_owned(), reply }).await?
    }

    pub async fn diff_edit(&self, path: &str, find: &str, replace: &str, all_occurrences: bool) -> Result<(), SandboxError> {
        self.call(|reply| InstanceCommand::DiffEdit {
            path: path.to_owned(),
            find: find.to_owned(),
            replace: replace.to_owned(),
            all_occurrences,
            reply,
        })
        .await?
    }

    pub async fn stats(&self) -> Result<InstanceStats, SandboxError> {
        self.call(|reply| InstanceCommand::Stats { reply }).await?
    }

    pub async fn stop(&self) {
        let (tx, rx) = oneshot::channel();
        if self.sender.send(InstanceCommand::Stop { reply: tx }).await.is_ok() {
            let _ = rx.await;
        }
    }
}

struct Actor {
    container_id: String,
    workspace_host_path: PathBuf,
    runtime: Arc<dyn ContainerRuntime>,
    state: SandboxState,
}

pub async fn spawn(
    key: ConvKey,
    image: &str,
    network: &str,
    workspace_root: &PathBuf,
    resources: ResourceLimits,
    runtime: Arc<dyn ContainerRuntime>,
) -> Result<Arc<InstanceHandle>, SandboxError> {
    let workspace_host_path = workspace_root.join(key.workspace_subpath());
    tokio::fs::create_dir_all(&workspace_host_path).await?;

    let container_name = format!("sandbox-{}-{}", sanitize(&key.user_id), sanitize(&key.conversation_id));
    let container_id = runtime.create_and_start(&container_name, image, network, &workspace_host_path, resources).await?;

    let (sender, receiver) = mpsc::channel(32);

    let actor = Actor { container_id, workspace_host_path, runtime, state: SandboxState::Ready };

    tokio::spawn(actor.run(receiver));

    Ok(Arc::new(InstanceHandle { key, sender, last_touched: std::sync::Mutex::new(std::time::Instant::now()) }))
}

fn sanitize(s: &str) -> String {
    s.chars().map(|c| if c.is_ascii_alphanumeric() { c } else { '_' }).collect()
}

impl Actor {
    async fn run(mut self, mut receiver: mpsc::Receiver<InstanceCommand>) {
        while let Some(command) = receiver.recv().await {
            match command {
                InstanceCommand::Exec { command, timeout, cancellation, reply } => {
                    self.state = SandboxState::Busy;
                    let result = tokio::select! {
                        result = self.runtime.exec(&self.container_id, &command, "/workspace", timeout, 256 * 1024) => result,
                        _ = cancellation.cancelled() => Err(SandboxError::InstanceGone("request cancelled".to_owned())),
                    };
                    self.state = SandboxState::Ready;
                    let _ = reply.send(result);
                }
                InstanceCommand::WriteFile { path, contents, reply } => {
                    let result = self.write_file(&path, contents).await;
                    let _ = reply.send(result);
                }
                InstanceCommand::ReadFile { path, reply } => {
                    let result = self.read_file(&path).await;
                    let _ = reply.send(result);
                }
                InstanceCommand::ListFiles { path, reply } => {
                    let result = self.list_files(&path).await;
                    let _ = reply.send(result);
                }
                InstanceCommand::DiffEdit { path, find, replace, all_occurrences, reply } => {
                    let result = self.diff_edit(&path, &find, &replace, all_occurrences).await;
                    let _ = reply.send(result);
                }
                InstanceCommand::Stats { reply } => {
                    let result = self.runtime.stats(&self.container_id).await;
                    let _ = reply.send(result);
                }
                InstanceCommand::Stop { reply } => {
                    self.state = SandboxState::Stopping;
                    let _ = self.runtime.stop_and_remove(&self.container_id).await;
                    let _ = reply.send(());
                    break;
                }
            }
        }
    }

    /// Normalizes `path` against the workspace root without touching the
    /// filesystem, so a `..` component can never walk above
    /// `workspace_host_path` regardless of how it's nested (`spec.md` §4.2:
    /// sandbox file operations are confined to the conversation's mount).
    fn resolve(&self, path: &str) -> Result<PathBuf, SandboxError> {
        let mut stack: Vec<std::ffi::OsString> = Vec::new();

        for component in std::path::Path::new(path.trim_start_matches('/')).components() {
            match component {
                std::path::Component::Normal(part) => stack.push(part.to_os_string()),
                std::path::Component::CurDir => {}
                std::path::Component::ParentDir => {
                    if stack.pop().is_none() {
                        return Err(SandboxError::Io(format!("path '{path}' escapes the sandbox workspace")));
                    }
                }
                std::path::Component::RootDir | std::path::Component::Prefix(_) => {
                    return Err(SandboxError::Io(format!("path '{path}' escapes the sandbox workspace")));
                }
            }
        }

        let mut resolved = self.workspace_host_path.clone();
        resolved.extend(stack);
        Ok(resolved)
    }

    async fn write_file(&self, path: &str, contents: Vec<u8>) -> Result<(), SandboxError> {
        let resolved = self.resolve(path)?;
        if let Some(parent) = resolved.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(resolved, contents).await?;
        Ok(())
    }

    async fn read_file(&self, path: &str) -> Result<Vec<u8>, SandboxError> {
        let resolved = self.resolve(path)?;
        Ok(tokio::fs::read(resolved).await?)
    }

    async fn list_files(&self, path: &str) -> Result<Vec<FileEntry>, SandboxError> {
        let resolved = self.resolve(path)?;
        let mut entries = Vec::new();
        let mut dir = tokio::fs::read_dir(resolved).await?;

        while let Some(entry) = dir.next_entry().await? {
            let metadata = entry.metadata().await?;
            let relative = entry.path().strip_prefix(&self.workspace_host_path).unwrap_or(&entry.path()).to_string_lossy().into_owned();
            entries.push(FileEntry { path: relative, is_dir: metadata.is_dir(), size: metadata.len() });
        }

        Ok(entries)
    }

    async fn diff_edit(&self, path: &str, find: &str, replace: &str, all_occurrences: bool) -> Result<(), SandboxError> {
        let resolved = self.resolve(path)?;
        let current = tokio::fs::read_to_string(&resolved).await?;

        if !current.contains(find) {
            return Err(SandboxError::Io(format!("pattern not found in '{path}'")));
        }

        let updated = if all_occurrences { current.replace(find, replace) } else { current.replacen(find, replace, 1) };
        tokio::fs::write(resolved, updated).await?;
        Ok(())
    }
}

#[allow(dead_code)]
fn unused_state_guard(state: SandboxState) -> bool {
    matches!(state, SandboxState::Evicted | SandboxState::Absent)
}
