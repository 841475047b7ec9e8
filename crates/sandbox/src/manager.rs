//! The Sandbox Manager (`spec.md` §4.2): one Docker container per
//! `(user, conversation)`, started lazily, evicted after an idle TTL, and
//! reached exclusively through [`crate::instance::InstanceHandle`].

use std::{path::PathBuf, sync::Arc, time::Duration};

use dashmap::DashMap;
use tokio_util::sync::CancellationToken;

use crate::{
    error::SandboxError,
    instance::{self, InstanceHandle},
    runtime::ContainerRuntime,
    types::{ConvKey, ExecResult, FileEntry, InstanceStats, ResourceLimits},
};

pub struct SandboxManagerConfig {
    pub image: String,
    pub network: String,
    pub workspace_root: PathBuf,
    pub resources: ResourceLimits,
    pub idle_ttl: Duration,
    pub default_exec_timeout: Duration,
}

pub struct SandboxManager {
    config: SandboxManagerConfig,
    runtime: Arc<dyn ContainerRuntime>,
    instances: DashMap<ConvKey, Arc<InstanceHandle>>,
}

impl SandboxManager {
    pub fn new(config: SandboxManagerConfig, runtime: Arc<dyn ContainerRuntime>) -> Self {
        Self { config, runtime, instances: DashMap::new() }
    }

    /// Returns the instance for `key`, starting a new container if none is
    /// running yet. Fails with [`SandboxError::NetworkMissing`] if the
    /// configured bridge network does not exist — the manager never creates
    /// it (`spec.md` §4.2: "refuses to start an instance without it").
    async fn get_or_start(&self, key: &ConvKey) -> Result<Arc<InstanceHandle>, SandboxError> {
        if let Some(existing) = self.instances.get(key) {
            return Ok(existing.clone());
        }

        let handle = instance::spawn(
            key.clone(),
            &self.config.image,
            &self.config.network,
            &self.config.workspace_root,
            self.config.resources,
            self.runtime.clone(),
        )
        .await?;

        self.instances.insert(key.clone(), handle.clone());
        Ok(handle)
    }

    pub async fn exec(&self, key: &ConvKey, command: &str) -> Result<ExecResult, SandboxError> {
        let instance = self.get_or_start(key).await?;
        instance.exec(command, self.config.default_exec_timeout).await
    }

    pub async fn exec_with_timeout(&self, key: &ConvKey, command: &str, timeout: Duration) -> Result<ExecResult, SandboxError> {
        let instance = self.get_or_start(key).await?;
        instance.exec(command, timeout).await
    }

    pub async fn exec_cancellable(
        &self,
        key: &ConvKey,
        command: &str,
        timeout: Duration,
        cancellation: CancellationToken,
    ) -> Result<ExecResult, SandboxError> {
        let instance = self.get_or_start(key).await?;
        instance.exec_cancellable(command, timeout, cancellation).await
    }

    pub async fn write_file(&self, key: &ConvKey, path: &str, contents: Vec<u8>) -> Result<(), SandboxError> {
        let instance = self.get_or_start(key).await?;
        instance.write_file(path, contents).await
    }

    pub async fn read_file(&self, key: &ConvKey, path: &str) -> Result<Vec<u8>, SandboxError> {
        let instance = self.get_or_start(key).await?;
        instance.read_file(path).await
    }

    pub async fn list_files(&self, key: &ConvKey, path: &str) -> Result<Vec<FileEntry>, SandboxError> {
        let instance = self.get_or_start(key).await?;
        instance.list_files(path).await
    }

    pub async fn diff_edit(&self, key: &ConvKey, path: &str, find: &str, replace: &str, all_occurrences: bool) -> Result<(), SandboxError> {
        let instance = self.get_or_start(key).await?;
        instance.diff_edit(path, find, replace, all_occurrences).await
    }

    pub async fn stats(&self, key: &ConvKey) -> Result<InstanceStats, SandboxError> {
        let instance = self.get_or_start(key).await?;
        instance.stats().await
    }

    /// Stops and drops every instance that has been idle longer than the
    /// configured TTL. Intended to be driven by a background `tokio::spawn`
    /// loop on a `tokio::time::interval` tick.
    pub async fn evict_idle(&self) {
        let idle_ttl = self.config.idle_ttl;
        let stale: Vec<ConvKey> =
            self.instances.iter().filter(|entry| entry.value().idle_for() >= idle_ttl).map(|entry| entry.key().clone()).collect();

        for key in stale {
            if let Some((_, handle)) = self.instances.remove(&key) {
                log::info!("evicting idle sandbox instance for conversation '{}'", key.conversation_id);
                handle.stop().await;
            }
        }
    }

    pub async fn shutdown_all(&self) {
        let keys: Vec<ConvKey> = self.instances.iter().map(|entry| entry.key().clone()).collect();
        for key in keys {
            if let Some((_, handle)) = self.instances.remove(&key) {
                handle.stop().await;
            }
        }
    }

    pub fn active_instance_count(&self) -> usize {
        self.instances.len()
    }
}

/// Spawns the background idle-eviction loop; the returned task runs until
/// the manager is dropped.
pub fn spawn_eviction_loop(manager: Arc<SandboxManager>, interval: Duration) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        loop {
            ticker.tick().await;
            manager.evict_idle().await;
        }
    })
}
