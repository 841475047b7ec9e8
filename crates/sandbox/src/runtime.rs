//! The Docker Engine API boundary, abstracted behind [`ContainerRuntime`] so
//! [`crate::instance`] can be tested without a real daemon — the same
//! dependency-injection shape `file-recall` uses for its upstream vector
//! provider (`crates/file-recall/src/vector_store.rs`).

use std::{
    collections::HashMap,
    path::Path,
    sync::{Arc, Mutex},
    time::Duration,
};

use async_trait::async_trait;
use bollard::{
    Docker,
    container::{Config, CreateContainerOptions, RemoveContainerOptions, StatsOptions, StopContainerOptions},
    exec::{CreateExecOptions, StartExecResults},
    models::{HostConfig, NetworkingConfig},
    network::ListNetworksOptions,
};
use bytes::Bytes;
use futures_util::StreamExt;

use crate::{
    error::SandboxError,
    types::{ExecResult, InstanceStats, KilledReason, ResourceLimits},
};

#[async_trait]
pub trait ContainerRuntime: Send + Sync {
    async fn network_exists(&self, network: &str) -> Result<bool, SandboxError>;

    async fn create_and_start(
        &self,
        name: &str,
        image: &str,
        network: &str,
        workspace_host_path: &Path,
        resources: ResourceLimits,
    ) -> Result<String, SandboxError>;

    async fn exec(
        &self,
        container_id: &str,
        command: &str,
        workdir: &str,
        timeout: Duration,
        output_byte_cap: usize,
    ) -> Result<ExecResult, SandboxError>;

    async fn stop_and_remove(&self, container_id: &str) -> Result<(), SandboxError>;

    async fn stats(&self, container_id: &str) -> Result<InstanceStats, SandboxError>;
}

pub struct BollardRuntime {
    docker: Docker,
}

impl BollardRuntime {
    pub fn connect() -> Result<Self, SandboxError> {
        let docker = Docker::connect_with_local_defaults().map_err(|e| SandboxError::Daemon(e.to_string()))?;
        Ok(Self { docker })
    }

    /// Signals a timed-out exec's PID with `SIGKILL` from inside the same
    /// container. Swallows every error: this only runs after a timeout has
    /// already been reported to the caller, so there's nothing left to
    /// propagate it to.
    async fn kill_exec(&self, exec_id: &str, container_id: &str) {
        let Ok(inspect) = self.docker.inspect_exec(exec_id).await else { return };
        let Some(pid) = inspect.pid else { return };

        let kill_options = CreateExecOptions {
            cmd: Some(vec!["kill".to_owned(), "-9".to_owned(), pid.to_string()]),
            attach_stdout: Some(false),
            attach_stderr: Some(false),
            ..Default::default()
        };

        if let Ok(kill_exec) = self.docker.create_exec(container_id, kill_options).await {
            let _ = self.docker.start_exec(&kill_exec.id, None).await;
        }
    }
}

#[async_trait]
impl ContainerRuntime for BollardRuntime {
    async fn network_exists(&self, network: &str) -> Result<bool, SandboxError> {
        let mut filters = HashMap::new();
        filters.insert("name".to_owned(), vec![network.to_owned()]);

        let options = ListNetworksOptions { filters };
        let networks = self.docker.list_networks(Some(options)).await.map_err(|e| SandboxError::Daemon(e.to_string()))?;

        Ok(networks.iter().any(|n| n.name.as_deref() == Some(network)))
    }

    async fn create_and_start(
        &self,
        name: &str,
        image: &str,
        network: &str,
        workspace_host_path: &Path,
        resources: ResourceLimits,
    ) -> Result<String, SandboxError> {
        if !self.network_exists(network).await? {
            return Err(SandboxError::NetworkMissing(network.to_owned()));
        }

        let bind = format!("{}:/workspace", workspace_host_path.display());

        let host_config = HostConfig {
            memory: Some(resources.memory_bytes),
            cpu_shares: Some(resources.cpu_shares),
            pids_limit: Some(resources.pids_limit),
            binds: Some(vec![bind]),
            network_mode: Some(network.to_owned()),
            ..Default::default()
        };

        let mut endpoints = HashMap::new();
        endpoints.insert(network.to_owned(), Default::default());

        let config = Config {
            image: Some(image.to_owned()),
            working_dir: Some("/workspace".to_owned()),
            tty: Some(true),
            host_config: Some(host_config),
            networking_config: Some(NetworkingConfig { endpoints_config: endpoints }),
            ..Default::default()
        };

        let options = CreateContainerOptions { name: name.to_owned(), platform: None };

        let response = self
            .docker
            .create_container(Some(options), config)
            .await
            .map_err(|e| SandboxError::Daemon(format!("create_container failed: {e}")))?;

        self.docker
            .start_container::<String>(&response.id, None)
            .await
            .map_err(|e| SandboxError::Daemon(format!("start_container failed: {e}")))?;

        Ok(response.id)
    }

    async fn exec(
        &self,
        container_id: &str,
        command: &str,
        workdir: &str,
        timeout: Duration,
        output_byte_cap: usize,
    ) -> Result<ExecResult, SandboxError> {
        let options = CreateExecOptions {
            cmd: Some(vec!["sh".to_owned(), "-c".to_owned(), command.to_owned()]),
            attach_stdout: Some(true),
            attach_stderr: Some(true),
            working_dir: Some(workdir.to_owned()),
            ..Default::default()
        };

        let created = self.docker.create_exec(container_id, options).await.map_err(|e| SandboxError::Daemon(e.to_string()))?;
        let exec_id = created.id;

        // Shared with the timed future so partial output survives even if
        // `collect` itself gets dropped on timeout.
        let stdout = Arc::new(Mutex::new(Vec::new()));
        let stderr = Arc::new(Mutex::new(Vec::new()));

        let collect = {
            let stdout = Arc::clone(&stdout);
            let stderr = Arc::clone(&stderr);
            let exec_id = exec_id.clone();
            async move {
                if let StartExecResults::Attached { mut output, .. } =
                    self.docker.start_exec(&exec_id, None).await.map_err(|e| SandboxError::Daemon(e.to_string()))?
                {
                    while let Some(chunk) = output.next().await {
                        match chunk {
                            Ok(bollard::container::LogOutput::StdOut { message }) => {
                                truncate_push(&mut stdout.lock().expect("stdout buffer mutex poisoned"), &message, output_byte_cap);
                            }
                            Ok(bollard::container::LogOutput::StdErr { message }) => {
                                truncate_push(&mut stderr.lock().expect("stderr buffer mutex poisoned"), &message, output_byte_cap);
                            }
                            Ok(_) => {}
                            Err(e) => return Err(SandboxError::Daemon(e.to_string())),
                        }
                    }
                }

                Ok::<_, SandboxError>(())
            }
        };

        match tokio::time::timeout(timeout, collect).await {
            Ok(Ok(())) => {
                let inspect = self.docker.inspect_exec(&exec_id).await.map_err(|e| SandboxError::Daemon(e.to_string()))?;
                let exit_code = inspect.exit_code;
                let killed_reason = exit_code.and_then(KilledReason::from_exit_code);

                Ok(ExecResult {
                    stdout: String::from_utf8_lossy(&stdout.lock().expect("stdout buffer mutex poisoned")).into_owned(),
                    stderr: String::from_utf8_lossy(&stderr.lock().expect("stderr buffer mutex poisoned")).into_owned(),
                    exit_code,
                    killed_reason,
                })
            }
            Ok(Err(e)) => Err(e),
            Err(_) => {
                // Hard timeout: the collect future gets dropped here, but
                // `stdout`/`stderr` were written to outside it, so whatever
                // came through before the deadline survives. There's no
                // "kill this exec" primitive in the Docker API, so reach for
                // the exec's own PID and signal it directly inside the
                // container — best effort, since the process may have
                // already forked past it.
                self.kill_exec(&exec_id, container_id).await;

                Ok(ExecResult {
                    stdout: String::from_utf8_lossy(&stdout.lock().expect("stdout buffer mutex poisoned")).into_owned(),
                    stderr: String::from_utf8_lossy(&stderr.lock().expect("stderr buffer mutex poisoned")).into_owned(),
                    exit_code: Some(137),
                    killed_reason: Some(KilledReason::Timeout),
                })
            }
        }
    }

    async fn stop_and_remove(&self, container_id: &str) -> Result<(), SandboxError> {
        let _ = self.docker.stop_container(container_id, Some(StopContainerOptions { t: Some(5) })).await;

        self.docker
            .remove_container(container_id, Some(RemoveContainerOptions { force: true, ..Default::default() }))
            .await
            .map_err(|e| SandboxError::Daemon(e.to_string()))?;

        Ok(())
    }

    async fn stats(&self, container_id: &str) -> Result<InstanceStats, SandboxError> {
        let options = StatsOptions { stream: false, one_shot: true };
        let mut stream = self.docker.stats(container_id, Some(options));

        let Some(Ok(stats)) = stream.next().await else {
            return Err(SandboxError::Daemon("failed to read container stats".to_owned()));
        };

        let mem_bytes = stats.memory_stats.usage.unwrap_or(0);
        let pid_count = stats.pids_stats.current.unwrap_or(0);

        let cpu_percent = compute_cpu_percent(&stats);

        Ok(InstanceStats { mem_bytes, cpu_percent, pid_count, disk_bytes: 0 })
    }
}

fn truncate_push(buf: &mut Vec<u8>, chunk: &Bytes, cap: usize) {
    if buf.len() >= cap {
        return;
    }
    let remaining = cap - buf.len();
    let take = remaining.min(chunk.len());
    buf.extend_from_slice(&chunk[..take]);
}

fn compute_cpu_percent(stats: &bollard::container::Stats) -> f64 {
    let cpu_delta = stats.cpu_stats.cpu_usage.total_usage as f64 - stats.precpu_stats.cpu_usage.total_usage as f64;
    let system_delta = stats.cpu_stats.system_cpu_usage.unwrap_or(0) as f64 - stats.precpu_stats.system_cpu_usage.unwrap_or(0) as f64;

    if system_delta > 0.0 && cpu_delta > 0.0 {
        let online_cpus = stats.cpu_stats.online_cpus.unwrap_or(1) as f64;
        (cpu_delta / system_delta) * online_cpus * 100.0
    } else {
        0.0
    }
}
