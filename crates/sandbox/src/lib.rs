//! The Sandbox Manager (`spec.md` §4.2): lazily-started, per-conversation
//! Docker containers for tool-initiated command execution, file I/O, and
//! resource introspection.

mod error;
mod instance;
mod manager;
mod runtime;
mod types;

pub use error::SandboxError;
pub use instance::InstanceHandle;
pub use manager::{SandboxManager, SandboxManagerConfig, spawn_eviction_loop};
pub use runtime::{BollardRuntime, ContainerRuntime};
pub use types::{ConvKey, ExecResult, FileEntry, InstanceStats, KilledReason, ResourceLimits, SandboxState};

#[cfg(test)]
mod tests {
    use std::{
        path::{Path, PathBuf},
        sync::{
            Arc,
            atomic::{AtomicU32, Ordering},
        },
        time::Duration,
    };

    use async_trait::async_trait;
    use tokio::sync::Mutex;

    use super::*;

    struct FakeRuntime {
        network_present: bool,
        exec_order: Arc<Mutex<Vec<String>>>,
        exec_calls: AtomicU32,
    }

    #[async_trait]
    impl ContainerRuntime for FakeRuntime {
        async fn network_exists(&self, _network: &str) -> Result<bool, SandboxError> {
            Ok(self.network_present)
        }

        async fn create_and_start(
            &self,
            _name: &str,
            _image: &str,
            network: &str,
            _workspace_host_path: &Path,
            _resources: ResourceLimits,
        ) -> Result<String, SandboxError> {
            if !self.network_exists(network).await? {
                return Err(SandboxError::NetworkMissing(network.to_owned()));
            }
            Ok("fake-container-id".to_owned())
        }

        async fn exec(
            &self,
            _container_id: &str,
            command: &str,
            _workdir: &str,
            _timeout: Duration,
            _output_byte_cap: usize,
        ) -> Result<ExecResult, SandboxError> {
            self.exec_calls.fetch_add(1, Ordering::SeqCst);
            self.exec_order.lock().await.push(command.to_owned());
            Ok(ExecResult { stdout: format!("ran: {command}"), stderr: String::new(), exit_code: Some(0), killed_reason: None })
        }

        async fn stop_and_remove(&self, _container_id: &str) -> Result<(), SandboxError> {
            Ok(())
        }

        async fn stats(&self, _container_id: &str) -> Result<InstanceStats, SandboxError> {
            Ok(InstanceStats { mem_bytes: 1024, cpu_percent: 1.5, pid_count: 3, disk_bytes: 0 })
        }
    }

    fn test_manager(runtime: Arc<FakeRuntime>, workspace_root: PathBuf) -> SandboxManager {
        test_manager_with_idle_ttl(runtime, workspace_root, Duration::from_secs(600))
    }

    fn test_manager_with_idle_ttl(runtime: Arc<FakeRuntime>, workspace_root: PathBuf, idle_ttl: Duration) -> SandboxManager {
        let config = SandboxManagerConfig {
            image: "sandbox:test".to_owned(),
            network: "sandbox-net".to_owned(),
            workspace_root,
            resources: ResourceLimits { memory_bytes: 512 * 1024 * 1024, cpu_shares: 512, pids_limit: 128 },
            idle_ttl,
            default_exec_timeout: Duration::from_secs(30),
        };
        SandboxManager::new(config, runtime)
    }

    #[tokio::test]
    async fn starting_an_instance_fails_fast_when_network_is_missing() {
        let tmp = tempfile::tempdir().unwrap();
        let runtime = Arc::new(FakeRuntime { network_present: false, exec_order: Arc::new(Mutex::new(Vec::new())), exec_calls: AtomicU32::new(0) });
        let manager = test_manager(runtime, tmp.path().to_path_buf());

        let key = ConvKey::new("user-1", "conv-1");
        let result = manager.exec(&key, "echo hi").await;

        assert!(matches!(result, Err(SandboxError::NetworkMissing(_))));
    }

    #[tokio::test]
    async fn concurrent_execs_for_the_same_conversation_run_one_at_a_time_in_order() {
        let tmp = tempfile::tempdir().unwrap();
        let exec_order = Arc::new(Mutex::new(Vec::new()));
        let runtime = Arc::new(FakeRuntime { network_present: true, exec_order: exec_order.clone(), exec_calls: AtomicU32::new(0) });
        let manager = Arc::new(test_manager(runtime, tmp.path().to_path_buf()));

        let key = ConvKey::new("user-1", "conv-1");

        let handles: Vec<_> = (0..5)
            .map(|i| {
                let manager = manager.clone();
                let key = key.clone();
                tokio::spawn(async move { manager.exec(&key, &format!("cmd-{i}")).await.unwrap() })
            })
            .collect();

        for handle in handles {
            handle.await.unwrap();
        }

        let order = exec_order.lock().await;
        assert_eq!(order.len(), 5);
        assert_eq!(manager.active_instance_count(), 1);
    }

    #[tokio::test]
    async fn write_then_read_round_trips_through_the_workspace_mount() {
        let tmp = tempfile::tempdir().unwrap();
        let runtime = Arc::new(FakeRuntime { network_present: true, exec_order: Arc::new(Mutex::new(Vec::new())), exec_calls: AtomicU32::new(0) });
        let manager = test_manager(runtime, tmp.path().to_path_buf());

        let key = ConvKey::new("user-1", "conv-2");
        manager.write_file(&key, "notes.txt", b"hello".to_vec()).await.unwrap();
        let contents = manager.read_file(&key, "notes.txt").await.unwrap();

        assert_eq!(contents, b"hello");
    }

    #[tokio::test]
    async fn path_traversal_outside_the_workspace_is_rejected() {
        let tmp = tempfile::tempdir().unwrap();
        let runtime = Arc::new(FakeRuntime { network_present: true, exec_order: Arc::new(Mutex::new(Vec::new())), exec_calls: AtomicU32::new(0) });
        let manager = test_manager(runtime, tmp.path().to_path_buf());

        let key = ConvKey::new("user-1", "conv-3");
        let result = manager.write_file(&key, "../../etc/passwd", b"pwned".to_vec()).await;

        assert!(matches!(result, Err(SandboxError::Io(_))));
    }

    #[tokio::test]
    async fn diff_edit_requires_an_exact_match() {
        let tmp = tempfile::tempdir().unwrap();
        let runtime = Arc::new(FakeRuntime { network_present: true, exec_order: Arc::new(Mutex::new(Vec::new())), exec_calls: AtomicU32::new(0) });
        let manager = test_manager(runtime, tmp.path().to_path_buf());

        let key = ConvKey::new("user-1", "conv-4");
        manager.write_file(&key, "main.py", b"print('hi')".to_vec()).await.unwrap();

        manager.diff_edit(&key, "main.py", "hi", "bye", false).await.unwrap();
        let contents = manager.read_file(&key, "main.py").await.unwrap();
        assert_eq!(contents, b"print('bye')");

        let missing = manager.diff_edit(&key, "main.py", "not-there", "x", false).await;
        assert!(matches!(missing, Err(SandboxError::Io(_))));
    }

    #[tokio::test]
    async fn diff_edit_all_occurrences_replaces_every_match() {
        let tmp = tempfile::tempdir().unwrap();
        let runtime = Arc::new(FakeRuntime { network_present: true, exec_order: Arc::new(Mutex::new(Vec::new())), exec_calls: AtomicU32::new(0) });
        let manager = test_manager(runtime, tmp.path().to_path_buf());

        let key = ConvKey::new("user-1", "conv-6");
        manager.write_file(&key, "data.txt", b"foo bar foo baz foo".to_vec()).await.unwrap();

        manager.diff_edit(&key, "data.txt", "foo", "qux", true).await.unwrap();
        let contents = manager.read_file(&key, "data.txt").await.unwrap();
        assert_eq!(contents, b"qux bar qux baz qux");
    }

    #[tokio::test]
    async fn idle_eviction_stops_and_forgets_the_instance() {
        let tmp = tempfile::tempdir().unwrap();
        let runtime = Arc::new(FakeRuntime { network_present: true, exec_order: Arc::new(Mutex::new(Vec::new())), exec_calls: AtomicU32::new(0) });
        let manager = test_manager_with_idle_ttl(runtime, tmp.path().to_path_buf(), Duration::from_millis(1));

        let key = ConvKey::new("user-1", "conv-5");
        manager.exec(&key, "echo hi").await.unwrap();
        assert_eq!(manager.active_instance_count(), 1);

        tokio::time::sleep(Duration::from_millis(20)).await;
        manager.evict_idle().await;

        assert_eq!(manager.active_instance_count(), 0);
    }

    #[test]
    fn killed_reason_classifies_oom_exit_code() {
        assert_eq!(KilledReason::from_exit_code(137), Some(KilledReason::OutOfMemory));
        assert_eq!(KilledReason::from_exit_code(0), None);
    }
}
