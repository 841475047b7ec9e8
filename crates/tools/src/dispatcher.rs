//! The Tool Dispatcher (`spec.md` §4.5): the single entry point through
//! which a [`canonical::ToolCall`] becomes a tool-result string.

use std::{sync::Arc, time::Instant};

use async_trait::async_trait;
use canonical::{RequestContext, ToolCall};
use file_recall::FileRecallManager;
use memory::{MemoryError, MemoryStore};
use metrics::{MetricsRecorder, ToolCallRecord, ToolCallStatus};
use sandbox::{ConvKey, SandboxManager};
use serde_json::json;
use sha2::{Digest, Sha256};

use crate::{error::ToolError, registry::ToolRegistry};

/// The dispatch result, `spec.md` §4.5: `{ok: true, resultText} | {ok: false, errorText}`.
#[derive(Debug, Clone)]
pub struct DispatchOutcome {
    pub ok: bool,
    pub result_text: String,
}

impl DispatchOutcome {
    fn ok(text: impl Into<String>) -> Self {
        Self { ok: true, result_text: text.into() }
    }

    fn err(text: impl std::fmt::Display) -> Self {
        Self { ok: false, result_text: text.to_string() }
    }
}

/// The contract web-search and image-generation tool bodies satisfy
/// (`spec.md` §1: "we specify the dispatch contract they satisfy, not their
/// internal logic"). The default implementation always reports
/// `tool-runtime-error`, matching `SPEC_FULL.md` §4.5.
#[async_trait]
pub trait ExternalToolClient: Send + Sync {
    async fn web_search(&self, query: &str, ctx: &RequestContext) -> Result<String, ToolError>;
    async fn image_generation(&self, prompt: &str, size: Option<&str>, ctx: &RequestContext) -> Result<String, ToolError>;
}

pub struct UnconfiguredExternalToolClient;

#[async_trait]
impl ExternalToolClient for UnconfiguredExternalToolClient {
    async fn web_search(&self, _query: &str, _ctx: &RequestContext) -> Result<String, ToolError> {
        Err(ToolError::runtime("web_search", "external tool body not configured"))
    }

    async fn image_generation(&self, _prompt: &str, _size: Option<&str>, _ctx: &RequestContext) -> Result<String, ToolError> {
        Err(ToolError::runtime("image_generation", "external tool body not configured"))
    }
}

pub struct ToolDispatcher {
    registry: Arc<ToolRegistry>,
    sandbox: Option<Arc<SandboxManager>>,
    memory: Option<Arc<MemoryStore>>,
    file_recall: Option<Arc<FileRecallManager>>,
    external: Arc<dyn ExternalToolClient>,
    metrics: Arc<MetricsRecorder>,
}

impl ToolDispatcher {
    pub fn new(
        registry: Arc<ToolRegistry>,
        sandbox: Option<Arc<SandboxManager>>,
        memory: Option<Arc<MemoryStore>>,
        file_recall: Option<Arc<FileRecallManager>>,
        external: Arc<dyn ExternalToolClient>,
        metrics: Arc<MetricsRecorder>,
    ) -> Self {
        Self { registry, sandbox, memory, file_recall, external, metrics }
    }

    /// `dispatch(call, requestContext) -> {ok, resultText}` (`spec.md` §4.5).
    /// Never returns an `Err` — every failure mode this function can produce
    /// is serialized into `DispatchOutcome::err` so the dispatch loop can
    /// place it straight into a tool-role message.
    pub async fn dispatch(&self, request_id: &str, call: &ToolCall, ctx: &RequestContext) -> DispatchOutcome {
        let started = Instant::now();

        let outcome = match self.registry.validate_call(&call.name, &call.arguments, ctx) {
            Ok(()) => self.execute(call, ctx).await,
            Err(e) => DispatchOutcome::err(e),
        };

        self.metrics.record_tool_call(ToolCallRecord {
            request_id: request_id.to_owned(),
            name: call.name.clone(),
            arguments_digest: hex_sha256(&call.arguments.to_string()),
            duration_ms: started.elapsed().as_millis() as u64,
            status: if outcome.ok { ToolCallStatus::Ok } else { ToolCallStatus::Error },
        });

        outcome
    }

    async fn execute(&self, call: &ToolCall, ctx: &RequestContext) -> DispatchOutcome {
        match call.name.as_str() {
            "date_time_now" => self.date_time_now(call),
            "memory_list" => self.memory_list(ctx).await,
            "memory_create" => self.memory_create(call, ctx).await,
            "memory_update" => self.memory_update(call, ctx).await,
            "memory_delete" => self.memory_delete(call, ctx).await,
            "sandbox_execute" => self.sandbox_execute(call, ctx).await,
            "sandbox_write_file" => self.sandbox_write_file(call, ctx).await,
            "sandbox_read_file" => self.sandbox_read_file(call, ctx).await,
            "sandbox_list_files" => self.sandbox_list_files(call, ctx).await,
            "sandbox_diff_edit" => self.sandbox_diff_edit(call, ctx).await,
            "sandbox_stats" => self.sandbox_stats(ctx).await,
            "file_recall_search" => self.file_recall_search(call, ctx).await,
            "web_search" => self.web_search(call, ctx).await,
            "image_generation" => self.image_generation(call, ctx).await,
            other => DispatchOutcome::err(ToolError::UnknownTool(other.to_owned())),
        }
    }

    fn date_time_now(&self, call: &ToolCall) -> DispatchOutcome {
        let timezone = call.arguments.get("timezone").and_then(|v| v.as_str());

        let zoned = match timezone {
            Some(tz) => match tz.parse::<jiff::tz::TimeZone>() {
                Ok(tz) => jiff::Zoned::now().with_time_zone(tz),
                Err(e) => return DispatchOutcome::err(ToolError::runtime("date_time_now", format!("unknown timezone '{tz}': {e}"))),
            },
            None => jiff::Zoned::now().with_time_zone(jiff::tz::TimeZone::UTC),
        };

        DispatchOutcome::ok(zoned.strftime("%Y-%m-%dT%H:%M:%S%:z").to_string())
    }

    async fn memory_list(&self, ctx: &RequestContext) -> DispatchOutcome {
        let Some(memory) = &self.memory else {
            return DispatchOutcome::err(ToolError::runtime("memory_list", "memory store is not configured"));
        };

        match memory.retrieve(&ctx.user_id).await {
            Ok(memories) => {
                let rendered: Vec<_> = memories.into_iter().map(|m| json!({"id": m.memory_id, "text": m.text})).collect();
                DispatchOutcome::ok(serde_json::to_string(&rendered).unwrap_or_else(|_| "[]".to_owned()))
            }
            Err(e) => DispatchOutcome::err(memory_error(e)),
        }
    }

    async fn memory_create(&self, call: &ToolCall, ctx: &RequestContext) -> DispatchOutcome {
        let Some(memory) = &self.memory else {
            return DispatchOutcome::err(ToolError::runtime("memory_create", "memory store is not configured"));
        };

        let Some(text) = call.arguments.get("text").and_then(|v| v.as_str()) else {
            return DispatchOutcome::err(ToolError::ArgumentInvalid { tool: "memory_create".to_owned(), message: "missing 'text'".to_owned() });
        };

        match memory.create(&ctx.user_id, text).await {
            Ok(created) => DispatchOutcome::ok(json!({"id": created.memory_id}).to_string()),
            Err(e) => DispatchOutcome::err(memory_error(e)),
        }
    }

    async fn memory_update(&self, call: &ToolCall, ctx: &RequestContext) -> DispatchOutcome {
        let Some(memory) = &self.memory else {
            return DispatchOutcome::err(ToolError::runtime("memory_update", "memory store is not configured"));
        };

        let (Some(memory_id), Some(text)) =
            (call.arguments.get("memory_id").and_then(|v| v.as_str()), call.arguments.get("text").and_then(|v| v.as_str()))
        else {
            return DispatchOutcome::err(ToolError::ArgumentInvalid {
                tool: "memory_update".to_owned(),
                message: "missing 'memory_id' or 'text'".to_owned(),
            });
        };

        match memory.update(&ctx.user_id, memory_id, text).await {
            Ok(updated) => DispatchOutcome::ok(json!({"id": updated.memory_id}).to_string()),
            Err(e) => DispatchOutcome::err(memory_error(e)),
        }
    }

    async fn memory_delete(&self, call: &ToolCall, ctx: &RequestContext) -> DispatchOutcome {
        let Some(memory) = &self.memory else {
            return DispatchOutcome::err(ToolError::runtime("memory_delete", "memory store is not configured"));
        };

        let Some(memory_id) = call.arguments.get("memory_id").and_then(|v| v.as_str()) else {
            return DispatchOutcome::err(ToolError::ArgumentInvalid { tool: "memory_delete".to_owned(), message: "missing 'memory_id'".to_owned() });
        };

        match memory.delete(&ctx.user_id, memory_id).await {
            Ok(()) => DispatchOutcome::ok("deleted"),
            Err(e) => DispatchOutcome::err(memory_error(e)),
        }
    }

    fn conv_key(&self, ctx: &RequestContext) -> ConvKey {
        ConvKey::new(ctx.user_id.clone(), ctx.conversation_id.clone())
    }

    async fn sandbox_execute(&self, call: &ToolCall, ctx: &RequestContext) -> DispatchOutcome {
        let Some(sandbox) = &self.sandbox else {
            return DispatchOutcome::err(ToolError::runtime("sandbox_execute", "sandbox is not enabled"));
        };

        let Some(command) = call.arguments.get("command").and_then(|v| v.as_str()) else {
            return DispatchOutcome::err(ToolError::ArgumentInvalid { tool: "sandbox_execute".to_owned(), message: "missing 'command'".to_owned() });
        };

        let workdir = call.arguments.get("workdir").and_then(|v| v.as_str()).unwrap_or("/workspace");
        let command = format!("cd {workdir} && {command}");

        // Per-command failures (non-zero exit, timeout, OOM) are normal
        // returns, not errors (`spec.md` §4.2) — the model inspects them.
        match sandbox.exec_cancellable(&self.conv_key(ctx), &command, std::time::Duration::from_secs(300), ctx.cancellation.clone()).await {
            Ok(result) => DispatchOutcome::ok(
                json!({
                    "stdout": result.stdout,
                    "stderr": result.stderr,
                    "exit_code": result.exit_code,
                    "killed_reason": result.killed_reason.map(|r| r.as_str()),
                })
                .to_string(),
            ),
            Err(e) => DispatchOutcome::err(ToolError::runtime("sandbox_execute", e)),
        }
    }

    async fn sandbox_write_file(&self, call: &ToolCall, ctx: &RequestContext) -> DispatchOutcome {
        let Some(sandbox) = &self.sandbox else {
            return DispatchOutcome::err(ToolError::runtime("sandbox_write_file", "sandbox is not enabled"));
        };

        let (Some(path), Some(content)) =
            (call.arguments.get("path").and_then(|v| v.as_str()), call.arguments.get("content").and_then(|v| v.as_str()))
        else {
            return DispatchOutcome::err(ToolError::ArgumentInvalid {
                tool: "sandbox_write_file".to_owned(),
                message: "missing 'path' or 'content'".to_owned(),
            });
        };

        match sandbox.write_file(&self.conv_key(ctx), path, content.as_bytes().to_vec()).await {
            Ok(()) => DispatchOutcome::ok(format!("wrote {} bytes to {path}", content.len())),
            Err(e) => DispatchOutcome::err(ToolError::runtime("sandbox_write_file", e)),
        }
    }

    async fn sandbox_read_file(&self, call: &ToolCall, ctx: &RequestContext) -> DispatchOutcome {
        let Some(sandbox) = &self.sandbox else {
            return DispatchOutcome::err(ToolError::runtime("sandbox_read_file", "sandbox is not enabled"));
        };

        let Some(path) = call.arguments.get("path").and_then(|v| v.as_str()) else {
            return DispatchOutcome::err(ToolError::ArgumentInvalid { tool: "sandbox_read_file".to_owned(), message: "missing 'path'".to_owned() });
        };

        let max_lines = call.arguments.get("max_lines").and_then(|v| v.as_u64()).map(|n| n as usize);

        match sandbox.read_file(&self.conv_key(ctx), path).await {
            Ok(bytes) => {
                let text = String::from_utf8_lossy(&bytes);
                let rendered = match max_lines {
                    Some(limit) => text.lines().take(limit).collect::<Vec<_>>().join("\n"),
                    None => text.into_owned(),
                };
                DispatchOutcome::ok(rendered)
            }
            Err(e) => DispatchOutcome::err(ToolError::runtime("sandbox_read_file", e)),
        }
    }

    async fn sandbox_list_files(&self, call: &ToolCall, ctx: &RequestContext) -> DispatchOutcome {
        let Some(sandbox) = &self.sandbox else {
            return DispatchOutcome::err(ToolError::runtime("sandbox_list_files", "sandbox is not enabled"));
        };

        let path = call.arguments.get("path").and_then(|v| v.as_str()).unwrap_or("").to_owned();
        let recursive = call.arguments.get("recursive").and_then(|v| v.as_bool()).unwrap_or(false);
        let key = self.conv_key(ctx);

        let entries = match self.list_files_maybe_recursive(sandbox, &key, &path, recursive).await {
            Ok(entries) => entries,
            Err(e) => return DispatchOutcome::err(ToolError::runtime("sandbox_list_files", e)),
        };

        let rendered: Vec<_> = entries.into_iter().map(|e| json!({"path": e.path, "is_dir": e.is_dir, "size": e.size})).collect();
        DispatchOutcome::ok(serde_json::to_string(&rendered).unwrap_or_else(|_| "[]".to_owned()))
    }

    /// `spec.md` §4.2's `listFiles(... recursive)` contract over a manager
    /// whose `list_files` lists a single directory level at a time: walks
    /// subdirectories breadth-first, issuing one call per directory.
    async fn list_files_maybe_recursive(
        &self,
        sandbox: &SandboxManager,
        key: &ConvKey,
        path: &str,
        recursive: bool,
    ) -> Result<Vec<sandbox::FileEntry>, sandbox::SandboxError> {
        let mut all = sandbox.list_files(key, path).await?;

        if recursive {
            let mut queue: Vec<String> = all.iter().filter(|e| e.is_dir).map(|e| e.path.clone()).collect();

            while let Some(dir) = queue.pop() {
                let children = sandbox.list_files(key, &dir).await?;
                queue.extend(children.iter().filter(|e| e.is_dir).map(|e| e.path.clone()));
                all.extend(children);
            }
        }

        Ok(all)
    }

    async fn sandbox_diff_edit(&self, call: &ToolCall, ctx: &RequestContext) -> DispatchOutcome {
        let Some(sandbox) = &self.sandbox else {
            return DispatchOutcome::err(ToolError::runtime("sandbox_diff_edit", "sandbox is not enabled"));
        };

        let (Some(path), Some(search), Some(replace)) = (
            call.arguments.get("path").and_then(|v| v.as_str()),
            call.arguments.get("search").and_then(|v| v.as_str()),
            call.arguments.get("replace").and_then(|v| v.as_str()),
        ) else {
            return DispatchOutcome::err(ToolError::ArgumentInvalid {
                tool: "sandbox_diff_edit".to_owned(),
                message: "missing 'path', 'search', or 'replace'".to_owned(),
            });
        };

        let all_occurrences = call.arguments.get("all_occurrences").and_then(|v| v.as_bool()).unwrap_or(false);

        match sandbox.diff_edit(&self.conv_key(ctx), path, search, replace, all_occurrences).await {
            Ok(()) => DispatchOutcome::ok(format!("edited {path}")),
            Err(e) => DispatchOutcome::err(ToolError::runtime("sandbox_diff_edit", e)),
        }
    }

    async fn sandbox_stats(&self, ctx: &RequestContext) -> DispatchOutcome {
        let Some(sandbox) = &self.sandbox else {
            return DispatchOutcome::err(ToolError::runtime("sandbox_stats", "sandbox is not enabled"));
        };

        match sandbox.stats(&self.conv_key(ctx)).await {
            Ok(stats) => DispatchOutcome::ok(
                json!({
                    "mem_bytes": stats.mem_bytes,
                    "cpu_percent": stats.cpu_percent,
                    "pid_count": stats.pid_count,
                    "disk_bytes": stats.disk_bytes,
                })
                .to_string(),
            ),
            Err(e) => DispatchOutcome::err(ToolError::runtime("sandbox_stats", e)),
        }
    }

    async fn file_recall_search(&self, call: &ToolCall, ctx: &RequestContext) -> DispatchOutcome {
        let Some(file_recall) = &self.file_recall else {
            return DispatchOutcome::err(ToolError::runtime("file_recall_search", "file recall is not enabled"));
        };

        let Some(tenant_id) = ctx.tenant_id.as_deref() else {
            return DispatchOutcome::err(ToolError::runtime("file_recall_search", "request carries no tenant id"));
        };

        let Some(query) = call.arguments.get("query").and_then(|v| v.as_str()) else {
            return DispatchOutcome::err(ToolError::ArgumentInvalid { tool: "file_recall_search".to_owned(), message: "missing 'query'".to_owned() });
        };

        let max_results = call.arguments.get("max_results").and_then(|v| v.as_u64()).unwrap_or(10) as u32;

        match file_recall.search(tenant_id, query, max_results).await {
            Ok(hits) => {
                let rendered: Vec<_> =
                    hits.into_iter().map(|h| json!({"filename": h.filename, "score": h.score, "snippets": h.snippets})).collect();
                DispatchOutcome::ok(serde_json::to_string(&rendered).unwrap_or_else(|_| "[]".to_owned()))
            }
            Err(e) => DispatchOutcome::err(ToolError::runtime("file_recall_search", e)),
        }
    }

    async fn web_search(&self, call: &ToolCall, ctx: &RequestContext) -> DispatchOutcome {
        let Some(query) = call.arguments.get("query").and_then(|v| v.as_str()) else {
            return DispatchOutcome::err(ToolError::ArgumentInvalid { tool: "web_search".to_owned(), message: "missing 'query'".to_owned() });
        };

        match self.external.web_search(query, ctx).await {
            Ok(result) => DispatchOutcome::ok(result),
            Err(e) => DispatchOutcome::err(e),
        }
    }

    async fn image_generation(&self, call: &ToolCall, ctx: &RequestContext) -> DispatchOutcome {
        let Some(prompt) = call.arguments.get("prompt").and_then(|v| v.as_str()) else {
            return DispatchOutcome::err(ToolError::ArgumentInvalid { tool: "image_generation".to_owned(), message: "missing 'prompt'".to_owned() });
        };

        let size = call.arguments.get("size").and_then(|v| v.as_str());

        match self.external.image_generation(prompt, size, ctx).await {
            Ok(result) => DispatchOutcome::ok(result),
            Err(e) => DispatchOutcome::err(e),
        }
    }
}

fn memory_error(err: MemoryError) -> ToolError {
    match err {
        MemoryError::BudgetExceeded { user_id, attempted_total, budget } => ToolError::runtime(
            "memory",
            format!("budget-exceeded: user '{user_id}' would reach {attempted_total} chars, budget is {budget}"),
        ),
        other => ToolError::runtime("memory", other),
    }
}

fn hex_sha256(text: &str) -> String {
    let digest = Sha256::digest(text.as_bytes());
    digest.iter().map(|b| format!("{b:02x}")).collect()
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use canonical::ToolsConfig;
    use serde_json::json;

    use super::*;
    use crate::registry::ToolRegistry;

    fn ctx() -> RequestContext {
        RequestContext {
            user_id: "user-1".to_owned(),
            conversation_id: "conv-1".to_owned(),
            tools_config: ToolsConfig { date_time: true, memory: true, ..Default::default() },
            ..Default::default()
        }
    }

    async fn dispatcher() -> (ToolDispatcher, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let memory = Arc::new(MemoryStore::new(dir.path().join("memory.db"), 2000).unwrap());
        let metrics = Arc::new(MetricsRecorder::new(dir.path().join("metrics.sqlite3")).unwrap());
        let dispatcher = ToolDispatcher::new(
            Arc::new(ToolRegistry::new()),
            None,
            Some(memory),
            None,
            Arc::new(UnconfiguredExternalToolClient),
            metrics,
        );
        (dispatcher, dir)
    }

    #[tokio::test]
    async fn date_time_now_defaults_to_utc() {
        let (dispatcher, _dir) = dispatcher().await;
        let call = ToolCall { id: "call_1".to_owned(), name: "date_time_now".to_owned(), arguments: json!({}) };

        let outcome = dispatcher.dispatch("req-1", &call, &ctx()).await;
        assert!(outcome.ok);
        assert!(outcome.result_text.ends_with("+00:00"));
    }

    #[tokio::test]
    async fn unknown_tool_name_is_an_error_result_not_a_panic() {
        let (dispatcher, _dir) = dispatcher().await;
        let call = ToolCall { id: "call_1".to_owned(), name: "not_a_tool".to_owned(), arguments: json!({}) };

        let outcome = dispatcher.dispatch("req-1", &call, &ctx()).await;
        assert!(!outcome.ok);
    }

    #[tokio::test]
    async fn invalid_arguments_recover_as_an_error_result() {
        let (dispatcher, _dir) = dispatcher().await;
        let call = ToolCall { id: "call_1".to_owned(), name: "memory_create".to_owned(), arguments: json!({}) };

        let outcome = dispatcher.dispatch("req-1", &call, &ctx()).await;
        assert!(!outcome.ok);
        assert!(outcome.result_text.contains("invalid arguments"));
    }

    #[tokio::test]
    async fn memory_budget_exceeded_surfaces_as_a_tool_result_error() {
        let (dispatcher, _dir) = dispatcher().await;
        let filler = "x".repeat(2000);

        let create = ToolCall { id: "call_1".to_owned(), name: "memory_create".to_owned(), arguments: json!({"text": filler}) };
        let first = dispatcher.dispatch("req-1", &create, &ctx()).await;
        assert!(first.ok);

        let overflow = ToolCall { id: "call_2".to_owned(), name: "memory_create".to_owned(), arguments: json!({"text": "x"}) };
        let second = dispatcher.dispatch("req-1", &overflow, &ctx()).await;
        assert!(!second.ok);
        assert!(second.result_text.contains("budget-exceeded"));
    }

    #[tokio::test]
    async fn disabled_tool_never_reaches_execution() {
        let (dispatcher, _dir) = dispatcher().await;
        let call = ToolCall { id: "call_1".to_owned(), name: "sandbox_execute".to_owned(), arguments: json!({"command": "true"}) };

        let outcome = dispatcher.dispatch("req-1", &call, &ctx()).await;
        assert!(!outcome.ok);
        assert!(outcome.result_text.contains("not enabled"));
    }
}
