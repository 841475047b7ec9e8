//! The Metrics Recorder (`spec.md` §3 `RequestRecord`/`ToolCallRecord`, §5
//! "single in-process writer").
//!
//! `spec.md` §9 REDESIGN FLAGS: "Singleton global metrics DB. Target: a
//! single owner routine receiving `RecordRequest`/`RecordToolCall` messages;
//! dashboard reads are separate and explicitly re-open a read snapshot per
//! call." Writes go through an unbounded channel drained by one background
//! task holding the only write connection; every read method opens its own
//! short-lived connection, per the "readers ... explicitly reload from the
//! persisted file before each read operation" requirement in `spec.md` §5.

use std::path::{Path, PathBuf};

use rusqlite::{Connection, params};
use tokio::sync::mpsc;

use crate::{
    error::MetricsError,
    pricing,
    types::{RequestRecord, RequestStatus, ToolCallRecord, ToolCallStatus},
};

enum Command {
    Request(RequestRecord),
    ToolCall(ToolCallRecord),
}

#[derive(Clone)]
pub struct MetricsRecorder {
    sender: mpsc::UnboundedSender<Command>,
    db_path: PathBuf,
}

impl MetricsRecorder {
    /// Opens (creating if needed) the sqlite database at `db_path`, runs the
    /// schema migration, and spawns the single writer task.
    pub fn new(db_path: impl Into<PathBuf>) -> Result<Self, MetricsError> {
        let db_path = db_path.into();

        if let Some(parent) = db_path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent).map_err(|e| MetricsError::Database(e.to_string()))?;
        }

        let conn = Connection::open(&db_path)?;
        migrate(&conn)?;

        let (sender, mut receiver) = mpsc::unbounded_channel::<Command>();
        let writer_path = db_path.clone();

        tokio::task::spawn_blocking(move || {
            let conn = match Connection::open(&writer_path) {
                Ok(conn) => conn,
                Err(e) => {
                    log::error!("metrics writer failed to open '{}': {e}", writer_path.display());
                    return;
                }
            };

            while let Some(command) = receiver.blocking_recv() {
                let result = match command {
                    Command::Request(record) => insert_request(&conn, &record),
                    Command::ToolCall(record) => insert_tool_call(&conn, &record),
                };

                if let Err(e) = result {
                    log::warn!("metrics write failed: {e}");
                }
            }
        });

        Ok(Self { sender, db_path })
    }

    /// Queues a finalized request row. Never blocks the caller — the loop
    /// that drives a chat request must not stall on metrics I/O.
    pub fn record_request(&self, record: RequestRecord) {
        if self.sender.send(Command::Request(record)).is_err() {
            log::warn!("metrics writer task is gone; dropping request record");
        }
    }

    /// Queues one tool-call row.
    pub fn record_tool_call(&self, record: ToolCallRecord) {
        if self.sender.send(Command::ToolCall(record)).is_err() {
            log::warn!("metrics writer task is gone; dropping tool-call record");
        }
    }

    /// Computes `RequestRecord.cost` from provider/model/usage. Exposed so
    /// `crates/gateway` can populate a `RequestRecord` before handing it to
    /// [`Self::record_request`].
    pub fn estimate_cost(provider: &str, model: &str, input_tokens: u64, cached_input_tokens: u64, output_tokens: u64) -> f64 {
        pricing::estimate_cost(provider, model, input_tokens, cached_input_tokens, output_tokens)
    }

    /// Read query consumed by the (external) analytics dashboard. Reopens the
    /// database file rather than reusing any cached connection (`spec.md` §5).
    pub async fn recent_requests(&self, limit: u32) -> Result<Vec<RequestRecord>, MetricsError> {
        let path = self.db_path.clone();

        tokio::task::spawn_blocking(move || {
            let conn = Connection::open(path)?;
            let mut stmt = conn.prepare(
                "SELECT id, conversation_id, user_id, instance_id, model, provider, status, input_tokens,
                        output_tokens, cached_input_tokens, cost, started_at, duration_ms, error
                 FROM requests ORDER BY started_at DESC LIMIT ?1",
            )?;

            let rows = stmt
                .query_map(params![limit], request_from_row)?
                .collect::<Result<Vec<_>, _>>()?;

            Ok::<_, MetricsError>(rows)
        })
        .await
        .map_err(|e| MetricsError::Database(e.to_string()))?
    }

    /// Read query for the tool-call rows belonging to one request.
    pub async fn tool_calls_for_request(&self, request_id: &str) -> Result<Vec<ToolCallRecord>, MetricsError> {
        let path = self.db_path.clone();
        let request_id = request_id.to_owned();

        tokio::task::spawn_blocking(move || {
            let conn = Connection::open(path)?;
            let mut stmt = conn.prepare(
                "SELECT request_id, name, arguments_digest, duration_ms, status
                 FROM tool_calls WHERE request_id = ?1",
            )?;

            let rows = stmt
                .query_map(params![request_id], tool_call_from_row)?
                .collect::<Result<Vec<_>, _>>()?;

            Ok::<_, MetricsError>(rows)
        })
        .await
        .map_err(|e| MetricsError::Database(e.to_string()))?
    }
}

fn migrate(conn: &Connection) -> Result<(), MetricsError> {
    conn.pragma_update(None, "journal_mode", "WAL")?;
    conn.execute(
        "CREATE TABLE IF NOT EXISTS requests (
            id TEXT PRIMARY KEY,
            conversation_id TEXT NOT NULL,
            user_id TEXT NOT NULL,
            instance_id TEXT,
            model TEXT NOT NULL,
            provider TEXT NOT NULL,
            status TEXT NOT NULL,
            input_tokens INTEGER NOT NULL,
            output_tokens INTEGER NOT NULL,
            cached_input_tokens INTEGER NOT NULL,
            cost REAL NOT NULL,
            started_at TEXT NOT NULL,
            duration_ms INTEGER NOT NULL,
            error TEXT
        )",
        [],
    )?;
    conn.execute(
        "CREATE TABLE IF NOT EXISTS tool_calls (
            request_id TEXT NOT NULL,
            name TEXT NOT NULL,
            arguments_digest TEXT NOT NULL,
            duration_ms INTEGER NOT NULL,
            status TEXT NOT NULL
        )",
        [],
    )?;
    conn.execute("CREATE INDEX IF NOT EXISTS tool_calls_request_id ON tool_calls (request_id)", [])?;

    Ok(())
}

fn insert_request(conn: &Connection, record: &RequestRecord) -> Result<(), MetricsError> {
    conn.execute(
        "INSERT INTO requests (id, conversation_id, user_id, instance_id, model, provider, status, input_tokens,
                                output_tokens, cached_input_tokens, cost, started_at, duration_ms, error)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)",
        params![
            record.id,
            record.conversation_id,
            record.user_id,
            record.instance_id,
            record.model,
            record.provider,
            record.status.as_str(),
            record.input_tokens as i64,
            record.output_tokens as i64,
            record.cached_input_tokens as i64,
            record.cost,
            record.started_at,
            record.duration_ms as i64,
            record.error,
        ],
    )?;

    Ok(())
}

fn insert_tool_call(conn: &Connection, record: &ToolCallRecord) -> Result<(), MetricsError> {
    conn.execute(
        "INSERT INTO tool_calls (request_id, name, arguments_digest, duration_ms, status) VALUES (?1, ?2, ?3, ?4, ?5)",
        params![record.request_id, record.name, record.arguments_digest, record.duration_ms as i64, record.status.as_str()],
    )?;

    Ok(())
}

fn request_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<RequestRecord> {
    Ok(RequestRecord {
        id: row.get(0)?,
        conversation_id: row.get(1)?,
        user_id: row.get(2)?,
        instance_id: row.get(3)?,
        model: row.get(4)?,
        provider: row.get(5)?,
        status: RequestStatus::from_str(&row.get::<_, String>(6)?),
        input_tokens: row.get::<_, i64>(7)? as u64,
        output_tokens: row.get::<_, i64>(8)? as u64,
        cached_input_tokens: row.get::<_, i64>(9)? as u64,
        cost: row.get(10)?,
        started_at: row.get(11)?,
        duration_ms: row.get::<_, i64>(12)? as u64,
        error: row.get(13)?,
    })
}

fn tool_call_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<ToolCallRecord> {
    Ok(ToolCallRecord {
        request_id: row.get(0)?,
        name: row.get(1)?,
        arguments_digest: row.get(2)?,
        duration_ms: row.get::<_, i64>(3)? as u64,
        status: ToolCallStatus::from_str(&row.get::<_, String>(4)?),
    })
}

/// Recreates the schema at `path` if it does not yet exist — used by the
/// dashboard (external) to open a read-only snapshot without racing the
/// writer's own migration.
pub fn ensure_schema(path: impl AsRef<Path>) -> Result<(), MetricsError> {
    let conn = Connection::open(path)?;
    migrate(&conn)
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn recorder() -> (MetricsRecorder, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let recorder = MetricsRecorder::new(dir.path().join("metrics.sqlite3")).unwrap();
        (recorder, dir)
    }

    #[tokio::test]
    async fn recorded_request_is_readable_after_a_brief_delay() {
        let (recorder, _dir) = recorder().await;

        recorder.record_request(RequestRecord {
            id: "req-1".to_owned(),
            conversation_id: "conv-1".to_owned(),
            user_id: "user-1".to_owned(),
            instance_id: None,
            model: "gpt-4o".to_owned(),
            provider: "openai".to_owned(),
            status: RequestStatus::Completed,
            input_tokens: 100,
            output_tokens: 50,
            cached_input_tokens: 0,
            cost: 0.01,
            started_at: "2026-01-01T00:00:00Z".to_owned(),
            duration_ms: 1200,
            error: None,
        });

        // Give the writer task a chance to drain the channel.
        for _ in 0..50 {
            let rows = recorder.recent_requests(10).await.unwrap();
            if !rows.is_empty() {
                assert_eq!(rows[0].id, "req-1");
                return;
            }
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        }

        panic!("request record was never written");
    }

    #[tokio::test]
    async fn tool_call_rows_are_scoped_to_their_request() {
        let (recorder, _dir) = recorder().await;

        recorder.record_tool_call(ToolCallRecord {
            request_id: "req-1".to_owned(),
            name: "date_time_now".to_owned(),
            arguments_digest: "abc123".to_owned(),
            duration_ms: 5,
            status: ToolCallStatus::Ok,
        });

        for _ in 0..50 {
            let rows = recorder.tool_calls_for_request("req-1").await.unwrap();
            if !rows.is_empty() {
                assert_eq!(rows[0].name, "date_time_now");
                return;
            }
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        }

        panic!("tool call record was never written");
    }
}
