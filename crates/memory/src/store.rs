//! Per-user key-value record of short facts (`spec.md` §4.4 `UserMemory`).
//!
//! Persisted in its own sqlite database (`SPEC_FULL.md` §4.4 — kept separate
//! from File Recall's store, one file per bounded concern). Writes for one
//! user are serialized by a per-user `tokio::sync::Mutex` so the
//! budget-check-then-write sequence is atomic; writes for different users run
//! on independent connections and therefore in parallel (`spec.md` §5).

use std::{path::PathBuf, sync::Arc};

use dashmap::DashMap;
use rusqlite::{Connection, OptionalExtension, params};
use tokio::sync::Mutex;

use crate::error::MemoryError;

/// One short fact recorded for a user (`spec.md` §3 `UserMemory`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserMemory {
    pub user_id: String,
    pub memory_id: String,
    pub text: String,
    pub created_at: String,
    pub updated_at: String,
}

pub struct MemoryStore {
    db_path: PathBuf,
    max_chars: usize,
    locks: DashMap<String, Arc<Mutex<()>>>,
}

impl MemoryStore {
    /// Opens (creating if needed) the sqlite database at `db_path` and runs
    /// the schema migration. `max_chars` is `MAX_MEMORY_CHARS` (`spec.md` §6).
    pub fn new(db_path: impl Into<PathBuf>, max_chars: usize) -> Result<Self, MemoryError> {
        let db_path = db_path.into();

        if let Some(parent) = db_path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent).map_err(|e| MemoryError::Database(e.to_string()))?;
        }

        let conn = Connection::open(&db_path)?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.execute(
            "CREATE TABLE IF NOT EXISTS memories (
                user_id TEXT NOT NULL,
                memory_id TEXT NOT NULL,
                text TEXT NOT NULL,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL,
                PRIMARY KEY (user_id, memory_id)
            )",
            [],
        )?;

        Ok(Self { db_path, max_chars, locks: DashMap::new() })
    }

    fn user_lock(&self, user_id: &str) -> Arc<Mutex<()>> {
        self.locks.entry(user_id.to_owned()).or_insert_with(|| Arc::new(Mutex::new(()))).clone()
    }

    fn connection(&self) -> Result<Connection, MemoryError> {
        Ok(Connection::open(&self.db_path)?)
    }

    fn total_chars(conn: &Connection, user_id: &str) -> Result<usize, MemoryError> {
        let total: i64 = conn.query_row(
            "SELECT COALESCE(SUM(LENGTH(text)), 0) FROM memories WHERE user_id = ?1",
            params![user_id],
            |row| row.get(0),
        )?;
        Ok(total as usize)
    }

    /// `retrieve(user)` (`spec.md` §4.4). Returns memories oldest-first.
    pub async fn retrieve(&self, user_id: &str) -> Result<Vec<UserMemory>, MemoryError> {
        let conn = self.connection()?;
        let user_id = user_id.to_owned();

        tokio::task::spawn_blocking(move || {
            let mut stmt = conn.prepare(
                "SELECT user_id, memory_id, text, created_at, updated_at FROM memories
                 WHERE user_id = ?1 ORDER BY created_at ASC",
            )?;

            let rows = stmt
                .query_map(params![user_id], |row| {
                    Ok(UserMemory {
                        user_id: row.get(0)?,
                        memory_id: row.get(1)?,
                        text: row.get(2)?,
                        created_at: row.get(3)?,
                        updated_at: row.get(4)?,
                    })
                })?
                .collect::<Result<Vec<_>, _>>()?;

            Ok::<_, MemoryError>(rows)
        })
        .await
        .map_err(|e| MemoryError::Database(e.to_string()))?
    }

    /// `create(user, text)` (`spec.md` §4.4). Fails with [`MemoryError::BudgetExceeded`]
    /// when the new total would exceed `max_chars`.
    pub async fn create(&self, user_id: &str, text: &str) -> Result<UserMemory, MemoryError> {
        let lock = self.user_lock(user_id);
        let _guard = lock.lock().await;

        let conn = self.connection()?;
        let user_id = user_id.to_owned();
        let text = text.to_owned();
        let max_chars = self.max_chars;
        let now = now_rfc3339();

        tokio::task::spawn_blocking(move || {
            let existing = Self::total_chars(&conn, &user_id)?;
            let attempted_total = existing + text.chars().count();

            if attempted_total > max_chars {
                return Err(MemoryError::BudgetExceeded { user_id, attempted_total, budget: max_chars });
            }

            let memory_id = uuid::Uuid::new_v4().to_string();
            conn.execute(
                "INSERT INTO memories (user_id, memory_id, text, created_at, updated_at) VALUES (?1, ?2, ?3, ?4, ?4)",
                params![user_id, memory_id, text, now],
            )?;

            Ok(UserMemory { user_id, memory_id, text, created_at: now.clone(), updated_at: now })
        })
        .await
        .map_err(|e| MemoryError::Database(e.to_string()))?
    }

    /// `update(user, id, text)` (`spec.md` §4.4). The replaced memory's old
    /// length is excluded before re-checking the budget, so shrinking a
    /// memory never spuriously fails.
    pub async fn update(&self, user_id: &str, memory_id: &str, text: &str) -> Result<UserMemory, MemoryError> {
        let lock = self.user_lock(user_id);
        let _guard = lock.lock().await;

        let conn = self.connection()?;
        let user_id = user_id.to_owned();
        let memory_id = memory_id.to_owned();
        let text = text.to_owned();
        let max_chars = self.max_chars;
        let now = now_rfc3339();

        tokio::task::spawn_blocking(move || {
            let created_at: Option<String> = conn
                .query_row(
                    "SELECT created_at FROM memories WHERE user_id = ?1 AND memory_id = ?2",
                    params![user_id, memory_id],
                    |row| row.get(0),
                )
                .optional()?;

            let Some(created_at) = created_at else {
                return Err(MemoryError::NotFound { user_id, memory_id });
            };

            let existing_other: i64 = conn.query_row(
                "SELECT COALESCE(SUM(LENGTH(text)), 0) FROM memories WHERE user_id = ?1 AND memory_id != ?2",
                params![user_id, memory_id],
                |row| row.get(0),
            )?;

            let attempted_total = existing_other as usize + text.chars().count();
            if attempted_total > max_chars {
                return Err(MemoryError::BudgetExceeded { user_id, attempted_total, budget: max_chars });
            }

            conn.execute(
                "UPDATE memories SET text = ?1, updated_at = ?2 WHERE user_id = ?3 AND memory_id = ?4",
                params![text, now, user_id, memory_id],
            )?;

            Ok(UserMemory { user_id, memory_id, text, created_at, updated_at: now })
        })
        .await
        .map_err(|e| MemoryError::Database(e.to_string()))?
    }

    /// `delete(user, id)` (`spec.md` §4.4).
    pub async fn delete(&self, user_id: &str, memory_id: &str) -> Result<(), MemoryError> {
        let lock = self.user_lock(user_id);
        let _guard = lock.lock().await;

        let conn = self.connection()?;
        let user_id = user_id.to_owned();
        let memory_id = memory_id.to_owned();

        tokio::task::spawn_blocking(move || {
            let changed = conn.execute(
                "DELETE FROM memories WHERE user_id = ?1 AND memory_id = ?2",
                params![user_id, memory_id],
            )?;

            if changed == 0 {
                return Err(MemoryError::NotFound { user_id, memory_id });
            }

            Ok(())
        })
        .await
        .map_err(|e| MemoryError::Database(e.to_string()))?
    }
}

fn now_rfc3339() -> String {
    jiff::Zoned::now().with_time_zone(jiff::tz::TimeZone::UTC).strftime("%Y-%m-%dT%H:%M:%S%.6fZ").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn store() -> (MemoryStore, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let store = MemoryStore::new(dir.path().join("memory.db"), 2000).unwrap();
        (store, dir)
    }

    #[tokio::test]
    async fn create_and_retrieve_roundtrip() {
        let (store, _dir) = store().await;
        store.create("alice", "likes oat milk").await.unwrap();
        let memories = store.retrieve("alice").await.unwrap();
        assert_eq!(memories.len(), 1);
        assert_eq!(memories[0].text, "likes oat milk");
    }

    #[tokio::test]
    async fn budget_exceeded_on_create() {
        let (store, _dir) = store().await;
        let filler = "x".repeat(1999);
        store.create("bob", &filler).await.unwrap();

        let err = store.create("bob", "xx").await.unwrap_err();
        assert!(matches!(err, MemoryError::BudgetExceeded { .. }));
    }

    #[tokio::test]
    async fn update_shrinking_a_memory_succeeds_even_near_budget() {
        let (store, _dir) = store().await;
        let filler = "x".repeat(1990);
        store.create("carol", &filler).await.unwrap();
        let ten = store.create("carol", "0123456789").await.unwrap();

        let updated = store.update("carol", &ten.memory_id, "012345678").await.unwrap();
        assert_eq!(updated.text, "012345678");

        let total: usize = store.retrieve("carol").await.unwrap().iter().map(|m| m.text.chars().count()).sum();
        assert_eq!(total, 1999);
    }

    #[tokio::test]
    async fn delete_unknown_memory_is_not_found() {
        let (store, _dir) = store().await;
        let err = store.delete("dave", "nonexistent").await.unwrap_err();
        assert!(matches!(err, MemoryError::NotFound { .. }));
    }

    #[tokio::test]
    async fn different_users_do_not_share_budget() {
        let (store, _dir) = store().await;
        let filler = "x".repeat(2000);
        store.create("erin", &filler).await.unwrap();
        // frank has an independent budget even though erin's is full.
        store.create("frank", "hello").await.unwrap();
        assert_eq!(store.retrieve("frank").await.unwrap().len(), 1);
    }
}
