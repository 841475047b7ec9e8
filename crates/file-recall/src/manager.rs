//! The File Recall Manager (`spec.md` §4.3): per-tenant document search
//! backed by an upstream vector-search provider, deduplicated by content hash.

use std::{path::PathBuf, sync::Arc};

use dashmap::DashMap;
use rand::RngCore;
use rusqlite::{Connection, OptionalExtension, params};
use secrecy::{ExposeSecret, SecretString};
use sha2::{Digest, Sha256};
use tokio::sync::Mutex;

use crate::{
    error::FileRecallError,
    types::{DocumentStatus, FileRecallDocument, FileRecallTenant, SearchHit, UploadFile, UploadOutcome},
    vector_store::VectorStoreProvider,
};

pub struct FileRecallManager {
    db_path: PathBuf,
    data_dir: PathBuf,
    allowed_extensions: Vec<String>,
    provider: Arc<dyn VectorStoreProvider>,
    /// Serializes upload attempts by `(tenant, content sha256)` (`spec.md` §5):
    /// the second concurrent caller observes the first's row and reports
    /// `skipped` instead of issuing a second upstream upload.
    upload_locks: DashMap<(String, String), Arc<Mutex<()>>>,
    db: Mutex<()>,
}

impl FileRecallManager {
    pub fn new(
        db_path: impl Into<PathBuf>,
        data_dir: impl Into<PathBuf>,
        allowed_extensions: Vec<String>,
        provider: Arc<dyn VectorStoreProvider>,
    ) -> Result<Self, FileRecallError> {
        let db_path = db_path.into();
        let data_dir = data_dir.into();

        if let Some(parent) = db_path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::create_dir_all(&data_dir)?;

        let conn = Connection::open(&db_path)?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.execute(
            "CREATE TABLE IF NOT EXISTS tenants (
                id TEXT PRIMARY KEY,
                name TEXT NOT NULL,
                upstream_api_key TEXT NOT NULL,
                vector_store_id TEXT,
                access_token TEXT NOT NULL UNIQUE,
                file_count INTEGER NOT NULL DEFAULT 0,
                total_bytes INTEGER NOT NULL DEFAULT 0
            )",
            [],
        )?;
        conn.execute(
            "CREATE TABLE IF NOT EXISTS documents (
                tenant_id TEXT NOT NULL,
                document_id TEXT PRIMARY KEY,
                display_filename TEXT NOT NULL,
                storage_filename TEXT NOT NULL,
                content_sha256 TEXT NOT NULL,
                size INTEGER NOT NULL,
                mime TEXT NOT NULL,
                upstream_file_id TEXT NOT NULL,
                upstream_vector_store_file_id TEXT NOT NULL,
                status TEXT NOT NULL,
                UNIQUE (tenant_id, content_sha256)
            )",
            [],
        )?;

        Ok(Self { db_path, data_dir, allowed_extensions, provider, upload_locks: DashMap::new(), db: Mutex::new(()) })
    }

    fn connection(&self) -> Result<Connection, FileRecallError> {
        Ok(Connection::open(&self.db_path)?)
    }

    fn upload_lock(&self, tenant_id: &str, sha256: &str) -> Arc<Mutex<()>> {
        self.upload_locks
            .entry((tenant_id.to_owned(), sha256.to_owned()))
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// `createTenant(id, name, upstreamApiKey) -> {access_token}` (`spec.md` §4.3).
    /// Does not create an upstream vector store yet — that happens lazily on
    /// first upload.
    pub async fn create_tenant(&self, id: &str, name: &str, upstream_api_key: SecretString) -> Result<SecretString, FileRecallError> {
        let _guard = self.db.lock().await;
        let conn = self.connection()?;

        let access_token = generate_access_token();

        conn.execute(
            "INSERT INTO tenants (id, name, upstream_api_key, vector_store_id, access_token, file_count, total_bytes)
             VALUES (?1, ?2, ?3, NULL, ?4, 0, 0)",
            params![id, name, upstream_api_key.expose_secret(), access_token.expose_secret()],
        )?;

        Ok(access_token)
    }

    pub async fn get_tenant(&self, id: &str) -> Result<FileRecallTenant, FileRecallError> {
        let conn = self.connection()?;
        let id = id.to_owned();
        load_tenant(&conn, &id)
    }

    /// Updates a tenant's display name. Backs the admin `PUT` endpoint
    /// (`spec.md` §6) — the tenant's id, access token, and documents are
    /// immutable once created.
    pub async fn rename_tenant(&self, id: &str, name: &str) -> Result<FileRecallTenant, FileRecallError> {
        let _guard = self.db.lock().await;
        let conn = self.connection()?;

        let updated = conn.execute("UPDATE tenants SET name = ?1 WHERE id = ?2", params![name, id])?;
        if updated == 0 {
            return Err(FileRecallError::TenantNotFound(id.to_owned()));
        }

        load_tenant(&conn, id)
    }

    pub async fn authenticate_tenant(&self, access_token: &str) -> Result<FileRecallTenant, FileRecallError> {
        let conn = self.connection()?;
        let row = conn
            .query_row(
                "SELECT id, name, upstream_api_key, vector_store_id, access_token, file_count, total_bytes
                 FROM tenants WHERE access_token = ?1",
                params![access_token],
                tenant_from_row,
            )
            .optional()?;

        row.ok_or_else(|| FileRecallError::TenantNotFound("unknown access token".to_owned()))
    }

    /// `upload(tenant, files[])` (`spec.md` §4.3). Steps are applied in order
    /// per file; files within one call are processed sequentially per the
    /// ordering implied by the returned per-file outcome list, though
    /// different files' upstream uploads could in principle run concurrently
    /// — deduplication correctness (`spec.md` §5) only requires serializing
    /// identical-content uploads, which `upload_lock` already guarantees.
    pub async fn upload(&self, tenant_id: &str, files: Vec<UploadFile>) -> Result<Vec<UploadOutcome>, FileRecallError> {
        let mut outcomes = Vec::with_capacity(files.len());

        for file in files {
            outcomes.push(self.upload_one(tenant_id, file).await);
        }

        Ok(outcomes)
    }

    async fn upload_one(&self, tenant_id: &str, file: UploadFile) -> UploadOutcome {
        match self.try_upload_one(tenant_id, file).await {
            Ok(outcome) => outcome,
            Err(e) => UploadOutcome::Error { message: e.to_string() },
        }
    }

    async fn try_upload_one(&self, tenant_id: &str, file: UploadFile) -> Result<UploadOutcome, FileRecallError> {
        let extension = file
            .display_filename
            .rsplit_once('.')
            .map(|(_, ext)| ext.to_ascii_lowercase())
            .ok_or_else(|| FileRecallError::ExtensionNotAllowed(file.display_filename.clone()))?;

        if !self.allowed_extensions.iter().any(|allowed| allowed.eq_ignore_ascii_case(&extension)) {
            return Ok(UploadOutcome::Error { message: format!("extension '{extension}' is not allowed") });
        }

        let sha256 = hex_sha256(&file.bytes);
        let lock = self.upload_lock(tenant_id, &sha256);
        let _guard = lock.lock().await;

        if let Some(existing) = self.find_document_by_hash(tenant_id, &sha256).await? {
            return Ok(UploadOutcome::Skipped { existing_display_filename: existing.display_filename });
        }

        let tenant = self.get_tenant(tenant_id).await?;
        let vector_store_id = match tenant.vector_store_id {
            Some(id) => id,
            None => {
                let id = self.provider.create_store(&tenant.upstream_api_key, &tenant.name).await?;
                self.set_vector_store_id(tenant_id, &id).await?;
                id
            }
        };

        let storage_filename = format!("{}.{extension}", &sha256[..16]);
        let storage_path = self.data_dir.join(tenant_id).join(&storage_filename);
        if let Some(parent) = storage_path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&storage_path, &file.bytes).await?;

        let upstream_file_id = self.provider.upload_file(&tenant.upstream_api_key, &file.display_filename, file.bytes.clone()).await?;

        let document_id = uuid_v4_like(&sha256, tenant_id);
        let mime = mime_for_extension(&extension);
        let size = file.bytes.len() as u64;

        // Row goes in as `processing` before the upstream vector-store attach
        // runs, so a crash between the two steps leaves a document a reader
        // can tell apart from one that's actually searchable (`spec.md` §4.3).
        self.insert_document(tenant_id, &document_id, &file.display_filename, &storage_filename, &sha256, size, mime, &upstream_file_id).await?;

        match self.provider.attach_file(&tenant.upstream_api_key, &vector_store_id, &upstream_file_id).await {
            Ok(upstream_vector_store_file_id) => {
                self.mark_document_ready(tenant_id, &document_id, &upstream_vector_store_file_id).await?;
            }
            Err(e) => {
                self.mark_document_errored(tenant_id, &document_id).await?;
                return Err(e);
            }
        }

        Ok(UploadOutcome::Uploaded { document_id, display_filename: file.display_filename })
    }

    async fn find_document_by_hash(&self, tenant_id: &str, sha256: &str) -> Result<Option<FileRecallDocument>, FileRecallError> {
        let conn = self.connection()?;
        let tenant_id = tenant_id.to_owned();
        let sha256 = sha256.to_owned();

        conn.query_row(
            "SELECT tenant_id, document_id, display_filename, storage_filename, content_sha256, size, mime,
                    upstream_file_id, upstream_vector_store_file_id, status
             FROM documents WHERE tenant_id = ?1 AND content_sha256 = ?2",
            params![tenant_id, sha256],
            document_from_row,
        )
        .optional()
        .map_err(FileRecallError::from)
    }

    #[allow(clippy::too_many_arguments)]
    async fn insert_document(
        &self,
        tenant_id: &str,
        document_id: &str,
        display_filename: &str,
        storage_filename: &str,
        sha256: &str,
        size: u64,
        mime: &str,
        upstream_file_id: &str,
    ) -> Result<(), FileRecallError> {
        let _guard = self.db.lock().await;
        let conn = self.connection()?;

        conn.execute(
            "INSERT INTO documents (tenant_id, document_id, display_filename, storage_filename, content_sha256,
                                     size, mime, upstream_file_id, upstream_vector_store_file_id, status)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, '', ?9)",
            params![
                tenant_id,
                document_id,
                display_filename,
                storage_filename,
                sha256,
                size as i64,
                mime,
                upstream_file_id,
                DocumentStatus::Processing.as_str(),
            ],
        )?;

        conn.execute(
            "UPDATE tenants SET file_count = file_count + 1, total_bytes = total_bytes + ?1 WHERE id = ?2",
            params![size as i64, tenant_id],
        )?;

        Ok(())
    }

    /// Transitions a document from `processing` to `ready` once the upstream
    /// vector-store attach completes.
    async fn mark_document_ready(&self, tenant_id: &str, document_id: &str, upstream_vector_store_file_id: &str) -> Result<(), FileRecallError> {
        let _guard = self.db.lock().await;
        let conn = self.connection()?;

        conn.execute(
            "UPDATE documents SET status = ?1, upstream_vector_store_file_id = ?2 WHERE tenant_id = ?3 AND document_id = ?4",
            params![DocumentStatus::Ready.as_str(), upstream_vector_store_file_id, tenant_id, document_id],
        )?;

        Ok(())
    }

    /// Marks a document `error` when the upstream attach step fails after the
    /// row has already been inserted as `processing`.
    async fn mark_document_errored(&self, tenant_id: &str, document_id: &str) -> Result<(), FileRecallError> {
        let _guard = self.db.lock().await;
        let conn = self.connection()?;

        conn.execute(
            "UPDATE documents SET status = ?1 WHERE tenant_id = ?2 AND document_id = ?3",
            params![DocumentStatus::Error.as_str(), tenant_id, document_id],
        )?;

        Ok(())
    }

    async fn set_vector_store_id(&self, tenant_id: &str, vector_store_id: &str) -> Result<(), FileRecallError> {
        let _guard = self.db.lock().await;
        let conn = self.connection()?;
        conn.execute("UPDATE tenants SET vector_store_id = ?1 WHERE id = ?2", params![vector_store_id, tenant_id])?;
        Ok(())
    }

    /// `search(tenant, query, maxResults)` (`spec.md` §4.3).
    pub async fn search(&self, tenant_id: &str, query: &str, max_results: u32) -> Result<Vec<SearchHit>, FileRecallError> {
        let tenant = self.get_tenant(tenant_id).await?;
        let Some(vector_store_id) = tenant.vector_store_id else {
            return Ok(Vec::new());
        };

        self.provider.search(&tenant.upstream_api_key, &vector_store_id, query, max_results).await
    }

    /// Lists every document currently stored for `tenant_id`, oldest first.
    /// Backs the tenant-scoped list endpoint (`spec.md` §6).
    pub async fn list_documents(&self, tenant_id: &str) -> Result<Vec<FileRecallDocument>, FileRecallError> {
        let conn = self.connection()?;
        let mut stmt = conn.prepare(
            "SELECT tenant_id, document_id, display_filename, storage_filename, content_sha256, size, mime,
                    upstream_file_id, upstream_vector_store_file_id, status
             FROM documents WHERE tenant_id = ?1 ORDER BY rowid ASC",
        )?;
        let documents = stmt.query_map(params![tenant_id], document_from_row)?.collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(documents)
    }

    /// `deleteDocument(tenant, docId)` (`spec.md` §4.3).
    pub async fn delete_document(&self, tenant_id: &str, document_id: &str) -> Result<(), FileRecallError> {
        let tenant = self.get_tenant(tenant_id).await?;

        let conn = self.connection()?;
        let document = conn
            .query_row(
                "SELECT tenant_id, document_id, display_filename, storage_filename, content_sha256, size, mime,
                        upstream_file_id, upstream_vector_store_file_id, status
                 FROM documents WHERE tenant_id = ?1 AND document_id = ?2",
                params![tenant_id, document_id],
                document_from_row,
            )
            .optional()?
            .ok_or_else(|| FileRecallError::DocumentNotFound(document_id.to_owned()))?;

        if let Some(vector_store_id) = &tenant.vector_store_id {
            // Best-effort: the vector-store-file attachment is removed implicitly
            // when the underlying file object is deleted upstream.
            let _ = vector_store_id;
        }
        self.provider.delete_file(&tenant.upstream_api_key, &document.upstream_file_id).await?;

        let storage_path = self.data_dir.join(tenant_id).join(&document.storage_filename);
        let _ = tokio::fs::remove_file(&storage_path).await;

        let _guard = self.db.lock().await;
        let conn = self.connection()?;
        conn.execute("DELETE FROM documents WHERE tenant_id = ?1 AND document_id = ?2", params![tenant_id, document_id])?;
        conn.execute(
            "UPDATE tenants SET file_count = MAX(file_count - 1, 0), total_bytes = MAX(total_bytes - ?1, 0) WHERE id = ?2",
            params![document.size as i64, tenant_id],
        )?;

        Ok(())
    }

    /// `deleteTenant(id)` (`spec.md` §4.3).
    pub async fn delete_tenant(&self, tenant_id: &str) -> Result<(), FileRecallError> {
        let tenant = self.get_tenant(tenant_id).await?;

        if let Some(vector_store_id) = &tenant.vector_store_id {
            self.provider.delete_store(&tenant.upstream_api_key, vector_store_id).await?;
        }

        let tenant_dir = self.data_dir.join(tenant_id);
        let _ = tokio::fs::remove_dir_all(&tenant_dir).await;

        let _guard = self.db.lock().await;
        let conn = self.connection()?;
        conn.execute("DELETE FROM documents WHERE tenant_id = ?1", params![tenant_id])?;
        conn.execute("DELETE FROM tenants WHERE id = ?1", params![tenant_id])?;

        Ok(())
    }
}

fn load_tenant(conn: &Connection, id: &str) -> Result<FileRecallTenant, FileRecallError> {
    conn.query_row(
        "SELECT id, name, upstream_api_key, vector_store_id, access_token, file_count, total_bytes
         FROM tenants WHERE id = ?1",
        params![id],
        tenant_from_row,
    )
    .optional()?
    .ok_or_else(|| FileRecallError::TenantNotFound(id.to_owned()))
}

fn tenant_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<FileRecallTenant> {
    let api_key: String = row.get(2)?;
    let access_token: String = row.get(4)?;

    Ok(FileRecallTenant {
        id: row.get(0)?,
        name: row.get(1)?,
        upstream_api_key: api_key.into(),
        vector_store_id: row.get(3)?,
        access_token: access_token.into(),
        file_count: row.get::<_, i64>(5)? as u64,
        total_bytes: row.get::<_, i64>(6)? as u64,
    })
}

fn document_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<FileRecallDocument> {
    Ok(FileRecallDocument {
        tenant_id: row.get(0)?,
        document_id: row.get(1)?,
        display_filename: row.get(2)?,
        storage_filename: row.get(3)?,
        content_sha256: row.get(4)?,
        size: row.get::<_, i64>(5)? as u64,
        mime: row.get(6)?,
        upstream_file_id: row.get(7)?,
        upstream_vector_store_file_id: row.get(8)?,
        status: DocumentStatus::from_str(&row.get::<_, String>(9)?),
    })
}

fn hex_sha256(bytes: &[u8]) -> String {
    let digest = Sha256::digest(bytes);
    digest.iter().map(|b| format!("{b:02x}")).collect()
}

fn generate_access_token() -> SecretString {
    let mut bytes = [0u8; 32];
    rand::rng().fill_bytes(&mut bytes);
    let token: String = bytes.iter().map(|b| format!("{b:02x}")).collect();
    token.into()
}

/// Deterministic-looking opaque id for a document; not a real UUID, but a
/// stable function of its identity tuple so repeated calls in tests are
/// reproducible without drawing from a random source at the type-system
/// boundary this crate exposes.
fn uuid_v4_like(sha256: &str, tenant_id: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(tenant_id.as_bytes());
    hasher.update(sha256.as_bytes());
    let digest = hasher.finalize();
    digest[..16].iter().map(|b| format!("{b:02x}")).collect()
}

fn mime_for_extension(extension: &str) -> &'static str {
    match extension {
        "pdf" => "application/pdf",
        "docx" => "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
        "pptx" => "application/vnd.openxmlformats-officedocument.presentationml.presentation",
        "txt" => "text/plain",
        "md" => "text/markdown",
        "html" => "text/html",
        "json" => "application/json",
        "tex" => "application/x-tex",
        _ => "application/octet-stream",
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};

    use async_trait::async_trait;

    use super::*;

    struct FakeProvider {
        uploads: AtomicU32,
    }

    #[async_trait]
    impl VectorStoreProvider for FakeProvider {
        async fn create_store(&self, _api_key: &SecretString, _name: &str) -> Result<String, FileRecallError> {
            Ok("vs_1".to_owned())
        }

        async fn upload_file(&self, _api_key: &SecretString, _filename: &str, _bytes: Vec<u8>) -> Result<String, FileRecallError> {
            let n = self.uploads.fetch_add(1, Ordering::SeqCst);
            Ok(format!("file_{n}"))
        }

        async fn attach_file(&self, _api_key: &SecretString, _store_id: &str, file_id: &str) -> Result<String, FileRecallError> {
            Ok(format!("vsf_{file_id}"))
        }

        async fn search(&self, _api_key: &SecretString, _store_id: &str, _query: &str, _max_results: u32) -> Result<Vec<SearchHit>, FileRecallError> {
            Ok(vec![SearchHit { filename: "policy.pdf".to_owned(), score: 0.9, snippets: vec!["hello".to_owned()] }])
        }

        async fn delete_file(&self, _api_key: &SecretString, _file_id: &str) -> Result<(), FileRecallError> {
            Ok(())
        }

        async fn delete_store(&self, _api_key: &SecretString, _store_id: &str) -> Result<(), FileRecallError> {
            Ok(())
        }
    }

    async fn manager() -> (FileRecallManager, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let provider = Arc::new(FakeProvider { uploads: AtomicU32::new(0) });
        let manager = FileRecallManager::new(
            dir.path().join("fr.db"),
            dir.path().join("files"),
            vec!["pdf".to_owned(), "txt".to_owned()],
            provider,
        )
        .unwrap();
        (manager, dir)
    }

    #[tokio::test]
    async fn duplicate_content_is_deduped_by_hash() {
        let (manager, _dir) = manager().await;
        manager.create_tenant("t1", "Tenant One", "sk-x".to_owned().into()).await.unwrap();

        let bytes = b"hello world".to_vec();
        let first = manager
            .upload("t1", vec![UploadFile { display_filename: "a.pdf".to_owned(), bytes: bytes.clone() }])
            .await
            .unwrap();
        assert!(matches!(first[0], UploadOutcome::Uploaded { .. }));

        let second = manager
            .upload("t1", vec![UploadFile { display_filename: "b.pdf".to_owned(), bytes }])
            .await
            .unwrap();

        match &second[0] {
            UploadOutcome::Skipped { existing_display_filename } => assert_eq!(existing_display_filename, "a.pdf"),
            other => panic!("expected skipped, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn different_content_yields_two_documents() {
        let (manager, _dir) = manager().await;
        manager.create_tenant("t1", "Tenant One", "sk-x".to_owned().into()).await.unwrap();

        manager.upload("t1", vec![UploadFile { display_filename: "a.pdf".to_owned(), bytes: b"one".to_vec() }]).await.unwrap();
        manager.upload("t1", vec![UploadFile { display_filename: "b.pdf".to_owned(), bytes: b"two".to_vec() }]).await.unwrap();

        let tenant = manager.get_tenant("t1").await.unwrap();
        assert_eq!(tenant.file_count, 2);
    }

    #[tokio::test]
    async fn rejects_disallowed_extension() {
        let (manager, _dir) = manager().await;
        manager.create_tenant("t1", "Tenant One", "sk-x".to_owned().into()).await.unwrap();

        let result = manager.upload("t1", vec![UploadFile { display_filename: "a.exe".to_owned(), bytes: b"x".to_vec() }]).await.unwrap();
        assert!(matches!(result[0], UploadOutcome::Error { .. }));
    }

    #[tokio::test]
    async fn a_successfully_attached_document_ends_up_ready() {
        let (manager, _dir) = manager().await;
        manager.create_tenant("t1", "Tenant One", "sk-x".to_owned().into()).await.unwrap();

        manager.upload("t1", vec![UploadFile { display_filename: "a.pdf".to_owned(), bytes: b"one".to_vec() }]).await.unwrap();

        let documents = manager.list_documents("t1").await.unwrap();
        assert_eq!(documents.len(), 1);
        assert_eq!(documents[0].status, DocumentStatus::Ready);
        assert!(!documents[0].upstream_vector_store_file_id.is_empty());
    }

    struct FailingAttachProvider;

    #[async_trait]
    impl VectorStoreProvider for FailingAttachProvider {
        async fn create_store(&self, _api_key: &SecretString, _name: &str) -> Result<String, FileRecallError> {
            Ok("vs_1".to_owned())
        }

        async fn upload_file(&self, _api_key: &SecretString, _filename: &str, _bytes: Vec<u8>) -> Result<String, FileRecallError> {
            Ok("file_1".to_owned())
        }

        async fn attach_file(&self, _api_key: &SecretString, _store_id: &str, _file_id: &str) -> Result<String, FileRecallError> {
            Err(FileRecallError::Upstream("vector store attach failed".to_owned()))
        }

        async fn search(&self, _api_key: &SecretString, _store_id: &str, _query: &str, _max_results: u32) -> Result<Vec<SearchHit>, FileRecallError> {
            Ok(Vec::new())
        }

        async fn delete_file(&self, _api_key: &SecretString, _file_id: &str) -> Result<(), FileRecallError> {
            Ok(())
        }

        async fn delete_store(&self, _api_key: &SecretString, _store_id: &str) -> Result<(), FileRecallError> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn a_failed_attach_leaves_the_document_row_marked_errored_instead_of_ready() {
        let dir = tempfile::tempdir().unwrap();
        let manager = FileRecallManager::new(
            dir.path().join("fr.db"),
            dir.path().join("files"),
            vec!["pdf".to_owned()],
            Arc::new(FailingAttachProvider),
        )
        .unwrap();
        manager.create_tenant("t1", "Tenant One", "sk-x".to_owned().into()).await.unwrap();

        let outcome = manager.upload("t1", vec![UploadFile { display_filename: "a.pdf".to_owned(), bytes: b"one".to_vec() }]).await.unwrap();
        assert!(matches!(outcome[0], UploadOutcome::Error { .. }));

        let documents = manager.list_documents("t1").await.unwrap();
        assert_eq!(documents.len(), 1);
        assert_eq!(documents[0].status, DocumentStatus::Error);
    }

    #[tokio::test]
    async fn dedup_is_per_tenant_not_global() {
        let (manager, _dir) = manager().await;
        manager.create_tenant("t1", "Tenant One", "sk-x".to_owned().into()).await.unwrap();
        manager.create_tenant("t2", "Tenant Two", "sk-y".to_owned().into()).await.unwrap();

        let bytes = b"shared content".to_vec();
        manager.upload("t1", vec![UploadFile { display_filename: "a.pdf".to_owned(), bytes: bytes.clone() }]).await.unwrap();
        let outcome = manager.upload("t2", vec![UploadFile { display_filename: "a.pdf".to_owned(), bytes }]).await.unwrap();

        assert!(matches!(outcome[0], UploadOutcome::Uploaded { .. }));
    }
}
