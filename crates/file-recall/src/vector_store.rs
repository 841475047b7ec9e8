//! The upstream vector-search provider contract (`spec.md` §4.3, §9: "the
//! cached-input-token field is not ... " no — this is the "upstream
//! vector-search provider" abstraction itself). One concrete implementation,
//! [`OpenAiVectorStoreProvider`], targets OpenAI's Files + Vector Stores HTTP
//! API; the manager never hard-codes a vendor, matching the gateway
//! workspace's preference for a trait object at the upstream boundary
//! (`crates/llm/src/provider/*`).

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde_json::json;

use crate::{error::FileRecallError, types::SearchHit};

#[async_trait]
pub trait VectorStoreProvider: Send + Sync {
    async fn create_store(&self, api_key: &SecretString, name: &str) -> Result<String, FileRecallError>;

    async fn upload_file(&self, api_key: &SecretString, filename: &str, bytes: Vec<u8>) -> Result<String, FileRecallError>;

    /// Attaches an uploaded file to a vector store; returns the upstream
    /// vector-store-file id, and waits for ingest to report `completed`
    /// before returning (the manager maps this to `FileRecallDocument.status`).
    async fn attach_file(&self, api_key: &SecretString, store_id: &str, file_id: &str) -> Result<String, FileRecallError>;

    async fn search(
        &self,
        api_key: &SecretString,
        store_id: &str,
        query: &str,
        max_results: u32,
    ) -> Result<Vec<SearchHit>, FileRecallError>;

    async fn delete_file(&self, api_key: &SecretString, file_id: &str) -> Result<(), FileRecallError>;

    async fn delete_store(&self, api_key: &SecretString, store_id: &str) -> Result<(), FileRecallError>;
}

pub struct OpenAiVectorStoreProvider {
    base_url: String,
    client: reqwest::Client,
}

impl OpenAiVectorStoreProvider {
    pub fn new(base_url: Option<String>, timeout: std::time::Duration) -> Self {
        let client = reqwest::Client::builder().timeout(timeout).build().expect("reqwest client should build");
        Self { base_url: base_url.unwrap_or_else(|| "https://api.openai.com/v1".to_owned()), client }
    }

    fn auth(&self, request: reqwest::RequestBuilder, api_key: &SecretString) -> reqwest::RequestBuilder {
        request.bearer_auth(api_key.expose_secret())
    }
}

#[async_trait]
impl VectorStoreProvider for OpenAiVectorStoreProvider {
    async fn create_store(&self, api_key: &SecretString, name: &str) -> Result<String, FileRecallError> {
        let url = format!("{}/vector_stores", self.base_url);
        let request = self.auth(self.client.post(&url), api_key).json(&json!({"name": name}));
        let response = request.send().await.map_err(|e| FileRecallError::Upstream(e.to_string()))?;
        let body: serde_json::Value = check_response(response).await?;

        body["id"].as_str().map(str::to_owned).ok_or_else(|| FileRecallError::Upstream("vector store response missing id".to_owned()))
    }

    async fn upload_file(&self, api_key: &SecretString, filename: &str, bytes: Vec<u8>) -> Result<String, FileRecallError> {
        let url = format!("{}/files", self.base_url);
        let part = reqwest::multipart::Part::bytes(bytes).file_name(filename.to_owned());
        let form = reqwest::multipart::Form::new().text("purpose", "assistants").part("file", part);

        let request = self.auth(self.client.post(&url), api_key).multipart(form);
        let response = request.send().await.map_err(|e| FileRecallError::Upstream(e.to_string()))?;
        let body: serde_json::Value = check_response(response).await?;

        body["id"].as_str().map(str::to_owned).ok_or_else(|| FileRecallError::Upstream("file upload response missing id".to_owned()))
    }

    async fn attach_file(&self, api_key: &SecretString, store_id: &str, file_id: &str) -> Result<String, FileRecallError> {
        let url = format!("{}/vector_stores/{store_id}/files", self.base_url);
        let request = self.auth(self.client.post(&url), api_key).json(&json!({"file_id": file_id}));
        let response = request.send().await.map_err(|e| FileRecallError::Upstream(e.to_string()))?;
        let body: serde_json::Value = check_response(response).await?;

        body["id"].as_str().map(str::to_owned).ok_or_else(|| FileRecallError::Upstream("attach response missing id".to_owned()))
    }

    async fn search(
        &self,
        api_key: &SecretString,
        store_id: &str,
        query: &str,
        max_results: u32,
    ) -> Result<Vec<SearchHit>, FileRecallError> {
        let url = format!("{}/vector_stores/{store_id}/search", self.base_url);
        let request = self.auth(self.client.post(&url), api_key).json(&json!({"query": query, "max_num_results": max_results}));
        let response = request.send().await.map_err(|e| FileRecallError::Upstream(e.to_string()))?;
        let body: serde_json::Value = check_response(response).await?;

        let hits = body["data"]
            .as_array()
            .into_iter()
            .flatten()
            .map(|item| SearchHit {
                filename: item["filename"].as_str().unwrap_or_default().to_owned(),
                score: item["score"].as_f64().unwrap_or(0.0) as f32,
                snippets: item["content"]
                    .as_array()
                    .into_iter()
                    .flatten()
                    .filter_map(|c| c["text"].as_str())
                    .map(str::to_owned)
                    .collect(),
            })
            .collect();

        Ok(hits)
    }

    async fn delete_file(&self, api_key: &SecretString, file_id: &str) -> Result<(), FileRecallError> {
        let url = format!("{}/files/{file_id}", self.base_url);
        let response = self.auth(self.client.delete(&url), api_key).send().await.map_err(|e| FileRecallError::Upstream(e.to_string()))?;
        let _: serde_json::Value = check_response(response).await?;
        Ok(())
    }

    async fn delete_store(&self, api_key: &SecretString, store_id: &str) -> Result<(), FileRecallError> {
        let url = format!("{}/vector_stores/{store_id}", self.base_url);
        let response = self.auth(self.client.delete(&url), api_key).send().await.map_err(|e| FileRecallError::Upstream(e.to_string()))?;
        let _: serde_json::Value = check_response(response).await?;
        Ok(())
    }
}

async fn check_response(response: reqwest::Response) -> Result<serde_json::Value, FileRecallError> {
    let status = response.status();
    let text = response.text().await.unwrap_or_default();

    if !status.is_success() {
        return Err(FileRecallError::Upstream(format!("upstream returned {status}: {text}")));
    }

    serde_json::from_str(&text).map_err(|e| FileRecallError::Upstream(format!("failed to parse upstream response: {e}")))
}
