//! `POST /api/v1/file-recall/instances`, `GET|PUT|DELETE
//! /api/v1/file-recall/instances/:id` (admin-auth), plus the tenant-scoped
//! upload/list/delete endpoints authenticated by the tenant's own access
//! token (`spec.md` §6).

use axum::{
    Json,
    extract::{Extension, Multipart, Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use context::TenantAuthenticated;
use file_recall::{FileRecallDocument, UploadFile, UploadOutcome};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};

use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct CreateTenantRequest {
    pub id: String,
    pub name: String,
    pub openai_api_key: String,
}

#[derive(Debug, Serialize)]
pub struct CreateTenantResponse {
    pub id: String,
    pub access_token: String,
}

#[derive(Debug, Deserialize)]
pub struct RenameTenantRequest {
    pub name: String,
}

#[derive(Debug, Serialize)]
pub struct TenantResponse {
    pub id: String,
    pub name: String,
    pub file_count: u64,
    pub total_bytes: u64,
}

pub async fn create_instance(State(state): State<AppState>, Json(request): Json<CreateTenantRequest>) -> Response {
    let Some(file_recall) = &state.file_recall else {
        return (StatusCode::NOT_IMPLEMENTED, "file recall is not configured").into_response();
    };

    match file_recall.create_tenant(&request.id, &request.name, SecretString::from(request.openai_api_key)).await {
        Ok(access_token) => {
            Json(CreateTenantResponse { id: request.id, access_token: access_token.expose_secret().to_owned() }).into_response()
        }
        Err(err) => file_recall_error(err),
    }
}

pub async fn get_instance(State(state): State<AppState>, Path(id): Path<String>) -> Response {
    let Some(file_recall) = &state.file_recall else {
        return (StatusCode::NOT_IMPLEMENTED, "file recall is not configured").into_response();
    };

    match file_recall.get_tenant(&id).await {
        Ok(tenant) => Json(tenant_response(&tenant)).into_response(),
        Err(err) => file_recall_error(err),
    }
}

pub async fn update_instance(State(state): State<AppState>, Path(id): Path<String>, Json(request): Json<RenameTenantRequest>) -> Response {
    let Some(file_recall) = &state.file_recall else {
        return (StatusCode::NOT_IMPLEMENTED, "file recall is not configured").into_response();
    };

    match file_recall.rename_tenant(&id, &request.name).await {
        Ok(tenant) => Json(tenant_response(&tenant)).into_response(),
        Err(err) => file_recall_error(err),
    }
}

pub async fn delete_instance(State(state): State<AppState>, Path(id): Path<String>) -> Response {
    let Some(file_recall) = &state.file_recall else {
        return (StatusCode::NOT_IMPLEMENTED, "file recall is not configured").into_response();
    };

    match file_recall.delete_tenant(&id).await {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(err) => file_recall_error(err),
    }
}

#[derive(Debug, Serialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum UploadOutcomeBody {
    Uploaded { document_id: String, display_filename: String },
    Skipped { existing_display_filename: String },
    Error { message: String },
}

impl From<UploadOutcome> for UploadOutcomeBody {
    fn from(outcome: UploadOutcome) -> Self {
        match outcome {
            UploadOutcome::Uploaded { document_id, display_filename } => UploadOutcomeBody::Uploaded { document_id, display_filename },
            UploadOutcome::Skipped { existing_display_filename } => UploadOutcomeBody::Skipped { existing_display_filename },
            UploadOutcome::Error { message } => UploadOutcomeBody::Error { message },
        }
    }
}

pub async fn upload(
    State(state): State<AppState>,
    Extension(tenant): Extension<TenantAuthenticated>,
    mut multipart: Multipart,
) -> Response {
    let Some(file_recall) = &state.file_recall else {
        return (StatusCode::NOT_IMPLEMENTED, "file recall is not configured").into_response();
    };

    let mut files = Vec::new();
    loop {
        let field = match multipart.next_field().await {
            Ok(Some(field)) => field,
            Ok(None) => break,
            Err(err) => return (StatusCode::BAD_REQUEST, err.to_string()).into_response(),
        };

        let display_filename = field.file_name().unwrap_or("upload").to_owned();
        let bytes = match field.bytes().await {
            Ok(bytes) => bytes.to_vec(),
            Err(err) => return (StatusCode::BAD_REQUEST, err.to_string()).into_response(),
        };

        files.push(UploadFile { display_filename, bytes });
    }

    match file_recall.upload(&tenant.tenant_id, files).await {
        Ok(outcomes) => Json(outcomes.into_iter().map(UploadOutcomeBody::from).collect::<Vec<_>>()).into_response(),
        Err(err) => file_recall_error(err),
    }
}

#[derive(Debug, Serialize)]
pub struct DocumentResponse {
    pub document_id: String,
    pub display_filename: String,
    pub size: u64,
    pub mime: String,
    pub status: &'static str,
}

impl From<&FileRecallDocument> for DocumentResponse {
    fn from(document: &FileRecallDocument) -> Self {
        Self {
            document_id: document.document_id.clone(),
            display_filename: document.display_filename.clone(),
            size: document.size,
            mime: document.mime.clone(),
            status: document.status.as_str(),
        }
    }
}

pub async fn list(State(state): State<AppState>, Extension(tenant): Extension<TenantAuthenticated>) -> Response {
    let Some(file_recall) = &state.file_recall else {
        return (StatusCode::NOT_IMPLEMENTED, "file recall is not configured").into_response();
    };

    match file_recall.list_documents(&tenant.tenant_id).await {
        Ok(documents) => Json(documents.iter().map(DocumentResponse::from).collect::<Vec<_>>()).into_response(),
        Err(err) => file_recall_error(err),
    }
}

pub async fn delete_document(
    State(state): State<AppState>,
    Extension(tenant): Extension<TenantAuthenticated>,
    Path(document_id): Path<String>,
) -> Response {
    let Some(file_recall) = &state.file_recall else {
        return (StatusCode::NOT_IMPLEMENTED, "file recall is not configured").into_response();
    };

    match file_recall.delete_document(&tenant.tenant_id, &document_id).await {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(err) => file_recall_error(err),
    }
}

fn tenant_response(tenant: &file_recall::FileRecallTenant) -> TenantResponse {
    TenantResponse { id: tenant.id.clone(), name: tenant.name.clone(), file_count: tenant.file_count, total_bytes: tenant.total_bytes }
}

fn file_recall_error(err: file_recall::FileRecallError) -> Response {
    use file_recall::FileRecallError as E;

    let status = match err {
        E::TenantNotFound(_) | E::DocumentNotFound(_) => StatusCode::NOT_FOUND,
        E::ExtensionNotAllowed(_) => StatusCode::BAD_REQUEST,
        E::Upstream(_) => StatusCode::BAD_GATEWAY,
        E::Store(_) | E::Io(_) => StatusCode::INTERNAL_SERVER_ERROR,
    };

    (status, Json(serde_json::json!({ "error": { "message": err.to_string() } }))).into_response()
}
