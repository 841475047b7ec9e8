//! `GET /health` — unauthenticated liveness probe.

use axum::{Json, response::IntoResponse};
use serde::Serialize;

#[derive(Debug, Serialize)]
struct HealthBody {
    status: &'static str,
}

pub async fn health() -> impl IntoResponse {
    Json(HealthBody { status: "ok" })
}
