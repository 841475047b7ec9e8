//! `POST /api/v1/chat` (`spec.md` §6).

use std::{convert::Infallible, time::Instant};

use axum::{
    Json,
    extract::State,
    response::{
        IntoResponse, Response,
        sse::{Event, KeepAlive, Sse},
    },
};
use canonical::{CanonicalMessage, GatewayError, GatewayEvent, RequestContext, ToolsConfig, UpstreamCredentials};
use gateway::{LoopOutcome, done_payload};
use jiff::Zoned;
use metrics::{RequestRecord, RequestStatus as MetricsStatus};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio_stream::{StreamExt, wrappers::ReceiverStream};
use tokio_util::sync::CancellationToken;

use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    pub model: String,
    pub messages: Vec<CanonicalMessage>,
    #[serde(default)]
    pub stream: bool,
    #[serde(default)]
    pub tools_config: ToolsConfig,
    #[serde(default)]
    pub upstream: UpstreamCredentials,
    pub conversation_id: Option<String>,
    pub user_id: Option<String>,
    /// Files already attached to this conversation via File Recall; forwarded
    /// to the Conversation Shaper's compaction threshold (`spec.md` §4.7).
    #[serde(default)]
    pub attached_file_count: usize,
}

#[derive(Debug, Serialize)]
pub struct ChatResponse {
    pub message: CanonicalMessage,
    pub usage: canonical::Usage,
    pub status: &'static str,
}

pub async fn chat(State(state): State<AppState>, Json(request): Json<ChatRequest>) -> Response {
    let request_id = uuid::Uuid::new_v4().to_string();
    let conversation_id = request.conversation_id.clone().unwrap_or_else(|| request_id.clone());
    let user_id = request.user_id.clone().unwrap_or_else(|| "anonymous".to_owned());

    let ctx = RequestContext {
        conversation_id: conversation_id.clone(),
        user_id: user_id.clone(),
        tenant_id: None,
        tools_config: request.tools_config.clone(),
        upstream: request.upstream.clone(),
        cancellation: CancellationToken::new(),
    };

    if request.stream {
        stream_chat(state, request_id, conversation_id, user_id, request, ctx).await
    } else {
        oneshot_chat(state, request_id, conversation_id, user_id, request, ctx).await.into_response()
    }
}

async fn oneshot_chat(
    state: AppState,
    request_id: String,
    conversation_id: String,
    user_id: String,
    request: ChatRequest,
    ctx: RequestContext,
) -> Response {
    let started_at = Instant::now();
    let (tx, mut rx) = mpsc::channel::<GatewayEvent>(64);

    // delta/tool markers only matter to the SSE writer; non-streaming callers
    // just need the final history and usage, so drain and discard them.
    let drain = tokio::spawn(async move { while rx.recv().await.is_some() {} });

    let outcome = state
        .gateway
        .handle_chat(&request_id, &request.model, request.messages, request.attached_file_count, &ctx, &tx)
        .await;
    drop(tx);
    let _ = drain.await;

    record_request(&state, &request_id, &conversation_id, &user_id, &request.model, started_at, &outcome);

    match outcome {
        Ok(outcome) => {
            let message = outcome.history.last().cloned().unwrap_or_else(|| CanonicalMessage::assistant_text(""));
            Json(ChatResponse { message, usage: outcome.usage, status: status_label(outcome.status) }).into_response()
        }
        Err(err) => err.into_response(),
    }
}

async fn stream_chat(
    state: AppState,
    request_id: String,
    conversation_id: String,
    user_id: String,
    request: ChatRequest,
    ctx: RequestContext,
) -> Response {
    let started_at = Instant::now();
    let (tx, rx) = mpsc::channel::<GatewayEvent>(64);
    let model = request.model.clone();

    tokio::spawn(async move {
        let outcome = state
            .gateway
            .handle_chat(&request_id, &model, request.messages, request.attached_file_count, &ctx, &tx)
            .await;

        record_request(&state, &request_id, &conversation_id, &user_id, &model, started_at, &outcome);

        let terminal = match outcome {
            Ok(outcome) => GatewayEvent::Done(done_payload(outcome.usage, outcome.status)),
            Err(err) => GatewayEvent::Error(canonical::ErrorPayload { message: err.as_tool_result() }),
        };

        let _ = tx.send(terminal).await;
    });

    let events = ReceiverStream::new(rx).map(|event| Ok::<Event, Infallible>(to_sse_event(event)));
    Sse::new(events).keep_alive(KeepAlive::default()).into_response()
}

fn to_sse_event(event: GatewayEvent) -> Event {
    let (name, data) = match &event {
        GatewayEvent::Delta(payload) => ("delta", serde_json::to_string(payload)),
        GatewayEvent::Tool(marker) => ("tool", serde_json::to_string(marker)),
        GatewayEvent::Done(payload) => ("done", serde_json::to_string(payload)),
        GatewayEvent::Error(payload) => ("error", serde_json::to_string(payload)),
    };

    Event::default().event(name).data(data.unwrap_or_else(|_| "{}".to_owned()))
}

fn status_label(status: canonical::RequestStatus) -> &'static str {
    match status {
        canonical::RequestStatus::Completed => "completed",
        canonical::RequestStatus::Truncated => "truncated",
        canonical::RequestStatus::Cancelled => "cancelled",
        canonical::RequestStatus::UpstreamError => "upstream_error",
    }
}

fn record_request(
    state: &AppState,
    request_id: &str,
    conversation_id: &str,
    user_id: &str,
    model: &str,
    started_at: Instant,
    outcome: &Result<LoopOutcome, GatewayError>,
) {
    let (status, usage, error) = match outcome {
        Ok(outcome) => (metrics_status(outcome.status), outcome.usage, None),
        Err(err) => (MetricsStatus::UpstreamError, canonical::Usage::default(), Some(err.to_string())),
    };

    let provider = model.split_once('/').map(|(provider, _)| provider.to_owned()).unwrap_or_else(|| "unknown".to_owned());
    let cost = metrics::MetricsRecorder::estimate_cost(&provider, model, usage.input_tokens, usage.cached_input_tokens(), usage.output_tokens);

    state.metrics.record_request(RequestRecord {
        id: request_id.to_owned(),
        conversation_id: conversation_id.to_owned(),
        user_id: user_id.to_owned(),
        instance_id: None,
        model: model.to_owned(),
        provider,
        status,
        input_tokens: usage.input_tokens,
        output_tokens: usage.output_tokens,
        cached_input_tokens: usage.cached_input_tokens(),
        cost,
        started_at: Zoned::now().strftime("%Y-%m-%dT%H:%M:%SZ").to_string(),
        duration_ms: started_at.elapsed().as_millis() as u64,
        error,
    });
}

fn metrics_status(status: canonical::RequestStatus) -> MetricsStatus {
    match status {
        canonical::RequestStatus::Completed => MetricsStatus::Completed,
        canonical::RequestStatus::Truncated => MetricsStatus::Truncated,
        canonical::RequestStatus::Cancelled => MetricsStatus::Cancelled,
        canonical::RequestStatus::UpstreamError => MetricsStatus::UpstreamError,
    }
}
