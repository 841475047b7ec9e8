//! The Dispatch Loop (`spec.md` §4.8): drives iterations between a
//! [`ProviderAdapter`] and the [`ToolDispatcher`] until the model returns a
//! tool-free turn or `max_iter` is exhausted.
//!
//! Named `dispatch_loop` rather than `loop` (a reserved word) to avoid a raw
//! identifier module name. The per-request outbound channel
//! (`tokio::sync::mpsc::Sender<GatewayEvent>`) is created by `crates/server`'s
//! chat handler and threaded down into [`run`], per `SPEC_FULL.md` §4.8.

use canonical::{
    CanonicalMessage, ChatOptions, DeltaPayload, DonePayload, GatewayError, ProviderAdapter, ProviderEvent, RequestContext,
    RequestStatus, ToolCall, ToolDefinition, ToolMarker, ToolPhase, Usage,
};
use futures::StreamExt;
use tokio::sync::mpsc;
use tools::ToolDispatcher;

const MAX_SUMMARY_CHARS: usize = 200;

pub struct LoopOutcome {
    pub history: Vec<CanonicalMessage>,
    pub usage: Usage,
    pub status: RequestStatus,
}

/// Runs the dispatch loop to completion (or cancellation, or `max_iter`
/// exhaustion). `events` carries `delta`/`tool` markers out to the SSE
/// writer; `done`/`error` are left for the caller to emit once, since it also
/// needs the aggregate usage this function returns.
pub async fn run(
    request_id: &str,
    mut history: Vec<CanonicalMessage>,
    tools: &[ToolDefinition],
    dispatcher: &ToolDispatcher,
    adapter: &dyn ProviderAdapter,
    chat_options: &ChatOptions,
    ctx: &RequestContext,
    max_iter: u32,
    events: &mpsc::Sender<canonical::GatewayEvent>,
) -> Result<LoopOutcome, GatewayError> {
    let mut aggregate = Usage::default();

    for _ in 0..max_iter {
        let mut stream = adapter.chat(&history, tools, chat_options).await?;

        let mut text = String::new();
        let mut queued_calls: Vec<ToolCall> = Vec::new();
        let mut turn_end: Option<(canonical::FinishReason, Usage)> = None;

        loop {
            let next = tokio::select! {
                biased;
                _ = ctx.cancellation.cancelled() => {
                    return Ok(LoopOutcome { history, usage: aggregate, status: RequestStatus::Cancelled });
                }
                event = stream.next() => event,
            };

            let Some(event) = next else { break };

            match event? {
                ProviderEvent::TextDelta(delta) => {
                    text.push_str(&delta);
                    let _ = events.send(canonical::GatewayEvent::Delta(DeltaPayload::Text { content: delta })).await;
                }
                ProviderEvent::ReasoningDelta(delta) => {
                    let _ = events.send(canonical::GatewayEvent::Delta(DeltaPayload::Reasoning { content: delta })).await;
                }
                ProviderEvent::ToolCallAssembled(call) => queued_calls.push(call),
                ProviderEvent::TurnEnd { finish_reason, usage } => {
                    turn_end = Some((finish_reason, usage));
                }
            }
        }

        let (_finish_reason, usage) = turn_end.unwrap_or((canonical::FinishReason::Stop, Usage::default()));
        aggregate.input_tokens += usage.input_tokens;
        aggregate.output_tokens += usage.output_tokens;
        aggregate.cached_input_tokens =
            Some(aggregate.cached_input_tokens() + usage.cached_input_tokens());

        if queued_calls.is_empty() {
            history.push(CanonicalMessage::assistant_text(text));
            return Ok(LoopOutcome { history, usage: aggregate, status: RequestStatus::Completed });
        }

        let assistant_text = if text.is_empty() { None } else { Some(text) };
        history.push(CanonicalMessage::assistant_tool_calls(assistant_text, queued_calls.clone()));

        for call in &queued_calls {
            let _ = events
                .send(canonical::GatewayEvent::Tool(ToolMarker {
                    id: call.id.clone(),
                    name: call.name.clone(),
                    phase: ToolPhase::Begin,
                    summary: truncate_summary(&call.arguments.to_string()),
                }))
                .await;
        }

        // Declaration order is preserved; the dispatcher may run these with
        // bounded parallelism internally, but this loop awaits each result
        // before appending it, which is what guarantees history order
        // matches emission order (`spec.md` §5).
        for call in &queued_calls {
            let outcome = dispatcher.dispatch(request_id, call, ctx).await;
            history.push(CanonicalMessage::tool_result(call.id.clone(), outcome.result_text.clone()));

            let _ = events
                .send(canonical::GatewayEvent::Tool(ToolMarker {
                    id: call.id.clone(),
                    name: call.name.clone(),
                    phase: ToolPhase::End,
                    summary: truncate_summary(&outcome.result_text),
                }))
                .await;
        }
    }

    Ok(LoopOutcome { history, usage: aggregate, status: RequestStatus::Truncated })
}

fn truncate_summary(text: &str) -> String {
    if text.chars().count() <= MAX_SUMMARY_CHARS {
        text.to_owned()
    } else {
        let head: String = text.chars().take(MAX_SUMMARY_CHARS).collect();
        format!("{head}…")
    }
}

/// Builds the terminal `done` payload once the loop (or the caller, on an
/// upstream error) has settled on a final status.
pub fn done_payload(usage: Usage, status: RequestStatus) -> DonePayload {
    DonePayload { usage, status }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use async_trait::async_trait;
    use canonical::{FinishReason, ToolsConfig, UpstreamCredentials};
    use futures::stream::{self, BoxStream};
    use metrics::MetricsRecorder;
    use serde_json::json;
    use tools::{ToolRegistry, UnconfiguredExternalToolClient};

    use super::*;

    struct ScriptedAdapter {
        turns: Mutex<Vec<Vec<ProviderEvent>>>,
    }

    #[async_trait]
    impl ProviderAdapter for ScriptedAdapter {
        fn name(&self) -> &'static str {
            "scripted"
        }

        async fn chat(
            &self,
            _messages: &[CanonicalMessage],
            _tools: &[ToolDefinition],
            _options: &ChatOptions,
        ) -> Result<BoxStream<'static, Result<ProviderEvent, GatewayError>>, GatewayError> {
            let turn = self.turns.lock().unwrap().remove(0);
            Ok(stream::iter(turn.into_iter().map(Ok)).boxed())
        }

        async fn chat_once(&self, _messages: &[CanonicalMessage], _options: &ChatOptions) -> Result<(String, Usage), GatewayError> {
            unimplemented!("dispatch loop tests don't compact")
        }
    }

    fn ctx() -> RequestContext {
        RequestContext {
            conversation_id: "conv-1".to_owned(),
            user_id: "user-1".to_owned(),
            tools_config: ToolsConfig { date_time: true, ..Default::default() },
            upstream: UpstreamCredentials::default(),
            ..Default::default()
        }
    }

    async fn dispatcher() -> (ToolDispatcher, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let metrics = Arc::new(MetricsRecorder::new(dir.path().join("metrics.sqlite3")).unwrap());
        let dispatcher =
            ToolDispatcher::new(Arc::new(ToolRegistry::new()), None, None, None, Arc::new(UnconfiguredExternalToolClient), metrics);
        (dispatcher, dir)
    }

    #[tokio::test]
    async fn a_tool_free_turn_completes_on_the_first_iteration() {
        let adapter = ScriptedAdapter {
            turns: Mutex::new(vec![vec![
                ProviderEvent::TextDelta("hello".to_owned()),
                ProviderEvent::TurnEnd { finish_reason: FinishReason::Stop, usage: Usage { input_tokens: 10, output_tokens: 5, cached_input_tokens: None } },
            ]]),
        };

        let (dispatcher, _dir) = dispatcher().await;
        let (tx, mut rx) = mpsc::channel(16);
        let history = vec![CanonicalMessage::user("hi")];

        let outcome = run("req-1", history, &[], &dispatcher, &adapter, &ChatOptions::default(), &ctx(), 5, &tx).await.unwrap();

        assert_eq!(outcome.status, RequestStatus::Completed);
        assert_eq!(outcome.usage.input_tokens, 10);
        assert_eq!(outcome.history.last().unwrap().text(), "hello");

        drop(tx);
        let mut saw_delta = false;
        while let Some(event) = rx.recv().await {
            if matches!(event, canonical::GatewayEvent::Delta(DeltaPayload::Text { .. })) {
                saw_delta = true;
            }
        }
        assert!(saw_delta);
    }

    #[tokio::test]
    async fn a_tool_call_is_dispatched_and_the_loop_continues() {
        let call = ToolCall { id: "call_1".to_owned(), name: "date_time_now".to_owned(), arguments: json!({}) };

        let adapter = ScriptedAdapter {
            turns: Mutex::new(vec![
                vec![
                    ProviderEvent::ToolCallAssembled(call),
                    ProviderEvent::TurnEnd { finish_reason: FinishReason::ToolCalls, usage: Usage::default() },
                ],
                vec![
                    ProviderEvent::TextDelta("it is now known".to_owned()),
                    ProviderEvent::TurnEnd { finish_reason: FinishReason::Stop, usage: Usage::default() },
                ],
            ]),
        };

        let (dispatcher, _dir) = dispatcher().await;
        let (tx, mut rx) = mpsc::channel(16);
        let history = vec![CanonicalMessage::user("what time is it?")];

        let outcome = run("req-1", history, &[], &dispatcher, &adapter, &ChatOptions::default(), &ctx(), 5, &tx).await.unwrap();

        assert_eq!(outcome.status, RequestStatus::Completed);
        assert!(outcome.history.iter().any(|m| m.tool_call_id.as_deref() == Some("call_1")));

        drop(tx);
        let mut tool_events = 0;
        while let Some(event) = rx.recv().await {
            if matches!(event, canonical::GatewayEvent::Tool(_)) {
                tool_events += 1;
            }
        }
        assert_eq!(tool_events, 2);
    }

    #[tokio::test]
    async fn exhausting_max_iter_reports_truncated() {
        let call = || ToolCall { id: uuid::Uuid::new_v4().to_string(), name: "date_time_now".to_owned(), arguments: json!({}) };

        let adapter = ScriptedAdapter {
            turns: Mutex::new(
                (0..3)
                    .map(|_| {
                        vec![
                            ProviderEvent::ToolCallAssembled(call()),
                            ProviderEvent::TurnEnd { finish_reason: FinishReason::ToolCalls, usage: Usage::default() },
                        ]
                    })
                    .collect(),
            ),
        };

        let (dispatcher, _dir) = dispatcher().await;
        let (tx, _rx) = mpsc::channel(16);
        let history = vec![CanonicalMessage::user("loop forever")];

        let outcome = run("req-1", history, &[], &dispatcher, &adapter, &ChatOptions::default(), &ctx(), 3, &tx).await.unwrap();

        assert_eq!(outcome.status, RequestStatus::Truncated);
    }

    #[tokio::test]
    async fn cancellation_stops_the_loop_mid_stream() {
        let adapter = ScriptedAdapter {
            turns: Mutex::new(vec![vec![
                ProviderEvent::TextDelta("partial".to_owned()),
                ProviderEvent::TurnEnd { finish_reason: FinishReason::Stop, usage: Usage::default() },
            ]]),
        };

        let (dispatcher, _dir) = dispatcher().await;
        let (tx, _rx) = mpsc::channel(16);
        let mut request_ctx = ctx();
        request_ctx.cancellation.cancel();

        let history = vec![CanonicalMessage::user("hi")];
        let outcome = run("req-1", history, &[], &dispatcher, &adapter, &ChatOptions::default(), &request_ctx, 5, &tx).await.unwrap();

        assert_eq!(outcome.status, RequestStatus::Cancelled);
    }
}
