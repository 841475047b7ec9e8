//! Adapter for OpenAI's Responses API (`POST /v1/responses`).
//!
//! Grounded on the gateway workspace's `crates/llm/src/provider/openai.rs`
//! (HTTP plumbing, SSE-to-stream conversion) but targets the flat
//! Responses-API tool-call envelope described in `spec.md` §4.1, not the
//! legacy Chat Completions shape that file used.

use std::collections::HashMap;

use async_trait::async_trait;
use canonical::{
    CanonicalContent, CanonicalMessage, CanonicalRole, ChatOptions, FinishReason, GatewayError, ImageSource,
    ProviderAdapter, ProviderEvent, ToolCall, ToolDefinition, Usage,
};
use eventsource_stream::Eventsource;
use futures::{StreamExt, stream::BoxStream};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use crate::{error_mapping, http_client::shared_client};

const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

pub struct OpenAiAdapter {
    base_url: String,
    api_key: SecretString,
}

impl OpenAiAdapter {
    pub fn new(api_key: SecretString, base_url: Option<String>) -> Self {
        Self { base_url: base_url.unwrap_or_else(|| DEFAULT_BASE_URL.to_string()), api_key }
    }

    fn render_input(messages: &[CanonicalMessage]) -> Vec<Value> {
        messages.iter().map(render_message).collect()
    }

    fn render_tools(tools: &[ToolDefinition], strict: bool) -> Vec<Value> {
        tools
            .iter()
            .map(|tool| {
                let mut parameters = tool.parameters.clone();
                if strict && let Value::Object(obj) = &mut parameters {
                    obj.insert("additionalProperties".to_string(), Value::Bool(false));
                }

                json!({
                    "type": "function",
                    "name": tool.name,
                    "description": tool.description,
                    "parameters": parameters,
                    "strict": strict,
                })
            })
            .collect()
    }
}

fn render_message(message: &CanonicalMessage) -> Value {
    match message.role {
        CanonicalRole::Tool => json!({
            "type": "function_call_output",
            "call_id": message.tool_call_id,
            "output": message.text(),
        }),
        CanonicalRole::Assistant if message.tool_calls.is_some() => {
            let calls = message.tool_calls.as_deref().unwrap_or_default();
            let mut items: Vec<Value> = calls
                .iter()
                .map(|call| {
                    json!({
                        "type": "function_call",
                        "call_id": call.id,
                        "name": call.name,
                        "arguments": call.arguments.to_string(),
                    })
                })
                .collect();

            if !message.text().is_empty() {
                items.insert(0, render_role_message(message));
            }

            // The Responses API input array is flat; callers append one entry
            // per item, so a single assistant turn with both text and tool
            // calls becomes several input entries. We return an array here
            // and flatten it at the call site.
            Value::Array(items)
        }
        _ => render_role_message(message),
    }
}

fn render_role_message(message: &CanonicalMessage) -> Value {
    let role = match message.role {
        CanonicalRole::System => "system",
        CanonicalRole::User => "user",
        CanonicalRole::Assistant => "assistant",
        CanonicalRole::Tool => "tool",
    };

    let content: Vec<Value> = message
        .content
        .iter()
        .map(|part| match part {
            CanonicalContent::Text { text } => {
                let kind = if matches!(message.role, CanonicalRole::Assistant) { "output_text" } else { "input_text" };
                json!({"type": kind, "text": text})
            }
            CanonicalContent::Image { source } => match source {
                ImageSource::Url { url } => json!({"type": "input_image", "image_url": url}),
                ImageSource::Base64 { media_type, data } => {
                    json!({"type": "input_image", "image_url": format!("data:{media_type};base64,{data}")})
                }
            },
        })
        .collect();

    json!({"role": role, "content": content})
}

#[derive(Debug, Deserialize)]
struct ResponsesPayload {
    #[serde(default)]
    output: Vec<OutputItem>,
    #[serde(default)]
    usage: Option<ResponsesUsage>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum OutputItem {
    Message {
        #[serde(default)]
        content: Vec<OutputContent>,
    },
    FunctionCall {
        call_id: String,
        name: String,
        #[serde(default)]
        arguments: String,
    },
    #[serde(other)]
    Other,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum OutputContent {
    OutputText { text: String },
    #[serde(other)]
    Other,
}

#[derive(Debug, Deserialize)]
struct ResponsesUsage {
    input_tokens: u64,
    output_tokens: u64,
    #[serde(default)]
    input_tokens_details: Option<InputTokensDetails>,
}

#[derive(Debug, Deserialize)]
struct InputTokensDetails {
    #[serde(default)]
    cached_tokens: u64,
}

impl From<ResponsesUsage> for Usage {
    fn from(u: ResponsesUsage) -> Self {
        Usage {
            input_tokens: u.input_tokens,
            output_tokens: u.output_tokens,
            cached_input_tokens: u.input_tokens_details.map(|d| d.cached_tokens),
        }
    }
}

#[derive(Default)]
struct ToolCallBuilder {
    call_id: String,
    name: String,
    arguments: String,
}

/// Decode state for the Responses-API SSE stream. Kept outside the
/// `futures::stream::unfold` closure so the decode logic can be driven
/// directly in tests without going through an HTTP response body.
#[derive(Default)]
struct DecodeState {
    tool_calls: HashMap<String, ToolCallBuilder>,
    pending: Vec<ProviderEvent>,
    done: bool,
}

impl DecodeState {
    /// Feeds one parsed SSE event into the state machine. Returns an event
    /// to yield immediately, if any; anything queued in `pending` is drained
    /// by the caller on subsequent calls before `done` is checked again.
    fn apply(&mut self, parsed: StreamEvent) -> Option<ProviderEvent> {
        match parsed {
            StreamEvent::OutputTextDelta { delta } => return Some(ProviderEvent::TextDelta(delta)),
            StreamEvent::ReasoningDelta { delta } => return Some(ProviderEvent::ReasoningDelta(delta)),
            StreamEvent::OutputItemAdded { item: StreamItem::FunctionCall { id, call_id, name } } => {
                self.tool_calls.insert(id, ToolCallBuilder { call_id, name, arguments: String::new() });
            }
            StreamEvent::OutputItemAdded { .. } => {}
            StreamEvent::FunctionCallArgumentsDelta { item_id, delta } => {
                if let Some(builder) = self.tool_calls.get_mut(&item_id) {
                    builder.arguments.push_str(&delta);
                }
            }
            StreamEvent::Completed { response } | StreamEvent::Incomplete { response } => {
                self.done = true;

                for item in &response.output {
                    if let OutputItem::FunctionCall { call_id, name, arguments } = item {
                        self.tool_calls.entry(call_id.clone()).or_insert_with(|| ToolCallBuilder {
                            call_id: call_id.clone(),
                            name: name.clone(),
                            arguments: arguments.clone(),
                        });
                    }
                }

                let usage = response.usage.map(Usage::from).unwrap_or(Usage { input_tokens: 0, output_tokens: 0, cached_input_tokens: None });
                let finish_reason = if self.tool_calls.is_empty() { FinishReason::Stop } else { FinishReason::ToolCalls };

                for builder in std::mem::take(&mut self.tool_calls).into_values() {
                    let arguments: Value = sonic_rs::from_str(&builder.arguments).unwrap_or(Value::Object(Default::default()));
                    self.pending.push(ProviderEvent::ToolCallAssembled(ToolCall { id: builder.call_id, name: builder.name, arguments }));
                }

                // Inserted at the front so `pending.pop()` (which drains from the
                // back) yields every tool call before this, making TurnEnd last.
                self.pending.insert(0, ProviderEvent::TurnEnd { finish_reason, usage });
            }
            StreamEvent::Other => {}
        }

        None
    }
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type")]
enum StreamEvent {
    #[serde(rename = "response.output_text.delta")]
    OutputTextDelta { delta: String },
    #[serde(rename = "response.reasoning_summary_text.delta")]
    ReasoningDelta { delta: String },
    #[serde(rename = "response.output_item.added")]
    OutputItemAdded { item: StreamItem },
    #[serde(rename = "response.function_call_arguments.delta")]
    FunctionCallArgumentsDelta { item_id: String, delta: String },
    #[serde(rename = "response.completed")]
    Completed { response: ResponsesPayload },
    #[serde(rename = "response.incomplete")]
    Incomplete { response: ResponsesPayload },
    #[serde(other)]
    Other,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum StreamItem {
    FunctionCall {
        id: String,
        call_id: String,
        name: String,
    },
    #[serde(other)]
    Other,
}

#[async_trait]
impl ProviderAdapter for OpenAiAdapter {
    fn name(&self) -> &'static str {
        "openai"
    }

    async fn chat(
        &self,
        messages: &[CanonicalMessage],
        tools: &[ToolDefinition],
        options: &ChatOptions,
    ) -> Result<BoxStream<'static, Result<ProviderEvent, GatewayError>>, GatewayError> {
        let url = format!("{}/responses", self.base_url);

        let mut input = Vec::new();
        for message in messages {
            match Self::render_input(std::slice::from_ref(message)).into_iter().next() {
                Some(Value::Array(items)) => input.extend(items),
                Some(other) => input.push(other),
                None => {}
            }
        }

        let mut body = json!({
            "model": options.model,
            "input": input,
            "stream": true,
        });

        if let Value::Object(obj) = &mut body {
            if !tools.is_empty() {
                obj.insert("tools".to_string(), Value::Array(Self::render_tools(tools, options.strict_tools)));
            }
            if let Some(max) = options.max_output_tokens {
                obj.insert("max_output_tokens".to_string(), json!(max));
            }
            if let Some(temperature) = options.temperature {
                obj.insert("temperature".to_string(), json!(temperature));
            }
            if let Some(top_p) = options.top_p {
                obj.insert("top_p".to_string(), json!(top_p));
            }
        }

        let response = shared_client()
            .post(&url)
            .bearer_auth(self.api_key.expose_secret())
            .json(&body)
            .send()
            .await
            .map_err(|e| GatewayError::UpstreamUnavailable(format!("openai request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(error_mapping::from_status(status, &text, "openai"));
        }

        let event_stream = response.bytes_stream().eventsource();
        let state = DecodeState::default();

        let stream = futures::stream::unfold((Box::pin(event_stream), state), |(mut stream, mut state)| async move {
            loop {
                if let Some(event) = state.pending.pop() {
                    return Some((Ok(event), (stream, state)));
                }

                if state.done {
                    return None;
                }

                let Some(event) = stream.next().await else { return None };
                let Ok(event) = event else { continue };

                let Ok(parsed) = sonic_rs::from_str::<StreamEvent>(&event.data) else { continue };

                if let Some(event) = state.apply(parsed) {
                    return Some((Ok(event), (stream, state)));
                }
            }
        });

        Ok(Box::pin(stream))
    }

    async fn chat_once(&self, messages: &[CanonicalMessage], options: &ChatOptions) -> Result<(String, Usage), GatewayError> {
        let url = format!("{}/responses", self.base_url);

        let mut input = Vec::new();
        for message in messages {
            match Self::render_input(std::slice::from_ref(message)).into_iter().next() {
                Some(Value::Array(items)) => input.extend(items),
                Some(other) => input.push(other),
                None => {}
            }
        }

        let mut body = json!({"model": options.model, "input": input, "stream": false});
        if let Value::Object(obj) = &mut body
            && let Some(max) = options.max_output_tokens
        {
            obj.insert("max_output_tokens".to_string(), json!(max));
        }

        let response = shared_client()
            .post(&url)
            .bearer_auth(self.api_key.expose_secret())
            .json(&body)
            .send()
            .await
            .map_err(|e| GatewayError::UpstreamUnavailable(format!("openai request failed: {e}")))?;

        let status = response.status();
        let text = response.text().await.unwrap_or_default();
        if !status.is_success() {
            return Err(error_mapping::from_status(status, &text, "openai"));
        }

        let payload: ResponsesPayload =
            sonic_rs::from_str(&text).map_err(|e| GatewayError::UpstreamUnavailable(format!("failed to parse openai response: {e}")))?;

        let text_out = payload
            .output
            .iter()
            .filter_map(|item| match item {
                OutputItem::Message { content } => {
                    Some(content.iter().filter_map(|c| match c { OutputContent::OutputText { text } => Some(text.clone()), _ => None }).collect::<String>())
                }
                _ => None,
            })
            .collect::<Vec<_>>()
            .join("");

        let usage = payload.usage.map(Usage::from).unwrap_or(Usage { input_tokens: 0, output_tokens: 0, cached_input_tokens: None });

        Ok((text_out, usage))
    }
}

#[cfg(test)]
mod tests {
    use canonical::ToolDefinition;

    use super::*;

    #[test]
    fn strict_tools_add_additional_properties_false() {
        let tool = ToolDefinition {
            name: "get_weather".to_string(),
            description: "Look up the weather".to_string(),
            parameters: json!({"type": "object", "properties": {"city": {"type": "string"}}}),
        };

        let rendered = OpenAiAdapter::render_tools(std::slice::from_ref(&tool), true);
        assert_eq!(rendered[0]["type"], "function");
        assert_eq!(rendered[0]["parameters"]["additionalProperties"], false);

        let lenient = OpenAiAdapter::render_tools(std::slice::from_ref(&tool), false);
        assert!(lenient[0]["parameters"].get("additionalProperties").is_none());
    }

    #[test]
    fn tool_result_message_carries_call_id() {
        let message = CanonicalMessage::tool_result("call_1", "42 degrees");
        let rendered = render_message(&message);
        assert_eq!(rendered["type"], "function_call_output");
        assert_eq!(rendered["call_id"], "call_1");
        assert_eq!(rendered["output"], "42 degrees");
    }

    #[test]
    fn user_message_renders_input_text() {
        let message = CanonicalMessage::user("hello");
        let rendered = render_message(&message);
        assert_eq!(rendered["role"], "user");
        assert_eq!(rendered["content"][0]["type"], "input_text");
    }

    #[test]
    fn multi_tool_call_turn_emits_every_call_then_a_trailing_turn_end() {
        let mut state = DecodeState::default();

        assert!(
            state
                .apply(StreamEvent::OutputItemAdded {
                    item: StreamItem::FunctionCall { id: "item_1".to_string(), call_id: "call_1".to_string(), name: "get_weather".to_string() }
                })
                .is_none()
        );
        assert!(state.apply(StreamEvent::FunctionCallArgumentsDelta { item_id: "item_1".to_string(), delta: "{\"city\":\"nyc\"}".to_string() }).is_none());
        assert!(
            state
                .apply(StreamEvent::OutputItemAdded {
                    item: StreamItem::FunctionCall { id: "item_2".to_string(), call_id: "call_2".to_string(), name: "get_time".to_string() }
                })
                .is_none()
        );
        assert!(state.apply(StreamEvent::FunctionCallArgumentsDelta { item_id: "item_2".to_string(), delta: "{}".to_string() }).is_none());

        assert!(state.apply(StreamEvent::Completed { response: ResponsesPayload { output: Vec::new(), usage: None } }).is_none());
        assert!(!state.done, "the Completed arm must not be treated as exhausted until pending drains");

        let mut drained = Vec::new();
        while let Some(event) = state.pending.pop() {
            drained.push(event);
        }

        assert_eq!(drained.len(), 3);
        assert!(matches!(drained[2], ProviderEvent::TurnEnd { finish_reason: FinishReason::ToolCalls, .. }), "TurnEnd must be the last event of the turn");
        let call_ids: Vec<&str> = drained[..2]
            .iter()
            .map(|event| match event {
                ProviderEvent::ToolCallAssembled(c) => c.id.as_str(),
                other => panic!("expected a tool call, got {other:?}"),
            })
            .collect();
        assert!(call_ids.contains(&"call_1"));
        assert!(call_ids.contains(&"call_2"));
    }
}
