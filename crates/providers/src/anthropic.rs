//! Adapter for Anthropic's Messages API (`POST /v1/messages`).
//!
//! Grounded on the gateway workspace's `crates/llm/src/provider/anthropic.rs`
//! and its `AnthropicStreamProcessor`, generalized to emit the canonical
//! [`ProviderEvent`] algebra instead of OpenAI-compatible chunks, and to
//! buffer tool-call argument fragments until the turn closes per
//! `spec.md` §4.6 rather than forwarding them incrementally.

use std::collections::HashMap;

use async_trait::async_trait;
use canonical::{
    CanonicalContent, CanonicalMessage, CanonicalRole, ChatOptions, FinishReason, GatewayError, ImageSource,
    ProviderAdapter, ProviderEvent, ToolCall, ToolDefinition, Usage,
};
use eventsource_stream::Eventsource;
use futures::{StreamExt, stream::BoxStream};
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use serde_json::{Value, json};

use crate::{error_mapping, http_client::shared_client};

const DEFAULT_BASE_URL: &str = "https://api.anthropic.com/v1";
const ANTHROPIC_VERSION: &str = "2023-06-01";

pub struct AnthropicAdapter {
    base_url: String,
    api_key: SecretString,
    max_tokens: u32,
}

impl AnthropicAdapter {
    pub fn new(api_key: SecretString, base_url: Option<String>, max_tokens: u32) -> Self {
        Self { base_url: base_url.unwrap_or_else(|| DEFAULT_BASE_URL.to_string()), api_key, max_tokens }
    }

    fn render_body(&self, messages: &[CanonicalMessage], tools: &[ToolDefinition], options: &ChatOptions, stream: bool) -> Value {
        let system = messages
            .iter()
            .filter(|m| matches!(m.role, CanonicalRole::System))
            .map(CanonicalMessage::text)
            .collect::<Vec<_>>()
            .join("\n\n");

        let turns: Vec<Value> = messages.iter().filter(|m| !matches!(m.role, CanonicalRole::System)).map(render_message).collect();

        let mut body = json!({
            "model": options.model,
            "messages": turns,
            "max_tokens": options.max_output_tokens.unwrap_or(self.max_tokens),
            "stream": stream,
        });

        if let Value::Object(obj) = &mut body {
            if !system.is_empty() {
                obj.insert("system".to_string(), json!(system));
            }
            if !tools.is_empty() {
                obj.insert("tools".to_string(), Value::Array(render_tools(tools, options.strict_tools)));
            }
            if let Some(temperature) = options.temperature {
                obj.insert("temperature".to_string(), json!(temperature));
            }
            if let Some(top_p) = options.top_p {
                obj.insert("top_p".to_string(), json!(top_p));
            }
        }

        body
    }
}

fn render_tools(tools: &[ToolDefinition], strict: bool) -> Vec<Value> {
    tools
        .iter()
        .map(|tool| {
            let mut schema = tool.parameters.clone();
            if strict && let Value::Object(obj) = &mut schema {
                obj.insert("additionalProperties".to_string(), Value::Bool(false));
            }

            json!({"name": tool.name, "description": tool.description, "input_schema": schema})
        })
        .collect()
}

fn render_message(message: &CanonicalMessage) -> Value {
    if matches!(message.role, CanonicalRole::Tool) {
        return json!({
            "role": "user",
            "content": [{
                "type": "tool_result",
                "tool_use_id": message.tool_call_id,
                "content": message.text(),
            }],
        });
    }

    let role = if matches!(message.role, CanonicalRole::Assistant) { "assistant" } else { "user" };

    let mut content: Vec<Value> = message
        .content
        .iter()
        .map(|part| match part {
            CanonicalContent::Text { text } => json!({"type": "text", "text": text}),
            CanonicalContent::Image { source } => match source {
                ImageSource::Url { url } => json!({"type": "image", "source": {"type": "url", "url": url}}),
                ImageSource::Base64 { media_type, data } => {
                    json!({"type": "image", "source": {"type": "base64", "media_type": media_type, "data": data}})
                }
            },
        })
        .collect();

    if let Some(calls) = &message.tool_calls {
        for call in calls {
            content.push(json!({"type": "tool_use", "id": call.id, "name": call.name, "input": call.arguments}));
        }
    }

    json!({"role": role, "content": content})
}

#[derive(Debug, Deserialize)]
struct AnthropicUsage {
    #[serde(default)]
    input_tokens: u64,
    #[serde(default)]
    output_tokens: u64,
    #[serde(default)]
    cache_read_input_tokens: Option<u64>,
}

impl From<AnthropicUsage> for Usage {
    fn from(u: AnthropicUsage) -> Self {
        Usage { input_tokens: u.input_tokens, output_tokens: u.output_tokens, cached_input_tokens: u.cache_read_input_tokens }
    }
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type")]
enum StreamEvent {
    #[serde(rename = "message_start")]
    MessageStart { message: MessageStart },
    #[serde(rename = "content_block_start")]
    ContentBlockStart { index: u32, content_block: ContentBlock },
    #[serde(rename = "content_block_delta")]
    ContentBlockDelta { index: u32, delta: BlockDelta },
    #[serde(rename = "content_block_stop")]
    ContentBlockStop { index: u32 },
    #[serde(rename = "message_delta")]
    MessageDelta { delta: MessageDeltaData, usage: AnthropicUsage },
    #[serde(rename = "message_stop")]
    MessageStop,
    #[serde(other)]
    Other,
}

#[derive(Debug, Deserialize)]
struct MessageStart {
    #[serde(default)]
    usage: Option<AnthropicUsage>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ContentBlock {
    Text { #[serde(default)] text: String },
    ToolUse { id: String, name: String },
    #[serde(other)]
    Other,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum BlockDelta {
    TextDelta { text: String },
    InputJsonDelta { partial_json: String },
    #[serde(other)]
    Other,
}

#[derive(Debug, Deserialize)]
struct MessageDeltaData {
    #[serde(default)]
    stop_reason: Option<String>,
}

fn map_stop_reason(reason: Option<&str>) -> FinishReason {
    match reason {
        Some("end_turn") | Some("stop_sequence") => FinishReason::Stop,
        Some("max_tokens") => FinishReason::Length,
        Some("tool_use") => FinishReason::ToolCalls,
        Some("refusal") => FinishReason::ContentFilter,
        _ => FinishReason::Stop,
    }
}

#[async_trait]
impl ProviderAdapter for AnthropicAdapter {
    fn name(&self) -> &'static str {
        "anthropic"
    }

    async fn chat(
        &self,
        messages: &[CanonicalMessage],
        tools: &[ToolDefinition],
        options: &ChatOptions,
    ) -> Result<BoxStream<'static, Result<ProviderEvent, GatewayError>>, GatewayError> {
        let url = format!("{}/messages", self.base_url);
        let body = self.render_body(messages, tools, options, true);

        let response = shared_client()
            .post(&url)
            .header("x-api-key", self.api_key.expose_secret())
            .header("anthropic-version", ANTHROPIC_VERSION)
            .json(&body)
            .send()
            .await
            .map_err(|e| GatewayError::UpstreamUnavailable(format!("anthropic request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(error_mapping::from_status(status, &text, "anthropic"));
        }

        let event_stream = response.bytes_stream().eventsource();

        struct State {
            tool_calls: HashMap<u32, ToolCall>,
            partial_args: HashMap<u32, String>,
            usage: Usage,
            pending: Vec<ProviderEvent>,
            done: bool,
        }

        let state = State { tool_calls: HashMap::new(), partial_args: HashMap::new(), usage: Usage { input_tokens: 0, output_tokens: 0, cached_input_tokens: None }, pending: Vec::new(), done: false };

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

                match parsed {
                    StreamEvent::MessageStart { message } => {
                        if let Some(usage) = message.usage {
                            state.usage = usage.into();
                        }
                    }
                    StreamEvent::ContentBlockStart { index, content_block: ContentBlock::ToolUse { id, name } } => {
                        state.tool_calls.insert(index, ToolCall { id, name, arguments: Value::Object(Default::default()) });
                        state.partial_args.insert(index, String::new());
                    }
                    StreamEvent::ContentBlockStart { .. } => {}
                    StreamEvent::ContentBlockDelta { index, delta: BlockDelta::TextDelta { text } } => {
                        return Some((Ok(ProviderEvent::TextDelta(text)), (stream, state)));
                    }
                    StreamEvent::ContentBlockDelta { index, delta: BlockDelta::InputJsonDelta { partial_json } } => {
                        if let Some(buf) = state.partial_args.get_mut(&index) {
                            buf.push_str(&partial_json);
                        }
                    }
                    StreamEvent::ContentBlockDelta { .. } => {}
                    StreamEvent::ContentBlockStop { index } => {
                        if let (Some(call), Some(args)) = (state.tool_calls.remove(&index), state.partial_args.remove(&index)) {
                            let arguments = sonic_rs::from_str(&args).unwrap_or(Value::Object(Default::default()));
                            state.pending.push(ProviderEvent::ToolCallAssembled(ToolCall { arguments, ..call }));
                        }
                    }
                    StreamEvent::MessageDelta { delta, usage } => {
                        state.usage = usage.into();
                        state.done = true;
                        let finish_reason = map_stop_reason(delta.stop_reason.as_deref());
                        state.pending.insert(0, ProviderEvent::TurnEnd { finish_reason, usage: state.usage.clone() });
                    }
                    StreamEvent::MessageStop => {
                        state.done = true;
                    }
                    StreamEvent::Other => {}
                }
            }
        });

        Ok(Box::pin(stream))
    }

    async fn chat_once(&self, messages: &[CanonicalMessage], options: &ChatOptions) -> Result<(String, Usage), GatewayError> {
        let url = format!("{}/messages", self.base_url);
        let body = self.render_body(messages, &[], options, false);

        let response = shared_client()
            .post(&url)
            .header("x-api-key", self.api_key.expose_secret())
            .header("anthropic-version", ANTHROPIC_VERSION)
            .json(&body)
            .send()
            .await
            .map_err(|e| GatewayError::UpstreamUnavailable(format!("anthropic request failed: {e}")))?;

        let status = response.status();
        let text = response.text().await.unwrap_or_default();
        if !status.is_success() {
            return Err(error_mapping::from_status(status, &text, "anthropic"));
        }

        #[derive(Deserialize)]
        struct MessageResponse {
            content: Vec<ResponseBlock>,
            usage: AnthropicUsage,
        }

        #[derive(Deserialize)]
        #[serde(tag = "type", rename_all = "snake_case")]
        enum ResponseBlock {
            Text { text: String },
            #[serde(other)]
            Other,
        }

        let parsed: MessageResponse =
            sonic_rs::from_str(&text).map_err(|e| GatewayError::UpstreamUnavailable(format!("failed to parse anthropic response: {e}")))?;

        let text_out = parsed.content.into_iter().filter_map(|b| match b { ResponseBlock::Text { text } => Some(text), _ => None }).collect::<Vec<_>>().join("");

        Ok((text_out, parsed.usage.into()))
    }
}

#[cfg(test)]
mod tests {
    use canonical::ToolCall;

    use super::*;

    #[test]
    fn tool_result_renders_as_user_turn() {
        let message = CanonicalMessage::tool_result("toolu_1", "it is sunny");
        let rendered = render_message(&message);
        assert_eq!(rendered["role"], "user");
        assert_eq!(rendered["content"][0]["type"], "tool_result");
        assert_eq!(rendered["content"][0]["tool_use_id"], "toolu_1");
    }

    #[test]
    fn assistant_tool_calls_render_as_tool_use_blocks() {
        let call = ToolCall { id: "toolu_1".to_string(), name: "get_weather".to_string(), arguments: json!({"city": "nyc"}) };
        let message = CanonicalMessage::assistant_tool_calls(None, vec![call]);
        let rendered = render_message(&message);
        assert_eq!(rendered["content"][0]["type"], "tool_use");
        assert_eq!(rendered["content"][0]["name"], "get_weather");
    }

    #[test]
    fn stop_reason_tool_use_maps_to_tool_calls() {
        assert_eq!(map_stop_reason(Some("tool_use")), FinishReason::ToolCalls);
        assert_eq!(map_stop_reason(Some("max_tokens")), FinishReason::Length);
        assert_eq!(map_stop_reason(None), FinishReason::Stop);
    }
}
