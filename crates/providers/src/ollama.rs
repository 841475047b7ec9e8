//! Adapter for an Ollama-compatible `/api/chat` endpoint.
//!
//! Grounded on the gateway workspace's `crates/llm/src/provider/openai.rs`
//! HTTP/SSE plumbing, but rendering the legacy nested
//! `{type: "function", function: {...}}` tool envelope per `spec.md` §4.1 —
//! "the Ollama-compatible path must use the legacy shape".

use async_trait::async_trait;
use canonical::{
    CanonicalContent, CanonicalMessage, CanonicalRole, ChatOptions, FinishReason, GatewayError, ImageSource,
    ProviderAdapter, ProviderEvent, ToolCall, ToolDefinition, Usage,
};
use futures::{StreamExt, stream::BoxStream};
use serde::Deserialize;
use serde_json::{Value, json};

use crate::{error_mapping, http_client::shared_client};

const DEFAULT_BASE_URL: &str = "http://localhost:11434";

pub struct OllamaAdapter {
    base_url: String,
}

impl OllamaAdapter {
    pub fn new(base_url: Option<String>) -> Self {
        Self { base_url: base_url.unwrap_or_else(|| DEFAULT_BASE_URL.to_string()) }
    }

    fn render_body(messages: &[CanonicalMessage], tools: &[ToolDefinition], options: &ChatOptions, stream: bool) -> Value {
        let rendered: Vec<Value> = messages.iter().map(render_message).collect();

        let mut body = json!({"model": options.model, "messages": rendered, "stream": stream});

        if let Value::Object(obj) = &mut body {
            if !tools.is_empty() {
                obj.insert("tools".to_string(), Value::Array(tools.iter().map(render_tool).collect()));
            }

            let mut opts = serde_json::Map::new();
            if let Some(t) = options.temperature {
                opts.insert("temperature".to_string(), json!(t));
            }
            if let Some(p) = options.top_p {
                opts.insert("top_p".to_string(), json!(p));
            }
            if let Some(max) = options.max_output_tokens {
                opts.insert("num_predict".to_string(), json!(max));
            }
            if !opts.is_empty() {
                obj.insert("options".to_string(), Value::Object(opts));
            }
        }

        body
    }
}

fn render_tool(tool: &ToolDefinition) -> Value {
    json!({
        "type": "function",
        "function": {
            "name": tool.name,
            "description": tool.description,
            "parameters": tool.parameters,
        },
    })
}

fn render_message(message: &CanonicalMessage) -> Value {
    let role = match message.role {
        CanonicalRole::System => "system",
        CanonicalRole::User => "user",
        CanonicalRole::Assistant => "assistant",
        CanonicalRole::Tool => "tool",
    };

    let images: Vec<&str> = message
        .content
        .iter()
        .filter_map(|part| match part {
            CanonicalContent::Image { source: ImageSource::Base64 { data, .. } } => Some(data.as_str()),
            _ => None,
        })
        .collect();

    let mut entry = json!({"role": role, "content": message.text()});

    if let Value::Object(obj) = &mut entry {
        if !images.is_empty() {
            obj.insert("images".to_string(), json!(images));
        }

        if let Some(calls) = &message.tool_calls {
            let rendered: Vec<Value> = calls
                .iter()
                .map(|call| json!({"function": {"name": call.name, "arguments": call.arguments}}))
                .collect();
            obj.insert("tool_calls".to_string(), Value::Array(rendered));
        }
    }

    entry
}

#[derive(Debug, Deserialize)]
struct OllamaMessage {
    #[serde(default)]
    content: String,
    #[serde(default)]
    tool_calls: Vec<OllamaToolCall>,
}

#[derive(Debug, Deserialize)]
struct OllamaToolCall {
    function: OllamaFunctionCall,
}

#[derive(Debug, Deserialize)]
struct OllamaFunctionCall {
    name: String,
    #[serde(default)]
    arguments: Value,
}

#[derive(Debug, Deserialize)]
struct OllamaChunk {
    #[serde(default)]
    message: Option<OllamaMessage>,
    #[serde(default)]
    done: bool,
    #[serde(default)]
    prompt_eval_count: Option<u64>,
    #[serde(default)]
    eval_count: Option<u64>,
}

#[async_trait]
impl ProviderAdapter for OllamaAdapter {
    fn name(&self) -> &'static str {
        "ollama"
    }

    async fn chat(
        &self,
        messages: &[CanonicalMessage],
        tools: &[ToolDefinition],
        options: &ChatOptions,
    ) -> Result<BoxStream<'static, Result<ProviderEvent, GatewayError>>, GatewayError> {
        let url = format!("{}/api/chat", self.base_url);
        let body = Self::render_body(messages, tools, options, true);

        let response = shared_client()
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| GatewayError::UpstreamUnavailable(format!("ollama request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(error_mapping::from_status(status, &text, "ollama"));
        }

        // Ollama streams newline-delimited JSON objects, not SSE.
        let byte_stream = response.bytes_stream();

        let stream = futures::stream::unfold((Box::pin(byte_stream), Vec::<u8>::new(), Vec::<ProviderEvent>::new(), false), |(mut stream, mut buf, mut pending, mut done)| async move {
            loop {
                if let Some(event) = pending.pop() {
                    return Some((Ok(event), (stream, buf, pending, done)));
                }

                if done {
                    return None;
                }

                let chunk = match stream.next().await {
                    Some(Ok(bytes)) => bytes,
                    Some(Err(_)) => continue,
                    None => return None,
                };

                buf.extend_from_slice(&chunk);

                while let Some(pos) = buf.iter().position(|b| *b == b'\n') {
                    let line: Vec<u8> = buf.drain(..=pos).collect();
                    let line = &line[..line.len() - 1];
                    if line.is_empty() {
                        continue;
                    }

                    let Ok(parsed) = sonic_rs::from_slice::<OllamaChunk>(line) else { continue };

                    if let Some(message) = &parsed.message {
                        if !message.content.is_empty() {
                            pending.insert(0, ProviderEvent::TextDelta(message.content.clone()));
                        }

                        for call in &message.tool_calls {
                            pending.insert(0, ProviderEvent::ToolCallAssembled(ToolCall {
                                id: format!("call_{}", uuid::Uuid::new_v4()),
                                name: call.function.name.clone(),
                                arguments: call.function.arguments.clone(),
                            }));
                        }
                    }

                    if parsed.done {
                        done = true;
                        let usage = Usage {
                            input_tokens: parsed.prompt_eval_count.unwrap_or(0),
                            output_tokens: parsed.eval_count.unwrap_or(0),
                            cached_input_tokens: None,
                        };
                        let has_tool_calls = parsed.message.as_ref().is_some_and(|m| !m.tool_calls.is_empty());
                        let finish_reason = if has_tool_calls { FinishReason::ToolCalls } else { FinishReason::Stop };
                        pending.insert(0, ProviderEvent::TurnEnd { finish_reason, usage });
                    }
                }

                if let Some(event) = pending.pop() {
                    return Some((Ok(event), (stream, buf, pending, done)));
                }
            }
        });

        Ok(Box::pin(stream))
    }

    async fn chat_once(&self, messages: &[CanonicalMessage], options: &ChatOptions) -> Result<(String, Usage), GatewayError> {
        let url = format!("{}/api/chat", self.base_url);
        let body = Self::render_body(messages, &[], options, false);

        let response = shared_client()
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| GatewayError::UpstreamUnavailable(format!("ollama request failed: {e}")))?;

        let status = response.status();
        let text = response.text().await.unwrap_or_default();
        if !status.is_success() {
            return Err(error_mapping::from_status(status, &text, "ollama"));
        }

        let parsed: OllamaChunk =
            sonic_rs::from_str(&text).map_err(|e| GatewayError::UpstreamUnavailable(format!("failed to parse ollama response: {e}")))?;

        let content = parsed.message.map(|m| m.content).unwrap_or_default();
        let usage = Usage { input_tokens: parsed.prompt_eval_count.unwrap_or(0), output_tokens: parsed.eval_count.unwrap_or(0), cached_input_tokens: None };

        Ok((content, usage))
    }
}

#[cfg(test)]
mod tests {
    use canonical::ToolCall;

    use super::*;

    #[test]
    fn tools_render_in_legacy_nested_shape() {
        let tool = ToolDefinition { name: "get_weather".to_string(), description: "weather".to_string(), parameters: json!({"type": "object"}) };
        let rendered = render_tool(&tool);
        assert_eq!(rendered["type"], "function");
        assert_eq!(rendered["function"]["name"], "get_weather");
    }

    #[test]
    fn assistant_tool_calls_render_nested_function() {
        let call = ToolCall { id: "1".to_string(), name: "get_weather".to_string(), arguments: json!({"city": "nyc"}) };
        let message = CanonicalMessage::assistant_tool_calls(None, vec![call]);
        let rendered = render_message(&message);
        assert_eq!(rendered["tool_calls"][0]["function"]["name"], "get_weather");
    }
}
