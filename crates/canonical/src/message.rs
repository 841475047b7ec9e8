//! The canonical, provider-agnostic conversation model.
//!
//! Every [`crate::ProviderAdapter`] translates to and from this shape; no
//! provider-specific vocabulary is allowed to leak past the adapter boundary.

use serde::{Deserialize, Serialize};

/// One element of a conversation (`spec.md` §3 `CanonicalMessage`).
///
/// Invariant: every [`CanonicalRole::Tool`] message's `tool_call_id` references a
/// [`ToolCall::id`] emitted by an immediately prior assistant turn in the same
/// iteration. The dispatch loop (`crates/gateway`) is responsible for upholding
/// this; this type does not enforce it structurally.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CanonicalMessage {
    pub role: CanonicalRole,
    pub content: Vec<CanonicalContent>,
    /// Present only on assistant turns that requested tool calls.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Vec<ToolCall>>,
    /// Present only on tool-role messages; back-references the call this result answers.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
}

impl CanonicalMessage {
    pub fn system(text: impl Into<String>) -> Self {
        Self {
            role: CanonicalRole::System,
            content: vec![CanonicalContent::Text { text: text.into() }],
            tool_calls: None,
            tool_call_id: None,
        }
    }

    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: CanonicalRole::User,
            content: vec![CanonicalContent::Text { text: text.into() }],
            tool_calls: None,
            tool_call_id: None,
        }
    }

    pub fn assistant_text(text: impl Into<String>) -> Self {
        Self {
            role: CanonicalRole::Assistant,
            content: vec![CanonicalContent::Text { text: text.into() }],
            tool_calls: None,
            tool_call_id: None,
        }
    }

    pub fn assistant_tool_calls(text: Option<String>, calls: Vec<ToolCall>) -> Self {
        let mut content = Vec::new();

        if let Some(text) = text {
            content.push(CanonicalContent::Text { text });
        }

        Self {
            role: CanonicalRole::Assistant,
            content,
            tool_calls: Some(calls),
            tool_call_id: None,
        }
    }

    pub fn tool_result(tool_call_id: impl Into<String>, result: impl Into<String>) -> Self {
        Self {
            role: CanonicalRole::Tool,
            content: vec![CanonicalContent::Text { text: result.into() }],
            tool_calls: None,
            tool_call_id: Some(tool_call_id.into()),
        }
    }

    /// Concatenates every text part, ignoring images and tool markers. Used for
    /// token estimation and truncation in the Conversation Shaper.
    pub fn text(&self) -> String {
        self.content
            .iter()
            .filter_map(CanonicalContent::as_text)
            .collect::<Vec<_>>()
            .join("")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CanonicalRole {
    System,
    User,
    Assistant,
    Tool,
}

/// One part of a message's content (`spec.md` §3: "ordered list of parts").
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CanonicalContent {
    Text { text: String },
    /// A reference to an image, either inline base64 or a fetchable URL. The
    /// gateway never decodes image bytes itself; adapters forward the reference
    /// in whatever shape the upstream provider expects.
    Image { source: ImageSource },
}

impl CanonicalContent {
    pub fn as_text(&self) -> Option<&str> {
        match self {
            CanonicalContent::Text { text } => Some(text),
            CanonicalContent::Image { .. } => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ImageSource {
    Base64 { media_type: String, data: String },
    Url { url: String },
}

/// A tool invocation requested by the model (`spec.md` §3 `ToolCall`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCall {
    pub id: String,
    pub name: String,
    pub arguments: serde_json::Value,
}

/// The provider-agnostic description of a callable tool (`spec.md` §3 `ToolDefinition`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    /// A JSON-Schema object, shared verbatim across every provider rendering.
    pub parameters: serde_json::Value,
}

/// Token usage for one provider turn, with an optional cached-prompt counter
/// (`spec.md` §4.6 — "not uniformly reported by all providers"; missing ⇒ zero,
/// per §9 Open Questions).
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct Usage {
    pub input_tokens: u64,
    pub output_tokens: u64,
    #[serde(default)]
    pub cached_input_tokens: Option<u64>,
}

impl Usage {
    pub fn cached_input_tokens(&self) -> u64 {
        self.cached_input_tokens.unwrap_or(0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FinishReason {
    Stop,
    Length,
    ContentFilter,
    ToolCalls,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn text_ignores_images() {
        let message = CanonicalMessage {
            role: CanonicalRole::User,
            content: vec![
                CanonicalContent::Text {
                    text: "look at this: ".to_owned(),
                },
                CanonicalContent::Image {
                    source: ImageSource::Url {
                        url: "https://example.com/cat.png".to_owned(),
                    },
                },
                CanonicalContent::Text {
                    text: "cute right?".to_owned(),
                },
            ],
            tool_calls: None,
            tool_call_id: None,
        };

        assert_eq!(message.text(), "look at this: cute right?");
    }

    #[test]
    fn cached_input_tokens_defaults_to_zero() {
        let usage = Usage {
            input_tokens: 10,
            output_tokens: 5,
            cached_input_tokens: None,
        };

        assert_eq!(usage.cached_input_tokens(), 0);
    }

    #[test]
    fn tool_result_round_trips_through_json() {
        let message = CanonicalMessage::tool_result("call_1", "42 degrees");
        let json = serde_json::to_value(&message).unwrap();
        let back: CanonicalMessage = serde_json::from_value(json).unwrap();

        assert_eq!(back.tool_call_id.as_deref(), Some("call_1"));
        assert_eq!(back.text(), "42 degrees");
    }
}
