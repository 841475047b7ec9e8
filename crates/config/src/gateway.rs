//! Dispatch Loop and Conversation Shaper configuration (`spec.md` §4.7, §4.8, §6).

use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct GatewayConfig {
    /// `MAX_TOOL_ITERATIONS` — bounded cap on dispatch-loop iterations.
    pub max_tool_iterations: u32,
    /// `MAX_INPUT_TOKENS` — total input token budget before auto-compaction engages.
    pub max_input_tokens: u32,
    /// `MAX_USER_MESSAGE_TOKENS` — per-message trimming cap, scaled by attached-file count.
    pub max_user_message_tokens: u32,
    /// `COMPACTION_TOKEN_THRESHOLD` — estimated-input-token threshold above which
    /// auto-compaction runs.
    pub compaction_token_threshold: u32,
    /// `COMPACTION_MAX_SUMMARY_TOKENS` — cap on the generated summary message.
    pub compaction_max_summary_tokens: u32,
    /// Number of most-recent turns kept verbatim during compaction ("keep-tail").
    pub compaction_keep_tail_turns: u32,
    /// `ANTHROPIC_MAX_TOKENS` — required output-token cap for the Anthropic adapter.
    pub anthropic_max_tokens: u32,
    /// End-to-end watchdog timeout, in seconds, per `spec.md` §5 ("default 10 minutes").
    pub request_timeout_secs: u64,
    /// The model used for the compaction summarization pass.
    pub compaction_model: String,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            max_tool_iterations: 5,
            max_input_tokens: 128_000,
            max_user_message_tokens: 8_000,
            compaction_token_threshold: 65_536,
            compaction_max_summary_tokens: 1_024,
            compaction_keep_tail_turns: 4,
            anthropic_max_tokens: 8_192,
            request_timeout_secs: 600,
            compaction_model: "openai/gpt-4o-mini".to_owned(),
        }
    }
}

#[cfg(test)]
mod tests {
    use insta::assert_debug_snapshot;

    use super::GatewayConfig;

    #[test]
    fn defaults() {
        let config: GatewayConfig = toml::from_str("").unwrap();

        assert_debug_snapshot!(&config, @r#"
        GatewayConfig {
            max_tool_iterations: 5,
            max_input_tokens: 128000,
            max_user_message_tokens: 8000,
            compaction_token_threshold: 65536,
            compaction_max_summary_tokens: 1024,
            compaction_keep_tail_turns: 4,
            anthropic_max_tokens: 8192,
            request_timeout_secs: 600,
            compaction_model: "openai/gpt-4o-mini",
        }
        "#);
    }

    #[test]
    fn overrides_from_toml() {
        let config: GatewayConfig = toml::from_str("max_tool_iterations = 3\n").unwrap();
        assert_eq!(config.max_tool_iterations, 3);
        assert_eq!(config.max_input_tokens, 128_000);
    }
}
