//! The Conversation Shaper (`spec.md` §4.7): three sequential phases applied
//! to an inbound message list before it reaches the Dispatch Loop.
//!
//! Token estimation uses `tiktoken-rs`'s `cl100k_base` encoding (already a
//! gateway-workspace dependency, per `SPEC_FULL.md` §4.7) rather than a
//! provider round-trip — the estimate only has to be good enough to decide
//! whether to trim or compact, not exact.

use std::sync::{Arc, OnceLock};

use canonical::{CanonicalMessage, CanonicalRole, GatewayError, ProviderAdapter};
use config::GatewayConfig;
use memory::MemoryStore;
use tiktoken_rs::CoreBPE;

fn encoder() -> &'static CoreBPE {
    static ENCODER: OnceLock<CoreBPE> = OnceLock::new();
    ENCODER.get_or_init(|| tiktoken_rs::cl100k_base().expect("cl100k_base encoding table is bundled with tiktoken-rs"))
}

fn count_tokens(text: &str) -> usize {
    encoder().encode_ordinary(text).len()
}

fn count_message_tokens(message: &CanonicalMessage) -> usize {
    count_tokens(&message.text())
}

pub struct ConversationShaper {
    memory: Option<Arc<MemoryStore>>,
}

impl ConversationShaper {
    pub fn new(memory: Option<Arc<MemoryStore>>) -> Self {
        Self { memory }
    }

    /// Runs all three phases in order (`spec.md` §4.7). `attached_file_count`
    /// scales the per-message trimming cap; `compaction_adapter` is the
    /// `ProviderAdapter` that serves `config.compaction_model`, used only for
    /// its `chat_once` summarization call.
    pub async fn shape(
        &self,
        user_id: &str,
        mut history: Vec<CanonicalMessage>,
        attached_file_count: usize,
        config: &GatewayConfig,
        compaction_adapter: &dyn ProviderAdapter,
    ) -> Result<Vec<CanonicalMessage>, GatewayError> {
        self.inject_memory(user_id, &mut history).await?;
        self.trim_messages(&mut history, attached_file_count, config);
        self.compact_if_needed(&mut history, config, compaction_adapter).await?;
        Ok(history)
    }

    async fn inject_memory(&self, user_id: &str, history: &mut Vec<CanonicalMessage>) -> Result<(), GatewayError> {
        let Some(memory) = &self.memory else { return Ok(()) };

        let memories = memory.retrieve(user_id).await.map_err(|e| GatewayError::Internal(e.to_string()))?;
        if memories.is_empty() {
            return Ok(());
        }

        let bullets = memories.iter().map(|m| format!("- {}", m.text)).collect::<Vec<_>>().join("\n");
        let block = format!("Known facts about the user, remembered from earlier conversations:\n{bullets}");

        match history.iter_mut().find(|m| m.role == CanonicalRole::System) {
            Some(system) => {
                system.content.push(canonical::CanonicalContent::Text { text: format!("\n\n{block}") });
            }
            None => history.insert(0, CanonicalMessage::system(block)),
        }

        Ok(())
    }

    /// Per-message trimming (`spec.md` §4.7 phase 2). The cap scales down as
    /// more files are attached, since the same token budget is shared across
    /// the message text and every file extraction riding alongside it.
    fn trim_messages(&self, history: &mut [CanonicalMessage], attached_file_count: usize, config: &GatewayConfig) {
        let divisor = (attached_file_count as u32).max(1);
        let cap = (config.max_user_message_tokens / divisor).max(1) as usize;

        for message in history.iter_mut() {
            if message.role != CanonicalRole::User {
                continue;
            }

            for part in message.content.iter_mut() {
                if let canonical::CanonicalContent::Text { text } = part {
                    truncate_to_token_cap(text, cap);
                }
            }
        }
    }

    /// Auto-compaction (`spec.md` §4.7 phase 3). Idempotent by construction:
    /// once compacted, estimated tokens fall under `compaction_token_threshold`
    /// (the summary is bounded by `compaction_max_summary_tokens`), so a second
    /// call finds nothing to do.
    async fn compact_if_needed(
        &self,
        history: &mut Vec<CanonicalMessage>,
        config: &GatewayConfig,
        compaction_adapter: &dyn ProviderAdapter,
    ) -> Result<(), GatewayError> {
        let total: usize = history.iter().map(count_message_tokens).sum();
        if total <= config.compaction_token_threshold as usize {
            return Ok(());
        }

        let keep_from = keep_tail_boundary(history, config.compaction_keep_tail_turns as usize);
        if keep_from == 0 {
            // Nothing precedes the keep-tail; there's no head left to summarize.
            return Ok(());
        }

        let head = &history[..keep_from];
        let tail = history[keep_from..].to_vec();

        let transcript = head
            .iter()
            .map(|m| format!("{}: {}", role_label(m.role), m.text()))
            .collect::<Vec<_>>()
            .join("\n");

        let instruction = CanonicalMessage::user(format!(
            "Summarize the following conversation so far in under {} tokens. Preserve facts, decisions, and open questions; omit pleasantries.\n\n{transcript}",
            config.compaction_max_summary_tokens
        ));

        let options = canonical::ChatOptions {
            model: config.compaction_model.clone(),
            max_output_tokens: Some(config.compaction_max_summary_tokens),
            ..Default::default()
        };

        let (mut summary, _usage) =
            compaction_adapter.chat_once(std::slice::from_ref(&instruction), &options).await.map_err(|e| {
                GatewayError::UpstreamUnavailable(format!("compaction pass failed: {e}"))
            })?;

        truncate_to_token_cap(&mut summary, config.compaction_max_summary_tokens as usize);

        let mut compacted = Vec::with_capacity(tail.len() + 1);
        compacted.push(CanonicalMessage::system(format!("Summary of earlier conversation:\n{summary}")));
        compacted.extend(tail);

        *history = compacted;
        Ok(())
    }
}

fn role_label(role: CanonicalRole) -> &'static str {
    match role {
        CanonicalRole::System => "system",
        CanonicalRole::User => "user",
        CanonicalRole::Assistant => "assistant",
        CanonicalRole::Tool => "tool",
    }
}

/// Finds the index at which the "keep verbatim" tail begins: walks back
/// `keep_tail_turns` user-message boundaries, then walks further back if
/// needed so the boundary never falls between a tool call and its result.
fn keep_tail_boundary(history: &[CanonicalMessage], keep_tail_turns: usize) -> usize {
    let mut turn_starts: Vec<usize> = history
        .iter()
        .enumerate()
        .filter(|(_, m)| m.role == CanonicalRole::User)
        .map(|(i, _)| i)
        .collect();

    if turn_starts.len() <= keep_tail_turns {
        return 0;
    }

    let mut boundary = turn_starts[turn_starts.len() - keep_tail_turns];

    // Never split a tool-role message away from the assistant turn that
    // requested it: if the message right before `boundary` is a tool result
    // answering a call from further back, pull the boundary back to the
    // assistant turn that issued it.
    while boundary > 0 && history[boundary.saturating_sub(1)].role == CanonicalRole::Tool {
        boundary -= 1;
    }

    turn_starts.retain(|&i| i < boundary);
    boundary
}

fn truncate_to_token_cap(text: &mut String, cap: usize) {
    let tokens = encoder().encode_ordinary(text);
    if tokens.len() <= cap {
        return;
    }

    let truncated = encoder().decode(tokens[..cap].to_vec()).unwrap_or_default();
    *text = format!("{truncated}\n\n[... truncated, original message exceeded the per-message token cap]");
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;
    use canonical::{ChatOptions, FinishReason, ProviderEvent, ToolDefinition, Usage};
    use futures::stream::BoxStream;

    use super::*;

    struct StubCompactionAdapter;

    #[async_trait]
    impl ProviderAdapter for StubCompactionAdapter {
        fn name(&self) -> &'static str {
            "stub"
        }

        async fn chat(
            &self,
            _messages: &[CanonicalMessage],
            _tools: &[ToolDefinition],
            _options: &ChatOptions,
        ) -> Result<BoxStream<'static, Result<ProviderEvent, GatewayError>>, GatewayError> {
            unimplemented!("shaper tests only exercise chat_once")
        }

        async fn chat_once(&self, _messages: &[CanonicalMessage], _options: &ChatOptions) -> Result<(String, Usage), GatewayError> {
            Ok(("the user asked about Rust gateways".to_owned(), Usage { input_tokens: 50, output_tokens: 10, cached_input_tokens: None }))
        }
    }

    fn config() -> GatewayConfig {
        GatewayConfig { compaction_token_threshold: 30, compaction_keep_tail_turns: 1, compaction_max_summary_tokens: 50, ..GatewayConfig::default() }
    }

    #[tokio::test]
    async fn trimming_caps_a_user_message_and_marks_it_truncated() {
        let shaper = ConversationShaper::new(None);
        let long_text = "word ".repeat(500);
        let mut history = vec![CanonicalMessage::user(long_text)];

        shaper.trim_messages(&mut history, 1, &GatewayConfig { max_user_message_tokens: 20, ..GatewayConfig::default() });

        assert!(history[0].text().contains("truncated"));
        assert!(count_message_tokens(&history[0]) < 500);
    }

    #[tokio::test]
    async fn trimming_cap_shrinks_as_attached_files_grow() {
        let shaper = ConversationShaper::new(None);
        let text = "word ".repeat(200);
        let config = GatewayConfig { max_user_message_tokens: 100, ..GatewayConfig::default() };

        let mut one_file = vec![CanonicalMessage::user(text.clone())];
        shaper.trim_messages(&mut one_file, 1, &config);

        let mut four_files = vec![CanonicalMessage::user(text)];
        shaper.trim_messages(&mut four_files, 4, &config);

        assert!(count_message_tokens(&four_files[0]) < count_message_tokens(&one_file[0]));
    }

    #[tokio::test]
    async fn memory_injection_prepends_a_bullet_list_to_the_system_message() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(MemoryStore::new(dir.path().join("memory.db"), 2000).unwrap());
        store.create("user-1", "prefers concise answers").await.unwrap();

        let shaper = ConversationShaper::new(Some(store));
        let mut history = vec![CanonicalMessage::system("be helpful"), CanonicalMessage::user("hi")];

        shaper.inject_memory("user-1", &mut history).await.unwrap();

        assert_eq!(history.len(), 2);
        assert!(history[0].text().contains("prefers concise answers"));
    }

    #[tokio::test]
    async fn memory_injection_without_a_system_message_inserts_one() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(MemoryStore::new(dir.path().join("memory.db"), 2000).unwrap());
        store.create("user-1", "likes cats").await.unwrap();

        let shaper = ConversationShaper::new(Some(store));
        let mut history = vec![CanonicalMessage::user("hi")];

        shaper.inject_memory("user-1", &mut history).await.unwrap();

        assert_eq!(history.len(), 2);
        assert_eq!(history[0].role, CanonicalRole::System);
        assert!(history[0].text().contains("likes cats"));
    }

    #[tokio::test]
    async fn compaction_below_threshold_is_a_no_op() {
        let shaper = ConversationShaper::new(None);
        let mut history = vec![CanonicalMessage::system("be helpful"), CanonicalMessage::user("hi")];
        let original_len = history.len();

        shaper.compact_if_needed(&mut history, &config(), &StubCompactionAdapter).await.unwrap();

        assert_eq!(history.len(), original_len);
    }

    #[tokio::test]
    async fn compaction_keeps_the_most_recent_turn_verbatim() {
        let shaper = ConversationShaper::new(None);
        let filler = "background detail ".repeat(20);

        let mut history = vec![CanonicalMessage::system("be helpful")];
        for i in 0..5 {
            history.push(CanonicalMessage::user(format!("{filler} turn {i}")));
            history.push(CanonicalMessage::assistant_text(format!("{filler} reply {i}")));
        }
        history.push(CanonicalMessage::user("what's my name?"));

        shaper.compact_if_needed(&mut history, &config(), &StubCompactionAdapter).await.unwrap();

        assert_eq!(history[0].role, CanonicalRole::System);
        assert!(history[0].text().contains("Summary of earlier conversation"));
        assert_eq!(history.last().unwrap().text(), "what's my name?");
    }

    #[tokio::test]
    async fn compaction_is_idempotent() {
        let shaper = ConversationShaper::new(None);
        let filler = "background detail ".repeat(20);

        let mut history = vec![CanonicalMessage::system("be helpful")];
        for i in 0..5 {
            history.push(CanonicalMessage::user(format!("{filler} turn {i}")));
            history.push(CanonicalMessage::assistant_text(format!("{filler} reply {i}")));
        }

        shaper.compact_if_needed(&mut history, &config(), &StubCompactionAdapter).await.unwrap();
        let once = history.clone();

        shaper.compact_if_needed(&mut history, &config(), &StubCompactionAdapter).await.unwrap();

        assert_eq!(once.len(), history.len());
        assert_eq!(once.last().unwrap().text(), history.last().unwrap().text());
    }
}
