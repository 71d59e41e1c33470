//! Context-overflow recovery.
//!
//! Two stages, in order, each attempted at most once per iteration:
//!
//! 1. **Compaction** — summarise everything but the most recent messages
//!    through the provider and replace the old history with a single
//!    summary message.
//! 2. **Tool-result truncation** — clip oversized tool-result text parts to
//!    a fixed character cap.
//!
//! The guard never talks to a provider module directly; the run loop hands
//! it a summarisation closure, which keeps the conversion/overflow/loop
//! dependency graph acyclic.

use std::future::Future;

use chrono::Utc;
use tracing::{debug, warn};

use myclaw_core::error::ProviderError;
use myclaw_core::message::{ChatMessage, ToolResultPart, UserContent, UserMessage};

/// Messages preserved verbatim at the tail during compaction.
pub const DEFAULT_KEEP_RECENT: usize = 10;
/// Character cap applied to tool-result parts during truncation.
pub const DEFAULT_TOOL_RESULT_CAP: usize = 20_000;
/// Marker prefixed to the compacted history message.
pub const SUMMARY_MARKER: &str = "[Conversation summary]";

/// Tool-result text is clamped to this many characters when rendered into
/// the summarisation prompt.
const SUMMARY_RENDER_CLAMP: usize = 500;

const SUMMARY_DIRECTIVE: &str = "Summarize the conversation below concisely. \
Preserve key facts, decisions, open tasks, and anything the user asked to \
remember. Reply with the summary only.";

/// Tunables for the overflow guard.
#[derive(Debug, Clone)]
pub struct OverflowConfig {
    pub keep_recent: usize,
    pub tool_result_cap: usize,
}

impl Default for OverflowConfig {
    fn default() -> Self {
        Self {
            keep_recent: DEFAULT_KEEP_RECENT,
            tool_result_cap: DEFAULT_TOOL_RESULT_CAP,
        }
    }
}

/// What a recovery attempt did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecoveryOutcome {
    /// History was compacted from `old_count` to `new_count` messages.
    Compacted { old_count: usize, new_count: usize },
    /// `affected` oversized tool-result parts were clipped.
    Truncated { affected: usize },
    /// Both stages have run; nothing left to try.
    Exhausted,
}

/// Per-iteration overflow recovery state.
pub struct OverflowGuard {
    config: OverflowConfig,
    compaction_attempted: bool,
    truncation_attempted: bool,
}

impl OverflowGuard {
    pub fn new(config: OverflowConfig) -> Self {
        Self {
            config,
            compaction_attempted: false,
            truncation_attempted: false,
        }
    }

    /// Re-arm both stages. Called after tool results change the message
    /// list, since a later iteration may overflow again.
    pub fn reset(&mut self) {
        self.compaction_attempted = false;
        self.truncation_attempted = false;
    }

    /// Run the next unattempted stage that mutates the list.
    ///
    /// `summarize` performs the provider call for compaction; a failed
    /// summarisation falls through to truncation rather than aborting the
    /// turn.
    pub async fn recover<F, Fut>(
        &mut self,
        messages: &mut Vec<ChatMessage>,
        summarize: F,
    ) -> RecoveryOutcome
    where
        F: FnOnce(String) -> Fut,
        Fut: Future<Output = Result<String, ProviderError>>,
    {
        if !self.compaction_attempted {
            self.compaction_attempted = true;
            if messages.len() > self.config.keep_recent {
                let old_count = messages.len();
                let split = old_count - self.config.keep_recent;
                let prompt = render_summary_prompt(&messages[..split]);

                match summarize(prompt).await {
                    Ok(summary) => {
                        let mut compacted = Vec::with_capacity(self.config.keep_recent + 1);
                        compacted.push(ChatMessage::User(UserMessage {
                            content: UserContent::Text(format!("{SUMMARY_MARKER}\n{summary}")),
                            timestamp: Utc::now(),
                        }));
                        compacted.extend(messages.drain(split..));
                        *messages = compacted;

                        let new_count = messages.len();
                        debug!(old_count, new_count, "Compacted conversation history");
                        return RecoveryOutcome::Compacted {
                            old_count,
                            new_count,
                        };
                    }
                    Err(e) => {
                        warn!(error = %e, "Summarisation failed, falling back to truncation");
                    }
                }
            }
        }

        if !self.truncation_attempted {
            self.truncation_attempted = true;
            let affected = truncate_tool_results(messages, self.config.tool_result_cap);
            if affected > 0 {
                debug!(affected, cap = self.config.tool_result_cap, "Truncated tool results");
                return RecoveryOutcome::Truncated { affected };
            }
        }

        RecoveryOutcome::Exhausted
    }
}

/// Render old history into the summarisation prompt.
fn render_summary_prompt(old: &[ChatMessage]) -> String {
    let mut lines = Vec::with_capacity(old.len() + 1);
    lines.push(SUMMARY_DIRECTIVE.to_string());
    for message in old {
        match message {
            ChatMessage::User(m) => lines.push(format!("User: {}", m.content.text())),
            ChatMessage::Assistant(m) => lines.push(format!("Assistant: {}", m.text())),
            ChatMessage::ToolResult(m) => {
                let text = m.text();
                let clamped: String = text.chars().take(SUMMARY_RENDER_CLAMP).collect();
                lines.push(format!("Tool ({}): {}", m.tool_name, clamped));
            }
        }
    }
    lines.join("\n")
}

/// Clip oversized tool-result text parts in place. Returns how many parts
/// were clipped; untouched parts keep their existing allocation.
pub fn truncate_tool_results(messages: &mut [ChatMessage], cap: usize) -> usize {
    let mut affected = 0;
    for message in messages.iter_mut() {
        let ChatMessage::ToolResult(result) = message else {
            continue;
        };
        for part in result.content.iter_mut() {
            let ToolResultPart::Text { text } = part;
            if let Some(clipped) = clip_with_marker(text, cap) {
                *text = clipped;
                affected += 1;
            }
        }
    }
    affected
}

/// Clip `text` to `cap` characters plus a truncation marker. Returns `None`
/// when the text already fits.
pub fn clip_with_marker(text: &str, cap: usize) -> Option<String> {
    let total = text.chars().count();
    if total <= cap {
        return None;
    }
    let omitted = total - cap;
    let prefix: String = text.chars().take(cap).collect();
    Some(format!("{prefix}\n[truncated {omitted} chars]"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use myclaw_core::message::{
        AssistantMessage, ContentBlock, StopReason, ToolResultMessage, Usage,
    };

    fn text_assistant(text: &str) -> ChatMessage {
        ChatMessage::Assistant(AssistantMessage {
            content: vec![ContentBlock::Text { text: text.into() }],
            provider: "test".into(),
            model: "m".into(),
            usage: Usage::default(),
            stop_reason: StopReason::EndTurn,
            timestamp: Utc::now(),
        })
    }

    fn tool_result(text: &str) -> ChatMessage {
        ChatMessage::ToolResult(ToolResultMessage {
            tool_call_id: "tc".into(),
            tool_name: "shell".into(),
            content: vec![ToolResultPart::Text { text: text.into() }],
            is_error: false,
            timestamp: Utc::now(),
        })
    }

    fn history(n: usize) -> Vec<ChatMessage> {
        (0..n)
            .flat_map(|i| {
                vec![
                    ChatMessage::user(format!("question {i}")),
                    text_assistant(&format!("answer {i}")),
                ]
            })
            .collect()
    }

    #[tokio::test]
    async fn compaction_replaces_old_history() {
        let mut guard = OverflowGuard::new(OverflowConfig {
            keep_recent: 4,
            tool_result_cap: 100,
        });
        let mut messages = history(6); // 12 messages

        let outcome = guard
            .recover(&mut messages, |prompt| async move {
                assert!(prompt.starts_with(SUMMARY_DIRECTIVE));
                assert!(prompt.contains("User: question 0"));
                assert!(prompt.contains("Assistant: answer 3"));
                // The kept tail is not rendered into the prompt.
                assert!(!prompt.contains("question 4"));
                Ok("they talked".to_string())
            })
            .await;

        assert_eq!(
            outcome,
            RecoveryOutcome::Compacted {
                old_count: 12,
                new_count: 5
            }
        );
        assert_eq!(messages.len(), 5);

        let ChatMessage::User(summary) = &messages[0] else {
            panic!("expected summary message");
        };
        let text = summary.content.text();
        assert!(text.starts_with(SUMMARY_MARKER));
        assert!(text.contains("they talked"));

        // The recent window survives untouched.
        let ChatMessage::User(kept) = &messages[1] else {
            panic!("expected kept user message");
        };
        assert_eq!(kept.content.text(), "question 4");
    }

    #[tokio::test]
    async fn short_history_falls_through_to_truncation() {
        let mut guard = OverflowGuard::new(OverflowConfig {
            keep_recent: 10,
            tool_result_cap: 5,
        });
        let mut messages = vec![ChatMessage::user("hi"), tool_result("0123456789")];

        let outcome = guard
            .recover(&mut messages, |_| async move {
                panic!("summarise must not run for short histories")
            })
            .await;

        assert_eq!(outcome, RecoveryOutcome::Truncated { affected: 1 });
        let ChatMessage::ToolResult(result) = &messages[1] else {
            panic!("expected tool result");
        };
        assert_eq!(result.text(), "01234\n[truncated 5 chars]");
    }

    #[tokio::test]
    async fn both_stages_spent_means_exhausted() {
        let mut guard = OverflowGuard::new(OverflowConfig {
            keep_recent: 2,
            tool_result_cap: 1_000,
        });
        let mut messages = history(4);

        let first = guard
            .recover(&mut messages, |_| async move { Ok("s".to_string()) })
            .await;
        assert!(matches!(first, RecoveryOutcome::Compacted { .. }));

        // No oversized tool results, so truncation mutates nothing.
        let second = guard
            .recover(&mut messages, |_| async move { Ok("s".to_string()) })
            .await;
        assert_eq!(second, RecoveryOutcome::Exhausted);

        guard.reset();
        let third = guard
            .recover(&mut messages, |_| async move { Ok("again".to_string()) })
            .await;
        assert!(matches!(third, RecoveryOutcome::Compacted { .. }));
    }

    #[tokio::test]
    async fn failed_summarisation_falls_through() {
        let mut guard = OverflowGuard::new(OverflowConfig {
            keep_recent: 2,
            tool_result_cap: 4,
        });
        let mut messages = history(3);
        messages.push(tool_result("long tool output"));

        let outcome = guard
            .recover(&mut messages, |_| async move {
                Err(ProviderError::Network("down".into()))
            })
            .await;

        assert_eq!(outcome, RecoveryOutcome::Truncated { affected: 1 });
    }

    #[test]
    fn clip_with_marker_reports_omitted_count() {
        assert_eq!(clip_with_marker("short", 10), None);
        let clipped = clip_with_marker(&"x".repeat(25), 10).unwrap();
        assert_eq!(clipped, format!("{}\n[truncated 15 chars]", "x".repeat(10)));
    }

    #[test]
    fn truncate_leaves_small_parts_alone() {
        let mut messages = vec![tool_result("ok"), tool_result(&"y".repeat(30))];
        let affected = truncate_tool_results(&mut messages, 10);
        assert_eq!(affected, 1);
        let ChatMessage::ToolResult(untouched) = &messages[0] else {
            panic!();
        };
        assert_eq!(untouched.text(), "ok");
    }
}
