//! Message domain types.
//!
//! These are the value objects that flow through the engine: the caller's
//! text becomes a `UserMessage`, the provider answers with an
//! `AssistantMessage` made of content blocks, and executed tools answer tool
//! calls with `ToolResultMessage`s. System prompts are NOT messages — they
//! travel alongside the message list in the provider call context.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A message in the in-memory conversation, tagged by author.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "role", rename_all = "snake_case")]
pub enum ChatMessage {
    User(UserMessage),
    Assistant(AssistantMessage),
    ToolResult(ToolResultMessage),
}

impl ChatMessage {
    /// Shorthand for a plain-text user message stamped now.
    pub fn user(text: impl Into<String>) -> Self {
        Self::User(UserMessage {
            content: UserContent::Text(text.into()),
            timestamp: Utc::now(),
        })
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        match self {
            Self::User(m) => m.timestamp,
            Self::Assistant(m) => m.timestamp,
            Self::ToolResult(m) => m.timestamp,
        }
    }

    pub fn as_assistant(&self) -> Option<&AssistantMessage> {
        match self {
            Self::Assistant(m) => Some(m),
            _ => None,
        }
    }
}

/// A message from the end user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserMessage {
    pub content: UserContent,
    pub timestamp: DateTime<Utc>,
}

/// User content is either plain text or a sequence of parts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum UserContent {
    Text(String),
    Parts(Vec<UserPart>),
}

impl UserContent {
    /// The textual rendering of this content; image parts are elided.
    pub fn text(&self) -> String {
        match self {
            Self::Text(t) => t.clone(),
            Self::Parts(parts) => parts
                .iter()
                .filter_map(|p| match p {
                    UserPart::Text { text } => Some(text.as_str()),
                    UserPart::Image { .. } => None,
                })
                .collect::<Vec<_>>()
                .join("\n"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum UserPart {
    Text { text: String },
    Image { source: String, media_type: String },
}

/// A message produced by the model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssistantMessage {
    /// Ordered content blocks exactly as the provider produced them.
    pub content: Vec<ContentBlock>,
    pub provider: String,
    pub model: String,
    pub usage: Usage,
    pub stop_reason: StopReason,
    pub timestamp: DateTime<Utc>,
}

impl AssistantMessage {
    /// Concatenated text blocks. Thinking blocks are hidden from end-user
    /// output and are not included.
    pub fn text(&self) -> String {
        self.content
            .iter()
            .filter_map(|b| match b {
                ContentBlock::Text { text } => Some(text.as_str()),
                _ => None,
            })
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// The tool calls requested in this message, in content order.
    pub fn tool_calls(&self) -> Vec<&ToolCallBlock> {
        self.content
            .iter()
            .filter_map(|b| match b {
                ContentBlock::ToolCall(call) => Some(call),
                _ => None,
            })
            .collect()
    }
}

/// One block of assistant content.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentBlock {
    Text { text: String },
    /// Model reasoning, hidden from end-user output.
    Thinking { text: String },
    ToolCall(ToolCallBlock),
}

/// A tool invocation requested by the model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCallBlock {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub args: serde_json::Map<String, serde_json::Value>,
}

/// The answer to a single tool call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolResultMessage {
    /// The tool-call identifier this result answers.
    pub tool_call_id: String,
    pub tool_name: String,
    pub content: Vec<ToolResultPart>,
    pub is_error: bool,
    pub timestamp: DateTime<Utc>,
}

impl ToolResultMessage {
    pub fn text(&self) -> String {
        self.content
            .iter()
            .map(|p| match p {
                ToolResultPart::Text { text } => text.as_str(),
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ToolResultPart {
    Text { text: String },
}

/// Why the model stopped generating.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    #[default]
    EndTurn,
    ToolUse,
    MaxTokens,
    Other,
}

/// Token usage for one provider call, with a parallel cost record.
///
/// Providers report cache counters cumulatively per request, so
/// `accumulate` sums input/output/total but REPLACES the cache fields with
/// the latest call's values.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Usage {
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub cache_read_tokens: u64,
    pub cache_write_tokens: u64,
    pub total_tokens: u64,
    #[serde(default)]
    pub cost: UsageCost,
}

/// Dollar cost mirroring the token counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct UsageCost {
    pub input: f64,
    pub output: f64,
    pub cache_read: f64,
    pub cache_write: f64,
    pub total: f64,
}

impl Usage {
    /// Fold another call's usage into this one.
    pub fn accumulate(&mut self, other: &Usage) {
        self.input_tokens += other.input_tokens;
        self.output_tokens += other.output_tokens;
        self.total_tokens += other.total_tokens;
        self.cache_read_tokens = other.cache_read_tokens;
        self.cache_write_tokens = other.cache_write_tokens;

        self.cost.input += other.cost.input;
        self.cost.output += other.cost.output;
        self.cost.total += other.cost.total;
        self.cost.cache_read = other.cost.cache_read;
        self.cost.cache_write = other.cost.cache_write;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assistant(blocks: Vec<ContentBlock>) -> AssistantMessage {
        AssistantMessage {
            content: blocks,
            provider: "test".into(),
            model: "test-model".into(),
            usage: Usage::default(),
            stop_reason: StopReason::EndTurn,
            timestamp: Utc::now(),
        }
    }

    #[test]
    fn assistant_text_skips_thinking_and_tool_calls() {
        let msg = assistant(vec![
            ContentBlock::Thinking {
                text: "pondering".into(),
            },
            ContentBlock::Text {
                text: "Hello".into(),
            },
            ContentBlock::ToolCall(ToolCallBlock {
                id: "tc1".into(),
                name: "shell".into(),
                args: serde_json::Map::new(),
            }),
            ContentBlock::Text {
                text: "world".into(),
            },
        ]);
        assert_eq!(msg.text(), "Hello\nworld");
        assert_eq!(msg.tool_calls().len(), 1);
        assert_eq!(msg.tool_calls()[0].id, "tc1");
    }

    #[test]
    fn user_content_text_joins_parts() {
        let content = UserContent::Parts(vec![
            UserPart::Text { text: "a".into() },
            UserPart::Image {
                source: "photo.png".into(),
                media_type: "image/png".into(),
            },
            UserPart::Text { text: "b".into() },
        ]);
        assert_eq!(content.text(), "a\nb");
    }

    #[test]
    fn usage_accumulate_sums_and_replaces() {
        let mut total = Usage {
            input_tokens: 100,
            output_tokens: 50,
            cache_read_tokens: 10,
            cache_write_tokens: 5,
            total_tokens: 150,
            cost: UsageCost {
                input: 0.1,
                output: 0.2,
                cache_read: 0.01,
                cache_write: 0.02,
                total: 0.3,
            },
        };
        let next = Usage {
            input_tokens: 200,
            output_tokens: 100,
            cache_read_tokens: 40,
            cache_write_tokens: 20,
            total_tokens: 300,
            cost: UsageCost {
                input: 0.2,
                output: 0.4,
                cache_read: 0.04,
                cache_write: 0.08,
                total: 0.6,
            },
        };
        total.accumulate(&next);

        assert_eq!(total.input_tokens, 300);
        assert_eq!(total.output_tokens, 150);
        assert_eq!(total.total_tokens, 450);
        // Cache counters are per-request snapshots, not increments.
        assert_eq!(total.cache_read_tokens, 40);
        assert_eq!(total.cache_write_tokens, 20);
        assert!((total.cost.total - 0.9).abs() < 1e-9);
        assert!((total.cost.cache_read - 0.04).abs() < 1e-9);
    }

    #[test]
    fn content_block_serialization_roundtrip() {
        let blocks = vec![
            ContentBlock::Text { text: "hi".into() },
            ContentBlock::ToolCall(ToolCallBlock {
                id: "tc1".into(),
                name: "file_read".into(),
                args: serde_json::json!({"path": "a.txt"})
                    .as_object()
                    .cloned()
                    .unwrap(),
            }),
        ];
        let json = serde_json::to_string(&blocks).unwrap();
        assert!(json.contains(r#""type":"tool_call""#));
        let back: Vec<ContentBlock> = serde_json::from_str(&json).unwrap();
        assert_eq!(back, blocks);
    }
}
