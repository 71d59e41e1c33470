//! Transcript ↔ message conversion and orphan repair.
//!
//! The persisted transcript is a flat record per line; the in-memory form is
//! the tagged `ChatMessage`. Assistant content blocks round-trip verbatim
//! through the record's `meta.contentBlocks`, so nothing the provider
//! produced is lost across a restart.
//!
//! Orphan repair closes the gap left by interrupted runs: an assistant
//! message whose tool call was never answered would make the next provider
//! call invalid, so a synthetic error result is injected in its place.

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use tracing::warn;

use myclaw_core::message::{
    AssistantMessage, ChatMessage, ContentBlock, StopReason, ToolResultMessage, ToolResultPart,
    Usage, UserContent, UserMessage, UserPart,
};
use myclaw_store::transcript::{TranscriptMessage, TranscriptRole};

/// Text of the synthetic result injected for an unanswered tool call.
pub const ORPHAN_RESULT_TEXT: &str = "[Tool result missing — session was interrupted]";

const META_CONTENT_BLOCKS: &str = "contentBlocks";
const META_CONTENT_PARTS: &str = "contentParts";
const META_PROVIDER: &str = "provider";
const META_MODEL: &str = "model";
const META_USAGE: &str = "usage";
const META_STOP_REASON: &str = "stopReason";
const META_TOOL_NAME: &str = "toolName";
const META_IS_ERROR: &str = "isError";

/// Map persisted records to in-memory messages.
///
/// System records are discarded — system prompts are composed per turn, not
/// replayed from the log.
pub fn transcript_to_messages(records: &[TranscriptMessage]) -> Vec<ChatMessage> {
    let mut messages = Vec::with_capacity(records.len());
    for record in records {
        let timestamp = from_millis(record.ts);
        match record.role {
            TranscriptRole::System => {}
            TranscriptRole::User => {
                let content = record
                    .meta
                    .as_ref()
                    .and_then(|m| m.get(META_CONTENT_PARTS))
                    .and_then(|v| serde_json::from_value::<Vec<UserPart>>(v.clone()).ok())
                    .map(UserContent::Parts)
                    .unwrap_or_else(|| UserContent::Text(record.content.clone()));
                messages.push(ChatMessage::User(UserMessage { content, timestamp }));
            }
            TranscriptRole::Assistant => {
                let meta = record.meta.as_ref();
                let content = meta
                    .and_then(|m| m.get(META_CONTENT_BLOCKS))
                    .and_then(|v| serde_json::from_value::<Vec<ContentBlock>>(v.clone()).ok())
                    .unwrap_or_else(|| {
                        vec![ContentBlock::Text {
                            text: record.content.clone(),
                        }]
                    });
                let provider = meta
                    .and_then(|m| m.get(META_PROVIDER))
                    .and_then(|v| v.as_str())
                    .unwrap_or("unknown")
                    .to_string();
                let model = meta
                    .and_then(|m| m.get(META_MODEL))
                    .and_then(|v| v.as_str())
                    .unwrap_or("unknown")
                    .to_string();
                let usage = meta
                    .and_then(|m| m.get(META_USAGE))
                    .and_then(|v| serde_json::from_value::<Usage>(v.clone()).ok())
                    .unwrap_or_default();
                let stop_reason = meta
                    .and_then(|m| m.get(META_STOP_REASON))
                    .and_then(|v| serde_json::from_value::<StopReason>(v.clone()).ok())
                    .unwrap_or_default();
                messages.push(ChatMessage::Assistant(AssistantMessage {
                    content,
                    provider,
                    model,
                    usage,
                    stop_reason,
                    timestamp,
                }));
            }
            TranscriptRole::Tool => {
                let Some(tool_call_id) = record.tool_call_id.clone() else {
                    warn!("Tool record without toolCallId, skipping");
                    continue;
                };
                let meta = record.meta.as_ref();
                let tool_name = meta
                    .and_then(|m| m.get(META_TOOL_NAME))
                    .and_then(|v| v.as_str())
                    .unwrap_or_default()
                    .to_string();
                let is_error = meta
                    .and_then(|m| m.get(META_IS_ERROR))
                    .and_then(|v| v.as_bool())
                    .unwrap_or(false);
                messages.push(ChatMessage::ToolResult(ToolResultMessage {
                    tool_call_id,
                    tool_name,
                    content: vec![ToolResultPart::Text {
                        text: record.content.clone(),
                    }],
                    is_error,
                    timestamp,
                }));
            }
        }
    }
    messages
}

/// The inverse of [`transcript_to_messages`].
pub fn messages_to_transcript(messages: &[ChatMessage]) -> Vec<TranscriptMessage> {
    messages
        .iter()
        .map(|message| match message {
            ChatMessage::User(m) => {
                let meta = match &m.content {
                    UserContent::Parts(parts) => {
                        let mut map = serde_json::Map::new();
                        if let Ok(value) = serde_json::to_value(parts) {
                            map.insert(META_CONTENT_PARTS.into(), value);
                        }
                        Some(map)
                    }
                    UserContent::Text(_) => None,
                };
                TranscriptMessage {
                    role: TranscriptRole::User,
                    content: m.content.text(),
                    ts: m.timestamp.timestamp_millis(),
                    tool_call_id: None,
                    meta,
                }
            }
            ChatMessage::Assistant(m) => {
                let mut meta = serde_json::Map::new();
                if let Ok(blocks) = serde_json::to_value(&m.content) {
                    meta.insert(META_CONTENT_BLOCKS.into(), blocks);
                }
                meta.insert(META_PROVIDER.into(), m.provider.clone().into());
                meta.insert(META_MODEL.into(), m.model.clone().into());
                if let Ok(usage) = serde_json::to_value(&m.usage) {
                    meta.insert(META_USAGE.into(), usage);
                }
                if let Ok(stop) = serde_json::to_value(m.stop_reason) {
                    meta.insert(META_STOP_REASON.into(), stop);
                }
                TranscriptMessage {
                    role: TranscriptRole::Assistant,
                    content: m.text(),
                    ts: m.timestamp.timestamp_millis(),
                    tool_call_id: None,
                    meta: Some(meta),
                }
            }
            ChatMessage::ToolResult(m) => {
                let mut meta = serde_json::Map::new();
                meta.insert(META_TOOL_NAME.into(), m.tool_name.clone().into());
                meta.insert(META_IS_ERROR.into(), m.is_error.into());
                TranscriptMessage {
                    role: TranscriptRole::Tool,
                    content: m.text(),
                    ts: m.timestamp.timestamp_millis(),
                    tool_call_id: Some(m.tool_call_id.clone()),
                    meta: Some(meta),
                }
            }
        })
        .collect()
}

/// Inject synthetic error results for tool calls that were never answered.
///
/// For each assistant message, the window up to the next assistant message
/// (or the end of the list) must answer every tool call it contains. Missing
/// answers are injected immediately after the assistant message, stamped
/// with its timestamp. Repairing an already-repaired list is a no-op.
pub fn repair_orphaned_tool_calls(messages: &[ChatMessage]) -> Vec<ChatMessage> {
    let mut out = Vec::with_capacity(messages.len());

    for (i, message) in messages.iter().enumerate() {
        out.push(message.clone());

        let ChatMessage::Assistant(assistant) = message else {
            continue;
        };
        let calls = assistant.tool_calls();
        if calls.is_empty() {
            continue;
        }

        let mut answered: HashSet<&str> = HashSet::new();
        for later in &messages[i + 1..] {
            match later {
                ChatMessage::Assistant(_) => break,
                ChatMessage::ToolResult(result) => {
                    answered.insert(result.tool_call_id.as_str());
                }
                ChatMessage::User(_) => {}
            }
        }

        for call in calls {
            if !answered.contains(call.id.as_str()) {
                warn!(tool_call_id = %call.id, tool = %call.name, "Repairing orphaned tool call");
                out.push(ChatMessage::ToolResult(ToolResultMessage {
                    tool_call_id: call.id.clone(),
                    tool_name: call.name.clone(),
                    content: vec![ToolResultPart::Text {
                        text: ORPHAN_RESULT_TEXT.into(),
                    }],
                    is_error: true,
                    timestamp: assistant.timestamp,
                }));
            }
        }
    }

    out
}

fn from_millis(ts: i64) -> DateTime<Utc> {
    DateTime::<Utc>::from_timestamp_millis(ts).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use myclaw_core::message::ToolCallBlock;

    fn ts(millis: i64) -> DateTime<Utc> {
        DateTime::<Utc>::from_timestamp_millis(millis).unwrap()
    }

    fn assistant_with(blocks: Vec<ContentBlock>, at: i64) -> AssistantMessage {
        AssistantMessage {
            content: blocks,
            provider: "openrouter".into(),
            model: "m1".into(),
            usage: Usage {
                input_tokens: 10,
                output_tokens: 5,
                total_tokens: 15,
                ..Default::default()
            },
            stop_reason: StopReason::ToolUse,
            timestamp: ts(at),
        }
    }

    fn tool_call(id: &str, name: &str) -> ContentBlock {
        ContentBlock::ToolCall(ToolCallBlock {
            id: id.into(),
            name: name.into(),
            args: serde_json::Map::new(),
        })
    }

    #[test]
    fn roundtrip_preserves_structure() {
        let original = vec![
            ChatMessage::User(UserMessage {
                content: UserContent::Text("go".into()),
                timestamp: ts(1),
            }),
            ChatMessage::Assistant(assistant_with(
                vec![
                    ContentBlock::Thinking {
                        text: "plan".into(),
                    },
                    ContentBlock::Text { text: "ok".into() },
                    tool_call("tc1", "shell"),
                ],
                2,
            )),
            ChatMessage::ToolResult(ToolResultMessage {
                tool_call_id: "tc1".into(),
                tool_name: "shell".into(),
                content: vec![ToolResultPart::Text { text: "done".into() }],
                is_error: false,
                timestamp: ts(3),
            }),
        ];

        let records = messages_to_transcript(&original);
        let back = transcript_to_messages(&records);
        assert_eq!(back, original);
    }

    #[test]
    fn user_parts_roundtrip_through_meta() {
        let original = vec![ChatMessage::User(UserMessage {
            content: UserContent::Parts(vec![
                UserPart::Text { text: "see".into() },
                UserPart::Image {
                    source: "cat.png".into(),
                    media_type: "image/png".into(),
                },
            ]),
            timestamp: ts(5),
        })];

        let records = messages_to_transcript(&original);
        assert!(records[0].meta.is_some());
        let back = transcript_to_messages(&records);
        assert_eq!(back, original);
    }

    #[test]
    fn system_records_are_discarded() {
        let records = vec![TranscriptMessage {
            role: TranscriptRole::System,
            content: "old prompt".into(),
            ts: 1,
            tool_call_id: None,
            meta: None,
        }];
        assert!(transcript_to_messages(&records).is_empty());
    }

    #[test]
    fn assistant_without_meta_reconstructs_single_text_block() {
        let records = vec![TranscriptMessage {
            role: TranscriptRole::Assistant,
            content: "hello".into(),
            ts: 7,
            tool_call_id: None,
            meta: None,
        }];
        let messages = transcript_to_messages(&records);
        let ChatMessage::Assistant(m) = &messages[0] else {
            panic!("expected assistant");
        };
        assert_eq!(
            m.content,
            vec![ContentBlock::Text {
                text: "hello".into()
            }]
        );
        assert_eq!(m.provider, "unknown");
        assert_eq!(m.usage, Usage::default());
        assert_eq!(m.stop_reason, StopReason::EndTurn);
    }

    #[test]
    fn repair_injects_missing_result_after_assistant() {
        let messages = vec![
            ChatMessage::user("go"),
            ChatMessage::Assistant(assistant_with(vec![tool_call("tc1", "apply_patch")], 2)),
            ChatMessage::Assistant(assistant_with(
                vec![ContentBlock::Text {
                    text: "next turn".into(),
                }],
                3,
            )),
        ];

        let repaired = repair_orphaned_tool_calls(&messages);
        assert_eq!(repaired.len(), 4);

        let ChatMessage::ToolResult(injected) = &repaired[2] else {
            panic!("expected injected tool result");
        };
        assert_eq!(injected.tool_call_id, "tc1");
        assert_eq!(injected.tool_name, "apply_patch");
        assert!(injected.is_error);
        assert_eq!(injected.text(), ORPHAN_RESULT_TEXT);
        assert_eq!(injected.timestamp, ts(2));
    }

    #[test]
    fn repair_leaves_answered_calls_alone() {
        let messages = vec![
            ChatMessage::Assistant(assistant_with(
                vec![tool_call("tc1", "shell"), tool_call("tc2", "file_read")],
                1,
            )),
            ChatMessage::ToolResult(ToolResultMessage {
                tool_call_id: "tc1".into(),
                tool_name: "shell".into(),
                content: vec![ToolResultPart::Text { text: "ok".into() }],
                is_error: false,
                timestamp: ts(2),
            }),
        ];

        let repaired = repair_orphaned_tool_calls(&messages);
        // tc2 is injected right after the assistant; tc1's real answer stays.
        assert_eq!(repaired.len(), 3);
        let ChatMessage::ToolResult(injected) = &repaired[1] else {
            panic!("expected injected result");
        };
        assert_eq!(injected.tool_call_id, "tc2");
        let ChatMessage::ToolResult(real) = &repaired[2] else {
            panic!("expected real result");
        };
        assert_eq!(real.tool_call_id, "tc1");
        assert!(!real.is_error);
    }

    #[test]
    fn repair_is_idempotent() {
        let messages = vec![
            ChatMessage::user("go"),
            ChatMessage::Assistant(assistant_with(vec![tool_call("tc1", "shell")], 2)),
        ];
        let once = repair_orphaned_tool_calls(&messages);
        let twice = repair_orphaned_tool_calls(&once);
        assert_eq!(once, twice);
    }
}
