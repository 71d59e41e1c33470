//! Agent-level events.
//!
//! One run emits a causal stream the caller can forward to a UI or gateway:
//! `llm_start, (llm_stream)*, llm_end, (tool_start, tool_end)*,
//! [retry* | compaction], …, done`. Provider stream events are wrapped, not
//! re-interpreted, so their order is preserved verbatim.

use serde::Serialize;

use myclaw_core::message::AssistantMessage;
use myclaw_core::provider::StreamEvent;

use crate::failover::FailureKind;
use crate::runner::RunResult;

/// Events emitted by the run loop.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AgentEvent {
    /// A provider call is starting for the given (zero-based) iteration.
    LlmStart { iteration: u32 },

    /// A fine-grained provider streaming event.
    LlmStream { event: StreamEvent },

    /// The provider call resolved to a final assistant message.
    LlmEnd { message: AssistantMessage },

    /// A tool invocation is starting.
    #[serde(rename_all = "camelCase")]
    ToolStart {
        tool_name: String,
        tool_call_id: String,
    },

    /// A tool invocation finished.
    #[serde(rename_all = "camelCase")]
    ToolEnd {
        tool_name: String,
        tool_call_id: String,
        duration_ms: u64,
        is_error: bool,
    },

    /// The call failed with a retriable error and the chain rotated.
    #[serde(rename_all = "camelCase")]
    Retry {
        attempt: u32,
        reason: FailureKind,
        profile_id: String,
    },

    /// Overflow recovery mutated the message list.
    #[serde(rename_all = "camelCase")]
    Compaction { old_count: usize, new_count: usize },

    /// The run finished.
    Done { result: RunResult },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn events_serialize_with_wire_field_names() {
        let e = AgentEvent::ToolEnd {
            tool_name: "shell".into(),
            tool_call_id: "tc1".into(),
            duration_ms: 12,
            is_error: false,
        };
        let json = serde_json::to_string(&e).unwrap();
        assert!(json.contains(r#""type":"tool_end""#));
        assert!(json.contains(r#""toolName":"shell""#));
        assert!(json.contains(r#""durationMs":12"#));
        assert!(json.contains(r#""isError":false"#));

        let e = AgentEvent::Retry {
            attempt: 1,
            reason: FailureKind::Auth,
            profile_id: "fallback".into(),
        };
        let json = serde_json::to_string(&e).unwrap();
        assert!(json.contains(r#""reason":"auth""#));
        assert!(json.contains(r#""profileId":"fallback""#));
    }

    #[test]
    fn compaction_event_serializes_counts() {
        let e = AgentEvent::Compaction {
            old_count: 40,
            new_count: 11,
        };
        let json = serde_json::to_string(&e).unwrap();
        assert!(json.contains(r#""oldCount":40"#));
        assert!(json.contains(r#""newCount":11"#));
    }
}
