//! Provider trait — the abstraction over LLM backends.
//!
//! A Provider knows how to send a conversation to an inference service and
//! get a final assistant message back, either buffered (`complete`) or with
//! fine-grained events delivered along the way (`stream`). The two paths are
//! one abstraction: both resolve to the final message, and implementations
//! may fuse them.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use crate::error::ProviderError;
use crate::message::{AssistantMessage, ChatMessage};

/// Where and how to reach a model.
///
/// Resolved from (provider name, model id, optional base URL) by the
/// provider registry; unknown provider names get a minimal descriptor with
/// reasonable defaults.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderDescriptor {
    pub name: String,
    pub model: String,
    pub base_url: String,
    pub api: ApiFlavor,
}

/// The wire protocol a descriptor speaks.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApiFlavor {
    #[default]
    OpenAiCompat,
}

/// A tool definition sent to the model so it knows what it can call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    /// JSON Schema describing the tool's parameters.
    pub parameters: serde_json::Value,
}

/// Everything one provider call sees: the system prompt travels here,
/// alongside the message list, never inside it.
#[derive(Debug, Clone)]
pub struct CallContext {
    pub system_prompt: String,
    pub messages: Vec<ChatMessage>,
    pub tools: Vec<ToolDefinition>,
}

/// Per-call credentials and cancellation.
#[derive(Clone)]
pub struct CallOptions {
    pub api_key: String,
    pub cancel: CancellationToken,
}

/// Fine-grained events yielded while a response streams in.
///
/// Delivered to the caller in provider order, verbatim.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StreamEvent {
    TextDelta { text: String },
    ThinkingDelta { text: String },
    ToolCallStart { id: String, name: String },
    ToolCallEnd { id: String },
    Error { message: String },
    Done,
}

/// Callback receiving streaming events.
pub type StreamCallback = Arc<dyn Fn(StreamEvent) + Send + Sync>;

/// The core Provider trait.
///
/// The run loop calls `complete()` or `stream()` without knowing which
/// backend is in play.
#[async_trait]
pub trait Provider: Send + Sync {
    /// A human-readable name for this provider client.
    fn name(&self) -> &str;

    /// Send a request and resolve to the final assistant message.
    async fn complete(
        &self,
        descriptor: &ProviderDescriptor,
        context: CallContext,
        options: CallOptions,
    ) -> std::result::Result<AssistantMessage, ProviderError>;

    /// Like `complete`, but delivers streaming events to `on_event` before
    /// resolving. The default implementation fuses over `complete`, emitting
    /// the final text as a single delta.
    async fn stream(
        &self,
        descriptor: &ProviderDescriptor,
        context: CallContext,
        options: CallOptions,
        on_event: StreamCallback,
    ) -> std::result::Result<AssistantMessage, ProviderError> {
        let message = self.complete(descriptor, context, options).await?;
        let text = message.text();
        if !text.is_empty() {
            on_event(StreamEvent::TextDelta { text });
        }
        on_event(StreamEvent::Done);
        Ok(message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::{ContentBlock, StopReason, Usage};
    use chrono::Utc;
    use std::sync::Mutex;

    struct FixedProvider;

    #[async_trait]
    impl Provider for FixedProvider {
        fn name(&self) -> &str {
            "fixed"
        }

        async fn complete(
            &self,
            _descriptor: &ProviderDescriptor,
            _context: CallContext,
            _options: CallOptions,
        ) -> std::result::Result<AssistantMessage, ProviderError> {
            Ok(AssistantMessage {
                content: vec![ContentBlock::Text {
                    text: "hello".into(),
                }],
                provider: "fixed".into(),
                model: "fixed-1".into(),
                usage: Usage::default(),
                stop_reason: StopReason::EndTurn,
                timestamp: Utc::now(),
            })
        }
    }

    fn descriptor() -> ProviderDescriptor {
        ProviderDescriptor {
            name: "fixed".into(),
            model: "fixed-1".into(),
            base_url: "http://localhost".into(),
            api: ApiFlavor::OpenAiCompat,
        }
    }

    #[tokio::test]
    async fn default_stream_fuses_over_complete() {
        let events: Arc<Mutex<Vec<StreamEvent>>> = Arc::new(Mutex::new(Vec::new()));
        let sink = events.clone();
        let on_event: StreamCallback = Arc::new(move |e| sink.lock().unwrap().push(e));

        let context = CallContext {
            system_prompt: String::new(),
            messages: vec![ChatMessage::user("hi")],
            tools: vec![],
        };
        let options = CallOptions {
            api_key: "k".into(),
            cancel: CancellationToken::new(),
        };

        let msg = FixedProvider
            .stream(&descriptor(), context, options, on_event)
            .await
            .unwrap();
        assert_eq!(msg.text(), "hello");

        let events = events.lock().unwrap();
        assert!(matches!(events[0], StreamEvent::TextDelta { .. }));
        assert!(matches!(events.last(), Some(StreamEvent::Done)));
    }

    #[test]
    fn stream_event_serialization() {
        let e = StreamEvent::ToolCallStart {
            id: "tc1".into(),
            name: "shell".into(),
        };
        let json = serde_json::to_string(&e).unwrap();
        assert!(json.contains(r#""type":"tool_call_start""#));
    }
}
