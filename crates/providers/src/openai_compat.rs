//! OpenAI-compatible provider implementation.
//!
//! Works with OpenAI, OpenRouter, Ollama, vLLM, and any other service
//! exposing a `/chat/completions` endpoint. Maps the engine's content-block
//! message model onto the wire format and back, including tool calling and
//! cached-token usage counters.

use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use myclaw_core::error::ProviderError;
use myclaw_core::message::{
    AssistantMessage, ChatMessage, ContentBlock, StopReason, ToolCallBlock, Usage,
};
use myclaw_core::provider::{
    CallContext, CallOptions, Provider, ProviderDescriptor, ToolDefinition,
};

/// An OpenAI-compatible LLM provider client.
pub struct OpenAiCompatProvider {
    client: reqwest::Client,
}

impl OpenAiCompatProvider {
    pub fn new() -> Self {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(120))
            .build()
            .expect("Failed to create HTTP client");
        Self { client }
    }

    /// Flatten engine messages into wire messages. The system prompt rides
    /// first; assistant tool calls and tool results keep their ids so the
    /// service can pair them.
    fn to_api_messages(context: &CallContext) -> Vec<ApiMessage> {
        let mut out = Vec::with_capacity(context.messages.len() + 1);
        if !context.system_prompt.is_empty() {
            out.push(ApiMessage {
                role: "system".into(),
                content: Some(context.system_prompt.clone()),
                tool_calls: None,
                tool_call_id: None,
            });
        }

        for message in &context.messages {
            match message {
                ChatMessage::User(m) => out.push(ApiMessage {
                    role: "user".into(),
                    content: Some(m.content.text()),
                    tool_calls: None,
                    tool_call_id: None,
                }),
                ChatMessage::Assistant(m) => {
                    let text = m.text();
                    let calls: Vec<ApiToolCall> = m
                        .tool_calls()
                        .iter()
                        .map(|c| ApiToolCall {
                            id: c.id.clone(),
                            r#type: "function".into(),
                            function: ApiFunction {
                                name: c.name.clone(),
                                arguments: serde_json::Value::Object(c.args.clone()).to_string(),
                            },
                        })
                        .collect();
                    out.push(ApiMessage {
                        role: "assistant".into(),
                        content: if text.is_empty() { None } else { Some(text) },
                        tool_calls: if calls.is_empty() { None } else { Some(calls) },
                        tool_call_id: None,
                    });
                }
                ChatMessage::ToolResult(m) => out.push(ApiMessage {
                    role: "tool".into(),
                    content: Some(m.text()),
                    tool_calls: None,
                    tool_call_id: Some(m.tool_call_id.clone()),
                }),
            }
        }
        out
    }

    fn to_api_tools(tools: &[ToolDefinition]) -> Vec<ApiToolDefinition> {
        tools
            .iter()
            .map(|t| ApiToolDefinition {
                r#type: "function".into(),
                function: ApiToolFunction {
                    name: t.name.clone(),
                    description: t.description.clone(),
                    parameters: t.parameters.clone(),
                },
            })
            .collect()
    }

    fn parse_assistant(
        descriptor: &ProviderDescriptor,
        response: ApiResponse,
    ) -> Result<AssistantMessage, ProviderError> {
        let choice = response
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| ProviderError::BadResponse("No choices in response".into()))?;

        let mut content = Vec::new();
        if let Some(text) = choice.message.content {
            if !text.is_empty() {
                content.push(ContentBlock::Text { text });
            }
        }
        for call in choice.message.tool_calls.unwrap_or_default() {
            let args = match serde_json::from_str::<serde_json::Value>(&call.function.arguments) {
                Ok(serde_json::Value::Object(map)) => map,
                _ => {
                    warn!(tool = %call.function.name, "Unparseable tool arguments, passing empty map");
                    serde_json::Map::new()
                }
            };
            content.push(ContentBlock::ToolCall(ToolCallBlock {
                id: call.id,
                name: call.function.name,
                args,
            }));
        }

        let stop_reason = match choice.finish_reason.as_deref() {
            Some("stop") => StopReason::EndTurn,
            Some("tool_calls") => StopReason::ToolUse,
            Some("length") => StopReason::MaxTokens,
            _ => StopReason::Other,
        };

        let usage = response
            .usage
            .map(|u| {
                let cache_read = u
                    .prompt_tokens_details
                    .and_then(|d| d.cached_tokens)
                    .unwrap_or(0);
                Usage {
                    input_tokens: u.prompt_tokens,
                    output_tokens: u.completion_tokens,
                    cache_read_tokens: cache_read,
                    cache_write_tokens: 0,
                    total_tokens: u.total_tokens,
                    cost: Default::default(),
                }
            })
            .unwrap_or_default();

        Ok(AssistantMessage {
            content,
            provider: descriptor.name.clone(),
            model: response.model.unwrap_or_else(|| descriptor.model.clone()),
            usage,
            stop_reason,
            timestamp: Utc::now(),
        })
    }
}

impl Default for OpenAiCompatProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Provider for OpenAiCompatProvider {
    fn name(&self) -> &str {
        "openai_compat"
    }

    async fn complete(
        &self,
        descriptor: &ProviderDescriptor,
        context: CallContext,
        options: CallOptions,
    ) -> Result<AssistantMessage, ProviderError> {
        let url = format!("{}/chat/completions", descriptor.base_url);

        let mut body = serde_json::json!({
            "model": descriptor.model,
            "messages": Self::to_api_messages(&context),
            "stream": false,
        });
        if !context.tools.is_empty() {
            body["tools"] = serde_json::json!(Self::to_api_tools(&context.tools));
        }

        debug!(provider = %descriptor.name, model = %descriptor.model, "Sending completion request");

        let request = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", options.api_key))
            .header("Content-Type", "application/json")
            .json(&body)
            .send();

        let response = tokio::select! {
            _ = options.cancel.cancelled() => return Err(ProviderError::Cancelled),
            result = request => result.map_err(|e| {
                if e.is_timeout() {
                    ProviderError::Timeout(e.to_string())
                } else {
                    ProviderError::Network(e.to_string())
                }
            })?,
        };

        let status = response.status().as_u16();
        if status != 200 {
            let message = response.text().await.unwrap_or_default();
            warn!(status, body = %message, "Provider returned error");
            return Err(ProviderError::Api { status, message });
        }

        let api_response: ApiResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::BadResponse(format!("Failed to parse response: {e}")))?;

        Self::parse_assistant(descriptor, api_response)
    }
}

// --- Wire types ---

#[derive(Debug, Serialize)]
struct ApiMessage {
    role: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_calls: Option<Vec<ApiToolCall>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_call_id: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
struct ApiToolCall {
    id: String,
    r#type: String,
    function: ApiFunction,
}

#[derive(Debug, Serialize, Deserialize)]
struct ApiFunction {
    name: String,
    arguments: String,
}

#[derive(Debug, Serialize)]
struct ApiToolDefinition {
    r#type: String,
    function: ApiToolFunction,
}

#[derive(Debug, Serialize)]
struct ApiToolFunction {
    name: String,
    description: String,
    parameters: serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct ApiResponse {
    choices: Vec<ApiChoice>,
    #[serde(default)]
    model: Option<String>,
    #[serde(default)]
    usage: Option<ApiUsage>,
}

#[derive(Debug, Deserialize)]
struct ApiChoice {
    message: ApiResponseMessage,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiResponseMessage {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    tool_calls: Option<Vec<ApiToolCall>>,
}

#[derive(Debug, Deserialize)]
struct ApiUsage {
    #[serde(default)]
    prompt_tokens: u64,
    #[serde(default)]
    completion_tokens: u64,
    #[serde(default)]
    total_tokens: u64,
    #[serde(default)]
    prompt_tokens_details: Option<ApiPromptTokensDetails>,
}

#[derive(Debug, Deserialize)]
struct ApiPromptTokensDetails {
    #[serde(default)]
    cached_tokens: Option<u64>,
}
