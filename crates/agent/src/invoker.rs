//! Tool invoker — dispatch one tool call and bound its output.
//!
//! Failures never escape: a missing tool or a raising tool becomes a
//! tool-result with the error flag set, and the run continues.

use chrono::Utc;
use tokio_util::sync::CancellationToken;
use tracing::warn;

use myclaw_core::message::{ToolCallBlock, ToolResultMessage, ToolResultPart};
use myclaw_core::tool::ToolRegistry;

use crate::overflow::clip_with_marker;

/// Invoke the named tool and produce its result message.
///
/// Text output is bounded to `result_cap` characters per part before it
/// enters the conversation.
pub async fn invoke_tool(
    registry: &ToolRegistry,
    call: &ToolCallBlock,
    cancel: &CancellationToken,
    result_cap: usize,
) -> ToolResultMessage {
    let Some(tool) = registry.get(&call.name) else {
        warn!(tool = %call.name, "Model requested unknown tool");
        return error_result(call, format!("unknown tool: {}", call.name));
    };

    match tool.invoke(&call.id, &call.args, cancel).await {
        Ok(output) => {
            let content = output
                .content
                .into_iter()
                .map(|part| {
                    let ToolResultPart::Text { text } = part;
                    match clip_with_marker(&text, result_cap) {
                        Some(clipped) => ToolResultPart::Text { text: clipped },
                        None => ToolResultPart::Text { text },
                    }
                })
                .collect();
            ToolResultMessage {
                tool_call_id: call.id.clone(),
                tool_name: call.name.clone(),
                content,
                is_error: false,
                timestamp: Utc::now(),
            }
        }
        Err(e) => {
            warn!(tool = %call.name, error = %e, "Tool execution failed");
            error_result(call, e.to_string())
        }
    }
}

fn error_result(call: &ToolCallBlock, text: String) -> ToolResultMessage {
    ToolResultMessage {
        tool_call_id: call.id.clone(),
        tool_name: call.name.clone(),
        content: vec![ToolResultPart::Text { text }],
        is_error: true,
        timestamp: Utc::now(),
    }
}
