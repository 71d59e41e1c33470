//! Tool trait — the abstraction over agent capabilities.
//!
//! Tools are what let the agent act: read and write files, run commands.
//! The run loop only ever sees them through this interface.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::error::ToolError;
use crate::message::ToolResultPart;
use crate::provider::ToolDefinition;

/// What a tool hands back on success. The invoker extracts the text parts
/// and bounds them before they enter the conversation.
#[derive(Debug, Clone)]
pub struct ToolOutput {
    pub content: Vec<ToolResultPart>,
}

impl ToolOutput {
    /// A single-text-part output.
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            content: vec![ToolResultPart::Text { text: text.into() }],
        }
    }
}

/// The core Tool trait.
#[async_trait]
pub trait Tool: Send + Sync {
    /// The unique name of this tool (e.g., "shell", "file_read").
    fn name(&self) -> &str;

    /// A short human-facing label (e.g., "Shell").
    fn label(&self) -> &str;

    /// A description of what this tool does (sent to the model).
    fn description(&self) -> &str;

    /// JSON Schema describing this tool's parameters.
    fn parameters_schema(&self) -> serde_json::Value;

    /// Execute the tool.
    ///
    /// `call_id` is the model's tool-call identifier; implementations must
    /// honour `cancel` at their suspension points.
    async fn invoke(
        &self,
        call_id: &str,
        args: &serde_json::Map<String, serde_json::Value>,
        cancel: &CancellationToken,
    ) -> std::result::Result<ToolOutput, ToolError>;

    /// Convert this tool into a definition for the provider call.
    fn to_definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: self.name().to_string(),
            description: self.description().to_string(),
            parameters: self.parameters_schema(),
        }
    }
}

/// A registry of available tools, keyed by name.
pub struct ToolRegistry {
    tools: HashMap<String, Box<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self {
            tools: HashMap::new(),
        }
    }

    /// Register a tool. Replaces any existing tool with the same name.
    pub fn register(&mut self, tool: Box<dyn Tool>) {
        let name = tool.name().to_string();
        self.tools.insert(name, tool);
    }

    pub fn get(&self, name: &str) -> Option<&dyn Tool> {
        self.tools.get(name).map(|t| t.as_ref())
    }

    /// All tool definitions, sorted by name for a stable provider payload.
    pub fn definitions(&self) -> Vec<ToolDefinition> {
        let mut defs: Vec<ToolDefinition> = self.tools.values().map(|t| t.to_definition()).collect();
        defs.sort_by(|a, b| a.name.cmp(&b.name));
        defs
    }

    /// All registered tool names, sorted.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.tools.keys().cloned().collect();
        names.sort();
        names
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct EchoTool;

    #[async_trait]
    impl Tool for EchoTool {
        fn name(&self) -> &str {
            "echo"
        }
        fn label(&self) -> &str {
            "Echo"
        }
        fn description(&self) -> &str {
            "Echoes back the input"
        }
        fn parameters_schema(&self) -> serde_json::Value {
            serde_json::json!({
                "type": "object",
                "properties": {
                    "text": { "type": "string" }
                },
                "required": ["text"]
            })
        }
        async fn invoke(
            &self,
            _call_id: &str,
            args: &serde_json::Map<String, serde_json::Value>,
            _cancel: &CancellationToken,
        ) -> std::result::Result<ToolOutput, ToolError> {
            let text = args.get("text").and_then(|v| v.as_str()).unwrap_or("");
            Ok(ToolOutput::text(text))
        }
    }

    #[test]
    fn registry_register_and_lookup() {
        let mut registry = ToolRegistry::new();
        registry.register(Box::new(EchoTool));
        assert!(registry.get("echo").is_some());
        assert!(registry.get("nonexistent").is_none());
    }

    #[test]
    fn registry_definitions_sorted() {
        let mut registry = ToolRegistry::new();
        registry.register(Box::new(EchoTool));
        let defs = registry.definitions();
        assert_eq!(defs.len(), 1);
        assert_eq!(defs[0].name, "echo");
        assert_eq!(registry.names(), vec!["echo".to_string()]);
    }

    #[tokio::test]
    async fn invoke_returns_text_output() {
        let tool = EchoTool;
        let args = serde_json::json!({"text": "hello"})
            .as_object()
            .cloned()
            .unwrap();
        let out = tool
            .invoke("tc1", &args, &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(out.content.len(), 1);
        let ToolResultPart::Text { text } = &out.content[0];
        assert_eq!(text, "hello");
    }
}
