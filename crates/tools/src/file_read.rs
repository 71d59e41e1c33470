//! File read tool — read workspace file contents.

use std::path::PathBuf;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use myclaw_core::error::ToolError;
use myclaw_core::tool::{Tool, ToolOutput};

use crate::sandbox;

pub struct FileReadTool {
    workspace: PathBuf,
}

impl FileReadTool {
    pub fn new(workspace: impl Into<PathBuf>) -> Self {
        Self {
            workspace: workspace.into(),
        }
    }
}

#[async_trait]
impl Tool for FileReadTool {
    fn name(&self) -> &str {
        "file_read"
    }

    fn label(&self) -> &str {
        "Read file"
    }

    fn description(&self) -> &str {
        "Read the contents of a file inside the workspace. Paths are relative to the workspace root."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "path": {
                    "type": "string",
                    "description": "The file path to read, relative to the workspace"
                }
            },
            "required": ["path"]
        })
    }

    async fn invoke(
        &self,
        _call_id: &str,
        args: &serde_json::Map<String, serde_json::Value>,
        _cancel: &CancellationToken,
    ) -> Result<ToolOutput, ToolError> {
        let path = args
            .get("path")
            .and_then(|v| v.as_str())
            .ok_or_else(|| ToolError::InvalidArguments("Missing 'path' argument".into()))?;

        let resolved = sandbox::resolve(&self.workspace, path).map_err(|reason| {
            ToolError::PermissionDenied {
                tool_name: "file_read".into(),
                reason,
            }
        })?;

        match tokio::fs::read_to_string(&resolved).await {
            Ok(content) => Ok(ToolOutput::text(content)),
            Err(e) => Err(ToolError::ExecutionFailed {
                tool_name: "file_read".into(),
                reason: format!("Failed to read {path}: {e}"),
            }),
        }
    }
}
