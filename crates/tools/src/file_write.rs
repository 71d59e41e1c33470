//! File write tool — create or overwrite workspace files.

use std::path::PathBuf;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use myclaw_core::error::ToolError;
use myclaw_core::tool::{Tool, ToolOutput};

use crate::sandbox;

pub struct FileWriteTool {
    workspace: PathBuf,
}

impl FileWriteTool {
    pub fn new(workspace: impl Into<PathBuf>) -> Self {
        Self {
            workspace: workspace.into(),
        }
    }
}

#[async_trait]
impl Tool for FileWriteTool {
    fn name(&self) -> &str {
        "file_write"
    }

    fn label(&self) -> &str {
        "Write file"
    }

    fn description(&self) -> &str {
        "Write content to a file inside the workspace, creating parent directories as needed. Overwrites existing files."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "path": {
                    "type": "string",
                    "description": "The file path to write, relative to the workspace"
                },
                "content": {
                    "type": "string",
                    "description": "The full content to write"
                }
            },
            "required": ["path", "content"]
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
        let content = args
            .get("content")
            .and_then(|v| v.as_str())
            .ok_or_else(|| ToolError::InvalidArguments("Missing 'content' argument".into()))?;

        let resolved = sandbox::resolve(&self.workspace, path).map_err(|reason| {
            ToolError::PermissionDenied {
                tool_name: "file_write".into(),
                reason,
            }
        })?;

        if let Some(parent) = resolved.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| ToolError::ExecutionFailed {
                    tool_name: "file_write".into(),
                    reason: format!("Failed to create directories for {path}: {e}"),
                })?;
        }

        tokio::fs::write(&resolved, content)
            .await
            .map_err(|e| ToolError::ExecutionFailed {
                tool_name: "file_write".into(),
                reason: format!("Failed to write {path}: {e}"),
            })?;

        debug!(path = %resolved.display(), bytes = content.len(), "Wrote workspace file");
        Ok(ToolOutput::text(format!(
            "Wrote {} bytes to {path}",
            content.len()
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn write_creates_parents_and_file() {
        let dir = tempfile::tempdir().unwrap();
        let tool = FileWriteTool::new(dir.path());
        let args = serde_json::json!({"path": "sub/dir/out.txt", "content": "data"})
            .as_object()
            .cloned()
            .unwrap();

        tool.invoke("tc1", &args, &CancellationToken::new())
            .await
            .unwrap();

        let written = std::fs::read_to_string(dir.path().join("sub/dir/out.txt")).unwrap();
        assert_eq!(written, "data");
    }

    #[tokio::test]
    async fn escape_is_denied() {
        let dir = tempfile::tempdir().unwrap();
        let tool = FileWriteTool::new(dir.path());
        let args = serde_json::json!({"path": "../evil.txt", "content": "x"})
            .as_object()
            .cloned()
            .unwrap();
        let err = tool
            .invoke("tc1", &args, &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, ToolError::PermissionDenied { .. }));
    }

    #[tokio::test]
    async fn missing_content_argument() {
        let dir = tempfile::tempdir().unwrap();
        let tool = FileWriteTool::new(dir.path());
        let args = serde_json::json!({"path": "a.txt"}).as_object().cloned().unwrap();
        let err = tool
            .invoke("tc1", &args, &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, ToolError::InvalidArguments(_)));
    }
}
