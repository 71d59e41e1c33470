//! Workspace tools for the MyClaw agent.
//!
//! Every tool here is bound to the workspace directory: file paths resolve
//! inside it and shell commands run with it as the working directory.

pub mod file_read;
pub mod file_write;
pub mod sandbox;
pub mod shell;

pub use file_read::FileReadTool;
pub use file_write::FileWriteTool;
pub use shell::ShellTool;

use std::path::Path;

use myclaw_core::tool::ToolRegistry;

/// Build the standard tool set bound to a workspace directory.
pub fn workspace_registry(workspace: &Path) -> ToolRegistry {
    let mut registry = ToolRegistry::new();
    registry.register(Box::new(FileReadTool::new(workspace)));
    registry.register(Box::new(FileWriteTool::new(workspace)));
    registry.register(Box::new(ShellTool::new(workspace)));
    registry
}
