//! System-prompt composer.
//!
//! Assembles the prompt from fixed sections joined by blank lines, in this
//! order: identity, bootstrap files, tools, safety, runtime. Section order
//! and presence are observable contracts — downstream prompt caching depends
//! on stable prefixes.

use std::path::Path;

use chrono::Utc;

use crate::bootstrap::BootstrapFile;

/// The default identity when the caller supplies no override.
const DEFAULT_IDENTITY: &str = "You are MyClaw, a personal AI assistant. \
You run on your operator's own machine, help them get things done, and use \
the tools you are given when they move the task forward. Be concise, \
accurate, and proactive.";

const SAFETY_SECTION: &str = "## Safety\n\n\
Never fabricate tool results or pretend a tool ran when it did not. \
Never attempt to bypass permission checks or act outside the workspace \
boundaries you were given. If a request cannot be completed safely, say so.";

/// Inputs for one prompt composition.
pub struct PromptParams<'a> {
    /// Replaces the fixed identity text when set.
    pub identity_override: Option<&'a str>,
    pub bootstrap: &'a [BootstrapFile],
    pub tool_names: &'a [String],
    pub model: Option<&'a str>,
    pub workspace_dir: &'a Path,
}

/// Compose the system prompt.
pub fn compose_system_prompt(params: &PromptParams<'_>) -> String {
    let mut sections: Vec<String> = Vec::with_capacity(5);

    sections.push(
        params
            .identity_override
            .unwrap_or(DEFAULT_IDENTITY)
            .to_string(),
    );

    if !params.bootstrap.is_empty() {
        let mut block = String::from("<context_files>\n");
        for file in params.bootstrap {
            block.push_str(&format!(
                "<file path=\"{}\">\n{}\n</file>\n",
                file.name,
                file.content.trim_end()
            ));
        }
        block.push_str("</context_files>");
        sections.push(block);
    }

    if !params.tool_names.is_empty() {
        let mut block = String::from("## Tools\n\nYou can call these tools:\n");
        for name in params.tool_names {
            block.push_str(&format!("- {name}\n"));
        }
        block.push_str(
            "\nCall a tool when it gets you closer to the goal; report what it \
             actually returned.",
        );
        sections.push(block);
    }

    sections.push(SAFETY_SECTION.to_string());

    let mut runtime = format!(
        "## Runtime\n\nCurrent time: {}\nPlatform: {}\nWorking directory: {}",
        Utc::now().to_rfc3339(),
        std::env::consts::OS,
        params.workspace_dir.display()
    );
    if let Some(model) = params.model {
        runtime.push_str(&format!("\nModel: {model}"));
    }
    sections.push(runtime);

    sections.join("\n\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn params<'a>(
        bootstrap: &'a [BootstrapFile],
        tool_names: &'a [String],
        workspace: &'a PathBuf,
    ) -> PromptParams<'a> {
        PromptParams {
            identity_override: None,
            bootstrap,
            tool_names,
            model: Some("test-model"),
            workspace_dir: workspace,
        }
    }

    #[test]
    fn sections_appear_in_order() {
        let ws = PathBuf::from("/tmp/ws");
        let bootstrap = vec![BootstrapFile {
            name: "AGENTS.md".into(),
            content: "briefing".into(),
        }];
        let tools = vec!["file_read".to_string(), "shell".to_string()];

        let prompt = compose_system_prompt(&params(&bootstrap, &tools, &ws));

        let identity_pos = prompt.find("You are MyClaw").unwrap();
        let files_pos = prompt.find("<context_files>").unwrap();
        let tools_pos = prompt.find("## Tools").unwrap();
        let safety_pos = prompt.find("## Safety").unwrap();
        let runtime_pos = prompt.find("## Runtime").unwrap();

        assert!(identity_pos < files_pos);
        assert!(files_pos < tools_pos);
        assert!(tools_pos < safety_pos);
        assert!(safety_pos < runtime_pos);
    }

    #[test]
    fn bootstrap_files_render_as_tagged_blocks() {
        let ws = PathBuf::from("/tmp/ws");
        let bootstrap = vec![BootstrapFile {
            name: "SOUL.md".into(),
            content: "be kind\n".into(),
        }];
        let prompt = compose_system_prompt(&params(&bootstrap, &[], &ws));
        assert!(prompt.contains("<file path=\"SOUL.md\">\nbe kind\n</file>"));
    }

    #[test]
    fn empty_sections_are_omitted() {
        let ws = PathBuf::from("/tmp/ws");
        let prompt = compose_system_prompt(&params(&[], &[], &ws));
        assert!(!prompt.contains("<context_files>"));
        assert!(!prompt.contains("## Tools"));
        // Safety and runtime are always present.
        assert!(prompt.contains("## Safety"));
        assert!(prompt.contains("Working directory: /tmp/ws"));
        assert!(prompt.contains("Model: test-model"));
    }

    #[test]
    fn identity_override_replaces_default() {
        let ws = PathBuf::from("/tmp/ws");
        let p = PromptParams {
            identity_override: Some("You are TestBot."),
            bootstrap: &[],
            tool_names: &[],
            model: None,
            workspace_dir: &ws,
        };
        let prompt = compose_system_prompt(&p);
        assert!(prompt.starts_with("You are TestBot."));
        assert!(!prompt.contains("You are MyClaw"));
        assert!(!prompt.contains("Model:"));
    }

    #[test]
    fn tool_list_renders_bullets() {
        let ws = PathBuf::from("/tmp/ws");
        let tools = vec!["file_write".to_string()];
        let prompt = compose_system_prompt(&params(&[], &tools, &ws));
        assert!(prompt.contains("- file_write"));
    }
}
