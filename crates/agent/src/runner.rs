//! The agent run loop.
//!
//! Drives one conversation turn: load and repair the transcript, append the
//! user message, then iterate provider calls and tool invocations until the
//! model answers without requesting tools (or the iteration cap is hit).
//! Provider failures rotate through the credential chain; context overflow
//! goes through the two-stage recovery guard; cancellation is honoured at
//! every suspension point.
//!
//! On clean completion only the new tail of messages is appended to the
//! transcript — a propagated error leaves the log at the last completed
//! turn.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::Serialize;
use thiserror::Error;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use myclaw_core::error::ProviderError;
use myclaw_core::message::{ChatMessage, ToolCallBlock, Usage};
use myclaw_core::provider::{CallContext, CallOptions, Provider, StreamCallback};
use myclaw_core::session::SessionKey;
use myclaw_core::tool::ToolRegistry;
use myclaw_providers::resolve_descriptor;
use myclaw_store::index::{SessionIndex, SessionMetaPatch};
use myclaw_store::transcript::TranscriptStore;
use myclaw_store::StoreError;
use myclaw_tools::workspace_registry;

use crate::bootstrap::load_bootstrap_files;
use crate::convert::{messages_to_transcript, repair_orphaned_tool_calls, transcript_to_messages};
use crate::event::AgentEvent;
use crate::failover::{classify_failure, CredentialProfile, FailureKind, ProfileChain};
use crate::invoker::invoke_tool;
use crate::overflow::{OverflowConfig, OverflowGuard, RecoveryOutcome};
use crate::prompt::{compose_system_prompt, PromptParams};

/// Default iteration cap per turn.
pub const DEFAULT_MAX_ITERATIONS: u32 = 25;
/// Default retry budget per iteration.
pub const DEFAULT_MAX_RETRIES: u32 = 3;
/// Default per-result character cap applied by the invoker.
pub const DEFAULT_TOOL_RESULT_LIMIT: usize = 50_000;

/// Scaffolded into an empty workspace on first run. Never overwritten.
const DEFAULT_AGENTS_MD: &str = "# Agent Briefing\n\n\
This file is injected into the agent's system prompt at the start of every\n\
turn. Edit it to tell the agent who it works for, what it is responsible\n\
for, and any standing instructions.\n";

/// One run's configuration snapshot.
#[derive(Debug, Clone)]
pub struct RunConfig {
    pub provider: String,
    pub model: String,
    pub base_url: Option<String>,
    /// Ordered credential profiles; the first is tried first.
    pub profiles: Vec<CredentialProfile>,
    pub workspace_dir: PathBuf,
    pub max_iterations: u32,
    pub max_retries: u32,
    /// Character cap the invoker applies to each tool result.
    pub tool_result_limit: usize,
    pub overflow: OverflowConfig,
}

impl RunConfig {
    pub fn new(
        provider: impl Into<String>,
        model: impl Into<String>,
        workspace_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            provider: provider.into(),
            model: model.into(),
            base_url: None,
            profiles: Vec::new(),
            workspace_dir: workspace_dir.into(),
            max_iterations: DEFAULT_MAX_ITERATIONS,
            max_retries: DEFAULT_MAX_RETRIES,
            tool_result_limit: DEFAULT_TOOL_RESULT_LIMIT,
            overflow: OverflowConfig::default(),
        }
    }
}

/// Callback receiving agent events in causal order.
pub type EventSink = Arc<dyn Fn(AgentEvent) + Send + Sync>;

/// Inputs for one turn.
pub struct RunRequest {
    pub session_key: SessionKey,
    pub user_text: String,
    pub config: RunConfig,
    pub cancel: CancellationToken,
    pub on_event: Option<EventSink>,
}

/// The outcome of a completed turn.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RunResult {
    /// Concatenated text blocks of the final assistant message.
    pub reply: String,
    /// Usage accumulated across every provider call in the turn.
    pub usage: Usage,
    /// Usage of the last provider call alone.
    pub last_call_usage: Usage,
    pub iterations: u32,
    pub max_iterations_reached: bool,
}

/// Errors that end a run. Tool failures and recoverable provider failures
/// never surface here — they are folded back into the conversation.
#[derive(Debug, Error)]
pub enum AgentError {
    #[error("Run cancelled")]
    Cancelled,

    #[error("Context overflow not recoverable: {0}")]
    TerminalOverflow(ProviderError),

    #[error("Retries exhausted after {attempts} attempts: {source}")]
    RetriesExhausted {
        attempts: u32,
        source: ProviderError,
    },

    #[error("Provider error: {0}")]
    Provider(ProviderError),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Workspace error: {0}")]
    Io(#[from] std::io::Error),
}

/// The engine. One runner serves many sessions; the caller must not run two
/// turns for the same session key concurrently.
pub struct AgentRunner {
    provider: Arc<dyn Provider>,
    transcripts: TranscriptStore,
    index: SessionIndex,
    tools: Option<Arc<ToolRegistry>>,
}

impl AgentRunner {
    pub fn new(provider: Arc<dyn Provider>, transcripts: TranscriptStore, index: SessionIndex) -> Self {
        Self {
            provider,
            transcripts,
            index,
            tools: None,
        }
    }

    /// Replace the workspace-derived tool set (embedders, tests).
    pub fn with_tools(mut self, tools: Arc<ToolRegistry>) -> Self {
        self.tools = Some(tools);
        self
    }

    /// Run one turn.
    pub async fn run(&self, request: RunRequest) -> Result<RunResult, AgentError> {
        let RunRequest {
            session_key,
            user_text,
            config,
            cancel,
            on_event,
        } = request;

        if cancel.is_cancelled() {
            return Err(AgentError::Cancelled);
        }

        let emit = |event: AgentEvent| {
            if let Some(sink) = &on_event {
                sink(event);
            }
        };

        // -- Setup --
        scaffold_workspace(&config.workspace_dir)?;

        let owned_tools;
        let tools: &ToolRegistry = match &self.tools {
            Some(t) => t.as_ref(),
            None => {
                owned_tools = workspace_registry(&config.workspace_dir);
                &owned_tools
            }
        };
        let tool_defs = tools.definitions();
        let tool_names = tools.names();

        let bootstrap = load_bootstrap_files(&config.workspace_dir);
        let system_prompt = compose_system_prompt(&PromptParams {
            identity_override: None,
            bootstrap: &bootstrap,
            tool_names: &tool_names,
            model: Some(&config.model),
            workspace_dir: &config.workspace_dir,
        });

        let descriptor =
            resolve_descriptor(&config.provider, &config.model, config.base_url.as_deref());

        let records = self.transcripts.load(&session_key)?;
        let mut messages = repair_orphaned_tool_calls(&transcript_to_messages(&records));

        info!(
            session = %session_key,
            history = messages.len(),
            model = %config.model,
            "Starting turn"
        );

        messages.push(ChatMessage::user(&user_text));
        let history_base = messages.len();

        let mut chain = ProfileChain::new(config.profiles.clone());
        let mut guard = OverflowGuard::new(config.overflow.clone());
        let mut total_usage = Usage::default();
        let mut last_call_usage = Usage::default();

        // -- Iterate --
        for iteration in 0..config.max_iterations {
            if cancel.is_cancelled() {
                return Err(AgentError::Cancelled);
            }

            // (a) Invoke the provider, rotating credentials on failure.
            let mut retries_used = 0u32;
            let assistant = loop {
                if cancel.is_cancelled() {
                    return Err(AgentError::Cancelled);
                }

                let idx = loop {
                    match chain.select_available(Instant::now()) {
                        Some(idx) => break idx,
                        None => {
                            let wait = chain.shortest_wait(Instant::now());
                            debug!(wait_ms = wait.as_millis() as u64, "All profiles cooling down");
                            tokio::select! {
                                _ = cancel.cancelled() => return Err(AgentError::Cancelled),
                                _ = tokio::time::sleep(wait) => {}
                            }
                        }
                    }
                };
                let profile = chain.profile(idx).clone();

                emit(AgentEvent::LlmStart { iteration });

                let context = CallContext {
                    system_prompt: system_prompt.clone(),
                    messages: messages.clone(),
                    tools: tool_defs.clone(),
                };
                let options = CallOptions {
                    api_key: profile.api_key.clone(),
                    cancel: cancel.clone(),
                };

                let outcome = match &on_event {
                    Some(sink) => {
                        let sink = sink.clone();
                        let forward: StreamCallback =
                            Arc::new(move |event| sink(AgentEvent::LlmStream { event }));
                        self.provider
                            .stream(&descriptor, context, options, forward)
                            .await
                    }
                    None => self.provider.complete(&descriptor, context, options).await,
                };

                match outcome {
                    Ok(message) => {
                        chain.mark_good(idx);
                        emit(AgentEvent::LlmEnd {
                            message: message.clone(),
                        });
                        break message;
                    }
                    Err(ProviderError::Cancelled) => return Err(AgentError::Cancelled),
                    Err(error) => {
                        let kind = classify_failure(&error);
                        warn!(kind = %kind, error = %error, "Provider call failed");

                        match kind {
                            FailureKind::ContextOverflow => {
                                let provider = Arc::clone(&self.provider);
                                let summary_descriptor = descriptor.clone();
                                let api_key = profile.api_key.clone();
                                let summary_cancel = cancel.clone();
                                let summarize = move |prompt: String| async move {
                                    let context = CallContext {
                                        system_prompt: String::new(),
                                        messages: vec![ChatMessage::user(prompt)],
                                        tools: Vec::new(),
                                    };
                                    let options = CallOptions {
                                        api_key,
                                        cancel: summary_cancel,
                                    };
                                    provider
                                        .complete(&summary_descriptor, context, options)
                                        .await
                                        .map(|m| m.text())
                                };

                                match guard.recover(&mut messages, summarize).await {
                                    RecoveryOutcome::Compacted {
                                        old_count,
                                        new_count,
                                    } => {
                                        emit(AgentEvent::Compaction {
                                            old_count,
                                            new_count,
                                        });
                                        // Recovery does not consume the retry budget.
                                        continue;
                                    }
                                    RecoveryOutcome::Truncated { .. } => {
                                        emit(AgentEvent::Compaction {
                                            old_count: messages.len(),
                                            new_count: messages.len(),
                                        });
                                        continue;
                                    }
                                    RecoveryOutcome::Exhausted => {
                                        return Err(AgentError::TerminalOverflow(error));
                                    }
                                }
                            }
                            kind if kind.is_retriable() => {
                                chain.mark_failed(idx, Instant::now());
                                chain.advance();
                                retries_used += 1;
                                if retries_used > config.max_retries {
                                    return Err(AgentError::RetriesExhausted {
                                        attempts: retries_used,
                                        source: error,
                                    });
                                }
                                emit(AgentEvent::Retry {
                                    attempt: retries_used,
                                    reason: kind,
                                    profile_id: chain.current_profile().id.clone(),
                                });
                                continue;
                            }
                            _ => return Err(AgentError::Provider(error)),
                        }
                    }
                }
            };

            total_usage.accumulate(&assistant.usage);
            last_call_usage = assistant.usage.clone();

            // (b) Append the assistant message.
            let calls: Vec<ToolCallBlock> =
                assistant.tool_calls().into_iter().cloned().collect();
            let reply = assistant.text();
            messages.push(ChatMessage::Assistant(assistant));

            // (c) No tool calls — the turn is done.
            if calls.is_empty() {
                self.persist_turn(&session_key, &messages, history_base, &config, &total_usage)?;
                let result = RunResult {
                    reply,
                    usage: total_usage,
                    last_call_usage,
                    iterations: iteration + 1,
                    max_iterations_reached: false,
                };
                emit(AgentEvent::Done {
                    result: result.clone(),
                });
                return Ok(result);
            }

            // Tool calls: invoke each, folding results into the conversation.
            for call in &calls {
                if cancel.is_cancelled() {
                    return Err(AgentError::Cancelled);
                }
                emit(AgentEvent::ToolStart {
                    tool_name: call.name.clone(),
                    tool_call_id: call.id.clone(),
                });
                let started = Instant::now();
                let result =
                    invoke_tool(tools, call, &cancel, config.tool_result_limit).await;
                emit(AgentEvent::ToolEnd {
                    tool_name: call.name.clone(),
                    tool_call_id: call.id.clone(),
                    duration_ms: started.elapsed().as_millis() as u64,
                    is_error: result.is_error,
                });
                messages.push(ChatMessage::ToolResult(result));
            }

            // New tool results may have changed the context size picture.
            guard.reset();
        }

        // -- Iteration cap reached --
        warn!(
            session = %session_key,
            iterations = config.max_iterations,
            "Max iterations reached, ending turn"
        );
        self.persist_turn(&session_key, &messages, history_base, &config, &total_usage)?;

        let reply = messages
            .iter()
            .rev()
            .find_map(|m| m.as_assistant())
            .map(|m| m.text())
            .unwrap_or_default();
        let result = RunResult {
            reply,
            usage: total_usage,
            last_call_usage,
            iterations: config.max_iterations,
            max_iterations_reached: true,
        };
        emit(AgentEvent::Done {
            result: result.clone(),
        });
        Ok(result)
    }

    /// Append the new tail of messages and refresh the session entry.
    fn persist_turn(
        &self,
        session_key: &SessionKey,
        messages: &[ChatMessage],
        history_base: usize,
        config: &RunConfig,
        total_usage: &Usage,
    ) -> Result<(), AgentError> {
        let tail = &messages[history_base - 1..];
        let records = messages_to_transcript(tail);
        self.transcripts.append_batch(session_key, &records)?;

        self.index.upsert_meta(
            session_key,
            SessionMetaPatch {
                last_channel: Some(session_key.channel.clone()),
                chat_type: Some(session_key.peer_kind.to_string()),
                model: Some(config.model.clone()),
                total_tokens: Some(total_usage.total_tokens),
                ..Default::default()
            },
        )?;
        Ok(())
    }
}

/// Ensure the workspace exists and carries a starter AGENTS.md.
fn scaffold_workspace(dir: &Path) -> std::io::Result<()> {
    std::fs::create_dir_all(dir)?;
    let agents = dir.join("AGENTS.md");
    if !agents.exists() {
        debug!(path = %agents.display(), "Scaffolding default AGENTS.md");
        std::fs::write(&agents, DEFAULT_AGENTS_MD)?;
    }
    Ok(())
}
