//! # MyClaw Agent
//!
//! The agent engine: everything between a user message arriving and the
//! final assistant reply going back out.
//!
//! - `bootstrap` / `prompt` — workspace context files and the system prompt
//! - `convert` — transcript ↔ message mapping and orphan repair
//! - `failover` — error classification and the credential cooldown chain
//! - `overflow` — two-stage context-overflow recovery
//! - `invoker` — tool dispatch with output bounding
//! - `runner` — the per-turn state machine tying it all together
//! - `event` — the event stream delivered to callers

pub mod bootstrap;
pub mod convert;
pub mod event;
pub mod failover;
pub mod invoker;
pub mod overflow;
pub mod prompt;
pub mod runner;

pub use bootstrap::{load_bootstrap_files, BootstrapFile};
pub use convert::{
    messages_to_transcript, repair_orphaned_tool_calls, transcript_to_messages, ORPHAN_RESULT_TEXT,
};
pub use event::AgentEvent;
pub use failover::{classify_failure, CredentialProfile, FailureKind, ProfileChain, ProfileState};
pub use invoker::invoke_tool;
pub use overflow::{OverflowConfig, OverflowGuard, RecoveryOutcome};
pub use prompt::{compose_system_prompt, PromptParams};
pub use runner::{AgentError, AgentRunner, EventSink, RunConfig, RunRequest, RunResult};
