//! # MyClaw Core
//!
//! Domain types, traits, and error definitions for the MyClaw agent runtime.
//! This crate defines the model that every other crate implements against:
//! sessions, messages, providers, and tools.
//!
//! All other crates depend inward on core, which keeps the dependency graph
//! clean and lets the engine be tested against mock providers and tools.

pub mod error;
pub mod message;
pub mod provider;
pub mod session;
pub mod tool;

// Re-export key types at crate root for ergonomics
pub use error::{Error, ProviderError, Result, SessionKeyError, ToolError};
pub use message::{
    AssistantMessage, ChatMessage, ContentBlock, StopReason, ToolCallBlock, ToolResultMessage,
    ToolResultPart, Usage, UsageCost, UserContent, UserMessage, UserPart,
};
pub use provider::{
    ApiFlavor, CallContext, CallOptions, Provider, ProviderDescriptor, StreamCallback, StreamEvent,
    ToolDefinition,
};
pub use session::{PeerKind, SessionKey, SessionKeyParams};
pub use tool::{Tool, ToolOutput, ToolRegistry};
