//! Error types for the MyClaw domain.
//!
//! Uses `thiserror` for ergonomic error definitions.
//! Each bounded context has its own error enum; crate-level operations wrap
//! them into the top-level `Error`.

use thiserror::Error;

/// The top-level error type for all MyClaw operations.
#[derive(Debug, Error)]
pub enum Error {
    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),

    #[error("Tool error: {0}")]
    Tool(#[from] ToolError),

    #[error("Session key error: {0}")]
    SessionKey(#[from] SessionKeyError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type alias using our Error.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors surfaced by a `Provider` implementation.
///
/// `Api` carries the HTTP status so the failover classifier can apply its
/// status-code rules before falling back to message inspection.
#[derive(Debug, Clone, Error)]
pub enum ProviderError {
    #[error("API request failed (status {status}): {message}")]
    Api { status: u16, message: String },

    #[error("Request timed out: {0}")]
    Timeout(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Malformed provider response: {0}")]
    BadResponse(String),

    #[error("Provider not configured: {0}")]
    NotConfigured(String),

    #[error("Call cancelled")]
    Cancelled,
}

impl ProviderError {
    /// The HTTP status behind this failure, if one was observed.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Api { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// The human-readable message used for pattern classification.
    pub fn message(&self) -> String {
        match self {
            Self::Api { message, .. } => message.clone(),
            other => other.to_string(),
        }
    }
}

/// Errors raised by tool execution.
#[derive(Debug, Error)]
pub enum ToolError {
    #[error("Tool not found: {0}")]
    NotFound(String),

    #[error("Tool execution failed: {tool_name} — {reason}")]
    ExecutionFailed { tool_name: String, reason: String },

    #[error("Permission denied: {tool_name} — {reason}")]
    PermissionDenied { tool_name: String, reason: String },

    #[error("Invalid tool arguments: {0}")]
    InvalidArguments(String),

    #[error("Tool cancelled: {0}")]
    Cancelled(String),
}

/// A session key string that does not match the canonical grammar.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Malformed session key: {0}")]
pub struct SessionKeyError(pub String);
