//! # MyClaw Store
//!
//! Filesystem-backed session state: the per-session JSONL transcript log,
//! the `sessions.json` metadata index, and the state-root directory layout.
//!
//! Everything here is plain, human-inspectable JSON. One process writes at a
//! time (the caller's responsibility); readers tolerate partial or malformed
//! trailing lines.

pub mod index;
pub mod layout;
pub mod transcript;

pub use index::{SessionEntry, SessionIndex, SessionMetaPatch};
pub use layout::StateLayout;
pub use transcript::{SessionHeader, TranscriptMessage, TranscriptRole, TranscriptStore};

use std::path::PathBuf;
use thiserror::Error;

/// Errors raised by the store crate.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl StoreError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}
