//! Append-only transcript log — one JSONL file per session.
//!
//! The first line of every file is a session header; every following
//! non-blank line is one message record. Appends are whole-record writes so
//! an interrupted process can at worst truncate the final line, which
//! readers skip.

use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::warn;

use myclaw_core::SessionKey;

use crate::StoreError;

/// The role recorded on a transcript line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TranscriptRole {
    User,
    Assistant,
    System,
    Tool,
}

/// The header line at the top of every transcript file.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionHeader {
    #[serde(rename = "type")]
    pub kind: String,
    pub session_key: String,
    pub created_at: i64,
}

/// One persisted message line.
///
/// Unknown fields are accepted and ignored on load; `meta` round-trips
/// verbatim.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TranscriptMessage {
    pub role: TranscriptRole,
    pub content: String,
    /// Epoch milliseconds.
    pub ts: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub meta: Option<serde_json::Map<String, serde_json::Value>>,
}

/// The per-session transcript store rooted at a sessions directory.
#[derive(Debug, Clone)]
pub struct TranscriptStore {
    sessions_dir: PathBuf,
}

impl TranscriptStore {
    pub fn new(sessions_dir: impl Into<PathBuf>) -> Self {
        Self {
            sessions_dir: sessions_dir.into(),
        }
    }

    /// The transcript path for a session key.
    pub fn path_for(&self, key: &SessionKey) -> PathBuf {
        self.sessions_dir.join(format!("{}.jsonl", key.slug()))
    }

    /// Append a single message. Creates the file (with its header) on first
    /// use; each append is one `record + '\n'` write.
    pub fn append(&self, key: &SessionKey, message: &TranscriptMessage) -> Result<(), StoreError> {
        self.append_batch(key, std::slice::from_ref(message))
    }

    /// Append several messages as a single filesystem write, minimising the
    /// window in which a crash can truncate the batch.
    pub fn append_batch(
        &self,
        key: &SessionKey,
        messages: &[TranscriptMessage],
    ) -> Result<(), StoreError> {
        if messages.is_empty() {
            return Ok(());
        }

        let path = self.path_for(key);
        self.ensure_header(key, &path)?;

        let mut buf = String::new();
        for message in messages {
            buf.push_str(&serde_json::to_string(message)?);
            buf.push('\n');
        }

        let mut file = OpenOptions::new()
            .append(true)
            .open(&path)
            .map_err(|e| StoreError::io(&path, e))?;
        file.write_all(buf.as_bytes())
            .map_err(|e| StoreError::io(&path, e))?;
        Ok(())
    }

    /// Load every valid message line in file order. Blank and malformed
    /// lines are skipped without failing the load.
    pub fn load(&self, key: &SessionKey) -> Result<Vec<TranscriptMessage>, StoreError> {
        let path = self.path_for(key);
        let content = match std::fs::read_to_string(&path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(StoreError::io(&path, e)),
        };

        let mut messages = Vec::new();
        for line in content.lines() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            let value: serde_json::Value = match serde_json::from_str(line) {
                Ok(v) => v,
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "Skipping malformed transcript line");
                    continue;
                }
            };
            if value.get("type").and_then(|t| t.as_str()) == Some("session") {
                continue;
            }
            match serde_json::from_value::<TranscriptMessage>(value) {
                Ok(message) => messages.push(message),
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "Skipping malformed transcript record");
                }
            }
        }
        Ok(messages)
    }

    /// Number of valid message lines.
    pub fn count(&self, key: &SessionKey) -> Result<usize, StoreError> {
        Ok(self.load(key)?.len())
    }

    /// Remove a transcript. Idempotent; reports whether a file was removed.
    pub fn delete(&self, key: &SessionKey) -> Result<bool, StoreError> {
        let path = self.path_for(key);
        match std::fs::remove_file(&path) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(StoreError::io(&path, e)),
        }
    }

    /// Write the header line atomically if the file does not exist yet.
    fn ensure_header(&self, key: &SessionKey, path: &Path) -> Result<(), StoreError> {
        if path.exists() {
            return Ok(());
        }
        std::fs::create_dir_all(&self.sessions_dir)
            .map_err(|e| StoreError::io(&self.sessions_dir, e))?;

        let header = SessionHeader {
            kind: "session".into(),
            session_key: key.to_string(),
            created_at: Utc::now().timestamp_millis(),
        };
        let line = format!("{}\n", serde_json::to_string(&header)?);
        std::fs::write(path, line).map_err(|e| StoreError::io(path, e))?;
        Ok(())
    }
}
