//! Session metadata index — a single `sessions.json` map from session key
//! to entry, with an in-process cache keyed by the file's mtime.
//!
//! The cache hands out deep copies so callers can never mutate cached state.
//! Correctness of the mtime test assumes a single writer per process and a
//! filesystem whose mtime advances on every write.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Mutex;
use std::time::SystemTime;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use uuid::Uuid;

use myclaw_core::SessionKey;

use crate::StoreError;

/// One row of the index.
///
/// `session_id` and `session_file` are immutable after creation;
/// `updated_at` is refreshed on every write.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionEntry {
    pub session_id: String,
    /// Epoch milliseconds of the last update.
    pub updated_at: i64,
    /// Transcript filename relative to the sessions directory.
    pub session_file: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_channel: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_to: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chat_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_tokens: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extra: Option<serde_json::Map<String, serde_json::Value>>,
}

/// Mutable annotations merged into an entry by `upsert_meta`. `None` fields
/// leave the existing value untouched.
#[derive(Debug, Clone, Default)]
pub struct SessionMetaPatch {
    pub last_channel: Option<String>,
    pub last_to: Option<String>,
    pub chat_type: Option<String>,
    pub model: Option<String>,
    pub total_tokens: Option<u64>,
    pub extra: Option<serde_json::Map<String, serde_json::Value>>,
}

type EntryMap = HashMap<String, SessionEntry>;

struct CachedIndex {
    modified: SystemTime,
    entries: EntryMap,
}

/// The index file plus its owned cache. Callers hold one of these per
/// process; there is no ambient global state.
pub struct SessionIndex {
    path: PathBuf,
    cache: Mutex<Option<CachedIndex>>,
}

impl SessionIndex {
    pub fn new(sessions_dir: impl Into<PathBuf>) -> Self {
        Self {
            path: sessions_dir.into().join("sessions.json"),
            cache: Mutex::new(None),
        }
    }

    pub fn path(&self) -> &PathBuf {
        &self.path
    }

    /// Load the map, serving from cache when the file's mtime is unchanged.
    /// A corrupt file is preserved as `sessions.json.bak.<ts>` and an empty
    /// map returned.
    pub fn load(&self) -> Result<EntryMap, StoreError> {
        let modified = match std::fs::metadata(&self.path) {
            Ok(meta) => meta.modified().map_err(|e| StoreError::io(&self.path, e))?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(EntryMap::new()),
            Err(e) => return Err(StoreError::io(&self.path, e)),
        };

        let mut cache = self.cache.lock().unwrap();
        if let Some(cached) = cache.as_ref() {
            if cached.modified == modified {
                return Ok(cached.entries.clone());
            }
        }

        let entries = self.read_from_disk()?;
        *cache = Some(CachedIndex {
            modified,
            entries: entries.clone(),
        });
        Ok(entries)
    }

    /// Write the whole map pretty-printed and refresh the cache.
    pub fn save(&self, entries: &EntryMap) -> Result<(), StoreError> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| StoreError::io(parent, e))?;
        }
        let json = serde_json::to_string_pretty(entries)?;
        std::fs::write(&self.path, json).map_err(|e| StoreError::io(&self.path, e))?;

        let modified = std::fs::metadata(&self.path)
            .and_then(|m| m.modified())
            .map_err(|e| StoreError::io(&self.path, e))?;
        *self.cache.lock().unwrap() = Some(CachedIndex {
            modified,
            entries: entries.clone(),
        });
        Ok(())
    }

    /// Read-modify-write with the cache bypassed on the read side.
    pub fn update<F>(&self, mutator: F) -> Result<(), StoreError>
    where
        F: FnOnce(&mut EntryMap),
    {
        let mut entries = self.read_from_disk()?;
        mutator(&mut entries);
        self.save(&entries)
    }

    /// Merge a patch into the entry for `key`, creating it (with a fresh id
    /// and derived filename) if absent. Returns the resulting entry.
    pub fn upsert_meta(
        &self,
        key: &SessionKey,
        patch: SessionMetaPatch,
    ) -> Result<SessionEntry, StoreError> {
        let mut entries = self.read_from_disk()?;
        let now = Utc::now().timestamp_millis();

        let entry = entries
            .entry(key.to_string())
            .or_insert_with(|| SessionEntry {
                session_id: Uuid::new_v4().to_string(),
                updated_at: now,
                session_file: format!("{}.jsonl", key.slug()),
                last_channel: None,
                last_to: None,
                chat_type: None,
                model: None,
                total_tokens: None,
                extra: None,
            });

        if let Some(v) = patch.last_channel {
            entry.last_channel = Some(v);
        }
        if let Some(v) = patch.last_to {
            entry.last_to = Some(v);
        }
        if let Some(v) = patch.chat_type {
            entry.chat_type = Some(v);
        }
        if let Some(v) = patch.model {
            entry.model = Some(v);
        }
        if let Some(v) = patch.total_tokens {
            entry.total_tokens = Some(v);
        }
        if let Some(v) = patch.extra {
            entry.extra = Some(v);
        }
        entry.updated_at = now;

        let result = entry.clone();
        self.save(&entries)?;
        Ok(result)
    }

    /// Remove an entry; reports whether it was present.
    pub fn delete(&self, key: &SessionKey) -> Result<bool, StoreError> {
        let mut entries = self.read_from_disk()?;
        let removed = entries.remove(&key.to_string()).is_some();
        if removed {
            self.save(&entries)?;
        }
        Ok(removed)
    }

    /// All known session keys.
    pub fn list(&self) -> Result<Vec<String>, StoreError> {
        Ok(self.load()?.keys().cloned().collect())
    }

    /// Drop entries older than `max_age_ms`; returns how many were removed.
    pub fn prune(&self, max_age_ms: i64) -> Result<usize, StoreError> {
        let cutoff = Utc::now().timestamp_millis() - max_age_ms;
        let mut entries = self.read_from_disk()?;
        let before = entries.len();
        entries.retain(|_, e| e.updated_at >= cutoff);
        let pruned = before - entries.len();
        if pruned > 0 {
            debug!(pruned, "Pruned stale session entries");
            self.save(&entries)?;
        }
        Ok(pruned)
    }

    fn read_from_disk(&self) -> Result<EntryMap, StoreError> {
        let content = match std::fs::read_to_string(&self.path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(EntryMap::new()),
            Err(e) => return Err(StoreError::io(&self.path, e)),
        };

        match serde_json::from_str::<EntryMap>(&content) {
            Ok(entries) => Ok(entries),
            Err(e) => {
                let backup = self.path.with_extension(format!(
                    "json.bak.{}",
                    Utc::now().timestamp_millis()
                ));
                warn!(
                    path = %self.path.display(),
                    backup = %backup.display(),
                    error = %e,
                    "Corrupt session index, preserving and starting empty"
                );
                if let Err(rename_err) = std::fs::rename(&self.path, &backup) {
                    warn!(error = %rename_err, "Failed to preserve corrupt index");
                }
                *self.cache.lock().unwrap() = None;
                Ok(EntryMap::new())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use myclaw_core::session::{PeerKind, SessionKeyParams};

    fn test_key(peer: &str) -> SessionKey {
        SessionKey::build(SessionKeyParams {
            agent: "main",
            channel: "cli",
            account: "default",
            peer_kind: Some(PeerKind::Direct),
            peer_id: peer,
        })
    }

    #[test]
    fn load_missing_returns_empty() {
        let dir = tempfile::tempdir().unwrap();
        let index = SessionIndex::new(dir.path());
        assert!(index.load().unwrap().is_empty());
    }

    #[test]
    fn upsert_creates_then_merges() {
        let dir = tempfile::tempdir().unwrap();
        let index = SessionIndex::new(dir.path());
        let key = test_key("alice");

        let created = index
            .upsert_meta(
                &key,
                SessionMetaPatch {
                    model: Some("m1".into()),
                    ..Default::default()
                },
            )
            .unwrap();
        assert_eq!(created.session_file, format!("{}.jsonl", key.slug()));
        assert_eq!(created.model.as_deref(), Some("m1"));

        let merged = index
            .upsert_meta(
                &key,
                SessionMetaPatch {
                    total_tokens: Some(150),
                    ..Default::default()
                },
            )
            .unwrap();
        // Identifier and filename are immutable; previous fields survive.
        assert_eq!(merged.session_id, created.session_id);
        assert_eq!(merged.model.as_deref(), Some("m1"));
        assert_eq!(merged.total_tokens, Some(150));
        assert!(merged.updated_at >= created.updated_at);
    }

    #[test]
    fn load_returns_defensive_copy() {
        let dir = tempfile::tempdir().unwrap();
        let index = SessionIndex::new(dir.path());
        let key = test_key("bob");
        index.upsert_meta(&key, SessionMetaPatch::default()).unwrap();

        let mut first = index.load().unwrap();
        first.get_mut(&key.to_string()).unwrap().model = Some("mutated".into());

        let second = index.load().unwrap();
        assert_eq!(second.get(&key.to_string()).unwrap().model, None);
    }

    #[test]
    fn corrupt_index_preserved_as_backup() {
        let dir = tempfile::tempdir().unwrap();
        let index = SessionIndex::new(dir.path());
        std::fs::write(index.path(), "{ this is not json").unwrap();

        assert!(index.load().unwrap().is_empty());

        let backups: Vec<_> = std::fs::read_dir(dir.path())
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name().to_string_lossy().contains(".bak."))
            .collect();
        assert_eq!(backups.len(), 1);
    }

    #[test]
    fn delete_reports_presence() {
        let dir = tempfile::tempdir().unwrap();
        let index = SessionIndex::new(dir.path());
        let key = test_key("carol");
        index.upsert_meta(&key, SessionMetaPatch::default()).unwrap();

        assert!(index.delete(&key).unwrap());
        assert!(!index.delete(&key).unwrap());
    }

    #[test]
    fn prune_removes_stale_entries() {
        let dir = tempfile::tempdir().unwrap();
        let index = SessionIndex::new(dir.path());
        index
            .upsert_meta(&test_key("old"), SessionMetaPatch::default())
            .unwrap();

        index
            .update(|entries| {
                for entry in entries.values_mut() {
                    entry.updated_at = 0;
                }
            })
            .unwrap();
        index
            .upsert_meta(&test_key("fresh"), SessionMetaPatch::default())
            .unwrap();

        let pruned = index.prune(60_000).unwrap();
        assert_eq!(pruned, 1);
        let keys = index.list().unwrap();
        assert_eq!(keys.len(), 1);
        assert!(keys[0].contains("fresh"));
    }

    #[test]
    fn index_file_is_pretty_printed() {
        let dir = tempfile::tempdir().unwrap();
        let index = SessionIndex::new(dir.path());
        index
            .upsert_meta(&test_key("dave"), SessionMetaPatch::default())
            .unwrap();

        let content = std::fs::read_to_string(index.path()).unwrap();
        assert!(content.contains('\n'));
        assert!(content.contains("sessionId"));
        assert!(content.contains("sessionFile"));
    }
}
