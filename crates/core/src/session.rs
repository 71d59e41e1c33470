//! Session keys — the canonical identity of a conversation context.
//!
//! A key names the agent, the channel the message arrived on, the account it
//! belongs to, and the peer (direct chat, group, or broadcast channel):
//!
//! ```text
//! agent:<agent>:channel:<channel>:account:<account>:peer:<kind>:<peer-id>
//! ```
//!
//! Every segment is normalised before assembly so that two messages from the
//! same conversation always map to the same key, and therefore the same
//! transcript file on disk.

use serde::{Deserialize, Serialize};

use crate::error::SessionKeyError;

/// Maximum length of a single normalised segment, in code points.
const SEGMENT_MAX: usize = 128;

/// The kind of peer a session is bound to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PeerKind {
    Direct,
    Group,
    Channel,
}

impl PeerKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Direct => "direct",
            Self::Group => "group",
            Self::Channel => "channel",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "direct" => Some(Self::Direct),
            "group" => Some(Self::Group),
            "channel" => Some(Self::Channel),
            _ => None,
        }
    }
}

impl std::fmt::Display for PeerKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The five normalised fields of a session key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionKey {
    pub agent: String,
    pub channel: String,
    pub account: String,
    pub peer_kind: PeerKind,
    pub peer_id: String,
}

/// Raw, un-normalised inputs for building a key.
#[derive(Debug, Clone, Default)]
pub struct SessionKeyParams<'a> {
    pub agent: &'a str,
    pub channel: &'a str,
    pub account: &'a str,
    pub peer_kind: Option<PeerKind>,
    pub peer_id: &'a str,
}

impl SessionKey {
    /// Build a key from raw parts, normalising every segment.
    pub fn build(params: SessionKeyParams<'_>) -> Self {
        Self {
            agent: normalize_segment(params.agent, "main"),
            channel: normalize_segment(params.channel, "unknown"),
            account: normalize_segment(params.account, "default"),
            peer_kind: params.peer_kind.unwrap_or(PeerKind::Direct),
            peer_id: normalize_segment(params.peer_id, "unknown"),
        }
    }

    /// Parse a canonical key string back into its five fields.
    ///
    /// The peer identifier is everything after the `peer:<kind>:` prefix and
    /// may itself contain `:` separators.
    pub fn parse(s: &str) -> Result<Self, SessionKeyError> {
        let malformed = || SessionKeyError(s.to_string());

        let rest = s.strip_prefix("agent:").ok_or_else(malformed)?;
        let (agent, rest) = split_marker(rest, ":channel:").ok_or_else(malformed)?;
        let (channel, rest) = split_marker(rest, ":account:").ok_or_else(malformed)?;
        let (account, rest) = split_marker(rest, ":peer:").ok_or_else(malformed)?;
        let (kind, peer_id) = rest.split_once(':').ok_or_else(malformed)?;
        let peer_kind = PeerKind::parse(kind).ok_or_else(malformed)?;

        if agent.is_empty() || channel.is_empty() || account.is_empty() || peer_id.is_empty() {
            return Err(malformed());
        }

        Ok(Self {
            agent: agent.to_string(),
            channel: channel.to_string(),
            account: account.to_string(),
            peer_kind,
            peer_id: peer_id.to_string(),
        })
    }

    /// The filesystem-safe form of this key: every `:` becomes `__`.
    pub fn slug(&self) -> String {
        self.to_string().replace(':', "__")
    }
}

impl std::fmt::Display for SessionKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "agent:{}:channel:{}:account:{}:peer:{}:{}",
            self.agent, self.channel, self.account, self.peer_kind, self.peer_id
        )
    }
}

fn split_marker<'a>(s: &'a str, marker: &str) -> Option<(&'a str, &'a str)> {
    let pos = s.find(marker)?;
    Some((&s[..pos], &s[pos + marker.len()..]))
}

/// Normalise one key segment: trim, lowercase, collapse whitespace runs to
/// `_`, strip anything outside `[a-z0-9_.@+:-]`, clamp to 128 code points.
/// An empty result falls back to the segment-specific default.
pub fn normalize_segment(raw: &str, fallback: &str) -> String {
    let mut out = String::with_capacity(raw.len().min(SEGMENT_MAX));
    let mut pending_space = false;

    for ch in raw.trim().chars() {
        if ch.is_whitespace() {
            pending_space = true;
            continue;
        }
        for lower in ch.to_lowercase() {
            if matches!(lower, 'a'..='z' | '0'..='9' | '_' | '.' | '@' | '+' | ':' | '-') {
                if pending_space && !out.is_empty() {
                    out.push('_');
                }
                pending_space = false;
                out.push(lower);
            }
        }
    }

    let clamped: String = out.chars().take(SEGMENT_MAX).collect();
    if clamped.is_empty() {
        fallback.to_string()
    } else {
        clamped
    }
}
