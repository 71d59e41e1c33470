//! Failover classification and the credential profile chain.
//!
//! Classification maps a provider failure to a recovery category. Status
//! codes win over message patterns, and the context-overflow pattern is
//! tested before the timeout pattern so "prompt is too long" never reads as
//! a network problem.
//!
//! The profile chain tracks per-credential cooldowns for the duration of one
//! run: exponential backoff on failure (doubling, capped at 60 s), reset to
//! the initial window on success.

use serde::{Deserialize, Serialize};
use tokio::time::Instant;

use myclaw_core::error::ProviderError;

/// Initial cooldown window after a profile's first failure.
pub const INITIAL_COOLDOWN_MS: u64 = 1_000;
/// Backoff ceiling.
pub const MAX_COOLDOWN_MS: u64 = 60_000;

const OVERFLOW_PATTERNS: &[&str] = &[
    "context_length_exceeded",
    "too many tokens",
    "token limit",
    "maximum context",
    "prompt is too long",
    "request too large",
    "max_tokens",
];

const TIMEOUT_PATTERNS: &[&str] = &[
    "timeout",
    "timed out",
    "etimedout",
    "econnreset",
    "econnaborted",
    "socket hang up",
    "network error",
];

const QUOTA_PATTERNS: &[&str] = &[
    "quota",
    "exceeded your current",
    "insufficient_quota",
    "billing hard limit",
];

/// What kind of failure a provider error represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    Auth,
    RateLimit,
    Billing,
    Timeout,
    Quota,
    ContextOverflow,
    Unknown,
}

impl FailureKind {
    /// Whether rotating to another credential is worth trying.
    ///
    /// Overflow takes the recovery path instead of rotation; quota and
    /// unknown failures are terminal.
    pub fn is_retriable(&self) -> bool {
        matches!(
            self,
            Self::Auth | Self::RateLimit | Self::Billing | Self::Timeout
        )
    }
}

impl std::fmt::Display for FailureKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Auth => "auth",
            Self::RateLimit => "rate_limit",
            Self::Billing => "billing",
            Self::Timeout => "timeout",
            Self::Quota => "quota",
            Self::ContextOverflow => "context_overflow",
            Self::Unknown => "unknown",
        };
        f.write_str(s)
    }
}

/// Classify a provider failure.
pub fn classify_failure(error: &ProviderError) -> FailureKind {
    if let Some(status) = error.status() {
        match status {
            401 | 403 => return FailureKind::Auth,
            429 => return FailureKind::RateLimit,
            402 => return FailureKind::Billing,
            s if s >= 500 => return FailureKind::Timeout,
            _ => {}
        }
    }
    if matches!(error, ProviderError::Timeout(_)) {
        return FailureKind::Timeout;
    }
    classify_message(&error.message())
}

fn classify_message(message: &str) -> FailureKind {
    let lower = message.to_lowercase();
    if OVERFLOW_PATTERNS.iter().any(|p| lower.contains(p)) {
        FailureKind::ContextOverflow
    } else if TIMEOUT_PATTERNS.iter().any(|p| lower.contains(p)) {
        FailureKind::Timeout
    } else if QUOTA_PATTERNS.iter().any(|p| lower.contains(p)) {
        FailureKind::Quota
    } else {
        FailureKind::Unknown
    }
}

/// A single named credential.
#[derive(Debug, Clone)]
pub struct CredentialProfile {
    pub id: String,
    pub api_key: String,
}

/// Per-profile cooldown state, held only for the duration of one run.
#[derive(Debug, Clone)]
pub struct ProfileState {
    pub cooldown_ms: u64,
    pub failed_at: Option<Instant>,
}

impl ProfileState {
    pub fn new() -> Self {
        Self {
            cooldown_ms: INITIAL_COOLDOWN_MS,
            failed_at: None,
        }
    }

    /// Available when it has never failed, or its cooldown has elapsed.
    pub fn is_available(&self, now: Instant) -> bool {
        match self.failed_at {
            None => true,
            Some(failed_at) => {
                now.duration_since(failed_at).as_millis() as u64 >= self.cooldown_ms
            }
        }
    }

    /// Time left in the cooldown window. Zero when available.
    pub fn remaining(&self, now: Instant) -> std::time::Duration {
        match self.failed_at {
            None => std::time::Duration::ZERO,
            Some(failed_at) => {
                let elapsed = now.duration_since(failed_at);
                std::time::Duration::from_millis(self.cooldown_ms).saturating_sub(elapsed)
            }
        }
    }

    pub fn mark_failed(&mut self, now: Instant) {
        self.failed_at = Some(now);
        self.cooldown_ms = (self.cooldown_ms * 2).min(MAX_COOLDOWN_MS);
    }

    pub fn mark_good(&mut self) {
        self.failed_at = None;
        self.cooldown_ms = INITIAL_COOLDOWN_MS;
    }
}

impl Default for ProfileState {
    fn default() -> Self {
        Self::new()
    }
}

/// Rotate an index modulo the chain length.
pub fn next_index(cur: usize, n: usize) -> usize {
    (cur + 1) % n
}

/// The ordered credential chain for one run.
pub struct ProfileChain {
    profiles: Vec<CredentialProfile>,
    states: Vec<ProfileState>,
    current: usize,
}

impl ProfileChain {
    /// Build a fresh chain. An empty profile list gets a single anonymous
    /// default so key-less local endpoints still work.
    pub fn new(mut profiles: Vec<CredentialProfile>) -> Self {
        if profiles.is_empty() {
            profiles.push(CredentialProfile {
                id: "default".into(),
                api_key: String::new(),
            });
        }
        let states = profiles.iter().map(|_| ProfileState::new()).collect();
        Self {
            profiles,
            states,
            current: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.profiles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.profiles.is_empty()
    }

    pub fn current_index(&self) -> usize {
        self.current
    }

    pub fn profile(&self, index: usize) -> &CredentialProfile {
        &self.profiles[index]
    }

    pub fn current_profile(&self) -> &CredentialProfile {
        &self.profiles[self.current]
    }

    /// Find the first available profile starting at the current index,
    /// rotating through the chain. Updates the current index on a hit.
    pub fn select_available(&mut self, now: Instant) -> Option<usize> {
        let n = self.len();
        let mut idx = self.current;
        for _ in 0..n {
            if self.states[idx].is_available(now) {
                self.current = idx;
                return Some(idx);
            }
            idx = next_index(idx, n);
        }
        None
    }

    /// The shortest remaining cooldown across the chain — how long to sleep
    /// when nothing is available.
    pub fn shortest_wait(&self, now: Instant) -> std::time::Duration {
        self.states
            .iter()
            .map(|s| s.remaining(now))
            .min()
            .unwrap_or(std::time::Duration::ZERO)
    }

    pub fn mark_failed(&mut self, index: usize, now: Instant) {
        self.states[index].mark_failed(now);
    }

    pub fn mark_good(&mut self, index: usize) {
        self.states[index].mark_good();
    }

    /// Move to the next profile in configured order.
    pub fn advance(&mut self) {
        self.current = next_index(self.current, self.len());
    }

    #[cfg(test)]
    pub(crate) fn state(&self, index: usize) -> &ProfileState {
        &self.states[index]
    }
}
