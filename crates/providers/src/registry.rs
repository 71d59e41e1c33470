//! Provider descriptor registry.
//!
//! Maps well-known provider names to their base URLs. Unknown names still
//! resolve: the caller's base URL (or an OpenAI-style default) is used so a
//! self-hosted endpoint works without registry changes.

use myclaw_core::provider::{ApiFlavor, ProviderDescriptor};

/// Well-known providers and their chat-completion base URLs.
const KNOWN_PROVIDERS: &[(&str, &str)] = &[
    ("anthropic", "https://api.anthropic.com/v1"),
    ("openai", "https://api.openai.com/v1"),
    ("openrouter", "https://openrouter.ai/api/v1"),
    ("ollama", "http://localhost:11434/v1"),
];

const FALLBACK_BASE_URL: &str = "https://api.openai.com/v1";

/// Resolve a descriptor from configuration.
///
/// An explicit `base_url` always wins; otherwise the registry's URL for the
/// named provider, or the OpenAI-style fallback for names the registry does
/// not know.
pub fn resolve_descriptor(
    provider: &str,
    model: &str,
    base_url: Option<&str>,
) -> ProviderDescriptor {
    let registered = KNOWN_PROVIDERS
        .iter()
        .find(|(name, _)| *name == provider)
        .map(|(_, url)| *url);

    let base_url = base_url
        .map(|u| u.trim_end_matches('/').to_string())
        .or_else(|| registered.map(String::from))
        .unwrap_or_else(|| FALLBACK_BASE_URL.to_string());

    ProviderDescriptor {
        name: provider.to_string(),
        model: model.to_string(),
        base_url,
        api: ApiFlavor::OpenAiCompat,
    }
}
