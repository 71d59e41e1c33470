//! LLM provider plumbing for MyClaw.
//!
//! `registry` resolves (provider name, model id, base URL) into a
//! `ProviderDescriptor`; `openai_compat` is the HTTP client speaking the
//! OpenAI-compatible chat-completions dialect most services expose.

pub mod openai_compat;
pub mod registry;

pub use openai_compat::OpenAiCompatProvider;
pub use registry::resolve_descriptor;
