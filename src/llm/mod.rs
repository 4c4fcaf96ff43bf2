//! Text generation capability.
//!
//! `LlmProvider` is an enum over concrete backends. Each backend exposes a
//! single `complete(prompt) -> text` round-trip; the graph constructor and
//! the infilling engine never see wire types.
//!
//! Provider instances are shared immutable capabilities: clone them freely
//! into spawned tasks. Enum dispatch keeps `complete` a plain `async fn`
//! without trait objects.

pub mod providers;

use thiserror::Error;

use providers::dummy::DummyProvider;
use providers::openai_compatible::OpenAiCompatibleProvider;
use providers::scripted::ScriptedProvider;

// ── Error ─────────────────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("unknown provider: {0}")]
    UnknownProvider(String),
    #[error("provider request failed: {0}")]
    Request(String),
}

// ── Provider enum ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub enum LlmProvider {
    Dummy(DummyProvider),
    Scripted(ScriptedProvider),
    OpenAiCompatible(OpenAiCompatibleProvider),
}

impl LlmProvider {
    /// Send `prompt` as a single user message and return the reply text.
    ///
    /// Transient and fatal failures are not distinguished; callers decide
    /// whether to retry.
    pub async fn complete(&self, prompt: &str) -> Result<String, ProviderError> {
        match self {
            LlmProvider::Dummy(p) => p.complete(prompt).await,
            LlmProvider::Scripted(p) => p.complete(prompt).await,
            LlmProvider::OpenAiCompatible(p) => p.complete(prompt).await,
        }
    }

    /// Shorthand for a scripted provider replying with `replies` in order.
    pub fn scripted<I, S>(replies: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        LlmProvider::Scripted(ScriptedProvider::new(replies))
    }

    pub fn name(&self) -> &'static str {
        match self {
            LlmProvider::Dummy(_) => "dummy",
            LlmProvider::Scripted(_) => "scripted",
            LlmProvider::OpenAiCompatible(_) => "openai",
        }
    }
}
