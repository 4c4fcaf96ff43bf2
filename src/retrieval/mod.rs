//! Evidence retrieval capability: `retrieve(query, top_k) -> passages`.
//!
//! `Retriever` is an enum over backends, mirroring `LlmProvider`. Backends
//! are read-only once built and safe to share across concurrent infilling
//! runs; clones are cheap handles.

#[cfg(feature = "fts-index")]
pub mod fts;

use std::sync::{Arc, Mutex};

use thiserror::Error;

use crate::config::RetrievalConfig;

#[derive(Debug, Error)]
pub enum RetrievalError {
    #[error("unknown retrieval backend: {0}")]
    UnknownBackend(String),
    #[error("evidence index error: {0}")]
    Index(String),
    #[error("retrieval failed: {0}")]
    Request(String),
}

#[derive(Debug, Clone)]
pub enum Retriever {
    Static(StaticRetriever),
    #[cfg(feature = "fts-index")]
    Fts(fts::EvidenceStore),
}

impl Retriever {
    /// Ranked passage texts for `query`, best first, at most `top_k`.
    pub async fn retrieve(&self, query: &str, top_k: usize) -> Result<Vec<String>, RetrievalError> {
        match self {
            Retriever::Static(r) => r.retrieve(query, top_k),
            #[cfg(feature = "fts-index")]
            Retriever::Fts(store) => {
                let store = store.clone();
                let query = query.to_string();
                tokio::task::spawn_blocking(move || store.search(&query, top_k))
                    .await
                    .map_err(|e| RetrievalError::Request(format!("search task failed: {e}")))?
                    .map(|hits| hits.into_iter().map(|hit| hit.text).collect())
            }
        }
    }

    /// Shorthand for a retriever that always answers with `passages`.
    pub fn fixed<I, S>(passages: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Retriever::Static(StaticRetriever::new(passages))
    }

    pub fn name(&self) -> &'static str {
        match self {
            Retriever::Static(_) => "static",
            #[cfg(feature = "fts-index")]
            Retriever::Fts(_) => "fts",
        }
    }
}

/// Construct the configured backend.
pub fn build(config: &RetrievalConfig) -> Result<Retriever, RetrievalError> {
    match config.backend.as_str() {
        "static" => Ok(Retriever::fixed(config.passages.iter().cloned())),
        #[cfg(feature = "fts-index")]
        "fts" => fts::EvidenceStore::open(&config.index_dir).map(Retriever::Fts),
        other => Err(RetrievalError::UnknownBackend(other.to_string())),
    }
}

// ── Static backend ────────────────────────────────────────────────────────────

#[derive(Debug, Default)]
struct StaticState {
    queries: Vec<String>,
    failure: Option<String>,
}

/// Returns the same passages for every query, truncated to `top_k`.
///
/// Used for offline runs from `[retrieval] passages` and as a test double;
/// it records every query it receives.
#[derive(Debug, Clone, Default)]
pub struct StaticRetriever {
    passages: Arc<Vec<String>>,
    state: Arc<Mutex<StaticState>>,
}

impl StaticRetriever {
    pub fn new<I, S>(passages: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            passages: Arc::new(passages.into_iter().map(Into::into).collect()),
            state: Arc::default(),
        }
    }

    /// A retriever whose every call fails with `message`.
    pub fn failing(message: impl Into<String>) -> Self {
        let r = Self::default();
        if let Ok(mut state) = r.state.lock() {
            state.failure = Some(message.into());
        }
        r
    }

    /// Queries received so far, in call order.
    pub fn queries(&self) -> Vec<String> {
        self.state.lock().map(|s| s.queries.clone()).unwrap_or_default()
    }

    fn retrieve(&self, query: &str, top_k: usize) -> Result<Vec<String>, RetrievalError> {
        let mut state = self
            .state
            .lock()
            .map_err(|_| RetrievalError::Request("static retriever lock poisoned".into()))?;
        state.queries.push(query.to_string());
        if let Some(message) = &state.failure {
            return Err(RetrievalError::Request(message.clone()));
        }
        Ok(self.passages.iter().take(top_k).cloned().collect())
    }
}
