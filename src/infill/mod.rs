//! Latent entity infilling.
//!
//! [`InfillEngine::run`] walks a resolution path and replaces one
//! placeholder per step with a model answer grounded in retrieved evidence:
//!
//! ```text
//! LoopCheck ──(index == path.len())──► Done
//!     │
//!     ▼
//!  Fanout ──► retrieval query + retrieve ─┐
//!     │                                   ├─► Join ──► Resolve ──► LoopCheck
//!     └─────► infill query ───────────────┘
//! ```
//!
//! The two fan-out branches run as separate tasks and are joined by a 2-of-2
//! barrier. Dropping a run aborts both. Any provider, retrieval or task
//! failure fails the whole run; the engine never retries and never returns a
//! partial graph.

pub mod context;
pub mod query;

use thiserror::Error;
use tokio::task::JoinError;
use tokio_util::task::AbortOnDropHandle;
use tracing::{debug, info};

use crate::graph::Graph;
use crate::llm::{LlmProvider, ProviderError};
use crate::prompt::Prompts;
use crate::retrieval::{RetrievalError, Retriever};

pub use context::{InfillLogEntry, ResolutionContext};
pub use query::{BLANK_TOKEN, build_infill_query, build_retrieval_query};

/// Passages requested per retrieval call unless configured otherwise.
pub const DEFAULT_TOP_K: usize = 10;

/// Leading phrase some models put before the filled entity.
const BLANK_PREFIX: &str = "blank is";

#[derive(Debug, Error)]
pub enum InfillError {
    #[error(transparent)]
    Provider(#[from] ProviderError),
    #[error(transparent)]
    Retrieval(#[from] RetrievalError),
    #[error("infill task failed: {0}")]
    Task(String),
}

impl From<JoinError> for InfillError {
    fn from(e: JoinError) -> Self {
        InfillError::Task(e.to_string())
    }
}

/// Final state of a completed run.
#[derive(Debug, Clone)]
pub struct InfillOutcome {
    pub graph: Graph,
    pub log: Vec<InfillLogEntry>,
}

enum State {
    LoopCheck(ResolutionContext),
    Fanout(ResolutionContext),
    Join {
        ctx: ResolutionContext,
        evidence: AbortOnDropHandle<Result<String, RetrievalError>>,
        query: AbortOnDropHandle<String>,
    },
    Resolve {
        ctx: ResolutionContext,
        evidence: String,
        query: String,
    },
    Done(ResolutionContext),
}

/// Shared, cheaply cloneable infilling capability.
#[derive(Debug, Clone)]
pub struct InfillEngine {
    provider: LlmProvider,
    retriever: Retriever,
    prompts: Prompts,
    top_k: usize,
}

impl InfillEngine {
    pub fn new(provider: LlmProvider, retriever: Retriever, prompts: Prompts) -> Self {
        Self { provider, retriever, prompts, top_k: DEFAULT_TOP_K }
    }

    pub fn with_top_k(mut self, top_k: usize) -> Self {
        self.top_k = top_k;
        self
    }

    /// Resolve every placeholder on `path`, in order.
    pub async fn run(&self, claim: &str, graph: Graph, path: Vec<String>) -> Result<InfillOutcome, InfillError> {
        debug!(steps = path.len(), "infilling started");
        let mut state = State::LoopCheck(ResolutionContext::new(claim, graph, path));
        loop {
            state = match state {
                State::LoopCheck(ctx) => self.loop_check(ctx),
                State::Fanout(ctx) => self.fanout(ctx),
                State::Join { ctx, evidence, query } => join(ctx, evidence, query).await?,
                State::Resolve { ctx, evidence, query } => self.resolve(ctx, evidence, query).await?,
                State::Done(ctx) => {
                    info!(claim = %ctx.claim, resolved = ctx.infilling_index, "infilling finished");
                    let graph = std::sync::Arc::unwrap_or_clone(ctx.graph);
                    return Ok(InfillOutcome { graph, log: ctx.log });
                }
            };
        }
    }

    fn loop_check(&self, ctx: ResolutionContext) -> State {
        if ctx.is_finished() {
            return State::Done(ctx);
        }
        match ctx.advance_target() {
            Ok(ctx) => {
                debug!(index = ctx.infilling_index, target = ?ctx.current_target, "next latent entity");
                State::Fanout(ctx)
            }
            Err(ctx) => State::Done(ctx),
        }
    }

    fn fanout(&self, ctx: ResolutionContext) -> State {
        let target = ctx.current_target.clone().unwrap_or_default();

        let evidence = {
            let graph = ctx.graph.clone();
            let target = target.clone();
            let retriever = self.retriever.clone();
            let top_k = self.top_k;
            AbortOnDropHandle::new(tokio::spawn(async move {
                let retrieval_query = build_retrieval_query(&graph, &target);
                debug!(%target, query = %retrieval_query, "retrieving evidence");
                let passages = retriever.retrieve(&retrieval_query, top_k).await?;
                debug!(%target, passages = passages.len(), "evidence retrieved");
                Ok::<_, RetrievalError>(passages.join("\n"))
            }))
        };

        let query = {
            let graph = ctx.graph.clone();
            AbortOnDropHandle::new(tokio::spawn(async move { build_infill_query(&graph, &target) }))
        };

        State::Join { ctx, evidence, query }
    }

    async fn resolve(&self, ctx: ResolutionContext, evidence: String, query: String) -> Result<State, InfillError> {
        let target = ctx.current_target.clone().unwrap_or_default();
        let prompt = self.prompts.infill(&evidence, &query);
        let raw = self.provider.complete(&prompt).await?;

        let answer = parse_answer(&raw).unwrap_or_else(|| {
            let fallback = ctx.graph.definition(&target).unwrap_or(target.as_str()).to_string();
            debug!(%target, %fallback, "empty answer, using definition");
            fallback
        });
        info!(index = ctx.infilling_index, %target, %answer, "latent entity resolved");

        Ok(State::LoopCheck(ctx.apply_answer(&target, query, answer)))
    }
}

async fn join(
    ctx: ResolutionContext,
    evidence: AbortOnDropHandle<Result<String, RetrievalError>>,
    query: AbortOnDropHandle<String>,
) -> Result<State, InfillError> {
    let (evidence, query) = tokio::try_join!(
        async { Ok::<_, InfillError>(evidence.await??) },
        async { Ok::<_, InfillError>(query.await?) },
    )?;
    Ok(State::Resolve { ctx, evidence, query })
}

/// Extract the filled entity from a raw model reply: drop a leading
/// `blank is` (any case), trim, keep the first line. `None` for a blank
/// reply, including a bare `blank is`.
pub fn parse_answer(raw: &str) -> Option<String> {
    let mut answer = raw.trim();
    if let Some(rest) = strip_blank_prefix(answer) {
        answer = rest.trim();
    }
    answer.lines().next().map(str::trim).filter(|line| !line.is_empty()).map(str::to_string)
}

/// `Some(rest)` when `answer` starts with [`BLANK_PREFIX`] as whole words.
fn strip_blank_prefix(answer: &str) -> Option<&str> {
    let head = answer.get(..BLANK_PREFIX.len())?;
    let rest = &answer[BLANK_PREFIX.len()..];
    let whole_word = rest.is_empty() || rest.starts_with(char::is_whitespace);
    (head.eq_ignore_ascii_case(BLANK_PREFIX) && whole_word).then_some(rest)
}
