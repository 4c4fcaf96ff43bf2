//! Claim → graph → infilled graph, for one claim or a bounded batch.
//!
//! Each claim owns its own resolution run; nothing mutable is shared across
//! claims. [`run_batch`] caps in-flight claims with a semaphore, records
//! per-claim failures instead of aborting, and stops scheduling on
//! cancellation. Cancelling drops a claim's run, which aborts its pending
//! retrieval and query tasks.

use std::sync::Arc;

use serde::Serialize;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::graph::{Graph, GraphConstructor};
use crate::infill::{InfillEngine, InfillError, InfillLogEntry};
use crate::llm::LlmProvider;
use crate::prompt::Prompts;
use crate::retrieval::Retriever;

/// A claim plus an optional explicit resolution path.
#[derive(Debug, Clone)]
pub struct ClaimRequest {
    pub claim: String,
    /// `None` resolves every defined placeholder in definition order.
    pub path: Option<Vec<String>>,
}

impl ClaimRequest {
    pub fn new(claim: impl Into<String>) -> Self {
        Self { claim: claim.into(), path: None }
    }

    pub fn with_path(mut self, path: Vec<String>) -> Self {
        self.path = Some(path);
        self
    }
}

/// Everything one successful run produced.
#[derive(Debug, Clone, Serialize)]
pub struct ClaimReport {
    pub claim: String,
    pub path: Vec<String>,
    /// Graph as parsed from the decomposition reply.
    pub constructed: Graph,
    /// Graph after infilling every placeholder on `path`.
    pub infilled: Graph,
    pub log: Vec<InfillLogEntry>,
}

#[derive(Debug, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ClaimOutcome {
    Completed(ClaimReport),
    Failed { claim: String, error: String },
    Cancelled { claim: String },
}

impl ClaimOutcome {
    pub fn claim(&self) -> &str {
        match self {
            ClaimOutcome::Completed(report) => &report.claim,
            ClaimOutcome::Failed { claim, .. } | ClaimOutcome::Cancelled { claim } => claim,
        }
    }
}

/// Placeholders with a definition, in definition order.
pub fn default_path(graph: &Graph) -> Vec<String> {
    graph.definitions().map(|(token, _)| token.to_string()).collect()
}

#[derive(Debug, Clone)]
pub struct Pipeline {
    constructor: GraphConstructor,
    engine: InfillEngine,
}

impl Pipeline {
    pub fn new(provider: LlmProvider, retriever: Retriever, prompts: Prompts, top_k: usize) -> Self {
        Self {
            constructor: GraphConstructor::new(provider.clone(), prompts.clone()),
            engine: InfillEngine::new(provider, retriever, prompts).with_top_k(top_k),
        }
    }

    /// Decompose `request.claim` and infill its latent entities.
    pub async fn check_claim(&self, request: ClaimRequest) -> Result<ClaimReport, InfillError> {
        let constructed = self.constructor.construct_claim(&request.claim).await?;
        let path = request.path.unwrap_or_else(|| default_path(&constructed));
        debug!(
            definitions = constructed.definition_triples().len(),
            triples = constructed.triples().len(),
            placeholders = ?constructed.placeholders(),
            path = ?path,
            "graph constructed"
        );

        let outcome = self.engine.run(&request.claim, constructed.clone(), path.clone()).await?;
        Ok(ClaimReport {
            claim: request.claim,
            path,
            constructed,
            infilled: outcome.graph,
            log: outcome.log,
        })
    }
}

/// Run every claim with at most `concurrency` in flight. Outcomes come back
/// in input order.
pub async fn run_batch(
    pipeline: Pipeline,
    requests: Vec<ClaimRequest>,
    concurrency: usize,
    shutdown: CancellationToken,
) -> Vec<ClaimOutcome> {
    let semaphore = Arc::new(Semaphore::new(concurrency.max(1)));
    let mut set: JoinSet<(usize, ClaimOutcome)> = JoinSet::new();
    let claims: Vec<String> = requests.iter().map(|r| r.claim.clone()).collect();

    for (idx, request) in requests.into_iter().enumerate() {
        let pipeline = pipeline.clone();
        let semaphore = semaphore.clone();
        let shutdown = shutdown.clone();
        set.spawn(async move {
            let claim = request.claim.clone();
            let outcome = tokio::select! {
                biased;
                _ = shutdown.cancelled() => ClaimOutcome::Cancelled { claim },
                outcome = check_with_permit(&pipeline, &semaphore, request) => outcome,
            };
            (idx, outcome)
        });
    }

    let mut outcomes: Vec<Option<ClaimOutcome>> = claims.iter().map(|_| None).collect();
    while let Some(res) = set.join_next().await {
        match res {
            Ok((idx, outcome)) => outcomes[idx] = Some(outcome),
            // Claim task panicked; its slot is filled below.
            Err(e) => error!("claim task panicked: {e}"),
        }
    }

    let outcomes: Vec<ClaimOutcome> = outcomes
        .into_iter()
        .zip(claims)
        .map(|(outcome, claim)| {
            outcome.unwrap_or_else(|| ClaimOutcome::Failed { claim, error: "claim task panicked".into() })
        })
        .collect();

    let failed = outcomes.iter().filter(|o| matches!(o, ClaimOutcome::Failed { .. })).count();
    let cancelled = outcomes.iter().filter(|o| matches!(o, ClaimOutcome::Cancelled { .. })).count();
    info!(total = outcomes.len(), failed, cancelled, "batch finished");
    outcomes
}

async fn check_with_permit(pipeline: &Pipeline, semaphore: &Semaphore, request: ClaimRequest) -> ClaimOutcome {
    let claim = request.claim.clone();
    let _permit = match semaphore.acquire().await {
        Ok(permit) => permit,
        Err(e) => return ClaimOutcome::Failed { claim, error: e.to_string() },
    };
    match pipeline.check_claim(request).await {
        Ok(report) => ClaimOutcome::Completed(report),
        Err(e) => {
            warn!(%claim, error = %e, "claim failed");
            ClaimOutcome::Failed { claim, error: e.to_string() }
        }
    }
}
