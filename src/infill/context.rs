//! Per-run resolution state, threaded by value through the engine.

use std::sync::Arc;

use serde::Serialize;

use crate::graph::{Graph, Triple, placeholder};

/// One resolve step, appended after every answer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InfillLogEntry {
    pub index: usize,
    pub target: String,
    /// The fill-in query the model answered.
    pub query: String,
    pub answer: String,
}

/// Owned by exactly one infilling run. Every transition consumes the context
/// and returns the next one; the graph is swapped, never edited, so spawned
/// branches that hold the previous `Arc<Graph>` keep a consistent snapshot.
#[derive(Debug, Clone)]
pub struct ResolutionContext {
    pub claim: String,
    pub path: Vec<String>,
    pub graph: Arc<Graph>,
    /// Definition lines with every resolved placeholder substituted.
    pub definition_texts: Vec<String>,
    /// Triple lines with every resolved placeholder substituted.
    pub triple_texts: Vec<String>,
    pub infilling_index: usize,
    pub current_target: Option<String>,
    pub log: Vec<InfillLogEntry>,
}

impl ResolutionContext {
    pub fn new(claim: impl Into<String>, graph: Graph, path: Vec<String>) -> Self {
        let definition_texts = graph.definition_triples().iter().map(|t| t.raw_text().to_string()).collect();
        let triple_texts = graph.triples().iter().map(|t| t.raw_text().to_string()).collect();
        Self {
            claim: claim.into(),
            path,
            graph: Arc::new(graph),
            definition_texts,
            triple_texts,
            infilling_index: 0,
            current_target: None,
            log: Vec::new(),
        }
    }

    pub fn is_finished(&self) -> bool {
        self.infilling_index >= self.path.len()
    }

    /// Point `current_target` at the next path entry, or hand the context
    /// back unchanged as `Err` once the path is exhausted.
    pub fn advance_target(mut self) -> Result<Self, Self> {
        match self.path.get(self.infilling_index).cloned() {
            Some(target) => {
                self.current_target = Some(target);
                Ok(self)
            }
            None => Err(self),
        }
    }

    /// Substitute `answer` for `target`, rebuild the graph, log the step and
    /// move the cursor forward.
    pub fn apply_answer(mut self, target: &str, query: String, answer: String) -> Self {
        self.definition_texts = self
            .definition_texts
            .iter()
            .map(|text| placeholder::substitute(text, target, &answer))
            .collect();
        self.triple_texts = self
            .triple_texts
            .iter()
            .map(|text| placeholder::substitute(text, target, &answer))
            .collect();

        let remaining: Vec<Triple> = self
            .definition_texts
            .iter()
            .filter(|text| is_unresolved_definition(text))
            .map(|text| Triple::parse(text))
            .collect();
        let triples = self.triple_texts.iter().map(|text| Triple::parse(text)).collect();
        self.graph = Arc::new(Graph::new(remaining, triples));

        self.log.push(InfillLogEntry {
            index: self.infilling_index,
            target: target.to_string(),
            query,
            answer,
        });
        self.infilling_index += 1;
        self.current_target = None;
        self
    }
}

/// A definition is still open while its subject is a placeholder.
fn is_unresolved_definition(text: &str) -> bool {
    text.split_whitespace().next().is_some_and(placeholder::contains_any)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn two_entity_context() -> ResolutionContext {
        let graph = Graph::from_texts(
            ["(ENT1) [SEP] is [SEP] a musician", "(ENT2) [SEP] is [SEP] a band"],
            [
                "(ENT1) [SEP] is part of [SEP] Tall Birds",
                "(ENT1) [SEP] is a percussionist for [SEP] (ENT2)",
            ],
        );
        ResolutionContext::new("claim", graph, vec!["(ENT1)".into(), "(ENT2)".into()])
    }

    #[test]
    fn advance_sets_target_until_exhausted() {
        let ctx = two_entity_context().advance_target().unwrap();
        assert_eq!(ctx.current_target.as_deref(), Some("(ENT1)"));

        let mut done = two_entity_context();
        done.infilling_index = 2;
        assert!(done.is_finished());
        assert!(done.advance_target().is_err());
    }

    #[test]
    fn apply_answer_rebuilds_graph() {
        let ctx = two_entity_context().apply_answer("(ENT1)", "q".into(), "Ben Smith".into());
        assert_eq!(ctx.infilling_index, 1);
        assert_eq!(ctx.graph.definition_triples().len(), 1);
        assert_eq!(ctx.graph.definition("(ENT2)"), Some("a band"));
        assert_eq!(ctx.graph.triples()[0].sentence(), "Ben Smith is part of Tall Birds");
        assert_eq!(ctx.definition_texts[0], "Ben Smith [SEP] is [SEP] a musician");
        assert_eq!(ctx.log.len(), 1);
        assert_eq!(ctx.log[0].answer, "Ben Smith");
    }

    #[test]
    fn last_answer_leaves_no_definitions() {
        let ctx = two_entity_context()
            .apply_answer("(ENT1)", "q1".into(), "Ben Smith".into())
            .apply_answer("(ENT2)", "q2".into(), "Tall Birds".into());
        assert!(ctx.graph.definition_triples().is_empty());
        assert_eq!(ctx.graph.triples().len(), 2);
        assert!(ctx.graph.is_grounded());
        assert_eq!(ctx.log.iter().map(|e| e.index).collect::<Vec<_>>(), vec![0, 1]);
    }

    #[test]
    fn resolved_value_never_touches_longer_tokens() {
        let graph = Graph::from_texts(
            ["(ENT1) [SEP] is [SEP] a city", "(ENT10) [SEP] is [SEP] a river"],
            ["(ENT10) [SEP] flows through [SEP] (ENT1)"],
        );
        let ctx = ResolutionContext::new("c", graph, vec!["(ENT1)".into()])
            .apply_answer("(ENT1)", "q".into(), "X".into());
        assert_eq!(ctx.graph.triples()[0].sentence(), "(ENT10) flows through X");
        assert_eq!(ctx.graph.definition("(ENT10)"), Some("a river"));
    }
}
