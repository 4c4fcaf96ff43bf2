//! Retrieval and fill-in query synthesis for one latent entity.
//!
//! Both builders are pure functions of `(graph, target)`. Candidate
//! sentences are rendered with a trailing period and kept only when the
//! target is the single placeholder they mention, so two unknowns are never
//! conflated in one query.
//!
//! ```text
//! (ENT1) [SEP] is [SEP] a musician
//! (ENT2) [SEP] is [SEP] a band
//! (ENT1) [SEP] is part of [SEP] Tall Birds
//! (ENT1) [SEP] is a percussionist for [SEP] (ENT2)
//!
//! retrieval query for (ENT1):  a musician is part of Tall Birds.
//! infill query for (ENT1):     <extra_id_0> is part of Tall Birds. <extra_id_0> is a musician.
//! ```

use crate::graph::{Graph, Triple, placeholder};

/// Marks the slot the model is asked to fill.
pub const BLANK_TOKEN: &str = "<extra_id_0>";

/// Natural-language query used to search the evidence corpus for `target`.
pub fn build_retrieval_query(graph: &Graph, target: &str) -> String {
    let candidates: Vec<String> = graph.triples_mentioning(target).map(as_statement).collect();
    let query = exclusive_join(&candidates, target);
    let query = if query.is_empty() { fallback_query(graph, target) } else { query };
    substitute_definitions(graph, query)
}

/// Cloze-style query with `target` replaced by [`BLANK_TOKEN`].
pub fn build_infill_query(graph: &Graph, target: &str) -> String {
    let mut candidates: Vec<String> = graph.triples_mentioning(target).map(as_statement).collect();
    if let Some(def) = graph.definition_triple(target) {
        candidates.push(as_statement(def));
    }
    let query = exclusive_join(&candidates, target);
    let query = if query.is_empty() { fallback_query(graph, target) } else { query };
    let query = placeholder::substitute(query.trim(), target, BLANK_TOKEN);
    substitute_definitions(graph, query)
}

fn as_statement(triple: &Triple) -> String {
    format!("{}.", triple.sentence())
}

/// Space-join the candidates whose only placeholder is `target`.
fn exclusive_join(candidates: &[String], target: &str) -> String {
    candidates
        .iter()
        .filter(|sentence| placeholder::mentions_only(sentence, target))
        .map(String::as_str)
        .collect::<Vec<_>>()
        .join(" ")
}

/// Used when no triple mentions `target` alone: its definition sentence,
/// else every sentence mentioning it, else the bare token.
fn fallback_query(graph: &Graph, target: &str) -> String {
    if let Some(def) = graph.definition_triple(target) {
        return as_statement(def);
    }
    let mentions: Vec<String> = graph.triples_mentioning(target).map(as_statement).collect();
    if mentions.is_empty() {
        target.to_string()
    } else {
        mentions.join(" ")
    }
}

/// Replace defined placeholders with their definition text until none are
/// left. One pass only when the graph has undefined placeholders, and stop
/// as soon as a pass changes nothing (mutually referencing definitions).
pub fn substitute_definitions(graph: &Graph, mut query: String) -> String {
    while placeholder::contains_any(&query) {
        let before = query.clone();
        for (token, definition) in graph.definitions() {
            query = placeholder::substitute(&query, token, definition);
        }
        if graph.has_placeholder_without_definition() || query == before {
            break;
        }
    }
    query
}
