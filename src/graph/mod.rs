//! Triple graph — definition triples for latent entities plus the claim's
//! factual triples.
//!
//! A [`Graph`] is immutable. Its lookup indices are computed once in
//! [`Graph::new`]; the infilling engine builds a fresh graph after every
//! resolution instead of editing one in place.
//!
//! ```text
//! # Latent Entities:
//! (ENT1) [SEP] is [SEP] a scandal          ← definition triple
//! # Triples:
//! Mark Geragos [SEP] was involved in [SEP] (ENT1)
//! (ENT1) [SEP] took place in [SEP] the 1990s
//! ```

pub mod construct;
pub mod placeholder;
pub mod triple;

use std::collections::HashMap;

use serde::Serialize;

pub use construct::{GraphConstructor, construct};
pub use triple::Triple;

/// Relation every definition triple carries.
pub const DEFINITION_RELATION: &str = "is";

#[derive(Debug, Clone, Default, Serialize)]
pub struct Graph {
    definition_triples: Vec<Triple>,
    triples: Vec<Triple>,
    #[serde(skip)]
    definition_index: HashMap<String, usize>,
    #[serde(skip)]
    mention_index: HashMap<String, Vec<usize>>,
    #[serde(skip)]
    has_placeholder_without_definition: bool,
}

impl Graph {
    /// Build a graph from raw definition lines and raw triple lines.
    pub fn from_texts<D, T>(definition_texts: D, triple_texts: T) -> Self
    where
        D: IntoIterator,
        D::Item: AsRef<str>,
        T: IntoIterator,
        T::Item: AsRef<str>,
    {
        Self::new(
            definition_texts.into_iter().map(|t| Triple::parse(t.as_ref())).collect(),
            triple_texts.into_iter().map(|t| Triple::parse(t.as_ref())).collect(),
        )
    }

    /// Build a graph and its indices.
    ///
    /// Definitions whose subject is not a placeholder, or whose relation is
    /// not [`DEFINITION_RELATION`], are kept in order but not indexed. When a
    /// placeholder is defined twice the first definition wins.
    pub fn new(definition_triples: Vec<Triple>, triples: Vec<Triple>) -> Self {
        let mut definition_index = HashMap::new();
        for (idx, def) in definition_triples.iter().enumerate() {
            if placeholder::is_placeholder(def.subject()) && def.relation() == DEFINITION_RELATION {
                definition_index.entry(def.subject().to_string()).or_insert(idx);
            }
        }

        let mut mention_index: HashMap<String, Vec<usize>> = HashMap::new();
        for (idx, triple) in triples.iter().enumerate() {
            for token in placeholder::distinct(triple.raw_text()) {
                mention_index.entry(token.to_string()).or_default().push(idx);
            }
        }

        let undefined_in_triples = mention_index.keys().any(|t| !definition_index.contains_key(t));
        let undefined_in_definitions = definition_triples.iter().any(|def| {
            placeholder::find_all(def.object()).any(|t| !definition_index.contains_key(t))
        });

        Self {
            definition_triples,
            triples,
            definition_index,
            mention_index,
            has_placeholder_without_definition: undefined_in_triples || undefined_in_definitions,
        }
    }

    pub fn definition_triples(&self) -> &[Triple] {
        &self.definition_triples
    }

    pub fn triples(&self) -> &[Triple] {
        &self.triples
    }

    pub fn definition_triple(&self, token: &str) -> Option<&Triple> {
        self.definition_index.get(token).map(|&idx| &self.definition_triples[idx])
    }

    /// Definition text of `token`, i.e. the object of its definition triple.
    pub fn definition(&self, token: &str) -> Option<&str> {
        self.definition_triple(token).map(Triple::object)
    }

    /// `(placeholder, definition text)` pairs in definition order.
    pub fn definitions(&self) -> impl Iterator<Item = (&str, &str)> {
        self.definition_triples
            .iter()
            .enumerate()
            .filter(|(idx, def)| self.definition_index.get(def.subject()) == Some(idx))
            .map(|(_, def)| (def.subject(), def.object()))
    }

    /// Factual triples mentioning `token`, in graph order.
    pub fn triples_mentioning<'a>(&'a self, token: &str) -> impl Iterator<Item = &'a Triple> + 'a {
        self.mention_index
            .get(token)
            .into_iter()
            .flatten()
            .map(|&idx| &self.triples[idx])
    }

    /// `true` when a placeholder used by a triple or inside a definition text
    /// has no definition of its own. Substitution loops stop early on it.
    pub fn has_placeholder_without_definition(&self) -> bool {
        self.has_placeholder_without_definition
    }

    /// Distinct placeholders across definitions and triples, in order of
    /// first appearance (definitions first).
    pub fn placeholders(&self) -> Vec<&str> {
        let mut out: Vec<&str> = Vec::new();
        let texts = self.definition_triples.iter().chain(&self.triples).map(Triple::raw_text);
        for text in texts {
            for token in placeholder::find_all(text) {
                if !out.contains(&token) {
                    out.push(token);
                }
            }
        }
        out
    }

    /// `true` when no triple of either kind still mentions a placeholder.
    pub fn is_grounded(&self) -> bool {
        !self
            .definition_triples
            .iter()
            .chain(&self.triples)
            .any(|t| placeholder::contains_any(t.raw_text()))
    }

    pub fn is_empty(&self) -> bool {
        self.definition_triples.is_empty() && self.triples.is_empty()
    }
}
