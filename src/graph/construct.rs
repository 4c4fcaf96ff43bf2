//! Graph construction: model response text → [`Graph`].
//!
//! Parsing is deliberately tolerant. Model output is unreliable, so nothing
//! here returns an error; the worst case is an empty or partial graph.

use tracing::{debug, trace};

use crate::llm::{LlmProvider, ProviderError};
use crate::prompt::Prompts;

use super::{DEFINITION_RELATION, Graph};
use super::triple::SEP;

const LATENT_HEADER: &str = "# Latent Entities";
const TRIPLES_HEADER: &str = "# Triples";

/// Which part of the response the forward scan is in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Section {
    Definitions,
    Triples,
}

/// How a single line is handled by the scan.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LineKind {
    /// "no latent entities identified", bare "none", the latent header.
    Skip,
    /// `# Triples` — switches to triples mode and is dropped.
    TriplesHeader,
    /// Anything that does not open with a placeholder forces triples mode.
    NonDefinition,
    Candidate,
}

fn classify(line: &str) -> LineKind {
    let lower = line.to_lowercase();
    if lower.contains("no latent entities identified")
        || lower.contains("(no latent entities needed)")
        || lower == "none"
        || line.starts_with(LATENT_HEADER)
    {
        LineKind::Skip
    } else if line.starts_with(TRIPLES_HEADER) {
        LineKind::TriplesHeader
    } else if !line.starts_with("(ENT") {
        LineKind::NonDefinition
    } else {
        LineKind::Candidate
    }
}

/// Split a response into `(pre-flip lines, post-flip lines)` with a single
/// forward scan.
fn split_sections(response: &str) -> (Vec<&str>, Vec<&str>) {
    let mut section = Section::Definitions;
    let mut head = Vec::new();
    let mut tail = Vec::new();

    for line in response.lines().map(str::trim).filter(|l| !l.is_empty()) {
        match classify(line) {
            LineKind::Skip => continue,
            LineKind::TriplesHeader => {
                section = Section::Triples;
                continue;
            }
            LineKind::NonDefinition => section = Section::Triples,
            LineKind::Candidate => {}
        }
        match section {
            Section::Definitions => head.push(line),
            Section::Triples => tail.push(line),
        }
    }
    (head, tail)
}

/// The prefix a pre-flip line at 0-based `position` must carry to count as
/// a definition: `(ENT{position + 1}) [SEP] is [SEP]`.
fn definition_prefix(position: usize) -> String {
    format!("(ENT{}) {SEP} {DEFINITION_RELATION} {SEP}", position + 1)
}

/// Parse one model response into a [`Graph`].
///
/// A pre-flip line is a definition only when its index matches its position,
/// so `(ENT2) [SEP] is [SEP] x` as the first line is an ordinary triple.
pub fn construct(model_response: &str) -> Graph {
    let (head, tail) = split_sections(model_response);

    let mut definitions = Vec::new();
    let mut triples = Vec::new();
    for (position, line) in head.into_iter().enumerate() {
        if line.starts_with(&definition_prefix(position)) {
            definitions.push(line);
        } else {
            trace!(line, position, "out-of-order definition kept as triple");
            triples.push(line);
        }
    }
    triples.extend(tail);

    debug!(definitions = definitions.len(), triples = triples.len(), "graph parsed");
    Graph::from_texts(definitions, triples)
}

/// Builds a graph for a claim by prompting the model with the few-shot
/// decomposition template and parsing its reply.
#[derive(Debug, Clone)]
pub struct GraphConstructor {
    provider: LlmProvider,
    prompts: Prompts,
}

impl GraphConstructor {
    pub fn new(provider: LlmProvider, prompts: Prompts) -> Self {
        Self { provider, prompts }
    }

    /// One `generate` call, then [`construct`]. Only provider failures error.
    pub async fn construct_claim(&self, claim: &str) -> Result<Graph, ProviderError> {
        let prompt = self.prompts.construct_graph(claim);
        let response = self.provider.complete(&prompt).await?;
        trace!(%response, "graph construction response");
        Ok(construct(&response))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const GERAGOS: &str = "# Latent Entities:\n\
        (ENT1) [SEP] is [SEP] a scandal\n\
        # Triples:\n\
        Mark Geragos [SEP] was involved in [SEP] (ENT1)\n\
        (ENT1) [SEP] took place in [SEP] the 1990s\n";

    #[test]
    fn parses_sections() {
        let g = construct(GERAGOS);
        assert_eq!(g.definition_triples().len(), 1);
        assert_eq!(g.triples().len(), 2);
        assert_eq!(g.definition("(ENT1)"), Some("a scandal"));
        assert_eq!(g.triples_mentioning("(ENT1)").count(), 2);
    }

    #[test]
    fn empty_and_junk_input_yield_empty_graph() {
        assert!(construct("").is_empty());
        assert!(construct("\n   \n\t").is_empty());
        let g = construct("I could not decompose this claim.");
        assert!(g.definition_triples().is_empty());
        assert_eq!(g.triples().len(), 1);
    }

    #[test]
    fn boilerplate_lines_are_skipped() {
        let response = "# Latent Entities:\nNo latent entities identified.\nNone\n\
            (No latent entities needed)\n# Triples:\n\
            The fairy Queen Mab [SEP] originated with [SEP] William Shakespeare";
        let g = construct(response);
        assert!(g.definition_triples().is_empty());
        assert_eq!(g.triples().len(), 1);
        assert_eq!(g.triples()[0].subject(), "The fairy Queen Mab");
    }

    #[test]
    fn triples_header_is_dropped() {
        let g = construct("# Triples:\nA [SEP] b [SEP] C");
        assert_eq!(g.triples().len(), 1);
        assert_eq!(g.triples()[0].sentence(), "A b C");
    }

    #[test]
    fn missing_header_flips_on_first_non_definition() {
        let response = "(ENT1) [SEP] is [SEP] a network\n\
            Skatoony [SEP] was shown on [SEP] (ENT1)\n\
            (ENT1) [SEP] launched on [SEP] 24 April 2006";
        let g = construct(response);
        assert_eq!(g.definition_triples().len(), 1);
        assert_eq!(g.triples().len(), 2);
        assert_eq!(g.triples()[1].subject(), "(ENT1)");
    }

    #[test]
    fn out_of_order_definition_falls_through() {
        let response = "(ENT2) [SEP] is [SEP] a band\n(ENT1) [SEP] is [SEP] a musician\n\
            # Triples:\n(ENT1) [SEP] plays in [SEP] (ENT2)";
        let g = construct(response);
        assert!(g.definition_triples().is_empty());
        assert_eq!(g.triples().len(), 3);
        assert_eq!(g.triples()[0].raw_text(), "(ENT2) [SEP] is [SEP] a band");
    }

    #[test]
    fn pre_flip_non_definition_is_kept_before_triples() {
        let response = "(ENT1) [SEP] is [SEP] a date\n(ENT2) [SEP] was born [SEP] x\n\
            # Triples:\nDanny Shirley [SEP] was born on [SEP] (ENT1)";
        let g = construct(response);
        assert_eq!(g.definition_triples().len(), 1);
        assert_eq!(g.triples()[0].raw_text(), "(ENT2) [SEP] was born [SEP] x");
        assert_eq!(g.triples()[1].subject(), "Danny Shirley");
    }

    #[test]
    fn two_sequential_definitions() {
        let response = "# Latent Entities:\n(ENT1) [SEP] is [SEP] an individual\n\
            (ENT2) [SEP] is [SEP] an American manufacturer\n# Triples:\n\
            (ENT1) [SEP] founded [SEP] (ENT2)";
        let g = construct(response);
        assert_eq!(g.definitions().collect::<Vec<_>>(), vec![
            ("(ENT1)", "an individual"),
            ("(ENT2)", "an American manufacturer"),
        ]);
    }

    #[test]
    fn classify_branches() {
        assert_eq!(classify("none"), LineKind::Skip);
        assert_eq!(classify("# Latent Entities:"), LineKind::Skip);
        assert_eq!(classify("# Triples:"), LineKind::TriplesHeader);
        assert_eq!(classify("A [SEP] b [SEP] C"), LineKind::NonDefinition);
        assert_eq!(classify("(ENT1) [SEP] is [SEP] x"), LineKind::Candidate);
    }

    #[tokio::test]
    async fn construct_claim_uses_provider_reply() {
        let provider = LlmProvider::scripted([GERAGOS]);
        let constructor = GraphConstructor::new(provider, Prompts::default());
        let g = constructor
            .construct_claim("Mark Geragos was involved in the scandal that took place in the 1990s.")
            .await
            .unwrap();
        assert_eq!(g.definition_triples().len(), 1);
        assert_eq!(g.triples().len(), 2);
    }
}
