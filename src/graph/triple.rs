//! A single `subject [SEP] relation [SEP] object [PREP] modifier` unit.

use serde::Serialize;

/// Field delimiter emitted by the graph-construction prompt.
pub const SEP: &str = "[SEP]";
/// Marks a prepositional phrase that modifies the whole triple.
pub const PREP: &str = "[PREP]";

/// An immutable triple parsed from one line of model output.
///
/// Fields are private; a changed triple is always a new `Triple` built with
/// [`Triple::parse`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Triple {
    subject: String,
    relation: String,
    object: String,
    modifier: Option<String>,
    sentence: String,
    raw_text: String,
}

impl Triple {
    /// Parse a raw line. Never fails: missing parts become empty fields and
    /// parts past the third are folded into the object.
    pub fn parse(raw_text: &str) -> Self {
        let mut parts = raw_text.split(SEP).map(str::trim);
        let subject = parts.next().unwrap_or_default().to_string();
        let relation = parts.next().unwrap_or_default().to_string();
        let tail = parts.collect::<Vec<_>>().join(" ");

        let (object, modifier) = match tail.split_once(PREP) {
            Some((object, modifier)) => {
                let modifier = modifier.trim();
                (
                    object.trim().to_string(),
                    (!modifier.is_empty()).then(|| modifier.to_string()),
                )
            }
            None => (tail.trim().to_string(), None),
        };

        let sentence = render_sentence(&subject, &relation, &object, modifier.as_deref());
        Self { subject, relation, object, modifier, sentence, raw_text: raw_text.to_string() }
    }

    pub fn subject(&self) -> &str {
        &self.subject
    }

    pub fn relation(&self) -> &str {
        &self.relation
    }

    pub fn object(&self) -> &str {
        &self.object
    }

    pub fn modifier(&self) -> Option<&str> {
        self.modifier.as_deref()
    }

    /// Human-readable rendering, e.g. `"Mark Geragos was involved in (ENT1)"`.
    pub fn sentence(&self) -> &str {
        &self.sentence
    }

    /// The line this triple was parsed from.
    pub fn raw_text(&self) -> &str {
        &self.raw_text
    }
}

/// `"{subject} {relation} {object}"` plus `" {modifier}"`, skipping empty
/// fields so malformed lines never render double spaces.
pub fn render_sentence(subject: &str, relation: &str, object: &str, modifier: Option<&str>) -> String {
    [Some(subject), Some(relation), Some(object), modifier]
        .into_iter()
        .flatten()
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}
