//! Prompt templates for graph construction and infilling.
//!
//! Templates are plain text with `{{key}}` variables. The built-in copies
//! under `config/prompts/` are compiled in; a `[prompts] dir` override loads
//! same-named files from disk instead, falling back to the built-in copy for
//! any file that is missing.
//!
//! | file                  | variables                   |
//! |-----------------------|-----------------------------|
//! | `construct_graph.txt` | `{{claim}}`                 |
//! | `infill.txt`          | `{{evidence}}`, `{{query}}` |

use std::collections::HashMap;
use std::fs;
use std::path::Path;

use tracing::debug;

pub const CONSTRUCT_GRAPH_FILE: &str = "construct_graph.txt";
pub const INFILL_FILE: &str = "infill.txt";

const BUILTIN_CONSTRUCT_GRAPH: &str = include_str!("../config/prompts/construct_graph.txt");
const BUILTIN_INFILL: &str = include_str!("../config/prompts/infill.txt");

/// Substitute `{{key}}` variables in a template.
///
/// Variables are applied in one pass over the template, so a value that
/// itself contains `{{...}}` (a claim quoting braces, say) is never expanded.
pub fn render(template: &str, vars: &HashMap<&str, &str>) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;
    while let Some(open) = rest.find("{{") {
        out.push_str(&rest[..open]);
        let after = &rest[open + 2..];
        match after.find("}}") {
            Some(close) => {
                let key = after[..close].trim();
                match vars.get(key) {
                    Some(value) => out.push_str(value),
                    None => out.push_str(&rest[open..open + 2 + close + 2]),
                }
                rest = &after[close + 2..];
            }
            None => {
                out.push_str(&rest[open..]);
                rest = "";
            }
        }
    }
    out.push_str(rest);
    out
}

/// Loaded prompt templates, cheap to clone into each engine.
#[derive(Debug, Clone)]
pub struct Prompts {
    construct_graph: String,
    infill: String,
}

impl Default for Prompts {
    fn default() -> Self {
        Self {
            construct_graph: BUILTIN_CONSTRUCT_GRAPH.trim().to_string(),
            infill: BUILTIN_INFILL.trim().to_string(),
        }
    }
}

impl Prompts {
    /// Load templates from `dir`, keeping the built-in copy of any file that
    /// is absent or empty.
    pub fn load(dir: &Path) -> Self {
        let builtin = Self::default();
        Self {
            construct_graph: load_or(dir, CONSTRUCT_GRAPH_FILE, builtin.construct_graph),
            infill: load_or(dir, INFILL_FILE, builtin.infill),
        }
    }

    pub fn construct_graph(&self, claim: &str) -> String {
        render(&self.construct_graph, &HashMap::from([("claim", claim)]))
    }

    pub fn infill(&self, evidence: &str, query: &str) -> String {
        render(&self.infill, &HashMap::from([("evidence", evidence), ("query", query)]))
    }
}

fn load_or(dir: &Path, filename: &str, fallback: String) -> String {
    let path = dir.join(filename);
    match fs::read_to_string(&path) {
        Ok(text) if !text.trim().is_empty() => text.trim().to_string(),
        Ok(_) => {
            debug!("prompt: '{}' is empty, using built-in", path.display());
            fallback
        }
        Err(_) => {
            debug!("prompt: '{}' not found, using built-in", path.display());
            fallback
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn render_substitutes_known_vars() {
        let vars = HashMap::from([("a", "1"), ("b", "2")]);
        assert_eq!(render("{{a}} + {{ b }} = {{c}}", &vars), "1 + 2 = {{c}}");
    }

    #[test]
    fn render_does_not_expand_values() {
        let vars = HashMap::from([("claim", "{{claim}}")]);
        assert_eq!(render("Claim: {{claim}}", &vars), "Claim: {{claim}}");
    }

    #[test]
    fn render_keeps_unterminated_braces() {
        assert_eq!(render("x {{open", &HashMap::new()), "x {{open");
    }

    #[test]
    fn builtin_infill_prompt_layout() {
        let p = Prompts::default().infill("EVIDENCE", "<extra_id_0> took place in the 1990s.");
        assert_eq!(
            p,
            "EVIDENCE\nBased on the above information, fill in the blank with the correct \
             entity: <extra_id_0> took place in the 1990s.\nAnswer:"
        );
    }

    #[test]
    fn builtin_construct_prompt_ends_with_claim() {
        let p = Prompts::default().construct_graph("Danny Shirley is older than Kevin Parker.");
        assert!(p.ends_with("# Claim: \nDanny Shirley is older than Kevin Parker."));
    }

    #[test]
    fn load_overrides_present_files_only() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join(INFILL_FILE), "Q={{query}} E={{evidence}}\n").unwrap();
        let p = Prompts::load(dir.path());
        assert_eq!(p.infill("e", "q"), "Q=q E=e");
        assert!(p.construct_graph("c").contains("[SEP]"));
    }
}
