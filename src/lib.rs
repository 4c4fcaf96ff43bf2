//! graphcheck: decompose claims into triple graphs and infill latent
//! entities from retrieved evidence.
//!
//! ```text
//! claim ──► GraphConstructor ──► Graph ──► InfillEngine ──► grounded Graph
//!              (LlmProvider)                 (Retriever + LlmProvider)
//! ```

pub mod config;
pub mod error;
pub mod graph;
pub mod infill;
pub mod llm;
pub mod logger;
pub mod pipeline;
pub mod prompt;
pub mod retrieval;
