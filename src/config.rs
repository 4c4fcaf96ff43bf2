//! Configuration loading with env-var overrides.
//!
//! Reads TOML files, supports `[meta] base = "..."` inheritance chains, and
//! applies `GRAPHCHECK_LOG_LEVEL` and `GRAPHCHECK_INDEX_DIR` env overrides.
//! The LLM API key is only ever read from `LLM_API_KEY`.

use std::collections::HashSet;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::error::AppError;

/// OpenAI-compatible endpoint settings.
#[derive(Debug, Clone)]
pub struct OpenAiConfig {
    /// Full URL of the chat completions endpoint.
    pub api_base_url: String,
    pub model: String,
    pub temperature: f32,
    pub timeout_seconds: u64,
}

#[derive(Debug, Clone)]
pub struct LlmConfig {
    /// Which provider to build: `"dummy"` or `"openai"`.
    pub provider: String,
    pub openai: OpenAiConfig,
}

#[derive(Debug, Clone)]
pub struct RetrievalConfig {
    /// `"static"` (fixed passages) or `"fts"` (SQLite FTS5 index).
    pub backend: String,
    /// Passages per retrieval call.
    pub top_k: usize,
    /// Directory holding `evidence.db` for the `fts` backend.
    pub index_dir: PathBuf,
    /// Passages served by the `static` backend.
    pub passages: Vec<String>,
}

/// Fully resolved configuration.
#[derive(Debug, Clone)]
pub struct Config {
    pub log_level: String,
    /// Append logs here instead of stderr.
    pub log_file: Option<PathBuf>,
    /// Claims processed concurrently by a batch run.
    pub concurrency: usize,
    pub llm: LlmConfig,
    /// From `LLM_API_KEY`; never read from TOML.
    pub llm_api_key: Option<String>,
    pub retrieval: RetrievalConfig,
    /// Prompt template override directory; built-ins when `None`.
    pub prompts_dir: Option<PathBuf>,
}

// ── Raw TOML shape ────────────────────────────────────────────────────────────

#[derive(Deserialize, Default)]
struct RawConfig {
    #[serde(default)]
    runtime: RawRuntime,
    #[serde(default)]
    llm: RawLlm,
    #[serde(default)]
    retrieval: RawRetrieval,
    #[serde(default)]
    prompts: RawPrompts,
}

#[derive(Deserialize)]
struct RawRuntime {
    #[serde(default = "default_log_level")]
    log_level: String,
    #[serde(default)]
    log_file: Option<String>,
    #[serde(default = "default_concurrency")]
    concurrency: usize,
}

impl Default for RawRuntime {
    fn default() -> Self {
        Self { log_level: default_log_level(), log_file: None, concurrency: default_concurrency() }
    }
}

#[derive(Deserialize)]
struct RawLlm {
    /// Maps to `default = "..."` in `[llm]`.
    #[serde(rename = "default", default = "default_llm_provider")]
    provider: String,
    #[serde(default)]
    openai: RawOpenAiConfig,
}

impl Default for RawLlm {
    fn default() -> Self {
        Self { provider: default_llm_provider(), openai: RawOpenAiConfig::default() }
    }
}

#[derive(Deserialize)]
struct RawOpenAiConfig {
    #[serde(default = "default_openai_api_base_url")]
    api_base_url: String,
    #[serde(default = "default_openai_model")]
    model: String,
    #[serde(default = "default_openai_temperature")]
    temperature: f32,
    #[serde(default = "default_openai_timeout_seconds")]
    timeout_seconds: u64,
}

impl Default for RawOpenAiConfig {
    fn default() -> Self {
        Self {
            api_base_url: default_openai_api_base_url(),
            model: default_openai_model(),
            temperature: default_openai_temperature(),
            timeout_seconds: default_openai_timeout_seconds(),
        }
    }
}

#[derive(Deserialize)]
struct RawRetrieval {
    #[serde(default = "default_retrieval_backend")]
    backend: String,
    #[serde(default = "default_top_k")]
    top_k: usize,
    #[serde(default = "default_index_dir")]
    index_dir: String,
    #[serde(default)]
    passages: Vec<String>,
}

impl Default for RawRetrieval {
    fn default() -> Self {
        Self {
            backend: default_retrieval_backend(),
            top_k: default_top_k(),
            index_dir: default_index_dir(),
            passages: Vec::new(),
        }
    }
}

#[derive(Deserialize, Default)]
struct RawPrompts {
    #[serde(default)]
    dir: Option<String>,
}

fn default_log_level() -> String { "info".to_string() }
fn default_concurrency() -> usize { 4 }
fn default_llm_provider() -> String { "dummy".to_string() }
fn default_openai_api_base_url() -> String { "https://api.openai.com/v1/chat/completions".to_string() }
fn default_openai_model() -> String { "gpt-4o-mini".to_string() }
fn default_openai_temperature() -> f32 { 0.0 }
fn default_openai_timeout_seconds() -> u64 { 60 }
fn default_retrieval_backend() -> String { "fts".to_string() }
fn default_top_k() -> usize { 10 }
fn default_index_dir() -> String { "~/.graphcheck/index".to_string() }

// ── Loading ───────────────────────────────────────────────────────────────────

/// Deep-merge two TOML values.
/// Tables are merged recursively; for every other type the overlay value
/// replaces the base value wholesale.
fn merge_toml(base: toml::Value, overlay: toml::Value) -> toml::Value {
    match (base, overlay) {
        (toml::Value::Table(mut base_tbl), toml::Value::Table(overlay_tbl)) => {
            for (key, ov_val) in overlay_tbl {
                let merged = match base_tbl.remove(&key) {
                    Some(base_val) => merge_toml(base_val, ov_val),
                    None => ov_val,
                };
                base_tbl.insert(key, merged);
            }
            toml::Value::Table(base_tbl)
        }
        (_, overlay) => overlay,
    }
}

/// Read a config file, follow any `[meta] base = "..."` chain, and return the
/// merged value. `visited` holds canonical paths already seen in this chain.
fn load_raw_merged(path: &Path, visited: &mut HashSet<PathBuf>) -> Result<toml::Value, AppError> {
    let canonical = path.canonicalize().unwrap_or_else(|_| path.to_path_buf());
    if !visited.insert(canonical) {
        return Err(AppError::Config(format!(
            "circular base reference detected at: {}",
            path.display()
        )));
    }

    let raw = fs::read_to_string(path)
        .map_err(|e| AppError::Config(format!("cannot read {}: {e}", path.display())))?;

    let overlay_val: toml::Value = toml::from_str(&raw)
        .map_err(|e| AppError::Config(format!("parse error in {}: {e}", path.display())))?;

    if let Some(base_str) = overlay_val.get("meta").and_then(|m| m.get("base")).and_then(|b| b.as_str()) {
        let base_path = if Path::new(base_str).is_absolute() {
            PathBuf::from(base_str)
        } else {
            path.parent().unwrap_or(Path::new(".")).join(base_str)
        };
        let base_val = load_raw_merged(&base_path, visited)?;
        Ok(merge_toml(base_val, overlay_val))
    } else {
        Ok(overlay_val)
    }
}

/// Load config from the given path, or `config/default.toml`, then apply
/// env-var overrides. Without an explicit path and without
/// `config/default.toml`, built-in defaults are used.
pub fn load(config_path: Option<&str>) -> Result<Config, AppError> {
    let log_level_override = env::var("GRAPHCHECK_LOG_LEVEL").ok();
    let index_dir_override = env::var("GRAPHCHECK_INDEX_DIR").ok();

    if let Some(path) = config_path {
        return load_from(Path::new(path), log_level_override.as_deref(), index_dir_override.as_deref());
    }

    let default_path = Path::new("config/default.toml");
    if default_path.exists() {
        load_from(default_path, log_level_override.as_deref(), index_dir_override.as_deref())
    } else {
        resolve(RawConfig::default(), log_level_override.as_deref(), index_dir_override.as_deref())
    }
}

/// Internal loader: explicit path and overrides, so tests never touch env
/// vars. Follows `[meta] base` chains before resolving.
pub fn load_from(
    path: &Path,
    log_level_override: Option<&str>,
    index_dir_override: Option<&str>,
) -> Result<Config, AppError> {
    let merged_val = load_raw_merged(path, &mut HashSet::new())?;

    let parsed: RawConfig = Deserialize::deserialize(merged_val).map_err(|e: toml::de::Error| {
        AppError::Config(format!("config error in {}: {e}", path.display()))
    })?;

    resolve(parsed, log_level_override, index_dir_override)
}

fn resolve(
    parsed: RawConfig,
    log_level_override: Option<&str>,
    index_dir_override: Option<&str>,
) -> Result<Config, AppError> {
    let rt = parsed.runtime;
    if rt.concurrency == 0 {
        return Err(AppError::Config("[runtime] concurrency must be at least 1".into()));
    }
    if parsed.retrieval.top_k == 0 {
        return Err(AppError::Config("[retrieval] top_k must be at least 1".into()));
    }

    let log_level = log_level_override.unwrap_or(&rt.log_level).to_string();
    let index_dir = expand_home(index_dir_override.unwrap_or(&parsed.retrieval.index_dir));

    Ok(Config {
        log_level,
        log_file: rt.log_file.as_deref().map(expand_home),
        concurrency: rt.concurrency,
        llm: LlmConfig {
            provider: parsed.llm.provider,
            openai: OpenAiConfig {
                api_base_url: parsed.llm.openai.api_base_url,
                model: parsed.llm.openai.model,
                temperature: parsed.llm.openai.temperature,
                timeout_seconds: parsed.llm.openai.timeout_seconds,
            },
        },
        llm_api_key: env::var("LLM_API_KEY").ok(),
        retrieval: RetrievalConfig {
            backend: parsed.retrieval.backend,
            top_k: parsed.retrieval.top_k,
            index_dir,
            passages: parsed.retrieval.passages,
        },
        prompts_dir: parsed.prompts.dir.as_deref().map(expand_home),
    })
}

/// Expand a leading `~` to the user's home directory.
/// Absolute or relative paths without `~` are returned unchanged.
pub fn expand_home(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest);
        }
    }
    if path == "~" {
        if let Some(home) = dirs::home_dir() {
            return home;
        }
    }
    PathBuf::from(path)
}

// ── test helpers ──────────────────────────────────────────────────────────────

/// Safe `Config` for unit tests: dummy LLM, static retrieval, no API keys.
#[cfg(test)]
impl Config {
    pub fn test_default() -> Self {
        Self {
            log_level: "info".into(),
            log_file: None,
            concurrency: 2,
            llm: LlmConfig {
                provider: "dummy".into(),
                openai: OpenAiConfig {
                    api_base_url: "http://localhost:0/v1/chat/completions".into(),
                    model: "test-model".into(),
                    temperature: 0.0,
                    timeout_seconds: 1,
                },
            },
            llm_api_key: None,
            retrieval: RetrievalConfig {
                backend: "static".into(),
                top_k: 10,
                index_dir: PathBuf::from("/nonexistent/index"),
                passages: Vec::new(),
            },
            prompts_dir: None,
        }
    }
}
