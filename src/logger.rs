//! Logging initialisation via tracing-subscriber.
//!
//! Call [`init`] once at startup, after the effective level is resolved from
//! CLI verbosity, `GRAPHCHECK_LOG_LEVEL` and the `[runtime]` config table.

use std::path::Path;

use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt::writer::BoxMakeWriter;

use crate::error::AppError;

/// Install the global subscriber.
///
/// With `prefer_level` the given `level` wins and `RUST_LOG` is only a
/// fallback for an unparsable level; otherwise `RUST_LOG` wins. Output goes to
/// stderr unless `log_file` is set, in which case lines are appended there so
/// stdout stays reserved for JSON reports.
pub fn init(level: &str, prefer_level: bool, log_file: Option<&Path>) -> Result<(), AppError> {
    let filter = if prefer_level {
        EnvFilter::try_new(level).or_else(|level_err| {
            EnvFilter::try_from_default_env().map_err(|env_err| {
                AppError::Logger(format!(
                    "invalid log level '{level}': {level_err}; RUST_LOG parse failed: {env_err}"
                ))
            })
        })?
    } else {
        EnvFilter::try_from_default_env()
            .or_else(|_| EnvFilter::try_new(level))
            .map_err(|e| AppError::Logger(format!("invalid log level '{level}': {e}")))?
    };

    let writer = match log_file {
        Some(path) => {
            let file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .map_err(|e| {
                    AppError::Logger(format!("failed to open log file '{}': {e}", path.display()))
                })?;
            BoxMakeWriter::new(file)
        }
        None => BoxMakeWriter::new(std::io::stderr),
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(writer)
        .try_init()
        .map_err(|e| AppError::Logger(format!("failed to set subscriber: {e}")))
}

/// Check that `level` is a usable filter: a bare level (`debug`) or a full
/// `EnvFilter` directive list (`graphcheck=debug,reqwest=warn`). Empty and
/// unparsable values are rejected.
pub fn validate_filter(level: &str) -> Result<(), AppError> {
    if level.trim().is_empty() {
        return Err(AppError::Logger("log level must not be empty".into()));
    }
    EnvFilter::try_new(level)
        .map(|_| ())
        .map_err(|e| AppError::Logger(format!("unrecognised log level '{level}': {e}")))
}

/// Map repeated `-v` flags to a level override.
///
/// `-v` → warn, `-vv` → info, `-vvv` → debug (per-step infilling
/// transitions), `-vvvv` and beyond → trace (full prompts and replies).
pub fn level_for_verbosity(verbosity: u8) -> Option<&'static str> {
    match verbosity {
        0 => None,
        1 => Some("warn"),
        2 => Some("info"),
        3 => Some("debug"),
        _ => Some("trace"),
    }
}
