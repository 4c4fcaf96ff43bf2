//! Application-wide error types.
//!
//! Subsystem errors (`ProviderError`, `RetrievalError`, `InfillError`) live
//! next to the code that raises them and convert into [`AppError`] at the
//! binary boundary.

use thiserror::Error;

use crate::infill::InfillError;
use crate::llm::ProviderError;
use crate::retrieval::RetrievalError;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("config error: {0}")]
    Config(String),

    #[error("logger error: {0}")]
    Logger(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Provider(#[from] ProviderError),

    #[error(transparent)]
    Retrieval(#[from] RetrievalError),

    #[error(transparent)]
    Infill(#[from] InfillError),
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error;

    #[test]
    fn config_error_display() {
        let e = AppError::Config("missing field".into());
        assert!(e.to_string().contains("config error"));
        assert!(e.to_string().contains("missing field"));
    }

    #[test]
    fn logger_error_display() {
        let e = AppError::Logger("already initialized".into());
        assert!(e.to_string().contains("already initialized"));
    }

    #[test]
    fn io_error_converts() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file missing");
        let e: AppError = io_err.into();
        assert!(e.to_string().contains("io error"));
        let _: &dyn Error = &e;
    }

    #[test]
    fn provider_error_is_transparent() {
        let e: AppError = ProviderError::Request("HTTP 500".into()).into();
        assert_eq!(e.to_string(), "provider request failed: HTTP 500");
    }
}
