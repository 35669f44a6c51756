//! Analysis error types

use std::time::Duration;

use thiserror::Error;

/// Failures of a single oracle call. Always contained to one position.
#[derive(Error, Debug)]
pub enum OracleError {
    #[error("Engine unavailable: {0}")]
    Unavailable(String),

    #[error("Engine call exceeded {0:?}")]
    Timeout(Duration),

    #[error("Malformed engine response: {0}")]
    MalformedResponse(String),
}

#[derive(Error, Debug)]
pub enum AnalysisError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("{0}")]
    Corpus(String),

    #[error(transparent)]
    Oracle(#[from] OracleError),

    #[error("Critical moment for unknown game {0}")]
    UnknownGame(u32),

    #[error("Analysis failed: {0}")]
    Orchestrator(String),
}

/// Message recorded on a job whose corpus produced no games.
pub const CORPUS_INVALID: &str = "PGN corpus is invalid or empty";

impl AnalysisError {
    pub fn corpus_invalid() -> Self {
        AnalysisError::Corpus(CORPUS_INVALID.to_string())
    }
}
