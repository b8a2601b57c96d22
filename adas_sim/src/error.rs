//! Error types for the simulation harness.

use adas_core::AdasError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SimError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Config(#[from] AdasError),

    #[error("Invalid noise model: {0}")]
    InvalidNoise(String),

    #[error("Unknown scenario: {0}")]
    UnknownScenario(String),

    #[error("Usage error: {0}")]
    Usage(String),
}
