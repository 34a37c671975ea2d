//! Error types for the simulation harness.

use crate::ingest::IngestError;
use thiserror::Error;
use ukf_core::UkfError;

/// Errors that can abort a harness run.
#[derive(Debug, Error)]
pub enum SimError {
    /// The estimation engine rejected a measurement or diverged
    #[error("Filter error at sample {index}: {source}")]
    Filter {
        index: usize,
        #[source]
        source: UkfError,
    },

    /// Engine construction failed
    #[error("Engine error: {0}")]
    Engine(#[from] UkfError),

    /// Measurement log could not be read
    #[error("Ingest error: {0}")]
    Ingest(#[from] IngestError),

    /// Configuration file could not be parsed
    #[error("Config error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
