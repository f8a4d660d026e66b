//! Error types for xrf-ingest
//!
//! Each subsystem owns a focused error enum; [`IngestError`] collects the ones
//! that can reach the caller of the pipeline.

use std::path::PathBuf;
use thiserror::Error;

use crate::services::reading_classifier::ClassificationError;

/// Errors surfaced by the ingest pipeline and CLI commands
#[derive(Debug, Error)]
pub enum IngestError {
    /// Malformed reading rejected in strict mode
    #[error(transparent)]
    Classification(#[from] ClassificationError),

    /// Reading file could not be read
    #[error("Failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Reading file is not a JSON array of readings
    #[error("Invalid reading input in {path}: {source}")]
    Decode {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// Result type for pipeline operations
pub type IngestResult<T> = Result<T, IngestError>;
