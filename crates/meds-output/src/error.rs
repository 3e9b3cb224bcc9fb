//! Error types for checkpoint output.

use std::path::PathBuf;

use polars::prelude::PolarsError;
use thiserror::Error;

/// Errors that can occur while writing or reading stage artifacts.
#[derive(Debug, Error)]
pub enum OutputError {
    // === Upstream Errors ===
    /// The stage this one reads from has not committed its artifact.
    #[error("upstream '{stage}' artifact not found at {path}; run that stage first")]
    MissingUpstream { stage: String, path: PathBuf },

    /// The directory holds an artifact of a different stage.
    #[error("expected '{expected}' artifact at {path}, found '{found}'")]
    StageMismatch {
        expected: String,
        found: String,
        path: PathBuf,
    },

    // === File System Errors ===
    /// Failed to create, read or remove a path.
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The staged artifact could not be moved onto its target.
    #[error("failed to publish {path}: {source}")]
    AtomicPublishFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // === Encoding Errors ===
    /// Parquet read or write failed.
    #[error("parquet error at {path}: {source}")]
    Parquet {
        path: PathBuf,
        #[source]
        source: PolarsError,
    },

    /// Frame did not have the expected checkpoint columns.
    #[error("invalid checkpoint frame: {source}")]
    Frame {
        #[source]
        source: PolarsError,
    },

    /// Manifest could not be encoded or decoded.
    #[error("invalid manifest {path}: {source}")]
    Manifest {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

impl OutputError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        OutputError::Io {
            path: path.into(),
            source,
        }
    }
}

impl From<PolarsError> for OutputError {
    fn from(source: PolarsError) -> Self {
        OutputError::Frame { source }
    }
}

/// Result type for output operations.
pub type Result<T> = std::result::Result<T, OutputError>;
