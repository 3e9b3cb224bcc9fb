//! Error types for raw source ingestion.

use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur while reading subject, source and lookup files.
#[derive(Debug, Error)]
pub enum IngestError {
    // === File System Errors ===
    /// Directory not found or not readable.
    #[error("directory not found: {path}")]
    DirectoryNotFound { path: PathBuf },

    /// Input file not found.
    #[error("file not found: {path}")]
    FileNotFound { path: PathBuf },

    /// Failed to read directory entries.
    #[error("failed to read directory {path}: {source}")]
    DirectoryRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Failed to open or read a file.
    #[error("failed to read file {path}: {source}")]
    FileRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // === Parsing Errors ===
    /// Malformed delimited text.
    #[error("failed to parse {path}: {source}")]
    Csv {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },

    /// File has no header row.
    #[error("file is empty: {path}")]
    EmptyFile { path: PathBuf },

    /// Required column not found.
    #[error("required column '{column}' not found in {path}")]
    MissingColumn { column: String, path: PathBuf },

    /// Invalid value in a required field.
    #[error("invalid {field} value '{value}' in {path} (row {row})")]
    InvalidValue {
        field: String,
        value: String,
        path: PathBuf,
        row: u64,
    },
}

/// Result type for ingestion operations.
pub type Result<T> = std::result::Result<T, IngestError>;
