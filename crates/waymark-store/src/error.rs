//! Error types for waymark-store.

use std::path::PathBuf;

/// Result type for waymark-store operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in waymark-store.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Database error from SQLite.
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// Failed to create database directory.
    #[error("Failed to create database directory {path}: {source}")]
    CreateDirectory {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Record not found (or already past the requested transition).
    #[error("Record not found: {0}")]
    RecordNotFound(String),

    /// A tile write was rejected because local storage is full.
    ///
    /// The failed put leaves prior cache entries and the derived manifest
    /// intact; only the single tile is lost.
    #[error("Tile cache storage is full")]
    StorageFull,

    /// Invalid timestamp.
    #[error("Invalid timestamp: {0}")]
    InvalidTimestamp(String),

    /// CSV export error.
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
