//! Error types for waymark-core.
//!
//! Nothing in this taxonomy is fatal to the process: every failure
//! degrades to "stay local / stay pending". A parse failure drops one
//! line, a full tile cache skips one put, a rejected push leaves the
//! record in the queue for the next pass.

use std::time::Duration;

use thiserror::Error;

use waymark_types::TileCoord;

/// Errors that can occur in the sync and caching engine.
///
/// This enum is marked `#[non_exhaustive]` to allow adding new error variants
/// in future versions without breaking downstream code.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// Malformed sensor text. The event is dropped; store state is untouched.
    #[error(transparent)]
    Parse(#[from] waymark_types::ParseError),

    /// Local persistence error (includes the tile cache's `StorageFull`).
    #[error("Store error: {0}")]
    Store(#[from] waymark_store::Error),

    /// HTTP transport error.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The remote store rejected a push. The record stays pending,
    /// isolated from the rest of the batch.
    #[error("Remote store rejected the request: {0}")]
    RemoteRejected(String),

    /// No connectivity; the operation was skipped, not retried, until the
    /// next trigger.
    #[error("Network unavailable")]
    NetworkUnavailable,

    /// Operation timed out.
    #[error("Operation '{operation}' timed out after {duration:?}")]
    Timeout {
        /// The operation that timed out.
        operation: String,
        /// The timeout duration.
        duration: Duration,
    },

    /// The tile source could not serve a tile.
    #[error("Tile {coord} unavailable from source (HTTP {status})")]
    TileUnavailable {
        /// The requested tile.
        coord: TileCoord,
        /// HTTP status returned by the source.
        status: u16,
    },

    /// I/O error on the sensor link.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Create a remote rejection error.
    pub fn remote_rejected(message: impl Into<String>) -> Self {
        Self::RemoteRejected(message.into())
    }

    /// Create a timeout error with operation context.
    pub fn timeout(operation: impl Into<String>, duration: Duration) -> Self {
        Self::Timeout {
            operation: operation.into(),
            duration,
        }
    }

    /// Whether this error is the tile cache's capacity rejection.
    pub fn is_storage_full(&self) -> bool {
        matches!(self, Error::Store(waymark_store::Error::StorageFull))
    }
}

/// Result type alias using waymark-core's Error type.
pub type Result<T> = std::result::Result<T, Error>;
