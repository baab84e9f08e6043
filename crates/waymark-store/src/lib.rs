//! Local data persistence for the Waymark location tracker.
//!
//! This crate provides SQLite-based storage for captured location events
//! and the offline map tile cache, enabling operation with no network
//! access and reconciliation once connectivity returns.
//!
//! # Features
//!
//! - Append-only local log of captured events; the sync queue is a
//!   filtered view over it, never a second copy that could diverge
//! - Map tile cache keyed by slippy-map coordinates, with a manifest that
//!   is recomputed from the live rows on every call
//! - Reverse-geocode address cache keyed by rounded coordinates
//! - CSV export of the event log
//!
//! # Example
//!
//! ```no_run
//! use waymark_store::{RecordQuery, Store};
//!
//! let store = Store::open_default()?;
//!
//! // Query the most recent records
//! let query = RecordQuery::new().limit(10);
//! let records = store.query_records(&query)?;
//! # Ok::<(), waymark_store::Error>(())
//! ```

mod error;
mod models;
mod queries;
mod schema;
mod store;

pub use error::{Error, Result};
pub use models::{CacheManifest, PENDING_ADDRESS, RecordOrigin, StoredRecord, TileRecord};
pub use queries::RecordQuery;
pub use store::Store;

/// Default database path following platform conventions.
///
/// - Linux: `~/.local/share/waymark/data.db`
/// - macOS: `~/Library/Application Support/waymark/data.db`
/// - Windows: `C:\Users\<user>\AppData\Local\waymark\data.db`
pub fn default_db_path() -> std::path::PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| std::path::PathBuf::from("."))
        .join("waymark")
        .join("data.db")
}
