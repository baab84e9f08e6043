//! Data models for stored data.

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use waymark_types::{LocationEvent, TileCoord};

/// Address value a record carries until the resolver has produced one.
pub const PENDING_ADDRESS: &str = "pending";

/// Where a record was first persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RecordOrigin {
    /// Confirmed by the remote authoritative store.
    Remote,
    /// Captured locally, awaiting remote confirmation.
    LocalPending,
}

impl RecordOrigin {
    pub(crate) fn as_str(&self) -> &'static str {
        match self {
            RecordOrigin::Remote => "remote",
            RecordOrigin::LocalPending => "local_pending",
        }
    }

    pub(crate) fn parse(s: &str) -> Self {
        match s {
            "remote" => RecordOrigin::Remote,
            _ => RecordOrigin::LocalPending,
        }
    }
}

/// A location event persisted in the local log.
///
/// Created by [`Store::append_event`](crate::Store::append_event) with
/// `origin = LocalPending, synced = false`. The only mutation allowed
/// afterwards is [`Store::mark_synced`](crate::Store::mark_synced), which
/// fires exactly once per record; everything else is deletion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredRecord {
    /// Locally-generated unique identifier.
    pub id: String,
    /// Latitude in decimal degrees.
    pub lat: f64,
    /// Longitude in decimal degrees.
    pub lng: f64,
    /// Received signal strength in dBm.
    pub rssi: i16,
    /// Status tag from the beacon.
    pub status: String,
    /// Resolved address, or [`PENDING_ADDRESS`] until resolution.
    pub address: String,
    /// The cleaned wire line the event was parsed from.
    pub raw: String,
    /// When the event was captured.
    #[serde(with = "time::serde::rfc3339")]
    pub captured_at: OffsetDateTime,
    /// Where the record was first persisted.
    pub origin: RecordOrigin,
    /// Whether the remote store has acknowledged this record.
    pub synced: bool,
    /// Identifier assigned by the remote store once synced.
    pub remote_id: Option<String>,
}

impl StoredRecord {
    /// Whether this record is still awaiting remote confirmation.
    pub fn is_pending(&self) -> bool {
        !self.synced
    }

    /// Build the persisted form of a freshly captured event.
    pub(crate) fn from_event(event: &LocationEvent, id: String, captured_at: OffsetDateTime) -> Self {
        Self {
            id,
            lat: event.lat,
            lng: event.lng,
            rssi: event.rssi,
            status: event.status.clone(),
            address: PENDING_ADDRESS.to_string(),
            raw: event.raw.clone(),
            captured_at,
            origin: RecordOrigin::LocalPending,
            synced: false,
            remote_id: None,
        }
    }
}

/// A cached map tile.
///
/// Keyed by its [`TileCoord`]; overwriting a key replaces the record
/// atomically, read-only otherwise until cache clear.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TileRecord {
    /// Slippy-map address of the tile.
    pub coord: TileCoord,
    /// Raster image bytes as served by the tile source.
    pub image: Vec<u8>,
    /// URL the tile was fetched from.
    pub source_url: String,
    /// When the tile was cached.
    #[serde(with = "time::serde::rfc3339")]
    pub cached_at: OffsetDateTime,
}

/// Summary of the tile cache, recomputed from the live record set.
///
/// Derived data: the counts always equal a recomputation over the tile
/// rows and are never maintained as separate counters that could drift.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheManifest {
    /// Number of cached tiles.
    pub tile_count: u64,
    /// Total image bytes across all tiles.
    pub total_bytes: u64,
    /// Most recent cache write, if any tile exists.
    #[serde(with = "time::serde::rfc3339::option")]
    pub last_updated: Option<OffsetDateTime>,
}
