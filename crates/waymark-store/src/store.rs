//! Main store implementation.

use std::path::Path;

use rand::Rng;
use rusqlite::{Connection, OptionalExtension};
use time::OffsetDateTime;
use tracing::{debug, info};

use waymark_types::{LocationEvent, TileCoord};

use crate::error::{Error, Result};
use crate::models::{CacheManifest, RecordOrigin, StoredRecord, TileRecord};
use crate::queries::{RecordQuery, unix_millis};

/// SQLite-based store for Waymark data.
///
/// Owns three independent record families: the captured event log, the
/// map tile cache, and the reverse-geocode address cache. Each family is
/// independently consistent; there are no cross-family transactions.
pub struct Store {
    conn: Connection,
}

impl Store {
    /// Open or create a database at the given path.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        // Create parent directories if needed
        if let Some(parent) = path.parent() {
            if !parent.exists() {
                std::fs::create_dir_all(parent).map_err(|e| Error::CreateDirectory {
                    path: parent.to_path_buf(),
                    source: e,
                })?;
            }
        }

        info!("Opening database at {}", path.display());
        let conn = Connection::open(path)?;

        // Enable WAL mode for better performance
        conn.execute_batch(
            "PRAGMA foreign_keys = ON;
             PRAGMA journal_mode = WAL;
             PRAGMA synchronous = NORMAL;",
        )?;

        // Initialize schema
        crate::schema::initialize(&conn)?;

        Ok(Self { conn })
    }

    /// Open the default database location.
    pub fn open_default() -> Result<Self> {
        Self::open(crate::default_db_path())
    }

    /// Open an in-memory database (for testing).
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        crate::schema::initialize(&conn)?;
        Ok(Self { conn })
    }
}

// Event log operations
impl Store {
    /// Append a captured event to the local log.
    ///
    /// Always succeeds locally regardless of connectivity. The record is
    /// created with `origin = LocalPending, synced = false` and a
    /// locally-unique id, so it enters the derived sync queue immediately.
    pub fn append_event(&self, event: &LocationEvent) -> Result<StoredRecord> {
        let captured_at = event.captured_at.unwrap_or_else(OffsetDateTime::now_utc);
        let id = generate_record_id(captured_at);
        let record = StoredRecord::from_event(event, id, captured_at);

        self.conn.execute(
            "INSERT INTO events (id, lat, lng, rssi, status, address, raw,
             captured_at, origin, synced, remote_id)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, 0, NULL)",
            rusqlite::params![
                record.id,
                record.lat,
                record.lng,
                record.rssi,
                record.status,
                record.address,
                record.raw,
                unix_millis(record.captured_at),
                record.origin.as_str(),
            ],
        )?;

        debug!("Appended event {} at {:.6},{:.6}", record.id, record.lat, record.lng);
        Ok(record)
    }

    /// Query events with filters.
    pub fn query_records(&self, query: &RecordQuery) -> Result<Vec<StoredRecord>> {
        let sql = query.build_sql();
        let (_, params) = query.build_where();

        debug!("Executing query: {}", sql);

        let params_ref: Vec<&dyn rusqlite::ToSql> = params.iter().map(|p| p.as_ref()).collect();

        let mut stmt = self.conn.prepare(&sql)?;
        let records = stmt
            .query_map(params_ref.as_slice(), row_to_record)?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(records)
    }

    /// All records awaiting remote confirmation, oldest first.
    ///
    /// The order is stable across calls: `(captured_at, id)` ascending,
    /// so reconciliation pushes records in capture order.
    pub fn list_pending(&self) -> Result<Vec<StoredRecord>> {
        self.query_records(&RecordQuery::new().pending_only().oldest_first())
    }

    /// Number of records awaiting remote confirmation.
    ///
    /// Recomputed from the log on every call; there is no separate counter
    /// to drift.
    pub fn count_pending(&self) -> Result<u64> {
        let count: i64 =
            self.conn
                .query_row("SELECT COUNT(*) FROM events WHERE synced = 0", [], |row| {
                    row.get(0)
                })?;
        Ok(count as u64)
    }

    /// Get a single record by id.
    pub fn get_record(&self, id: &str) -> Result<Option<StoredRecord>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, lat, lng, rssi, status, address, raw, captured_at,
             origin, synced, remote_id FROM events WHERE id = ?",
        )?;

        let record = stmt.query_row([id], row_to_record).optional()?;
        Ok(record)
    }

    /// Mark a record as confirmed by the remote store.
    ///
    /// This is the only mutation a record undergoes after creation, and it
    /// fires exactly once: a second call for the same id fails with
    /// [`Error::RecordNotFound`]. The resolved address travels with the
    /// confirmation so the record's final form matches what was pushed.
    pub fn mark_synced(&self, id: &str, remote_id: &str, address: &str) -> Result<()> {
        let updated = self.conn.execute(
            "UPDATE events SET synced = 1, remote_id = ?2, address = ?3
             WHERE id = ?1 AND synced = 0",
            rusqlite::params![id, remote_id, address],
        )?;

        if updated == 0 {
            return Err(Error::RecordNotFound(id.to_string()));
        }

        debug!("Marked {} synced as {}", id, remote_id);
        Ok(())
    }

    /// Delete a single record (user-initiated deletion of unsynced data).
    ///
    /// Removing the record also removes it from the derived sync queue;
    /// the queue is a view over this table, so the two cannot diverge.
    pub fn remove_record(&self, id: &str) -> Result<()> {
        let deleted = self
            .conn
            .execute("DELETE FROM events WHERE id = ?", [id])?;

        if deleted == 0 {
            return Err(Error::RecordNotFound(id.to_string()));
        }
        Ok(())
    }

    /// Delete all records (bulk clear). Returns the number removed.
    pub fn clear_events(&self) -> Result<usize> {
        let deleted = self.conn.execute("DELETE FROM events", [])?;
        info!("Cleared {} event records", deleted);
        Ok(deleted)
    }

    /// Export the event log as CSV, oldest first. Returns the row count.
    pub fn export_events_csv<W: std::io::Write>(&self, writer: W) -> Result<usize> {
        let records = self.query_records(&RecordQuery::new().oldest_first())?;

        let mut csv = csv::Writer::from_writer(writer);
        csv.write_record([
            "id",
            "captured_at",
            "lat",
            "lng",
            "rssi",
            "status",
            "address",
            "synced",
            "remote_id",
        ])?;

        for record in &records {
            let captured_at = record
                .captured_at
                .format(&time::format_description::well_known::Rfc3339)
                .map_err(|e| Error::InvalidTimestamp(e.to_string()))?;

            csv.write_record([
                record.id.clone(),
                captured_at,
                record.lat.to_string(),
                record.lng.to_string(),
                record.rssi.to_string(),
                record.status.clone(),
                record.address.clone(),
                record.synced.to_string(),
                record.remote_id.clone().unwrap_or_default(),
            ])?;
        }

        csv.flush().map_err(Error::Io)?;
        Ok(records.len())
    }
}

// Tile cache operations
impl Store {
    /// Store a tile, replacing any previous record under the same key.
    ///
    /// The write is a single statement, so a key is either fully replaced
    /// or untouched; there is no partial tile. A full disk fails only this
    /// put ([`Error::StorageFull`]) and leaves prior entries intact.
    pub fn put_tile(&self, coord: TileCoord, image: &[u8], source_url: &str) -> Result<()> {
        let now = unix_millis(OffsetDateTime::now_utc());

        self.conn
            .execute(
                "INSERT INTO tiles (zoom, x, y, image, source_url, cached_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                 ON CONFLICT(zoom, x, y) DO UPDATE SET
                    image = ?4, source_url = ?5, cached_at = ?6",
                rusqlite::params![coord.zoom, coord.x, coord.y, image, source_url, now],
            )
            .map_err(map_tile_write_error)?;

        debug!("Cached tile {} ({} bytes)", coord, image.len());
        Ok(())
    }

    /// Get a cached tile.
    pub fn get_tile(&self, coord: TileCoord) -> Result<Option<TileRecord>> {
        let mut stmt = self.conn.prepare(
            "SELECT image, source_url, cached_at FROM tiles
             WHERE zoom = ?1 AND x = ?2 AND y = ?3",
        )?;

        let record = stmt
            .query_row(rusqlite::params![coord.zoom, coord.x, coord.y], |row| {
                Ok(TileRecord {
                    coord,
                    image: row.get(0)?,
                    source_url: row.get(1)?,
                    cached_at: from_unix_millis(row.get(2)?),
                })
            })
            .optional()?;

        Ok(record)
    }

    /// Whether a tile is cached.
    pub fn has_tile(&self, coord: TileCoord) -> Result<bool> {
        let found: Option<i64> = self
            .conn
            .query_row(
                "SELECT 1 FROM tiles WHERE zoom = ?1 AND x = ?2 AND y = ?3",
                rusqlite::params![coord.zoom, coord.x, coord.y],
                |row| row.get(0),
            )
            .optional()?;

        Ok(found.is_some())
    }

    /// Summary of the tile cache, recomputed from the live rows.
    pub fn tile_stats(&self) -> Result<CacheManifest> {
        self.conn.query_row(
            "SELECT COUNT(*), COALESCE(SUM(LENGTH(image)), 0), MAX(cached_at) FROM tiles",
            [],
            |row| {
                Ok(CacheManifest {
                    tile_count: row.get::<_, i64>(0)? as u64,
                    total_bytes: row.get::<_, i64>(1)? as u64,
                    last_updated: row.get::<_, Option<i64>>(2)?.map(from_unix_millis),
                })
            },
        )
        .map_err(Error::Database)
    }

    /// Remove all cached tiles. Returns the number removed.
    pub fn clear_tiles(&self) -> Result<usize> {
        let deleted = self.conn.execute("DELETE FROM tiles", [])?;
        info!("Cleared {} cached tiles", deleted);
        Ok(deleted)
    }

    /// Remove cached tiles in an inclusive zoom range (partial invalidation).
    pub fn clear_tiles_in_zoom_range(&self, min_zoom: u8, max_zoom: u8) -> Result<usize> {
        let deleted = self.conn.execute(
            "DELETE FROM tiles WHERE zoom >= ?1 AND zoom <= ?2",
            rusqlite::params![min_zoom, max_zoom],
        )?;
        Ok(deleted)
    }
}

// Address cache operations
impl Store {
    /// Look up a previously resolved address by its rounded-coordinate key.
    pub fn cached_address(&self, cache_key: &str) -> Result<Option<String>> {
        let address = self
            .conn
            .query_row(
                "SELECT address FROM addresses WHERE cache_key = ?",
                [cache_key],
                |row| row.get(0),
            )
            .optional()?;

        Ok(address)
    }

    /// Remember a resolved address under its rounded-coordinate key.
    pub fn put_cached_address(&self, cache_key: &str, address: &str) -> Result<()> {
        self.conn.execute(
            "INSERT INTO addresses (cache_key, address, resolved_at) VALUES (?1, ?2, ?3)
             ON CONFLICT(cache_key) DO UPDATE SET address = ?2, resolved_at = ?3",
            rusqlite::params![cache_key, address, unix_millis(OffsetDateTime::now_utc())],
        )?;
        Ok(())
    }
}

fn row_to_record(row: &rusqlite::Row<'_>) -> rusqlite::Result<StoredRecord> {
    Ok(StoredRecord {
        id: row.get(0)?,
        lat: row.get(1)?,
        lng: row.get(2)?,
        rssi: row.get::<_, i64>(3)? as i16,
        status: row.get(4)?,
        address: row.get(5)?,
        raw: row.get(6)?,
        captured_at: from_unix_millis(row.get(7)?),
        origin: RecordOrigin::parse(&row.get::<_, String>(8)?),
        synced: row.get::<_, i64>(9)? != 0,
        remote_id: row.get(10)?,
    })
}

fn from_unix_millis(millis: i64) -> OffsetDateTime {
    OffsetDateTime::from_unix_timestamp_nanos(i128::from(millis) * 1_000_000).unwrap()
}

/// SQLITE_FULL on a tile write becomes [`Error::StorageFull`]; the single
/// statement either lands or leaves the cache in its last-good state.
fn map_tile_write_error(e: rusqlite::Error) -> Error {
    match e {
        rusqlite::Error::SqliteFailure(err, _) if err.code == rusqlite::ErrorCode::DiskFull => {
            Error::StorageFull
        }
        other => Error::Database(other),
    }
}

/// Locally-unique record id: capture timestamp plus a random suffix so
/// rapid successive calls within the same millisecond cannot collide.
fn generate_record_id(captured_at: OffsetDateTime) -> String {
    let millis = unix_millis(captured_at);
    let suffix: String = rand::rng()
        .sample_iter(rand::distr::Alphanumeric)
        .take(6)
        .map(char::from)
        .collect();
    format!("loc-{millis}-{suffix}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    fn create_test_event(lat: f64, lng: f64) -> LocationEvent {
        LocationEvent::parse(&format!("Lat:{lat},Lng:{lng},Status:CHECK_IN"))
            .unwrap()
            .with_captured_at(OffsetDateTime::now_utc())
    }

    fn test_coord() -> TileCoord {
        TileCoord { zoom: 12, x: 3425, y: 1889 }
    }

    #[test]
    fn test_open_in_memory() {
        let store = Store::open_in_memory().unwrap();
        assert_eq!(store.count_pending().unwrap(), 0);
    }

    #[test]
    fn test_append_creates_pending_record() {
        let store = Store::open_in_memory().unwrap();
        let record = store.append_event(&create_test_event(13.7565, 121.0583)).unwrap();

        assert_eq!(record.origin, RecordOrigin::LocalPending);
        assert!(!record.synced);
        assert_eq!(record.address, crate::models::PENDING_ADDRESS);
        assert!(record.remote_id.is_none());

        let pending = store.list_pending().unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0], record);
    }

    #[test]
    fn test_pending_count_matches_appends() {
        let store = Store::open_in_memory().unwrap();
        for i in 0..20 {
            store
                .append_event(&create_test_event(13.0 + f64::from(i) * 0.01, 121.0))
                .unwrap();
        }
        assert_eq!(store.count_pending().unwrap(), 20);
        assert_eq!(store.list_pending().unwrap().len(), 20);
    }

    #[test]
    fn test_record_ids_unique_within_same_millisecond() {
        let store = Store::open_in_memory().unwrap();
        let captured = OffsetDateTime::now_utc();
        let event = create_test_event(13.7565, 121.0583).with_captured_at(captured);

        let mut ids = HashSet::new();
        for _ in 0..50 {
            let record = store.append_event(&event).unwrap();
            assert!(ids.insert(record.id), "duplicate record id generated");
        }
    }

    #[test]
    fn test_pending_order_is_stable_oldest_first() {
        let store = Store::open_in_memory().unwrap();
        let base = OffsetDateTime::now_utc();

        for i in 0..5 {
            let event = create_test_event(13.7565, 121.0583)
                .with_captured_at(base + time::Duration::milliseconds(i * 10));
            store.append_event(&event).unwrap();
        }

        let first = store.list_pending().unwrap();
        let second = store.list_pending().unwrap();
        assert_eq!(first, second);

        for pair in first.windows(2) {
            assert!(pair[0].captured_at <= pair[1].captured_at);
        }
    }

    #[test]
    fn test_mark_synced_transitions_exactly_once() {
        let store = Store::open_in_memory().unwrap();
        let record = store.append_event(&create_test_event(13.7565, 121.0583)).unwrap();

        store
            .mark_synced(&record.id, "remote-1", "Batangas City, Philippines")
            .unwrap();

        let stored = store.get_record(&record.id).unwrap().unwrap();
        assert!(stored.synced);
        assert_eq!(stored.remote_id.as_deref(), Some("remote-1"));
        assert_eq!(stored.address, "Batangas City, Philippines");
        assert_eq!(store.count_pending().unwrap(), 0);

        // Second transition is rejected.
        let err = store.mark_synced(&record.id, "remote-2", "elsewhere").unwrap_err();
        assert!(matches!(err, Error::RecordNotFound(_)));
    }

    #[test]
    fn test_remove_record() {
        let store = Store::open_in_memory().unwrap();
        let record = store.append_event(&create_test_event(13.7565, 121.0583)).unwrap();

        store.remove_record(&record.id).unwrap();
        assert!(store.get_record(&record.id).unwrap().is_none());
        assert_eq!(store.count_pending().unwrap(), 0);

        assert!(matches!(
            store.remove_record(&record.id),
            Err(Error::RecordNotFound(_))
        ));
    }

    #[test]
    fn test_clear_events() {
        let store = Store::open_in_memory().unwrap();
        for _ in 0..3 {
            store.append_event(&create_test_event(13.7565, 121.0583)).unwrap();
        }
        assert_eq!(store.clear_events().unwrap(), 3);
        assert_eq!(store.count_pending().unwrap(), 0);
    }

    #[test]
    fn test_query_records_newest_first_with_limit() {
        let store = Store::open_in_memory().unwrap();
        let base = OffsetDateTime::now_utc();

        for i in 0..10 {
            let event = create_test_event(13.7565, 121.0583)
                .with_captured_at(base + time::Duration::seconds(i));
            store.append_event(&event).unwrap();
        }

        let records = store.query_records(&RecordQuery::new().limit(3)).unwrap();
        assert_eq!(records.len(), 3);
        assert!(records[0].captured_at >= records[1].captured_at);
    }

    #[test]
    fn test_export_events_csv() {
        let store = Store::open_in_memory().unwrap();
        let record = store.append_event(&create_test_event(13.7565, 121.0583)).unwrap();

        let mut out = Vec::new();
        let rows = store.export_events_csv(&mut out).unwrap();
        assert_eq!(rows, 1);

        let text = String::from_utf8(out).unwrap();
        assert!(text.starts_with("id,captured_at"));
        assert!(text.contains(&record.id));
        assert!(text.contains("CHECK_IN"));
    }

    #[test]
    fn test_put_then_get_tile_is_byte_identical() {
        let store = Store::open_in_memory().unwrap();
        let image: Vec<u8> = (0..=255).collect();

        store
            .put_tile(test_coord(), &image, "https://tile.example/12/3425/1889.png")
            .unwrap();

        let tile = store.get_tile(test_coord()).unwrap().unwrap();
        assert_eq!(tile.image, image);
        assert_eq!(tile.source_url, "https://tile.example/12/3425/1889.png");
        assert!(store.has_tile(test_coord()).unwrap());
    }

    #[test]
    fn test_put_tile_replaces_atomically() {
        let store = Store::open_in_memory().unwrap();
        store.put_tile(test_coord(), &[1, 2, 3], "url-a").unwrap();
        store.put_tile(test_coord(), &[9, 9], "url-b").unwrap();

        let tile = store.get_tile(test_coord()).unwrap().unwrap();
        assert_eq!(tile.image, vec![9, 9]);
        assert_eq!(tile.source_url, "url-b");

        let stats = store.tile_stats().unwrap();
        assert_eq!(stats.tile_count, 1);
        assert_eq!(stats.total_bytes, 2);
    }

    #[test]
    fn test_tile_stats_recomputed_from_rows() {
        let store = Store::open_in_memory().unwrap();

        let empty = store.tile_stats().unwrap();
        assert_eq!(empty.tile_count, 0);
        assert_eq!(empty.total_bytes, 0);
        assert!(empty.last_updated.is_none());

        store.put_tile(TileCoord { zoom: 12, x: 1, y: 1 }, &[0; 100], "a").unwrap();
        store.put_tile(TileCoord { zoom: 13, x: 2, y: 2 }, &[0; 50], "b").unwrap();

        let stats = store.tile_stats().unwrap();
        assert_eq!(stats.tile_count, 2);
        assert_eq!(stats.total_bytes, 150);
        assert!(stats.last_updated.is_some());
    }

    #[test]
    fn test_clear_tiles_resets_stats() {
        let store = Store::open_in_memory().unwrap();
        store.put_tile(test_coord(), &[1, 2, 3], "url").unwrap();

        assert_eq!(store.clear_tiles().unwrap(), 1);

        let stats = store.tile_stats().unwrap();
        assert_eq!(stats.tile_count, 0);
        assert_eq!(stats.total_bytes, 0);
        assert!(!store.has_tile(test_coord()).unwrap());
    }

    #[test]
    fn test_clear_tiles_in_zoom_range() {
        let store = Store::open_in_memory().unwrap();
        for zoom in 10..=14 {
            store.put_tile(TileCoord { zoom, x: 1, y: 1 }, &[zoom], "url").unwrap();
        }

        assert_eq!(store.clear_tiles_in_zoom_range(11, 13).unwrap(), 3);
        assert!(store.has_tile(TileCoord { zoom: 10, x: 1, y: 1 }).unwrap());
        assert!(!store.has_tile(TileCoord { zoom: 12, x: 1, y: 1 }).unwrap());
        assert!(store.has_tile(TileCoord { zoom: 14, x: 1, y: 1 }).unwrap());
    }

    #[test]
    fn test_keys_do_not_collide_across_zoom_levels() {
        let store = Store::open_in_memory().unwrap();
        store.put_tile(TileCoord { zoom: 11, x: 5, y: 5 }, &[11], "a").unwrap();
        store.put_tile(TileCoord { zoom: 12, x: 5, y: 5 }, &[12], "b").unwrap();

        assert_eq!(store.get_tile(TileCoord { zoom: 11, x: 5, y: 5 }).unwrap().unwrap().image, vec![11]);
        assert_eq!(store.get_tile(TileCoord { zoom: 12, x: 5, y: 5 }).unwrap().unwrap().image, vec![12]);
    }

    #[test]
    fn test_address_cache_roundtrip() {
        let store = Store::open_in_memory().unwrap();
        assert!(store.cached_address("13.7565,121.0583").unwrap().is_none());

        store
            .put_cached_address("13.7565,121.0583", "Batangas City, Philippines")
            .unwrap();
        assert_eq!(
            store.cached_address("13.7565,121.0583").unwrap().as_deref(),
            Some("Batangas City, Philippines")
        );

        // Overwrite is allowed; last writer wins.
        store.put_cached_address("13.7565,121.0583", "Batangas").unwrap();
        assert_eq!(
            store.cached_address("13.7565,121.0583").unwrap().as_deref(),
            Some("Batangas")
        );
    }

    #[test]
    fn test_open_on_disk_persists() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("data.db");

        {
            let store = Store::open(&path).unwrap();
            store.append_event(&create_test_event(13.7565, 121.0583)).unwrap();
        }

        let store = Store::open(&path).unwrap();
        assert_eq!(store.count_pending().unwrap(), 1);
    }
}
