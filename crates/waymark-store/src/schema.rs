//! Database schema and migrations.

use rusqlite::Connection;

use crate::error::Result;

/// Current schema version.
pub const SCHEMA_VERSION: i32 = 1;

/// Initialize the database schema.
pub fn initialize(conn: &Connection) -> Result<()> {
    let version = get_schema_version(conn)?;

    if version == 0 {
        // Fresh database - create all tables
        create_schema_v1(conn)?;
        set_schema_version(conn, SCHEMA_VERSION)?;
    } else if version < SCHEMA_VERSION {
        // Run migrations
        migrate(conn, version)?;
    }

    Ok(())
}

/// Get the current schema version.
fn get_schema_version(conn: &Connection) -> Result<i32> {
    // Check if the schema_version table exists
    let exists: bool = conn.query_row(
        "SELECT COUNT(*) > 0 FROM sqlite_master WHERE type='table' AND name='schema_version'",
        [],
        |row| row.get(0),
    )?;

    if !exists {
        return Ok(0);
    }

    let version: i32 =
        conn.query_row("SELECT version FROM schema_version", [], |row| row.get(0))?;

    Ok(version)
}

/// Set the schema version.
fn set_schema_version(conn: &Connection, version: i32) -> Result<()> {
    conn.execute(
        "INSERT OR REPLACE INTO schema_version (id, version) VALUES (1, ?)",
        [version],
    )?;
    Ok(())
}

/// Create the initial schema (version 1).
fn create_schema_v1(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r#"
        -- Schema version tracking
        CREATE TABLE IF NOT EXISTS schema_version (
            id INTEGER PRIMARY KEY CHECK (id = 1),
            version INTEGER NOT NULL
        );

        -- Captured location events (append-only local log).
        -- The sync queue is the filtered view WHERE synced = 0; it is
        -- never stored separately so it cannot diverge from the log.
        CREATE TABLE IF NOT EXISTS events (
            id TEXT PRIMARY KEY,
            lat REAL NOT NULL,
            lng REAL NOT NULL,
            rssi INTEGER NOT NULL,
            status TEXT NOT NULL,
            address TEXT NOT NULL,
            raw TEXT NOT NULL,
            captured_at INTEGER NOT NULL,
            origin TEXT NOT NULL,
            synced INTEGER NOT NULL DEFAULT 0,
            remote_id TEXT
        );
        CREATE INDEX IF NOT EXISTS idx_events_pending
            ON events(synced, captured_at);

        -- Cached map tiles, keyed by slippy-map coordinate
        CREATE TABLE IF NOT EXISTS tiles (
            zoom INTEGER NOT NULL,
            x INTEGER NOT NULL,
            y INTEGER NOT NULL,
            image BLOB NOT NULL,
            source_url TEXT NOT NULL,
            cached_at INTEGER NOT NULL,
            PRIMARY KEY (zoom, x, y)
        );

        -- Reverse-geocoded addresses keyed by rounded coordinates
        CREATE TABLE IF NOT EXISTS addresses (
            cache_key TEXT PRIMARY KEY,
            address TEXT NOT NULL,
            resolved_at INTEGER NOT NULL
        );
        "#,
    )?;

    Ok(())
}

/// Run migrations from old_version to current.
fn migrate(conn: &Connection, old_version: i32) -> Result<()> {
    // Add future migrations here
    // if old_version < 2 { migrate_to_v2(conn)?; }

    let _ = old_version; // Suppress unused warning
    set_schema_version(conn, SCHEMA_VERSION)?;
    Ok(())
}
