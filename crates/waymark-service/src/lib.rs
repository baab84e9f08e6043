//! Headless runtime for the Waymark location tracker.
//!
//! Wires the sensor link, local store, and sync engine together: lines
//! read from the receiver are parsed and persisted immediately, and a
//! background driver reconciles the pending log with the remote store
//! whenever connectivity allows.

pub mod config;
pub mod ingest;
pub mod state;

pub use config::{Config, ConfigError};
pub use ingest::{run_ingest, spawn_sync_driver};
pub use state::AppState;
