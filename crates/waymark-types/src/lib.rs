//! Platform-agnostic types for the Waymark location tracker.
//!
//! This crate provides the shared types used by the persistence layer
//! (waymark-store) and the sync engine (waymark-core): geolocation events
//! parsed from the sensor link, and Web-Mercator tile coordinates for the
//! offline map cache.
//!
//! # Features
//!
//! - Tolerant multi-format parsing of sensor-link text lines
//! - Slippy-map tile coordinate conversions and range enumeration
//! - Error types for wire parsing
//!
//! # Example
//!
//! ```
//! use waymark_types::{LocationEvent, TileCoord};
//!
//! let event = LocationEvent::parse("Lat:13.756500,Lng:121.058300,Status:CHECK_IN")?;
//! let tile = TileCoord::from_lat_lng(event.lat, event.lng, 12);
//! assert_eq!(tile.zoom, 12);
//! # Ok::<(), waymark_types::ParseError>(())
//! ```

pub mod error;
pub mod event;
pub mod tile;

pub use error::{ParseError, ParseResult};
pub use event::{DEFAULT_RSSI, LocationEvent, UNKNOWN_STATUS};
pub use tile::{MAX_MERCATOR_LATITUDE, TileCoord, TileRange};
