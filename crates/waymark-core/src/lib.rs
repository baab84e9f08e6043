//! Offline-first sync and caching engine for the Waymark location tracker.
//!
//! This crate ties the local store to the outside world: it frames sensor
//! bytes into lines, reconciles the offline event log with the remote
//! authoritative store, resolves addresses, watches connectivity, and
//! keeps the offline map tile cache populated.
//!
//! # Design
//!
//! - **Capture never waits on the network.** Parsed events are persisted
//!   locally first; reconciliation runs separately and later.
//! - **External collaborators are trait seams.** The remote store, reverse
//!   geocoder, and tile source are object-safe traits with HTTP
//!   implementations and in-memory mocks.
//! - **Failures degrade, never abort.** A rejected push leaves its record
//!   pending; a failed tile fetch skips one tile; a dead geocoder yields a
//!   coordinate placeholder.
//!
//! # Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//! use tokio::sync::Mutex;
//! use waymark_core::{
//!     AddressResolver, EventDispatcher, HttpRemoteStore, NominatimGeocoder, Reconciler,
//! };
//! use waymark_store::Store;
//!
//! # async fn example() -> waymark_core::Result<()> {
//! let store = Arc::new(Mutex::new(Store::open_default()?));
//! let remote = Arc::new(HttpRemoteStore::new("https://api.example.com/v1"));
//! let resolver = AddressResolver::new(
//!     Arc::new(NominatimGeocoder::default()),
//!     Arc::clone(&store),
//! );
//! let events = EventDispatcher::default();
//!
//! let reconciler = Reconciler::new(store, remote, resolver, events);
//! let result = reconciler.reconcile(true, true).await?;
//! println!("synced {} record(s)", result.succeeded);
//! # Ok(())
//! # }
//! ```

pub mod error;
pub mod events;
pub mod geocode;
pub mod link;
pub mod mirror;
pub mod mock;
pub mod monitor;
pub mod prefetch;
pub mod remote;
pub mod sync;
pub mod tiles;

pub use error::{Error, Result};
pub use events::{EventDispatcher, EventReceiver, EventSender, TrackerEvent};
pub use geocode::{AddressResolver, NominatimGeocoder, ReverseGeocoder};
pub use link::LineFramer;
pub use mirror::RemoteMirror;
pub use monitor::NetworkMonitor;
pub use prefetch::{AreaPrefetcher, PrefetchOptions, PrefetchReport};
pub use remote::{HttpRemoteStore, RemoteChange, RemoteRecord, RemoteStore};
pub use sync::{Reconciler, SyncResult, TrackPoint, merge_views};
pub use tiles::{HttpTileSource, TileSource};

/// User-Agent sent with every outbound HTTP request; third-party tile and
/// geocoding services require an identifying agent.
pub(crate) const HTTP_USER_AGENT: &str = concat!("waymark/", env!("CARGO_PKG_VERSION"));
