//! Mock collaborators for testing.
//!
//! The sync engine's externals (remote store, reverse geocoder, tile
//! source) are trait seams; these mocks implement them without any
//! network, with failure injection, latency simulation, and call counting
//! for asserting exactly what the engine did.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{RwLock, broadcast};

use waymark_store::StoredRecord;
use waymark_types::TileCoord;

use crate::error::{Error, Result};
use crate::geocode::ReverseGeocoder;
use crate::remote::{RemoteChange, RemoteRecord, RemoteStore};
use crate::tiles::TileSource;

/// A mock remote store backed by an in-memory collection.
///
/// # Failure injection
///
/// - [`set_should_fail`](Self::set_should_fail): every insert fails until
///   cleared.
/// - [`fail_next_inserts`](Self::fail_next_inserts): the next N inserts
///   fail, then inserts succeed again.
/// - [`set_insert_latency`](Self::set_insert_latency): artificial delay
///   before each insert resolves, for exercising interleavings.
pub struct MockRemoteStore {
    records: RwLock<Vec<RemoteRecord>>,
    next_id: AtomicU64,
    insert_count: AtomicU32,
    should_fail: AtomicBool,
    remaining_failures: AtomicU32,
    fail_message: RwLock<String>,
    insert_latency_ms: AtomicU64,
    changes: broadcast::Sender<RemoteChange>,
}

impl std::fmt::Debug for MockRemoteStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockRemoteStore")
            .field("insert_count", &self.insert_count.load(Ordering::Relaxed))
            .field("should_fail", &self.should_fail.load(Ordering::Relaxed))
            .finish()
    }
}

impl MockRemoteStore {
    /// Create an empty mock remote store.
    pub fn new() -> Self {
        let (changes, _) = broadcast::channel(100);
        Self {
            records: RwLock::new(Vec::new()),
            next_id: AtomicU64::new(0),
            insert_count: AtomicU32::new(0),
            should_fail: AtomicBool::new(false),
            remaining_failures: AtomicU32::new(0),
            fail_message: RwLock::new("mock remote failure".to_string()),
            insert_latency_ms: AtomicU64::new(0),
            changes,
        }
    }

    /// Make every insert fail until cleared.
    pub fn set_should_fail(&self, fail: bool) {
        self.should_fail.store(fail, Ordering::SeqCst);
    }

    /// Make the next `count` inserts fail, then succeed again.
    pub fn fail_next_inserts(&self, count: u32) {
        self.remaining_failures.store(count, Ordering::SeqCst);
    }

    /// Set the failure message returned by injected failures.
    pub async fn set_fail_message(&self, message: impl Into<String>) {
        *self.fail_message.write().await = message.into();
    }

    /// Delay each insert by the given duration.
    pub fn set_insert_latency(&self, latency: Duration) {
        self.insert_latency_ms
            .store(latency.as_millis() as u64, Ordering::SeqCst);
    }

    /// Total insert attempts, including failed ones.
    pub fn insert_count(&self) -> u32 {
        self.insert_count.load(Ordering::SeqCst)
    }

    /// Snapshot of the stored records.
    pub async fn records(&self) -> Vec<RemoteRecord> {
        self.records.read().await.clone()
    }

    async fn injected_failure(&self) -> Option<Error> {
        if self.should_fail.load(Ordering::SeqCst) {
            return Some(Error::remote_rejected(self.fail_message.read().await.clone()));
        }
        if self.remaining_failures.load(Ordering::SeqCst) > 0 {
            self.remaining_failures.fetch_sub(1, Ordering::SeqCst);
            return Some(Error::remote_rejected(self.fail_message.read().await.clone()));
        }
        None
    }
}

impl Default for MockRemoteStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RemoteStore for MockRemoteStore {
    async fn insert(&self, record: &StoredRecord, address: &str) -> Result<String> {
        let latency = self.insert_latency_ms.load(Ordering::SeqCst);
        if latency > 0 {
            tokio::time::sleep(Duration::from_millis(latency)).await;
        }

        self.insert_count.fetch_add(1, Ordering::SeqCst);

        if let Some(error) = self.injected_failure().await {
            return Err(error);
        }

        let id = format!("remote-{}", self.next_id.fetch_add(1, Ordering::SeqCst) + 1);
        let remote = RemoteRecord::from_push(record, address, id.clone());

        self.records.write().await.push(remote.clone());
        let _ = self.changes.send(RemoteChange::Added { record: remote });
        Ok(id)
    }

    async fn delete_by_id(&self, id: &str) -> Result<()> {
        let mut records = self.records.write().await;
        let before = records.len();
        records.retain(|r| r.id != id);

        if records.len() == before {
            return Err(Error::remote_rejected(format!("no such record: {id}")));
        }
        let _ = self.changes.send(RemoteChange::Removed { id: id.to_string() });
        Ok(())
    }

    async fn delete_all(&self) -> Result<()> {
        self.records.write().await.clear();
        let _ = self.changes.send(RemoteChange::Cleared);
        Ok(())
    }

    fn subscribe_changes(&self) -> broadcast::Receiver<RemoteChange> {
        self.changes.subscribe()
    }
}

/// A mock reverse geocoder returning a fixed address.
pub struct MockGeocoder {
    address: RwLock<String>,
    should_fail: AtomicBool,
    latency_ms: AtomicU64,
    call_count: AtomicU32,
}

impl MockGeocoder {
    /// Create a geocoder that always resolves to `address`.
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            address: RwLock::new(address.into()),
            should_fail: AtomicBool::new(false),
            latency_ms: AtomicU64::new(0),
            call_count: AtomicU32::new(0),
        }
    }

    /// Make every lookup fail until cleared.
    pub fn set_should_fail(&self, fail: bool) {
        self.should_fail.store(fail, Ordering::SeqCst);
    }

    /// Delay each lookup by the given duration.
    pub fn set_latency(&self, latency: Duration) {
        self.latency_ms
            .store(latency.as_millis() as u64, Ordering::SeqCst);
    }

    /// Number of lookups attempted.
    pub fn call_count(&self) -> u32 {
        self.call_count.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ReverseGeocoder for MockGeocoder {
    async fn reverse(&self, _lat: f64, _lng: f64) -> Result<String> {
        self.call_count.fetch_add(1, Ordering::SeqCst);

        let latency = self.latency_ms.load(Ordering::SeqCst);
        if latency > 0 {
            tokio::time::sleep(Duration::from_millis(latency)).await;
        }

        if self.should_fail.load(Ordering::SeqCst) {
            return Err(Error::remote_rejected("mock geocoder failure"));
        }
        Ok(self.address.read().await.clone())
    }
}

/// A mock tile source serving one fixed image.
pub struct MockTileSource {
    image: Vec<u8>,
    fail_coords: RwLock<HashSet<TileCoord>>,
    fetch_count: AtomicU32,
    fetched: RwLock<Vec<TileCoord>>,
}

impl MockTileSource {
    /// Create a source serving `image` for every tile.
    pub fn new(image: Vec<u8>) -> Self {
        Self {
            image,
            fail_coords: RwLock::new(HashSet::new()),
            fetch_count: AtomicU32::new(0),
            fetched: RwLock::new(Vec::new()),
        }
    }

    /// Make fetches of one specific tile fail.
    pub async fn fail_on(&self, coord: TileCoord) {
        self.fail_coords.write().await.insert(coord);
    }

    /// Number of fetch attempts, including failed ones.
    pub fn fetch_count(&self) -> u32 {
        self.fetch_count.load(Ordering::SeqCst)
    }

    /// Every coordinate fetched, in order.
    pub async fn fetched(&self) -> Vec<TileCoord> {
        self.fetched.read().await.clone()
    }
}

#[async_trait]
impl TileSource for MockTileSource {
    async fn fetch(&self, coord: TileCoord) -> Result<Vec<u8>> {
        self.fetch_count.fetch_add(1, Ordering::SeqCst);
        self.fetched.write().await.push(coord);

        if self.fail_coords.read().await.contains(&coord) {
            return Err(Error::TileUnavailable { coord, status: 503 });
        }
        Ok(self.image.clone())
    }

    fn tile_url(&self, coord: TileCoord) -> String {
        format!("mock://tiles/{coord}")
    }
}
