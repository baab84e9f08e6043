//! Reconciliation of the local event log with the remote store.
//!
//! State machine per record:
//!
//! ```text
//! LocalPending --(online + authenticated)--> PushAttempted --+--> Synced
//!                                                            |
//!                                                            +--> PushFailed (stays pending)
//! ```
//!
//! One pass walks the then-current pending set in capture order: resolve
//! an address if needed, push, mark synced on acknowledgment. A failed
//! record stays pending and does not stop the rest of the batch. Records
//! appended after the pass started are picked up by the next pass.
//!
//! At most one pass runs at a time: the in-flight guard rejects (does not
//! queue) re-entrant invocations, which would otherwise read the same
//! pending set and double-push every record in it.

use std::collections::HashSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use serde::Serialize;
use time::OffsetDateTime;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use waymark_store::{PENDING_ADDRESS, RecordOrigin, Store, StoredRecord};

use crate::error::Result;
use crate::events::{EventDispatcher, TrackerEvent};
use crate::geocode::AddressResolver;
use crate::mirror::RemoteMirror;
use crate::remote::{RemoteRecord, RemoteStore};

/// Fixed delay between record pushes, so a long queue does not hammer the
/// remote store after a long offline stretch.
pub const DEFAULT_PUSH_DELAY: Duration = Duration::from_millis(200);

/// Outcome of one reconciliation pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SyncResult {
    /// Records confirmed by the remote store in this pass.
    pub succeeded: usize,
    /// Records that stayed pending.
    pub failed: usize,
}

impl SyncResult {
    /// Whether every attempted push landed.
    pub fn is_clean(&self) -> bool {
        self.failed == 0
    }
}

/// Pushes pending records to the remote store and marks the confirmations.
pub struct Reconciler {
    store: Arc<Mutex<Store>>,
    remote: Arc<dyn RemoteStore>,
    resolver: AddressResolver,
    events: EventDispatcher,
    push_delay: Duration,
    in_flight: AtomicBool,
    last_synced_millis: AtomicU64,
}

impl Reconciler {
    /// Create a reconciler over the shared store and remote seam.
    pub fn new(
        store: Arc<Mutex<Store>>,
        remote: Arc<dyn RemoteStore>,
        resolver: AddressResolver,
        events: EventDispatcher,
    ) -> Self {
        Self {
            store,
            remote,
            resolver,
            events,
            push_delay: DEFAULT_PUSH_DELAY,
            in_flight: AtomicBool::new(false),
            last_synced_millis: AtomicU64::new(0),
        }
    }

    /// Override the fixed inter-record push delay.
    #[must_use]
    pub fn with_push_delay(mut self, delay: Duration) -> Self {
        self.push_delay = delay;
        self
    }

    /// Run one reconciliation pass over the current pending set.
    ///
    /// No-op when offline, unauthenticated, or a pass is already in
    /// flight; re-entrant calls are rejected, not queued.
    pub async fn reconcile(&self, online: bool, authenticated: bool) -> Result<SyncResult> {
        if !online {
            debug!("Skipping reconciliation: offline");
            return Ok(SyncResult::default());
        }
        if !authenticated {
            debug!("Skipping reconciliation: not authenticated");
            return Ok(SyncResult::default());
        }
        if self.in_flight.swap(true, Ordering::SeqCst) {
            debug!("Reconciliation already in flight, rejecting re-entrant call");
            return Ok(SyncResult::default());
        }

        let result = self.run_pass(online).await;
        self.in_flight.store(false, Ordering::SeqCst);
        result
    }

    async fn run_pass(&self, online: bool) -> Result<SyncResult> {
        let pending = self.store.lock().await.list_pending()?;
        if pending.is_empty() {
            return Ok(SyncResult::default());
        }

        info!("Reconciling {} pending record(s)", pending.len());
        self.events.send(TrackerEvent::SyncStarted { pending: pending.len() });

        let mut result = SyncResult::default();

        for record in &pending {
            // Address first. The resolver is infallible (cache, geocoder,
            // or placeholder) and never blocks the push.
            let address = if record.address == PENDING_ADDRESS {
                self.resolver.resolve(record.lat, record.lng, online).await
            } else {
                record.address.clone()
            };

            match self.remote.insert(record, &address).await {
                Ok(remote_id) => {
                    match self.store.lock().await.mark_synced(&record.id, &remote_id, &address) {
                        Ok(()) => {
                            result.succeeded += 1;
                            self.events.send(TrackerEvent::RecordSynced {
                                id: record.id.clone(),
                                remote_id,
                            });
                        }
                        Err(e) => {
                            // The remote has the record but it is still
                            // pending locally; the origin_id dedup absorbs
                            // the repeat push of the next pass.
                            warn!("Pushed {} but failed to mark synced: {}", record.id, e);
                            result.failed += 1;
                        }
                    }
                }
                Err(e) => {
                    warn!("Push failed for {}, record stays pending: {}", record.id, e);
                    result.failed += 1;
                }
            }

            tokio::time::sleep(self.push_delay).await;
        }

        if result.succeeded > 0 {
            let now = OffsetDateTime::now_utc().unix_timestamp_nanos() / 1_000_000;
            self.last_synced_millis.store(now as u64, Ordering::SeqCst);
        }

        info!(
            "Reconciliation complete: {} synced, {} still pending",
            result.succeeded, result.failed
        );
        self.events.send(TrackerEvent::SyncCompleted {
            succeeded: result.succeeded,
            failed: result.failed,
        });

        Ok(result)
    }

    /// Whether a pass is currently in flight.
    pub fn is_reconciling(&self) -> bool {
        self.in_flight.load(Ordering::SeqCst)
    }

    /// When the last successful push happened, if ever.
    pub fn last_synced_at(&self) -> Option<OffsetDateTime> {
        let millis = self.last_synced_millis.load(Ordering::SeqCst);
        if millis == 0 {
            None
        } else {
            OffsetDateTime::from_unix_timestamp_nanos(i128::from(millis) * 1_000_000).ok()
        }
    }

    /// Number of records awaiting confirmation, recomputed from the log.
    pub async fn pending_count(&self) -> Result<u64> {
        Ok(self.store.lock().await.count_pending()?)
    }

    /// The unified view the UI consumes: pending records first, then the
    /// mirrored remote collection, no record twice.
    pub async fn merged_view(&self, mirror: &RemoteMirror) -> Result<Vec<TrackPoint>> {
        let pending = self.store.lock().await.list_pending()?;
        let remote = mirror.snapshot().await;
        Ok(merge_views(pending, remote))
    }
}

/// One entry of the merged view.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrackPoint {
    /// Record identifier (local id while pending, remote id once synced).
    pub id: String,
    /// Latitude in decimal degrees.
    pub lat: f64,
    /// Longitude in decimal degrees.
    pub lng: f64,
    /// Received signal strength in dBm.
    pub rssi: i16,
    /// Status tag from the beacon.
    pub status: String,
    /// Resolved address or pending placeholder.
    pub address: String,
    /// When the event was captured.
    #[serde(with = "time::serde::rfc3339")]
    pub captured_at: OffsetDateTime,
    /// Which side of the sync this entry currently lives on.
    pub origin: RecordOrigin,
}

impl TrackPoint {
    fn from_pending(record: &StoredRecord) -> Self {
        Self {
            id: record.id.clone(),
            lat: record.lat,
            lng: record.lng,
            rssi: record.rssi,
            status: record.status.clone(),
            address: record.address.clone(),
            captured_at: record.captured_at,
            origin: RecordOrigin::LocalPending,
        }
    }

    fn from_remote(record: RemoteRecord) -> Self {
        Self {
            id: record.id,
            lat: record.lat,
            lng: record.lng,
            rssi: record.rssi,
            status: record.status,
            address: record.address,
            captured_at: record.captured_at,
            origin: RecordOrigin::Remote,
        }
    }
}

/// Merge pending and remote records: pending always ahead of confirmed,
/// and no record appears twice.
///
/// A remote record whose `origin_id` matches a still-pending local id
/// means the push landed but the local mark did not (lost connection
/// mid-write); the remote copy wins and the pending copy is hidden until
/// the next pass resolves it.
pub fn merge_views(pending: Vec<StoredRecord>, remote: Vec<RemoteRecord>) -> Vec<TrackPoint> {
    let confirmed_origins: HashSet<&str> = remote
        .iter()
        .filter_map(|r| r.origin_id.as_deref())
        .collect();

    let mut view = Vec::with_capacity(pending.len() + remote.len());

    for record in &pending {
        if confirmed_origins.contains(record.id.as_str()) {
            debug!("Record {} already confirmed remotely, hiding pending copy", record.id);
            continue;
        }
        view.push(TrackPoint::from_pending(record));
    }

    view.extend(remote.into_iter().map(TrackPoint::from_remote));
    view
}
