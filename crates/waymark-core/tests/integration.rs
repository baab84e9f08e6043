//! End-to-end tests of the offline capture and reconciliation flow,
//! running against in-memory stores and mock collaborators.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;

use waymark_core::mock::{MockGeocoder, MockRemoteStore};
use waymark_core::{
    AddressResolver, EventDispatcher, LineFramer, Reconciler, RemoteMirror, RemoteStore,
    TrackerEvent,
};
use waymark_store::{PENDING_ADDRESS, RecordOrigin, Store};
use waymark_types::LocationEvent;

struct Harness {
    store: Arc<Mutex<Store>>,
    remote: Arc<MockRemoteStore>,
    geocoder: Arc<MockGeocoder>,
    reconciler: Arc<Reconciler>,
    events: EventDispatcher,
}

fn harness() -> Harness {
    let store = Arc::new(Mutex::new(Store::open_in_memory().unwrap()));
    let remote = Arc::new(MockRemoteStore::new());
    let geocoder = Arc::new(MockGeocoder::new("Batangas City, Philippines"));
    let events = EventDispatcher::default();

    let resolver = AddressResolver::new(
        Arc::clone(&geocoder) as _,
        Arc::clone(&store),
    );
    let reconciler = Arc::new(
        Reconciler::new(
            Arc::clone(&store),
            Arc::clone(&remote) as _,
            resolver,
            events.clone(),
        )
        .with_push_delay(Duration::from_millis(0)),
    );

    Harness {
        store,
        remote,
        geocoder,
        reconciler,
        events,
    }
}

async fn capture(h: &Harness, line: &str) -> waymark_store::StoredRecord {
    let event = LocationEvent::parse(line)
        .unwrap()
        .with_captured_at(time::OffsetDateTime::now_utc());
    h.store.lock().await.append_event(&event).unwrap()
}

#[tokio::test]
async fn offline_capture_then_reconcile_moves_record_to_synced() {
    let h = harness();

    // Captured while offline: one pending record, address unresolved.
    let record = capture(&h, "Lat:13.756500,Lng:121.058300,Status:CHECK_IN").await;
    assert_eq!(record.origin, RecordOrigin::LocalPending);
    assert!(!record.synced);
    assert_eq!(record.address, PENDING_ADDRESS);
    assert_eq!(h.reconciler.pending_count().await.unwrap(), 1);
    assert!(h.reconciler.last_synced_at().is_none());

    // Back online and authenticated.
    let result = h.reconciler.reconcile(true, true).await.unwrap();
    assert_eq!(result.succeeded, 1);
    assert_eq!(result.failed, 0);
    assert_eq!(h.reconciler.pending_count().await.unwrap(), 0);
    assert!(h.reconciler.last_synced_at().is_some());

    // The push carried the resolved address and the local origin id.
    let pushed = h.remote.records().await;
    assert_eq!(pushed.len(), 1);
    assert_eq!(pushed[0].address, "Batangas City, Philippines");
    assert_eq!(pushed[0].origin_id.as_deref(), Some(record.id.as_str()));

    // Locally the record is confirmed, with the remote id attached.
    let stored = h.store.lock().await.get_record(&record.id).unwrap().unwrap();
    assert!(stored.synced);
    assert_eq!(stored.remote_id.as_deref(), Some(pushed[0].id.as_str()));
}

#[tokio::test]
async fn reconcile_is_noop_when_offline_or_unauthenticated() {
    let h = harness();
    capture(&h, "13.7565,121.0583,CHECK_IN").await;

    let offline = h.reconciler.reconcile(false, true).await.unwrap();
    assert_eq!(offline, waymark_core::SyncResult::default());

    let unauthenticated = h.reconciler.reconcile(true, false).await.unwrap();
    assert_eq!(unauthenticated, waymark_core::SyncResult::default());

    assert_eq!(h.reconciler.pending_count().await.unwrap(), 1);
    assert_eq!(h.remote.insert_count(), 0);
}

#[tokio::test]
async fn failed_push_stays_pending_without_stopping_the_batch() {
    let h = harness();
    let first = capture(&h, "Lat:13.7565,Lng:121.0583,Status:CHECK_IN").await;
    let second = capture(&h, "Lat:13.9411,Lng:121.1643,Status:CHECK_IN").await;

    // First push of the pass fails; the batch continues (bulkhead).
    h.remote.fail_next_inserts(1);
    let result = h.reconciler.reconcile(true, true).await.unwrap();
    assert_eq!(result.succeeded, 1);
    assert_eq!(result.failed, 1);

    let pending = h.store.lock().await.list_pending().unwrap();
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].id, first.id);
    assert!(h.store.lock().await.get_record(&second.id).unwrap().unwrap().synced);

    // Next pass retries only the failed record; synced ones are not
    // re-pushed.
    let retry = h.reconciler.reconcile(true, true).await.unwrap();
    assert_eq!(retry.succeeded, 1);
    assert_eq!(h.reconciler.pending_count().await.unwrap(), 0);
    // Two records, three insert attempts total: no re-push of a synced record.
    assert_eq!(h.remote.insert_count(), 3);
}

#[tokio::test]
async fn reentrant_reconcile_is_rejected_and_nothing_is_double_pushed() {
    let h = harness();
    for i in 0..3 {
        capture(&h, &format!("Lat:13.75{i},Lng:121.05{i},Status:CHECK_IN")).await;
    }

    // Slow pushes widen the window in which the second call could sneak in.
    h.remote.set_insert_latency(Duration::from_millis(20));

    let a = Arc::clone(&h.reconciler);
    let b = Arc::clone(&h.reconciler);
    let (ra, rb) = tokio::join!(
        tokio::spawn(async move { a.reconcile(true, true).await.unwrap() }),
        tokio::spawn(async move { b.reconcile(true, true).await.unwrap() }),
    );
    let (ra, rb) = (ra.unwrap(), rb.unwrap());

    // Exactly one of the two calls ran the pass; the other was rejected.
    assert_eq!(ra.succeeded + rb.succeeded, 3);
    assert!(ra.succeeded == 0 || rb.succeeded == 0);

    // Every record was pushed exactly once.
    assert_eq!(h.remote.insert_count(), 3);
    assert_eq!(h.remote.records().await.len(), 3);
    assert_eq!(h.reconciler.pending_count().await.unwrap(), 0);
}

#[tokio::test]
async fn merged_view_shows_every_synced_record_exactly_once() {
    let h = harness();
    let mirror = Arc::new(RemoteMirror::new());
    let feed = h.remote.subscribe_changes();
    let mirror_task = Arc::clone(&mirror).run(feed);

    for line in [
        "Lat:13.7565,Lng:121.0583,Status:CHECK_IN",
        "Lat:13.9411,Lng:121.1643,Status:SOS",
    ] {
        capture(&h, line).await;
    }

    h.reconciler.reconcile(true, true).await.unwrap();

    // Give the mirror task a chance to drain the change feed.
    tokio::time::sleep(Duration::from_millis(10)).await;

    let view = h.reconciler.merged_view(&mirror).await.unwrap();
    assert_eq!(view.len(), 2);
    assert!(view.iter().all(|p| p.origin == RecordOrigin::Remote));

    let mut ids: Vec<&str> = view.iter().map(|p| p.id.as_str()).collect();
    ids.sort_unstable();
    ids.dedup();
    assert_eq!(ids.len(), 2, "no record may appear twice");

    mirror_task.abort();
}

#[tokio::test]
async fn merged_view_orders_pending_ahead_of_remote() {
    let h = harness();
    let mirror = Arc::new(RemoteMirror::new());
    let feed = h.remote.subscribe_changes();
    let _mirror_task = Arc::clone(&mirror).run(feed);

    let synced = capture(&h, "Lat:13.7565,Lng:121.0583,Status:CHECK_IN").await;
    h.reconciler.reconcile(true, true).await.unwrap();

    let still_pending = capture(&h, "Lat:13.9411,Lng:121.1643,Status:CHECK_IN").await;
    tokio::time::sleep(Duration::from_millis(10)).await;

    let view = h.reconciler.merged_view(&mirror).await.unwrap();
    assert_eq!(view.len(), 2);
    assert_eq!(view[0].id, still_pending.id);
    assert_eq!(view[0].origin, RecordOrigin::LocalPending);
    assert_eq!(view[1].origin, RecordOrigin::Remote);
    assert_ne!(view[1].id, synced.id, "synced record shows under its remote id");
}

#[tokio::test]
async fn geocoder_failure_never_blocks_a_sync() {
    let h = harness();
    capture(&h, "Lat:13.7565,Lng:121.0583,Status:CHECK_IN").await;

    h.geocoder.set_should_fail(true);
    let result = h.reconciler.reconcile(true, true).await.unwrap();

    assert_eq!(result.succeeded, 1);
    let pushed = h.remote.records().await;
    assert_eq!(pushed[0].address, "Near 13.7565, 121.0583");
}

#[tokio::test]
async fn sync_lifecycle_events_are_broadcast() {
    let h = harness();
    let mut rx = h.events.subscribe();
    capture(&h, "Lat:13.7565,Lng:121.0583,Status:CHECK_IN").await;

    h.reconciler.reconcile(true, true).await.unwrap();

    assert!(matches!(
        rx.recv().await.unwrap(),
        TrackerEvent::SyncStarted { pending: 1 }
    ));
    assert!(matches!(rx.recv().await.unwrap(), TrackerEvent::RecordSynced { .. }));
    assert!(matches!(
        rx.recv().await.unwrap(),
        TrackerEvent::SyncCompleted { succeeded: 1, failed: 0 }
    ));
}

#[tokio::test]
async fn sensor_lines_flow_from_framer_into_the_pending_log() {
    let h = harness();
    let feed = b"# Receiver Link\nLat:13.756500,Lng:121.058300,Status:CHECK_IN\ngarbage packet\n13.9411,121.1643,SOS\n";
    let mut framer = LineFramer::new(&feed[..]);

    let mut parsed = 0usize;
    let mut rejected = 0usize;
    while let Some(line) = framer.next_line().await.unwrap() {
        match LocationEvent::parse(&line) {
            Ok(event) => {
                let event = event.with_captured_at(time::OffsetDateTime::now_utc());
                h.store.lock().await.append_event(&event).unwrap();
                parsed += 1;
            }
            Err(_) => rejected += 1,
        }
    }

    // The banner line and the garbage line are dropped; store state is
    // untouched by either.
    assert_eq!(parsed, 2);
    assert_eq!(rejected, 2);
    assert_eq!(h.reconciler.pending_count().await.unwrap(), 2);
}
