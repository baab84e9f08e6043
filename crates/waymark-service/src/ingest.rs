//! The capture pipeline and the sync driver.
//!
//! Capture is synchronous and local: every parsed line is persisted
//! before the next line is read, so an event that reached us is never
//! lost to a dropped connection. Reconciliation runs on its own task and
//! is triggered (never interrupted) by connectivity transitions and a
//! periodic retry tick.

use std::sync::Arc;
use std::time::Duration;

use tokio::io::AsyncRead;
use tracing::{debug, info, warn};

use waymark_core::{LineFramer, Result, TrackerEvent};
use waymark_types::LocationEvent;

use crate::state::AppState;

/// Read sensor lines until the stream ends, persisting every event.
///
/// Malformed lines are logged and dropped; they never touch store state.
pub async fn run_ingest<R: AsyncRead + Unpin>(state: Arc<AppState>, reader: R) -> Result<()> {
    let mut framer = LineFramer::new(reader);
    info!("Sensor link up, reading lines");

    while let Some(line) = framer.next_line().await? {
        match LocationEvent::parse(&line) {
            Ok(event) => {
                let event = event.with_captured_at(time::OffsetDateTime::now_utc());
                let (record, pending) = {
                    let store = state.store.lock().await;
                    let record = store.append_event(&event)?;
                    (record, store.count_pending()?)
                };

                info!("Captured {} ({}), {} pending", record.id, record.status, pending);
                state.events.send(TrackerEvent::EventCaptured { record });
            }
            Err(e) => {
                // Status banners and line noise land here too; drop quietly.
                debug!("Dropped sensor line: {}", e);
                state.events.send(TrackerEvent::ParseRejected {
                    line: e.line().to_string(),
                });
            }
        }
    }

    Ok(())
}

/// Spawn the sync driver: reconcile on offline-to-online transitions
/// (after a short settle delay) and on a periodic retry tick while online.
pub fn spawn_sync_driver(state: Arc<AppState>) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut online_rx = state.monitor.subscribe();
        let mut retry = tokio::time::interval(Duration::from_secs(
            state.config.sync.poll_interval_secs,
        ));
        let settle = Duration::from_secs(state.config.sync.online_sync_delay_secs);

        loop {
            tokio::select! {
                changed = online_rx.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    let online = *online_rx.borrow_and_update();
                    state.events.send(TrackerEvent::ConnectivityChanged { online });
                    if online {
                        // Let the link settle before the first burst of pushes.
                        tokio::time::sleep(settle).await;
                        reconcile_once(&state).await;
                    }
                }
                _ = retry.tick() => {
                    if state.monitor.is_online() {
                        reconcile_once(&state).await;
                    }
                }
            }
        }
    })
}

async fn reconcile_once(state: &AppState) {
    let online = state.monitor.is_online();
    let authenticated = state.is_authenticated().await;

    match state.reconciler.reconcile(online, authenticated).await {
        Ok(result) if result.succeeded > 0 || result.failed > 0 => {
            info!(
                "Sync pass: {} pushed, {} still pending",
                result.succeeded, result.failed
            );
        }
        Ok(_) => {}
        Err(e) => warn!("Reconciliation error: {}", e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use waymark_store::Store;

    async fn test_state() -> Arc<AppState> {
        AppState::new(Store::open_in_memory().unwrap(), Config::default()).await
    }

    #[tokio::test]
    async fn test_ingest_persists_valid_lines_and_drops_noise() {
        let state = test_state().await;
        let feed = b"Lat:13.756500,Lng:121.058300,Status:CHECK_IN\n<<corrupt>>\n13.9411,121.1643,SOS\n";

        run_ingest(Arc::clone(&state), &feed[..]).await.unwrap();

        let store = state.store.lock().await;
        assert_eq!(store.count_pending().unwrap(), 2);
    }

    #[tokio::test]
    async fn test_ingest_emits_capture_and_rejection_events() {
        let state = test_state().await;
        let mut rx = state.events.subscribe();
        let feed = b"Lat:13.7565,Lng:121.0583\ngarbage\n";

        run_ingest(Arc::clone(&state), &feed[..]).await.unwrap();

        assert!(matches!(
            rx.recv().await.unwrap(),
            TrackerEvent::EventCaptured { .. }
        ));
        match rx.recv().await.unwrap() {
            TrackerEvent::ParseRejected { line } => assert_eq!(line, "garbage"),
            other => panic!("unexpected event: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_ingest_survives_a_zero_fix_line() {
        let state = test_state().await;
        let feed = b"Lat:0.000000,Lng:0.000000,Status:CHECK_IN\nLat:13.7565,Lng:121.0583\n";

        run_ingest(Arc::clone(&state), &feed[..]).await.unwrap();

        // The no-fix sentinel is never persisted as a real point.
        assert_eq!(state.store.lock().await.count_pending().unwrap(), 1);
    }
}
