//! Local projection of the remote store's live change feed.
//!
//! The remote store pushes inserts and deletes; the mirror folds them into
//! an in-memory map so the merged view can be computed without a network
//! round trip. It is a projection, not a source of truth: dropping it and
//! resubscribing rebuilds it.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{RwLock, broadcast};
use tracing::{debug, warn};

use crate::remote::{RemoteChange, RemoteRecord};

/// In-memory view of the remote collection.
#[derive(Debug, Default)]
pub struct RemoteMirror {
    records: RwLock<HashMap<String, RemoteRecord>>,
}

impl RemoteMirror {
    /// Create an empty mirror.
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold one change into the mirror.
    pub async fn apply(&self, change: RemoteChange) {
        let mut records = self.records.write().await;
        match change {
            RemoteChange::Added { record } => {
                records.insert(record.id.clone(), record);
            }
            RemoteChange::Removed { id } => {
                records.remove(&id);
            }
            RemoteChange::Cleared => records.clear(),
        }
    }

    /// Snapshot of the remote collection, capture time descending (the
    /// remote collection's native order).
    pub async fn snapshot(&self) -> Vec<RemoteRecord> {
        let records = self.records.read().await;
        let mut snapshot: Vec<RemoteRecord> = records.values().cloned().collect();
        snapshot.sort_by(|a, b| b.captured_at.cmp(&a.captured_at).then(b.id.cmp(&a.id)));
        snapshot
    }

    /// Number of mirrored records.
    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }

    /// Whether the mirror is empty.
    pub async fn is_empty(&self) -> bool {
        self.records.read().await.is_empty()
    }

    /// Spawn a task applying a change feed until it closes.
    pub fn run(
        self: Arc<Self>,
        mut feed: broadcast::Receiver<RemoteChange>,
    ) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            loop {
                match feed.recv().await {
                    Ok(change) => self.apply(change).await,
                    Err(broadcast::error::RecvError::Lagged(missed)) => {
                        // Missed changes leave the mirror stale until the
                        // next full resubscription; flag it loudly.
                        warn!("Remote change feed lagged, {} change(s) missed", missed);
                    }
                    Err(broadcast::error::RecvError::Closed) => {
                        debug!("Remote change feed closed");
                        break;
                    }
                }
            }
        })
    }
}
