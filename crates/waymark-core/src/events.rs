//! Tracker event system for capture, sync, and connectivity notifications.
//!
//! This is the interface the presentation layer consumes: the core never
//! renders or notifies, it only broadcasts what happened.

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use waymark_store::StoredRecord;

/// Events emitted by the tracker core.
///
/// All events are serializable for logging, persistence, and IPC.
///
/// This enum is marked `#[non_exhaustive]` to allow adding new event types
/// in future versions without breaking downstream code.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
#[non_exhaustive]
pub enum TrackerEvent {
    /// A sensor line was parsed and persisted locally.
    EventCaptured { record: StoredRecord },
    /// A sensor line matched no known wire format and was dropped.
    ParseRejected { line: String },
    /// Connectivity changed (transition event or poll fallback).
    ConnectivityChanged { online: bool },
    /// A reconciliation pass started over the current pending set.
    SyncStarted { pending: usize },
    /// A pending record was confirmed by the remote store.
    RecordSynced { id: String, remote_id: String },
    /// A reconciliation pass finished.
    SyncCompleted { succeeded: usize, failed: usize },
    /// A prefetch plan finished.
    PrefetchCompleted {
        fetched: usize,
        skipped: usize,
        failed: usize,
    },
}

/// Sender for tracker events.
pub type EventSender = broadcast::Sender<TrackerEvent>;

/// Receiver for tracker events.
pub type EventReceiver = broadcast::Receiver<TrackerEvent>;

/// Create a new event channel with the given capacity.
pub fn event_channel(capacity: usize) -> (EventSender, EventReceiver) {
    broadcast::channel(capacity)
}

/// Create a default event channel with capacity 100.
pub fn default_event_channel() -> (EventSender, EventReceiver) {
    event_channel(100)
}

/// Event dispatcher for sending events to multiple receivers.
#[derive(Debug, Clone)]
pub struct EventDispatcher {
    sender: EventSender,
}

impl EventDispatcher {
    /// Create a new event dispatcher.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Subscribe to events.
    pub fn subscribe(&self) -> EventReceiver {
        self.sender.subscribe()
    }

    /// Send an event.
    pub fn send(&self, event: TrackerEvent) {
        // Ignore error if no receivers
        let _ = self.sender.send(event);
    }

    /// Get the number of active receivers.
    pub fn receiver_count(&self) -> usize {
        self.sender.receiver_count()
    }

    /// Get the sender for direct use.
    pub fn sender(&self) -> EventSender {
        self.sender.clone()
    }
}

impl Default for EventDispatcher {
    fn default() -> Self {
        Self::new(100)
    }
}
