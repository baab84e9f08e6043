//! Network connectivity monitoring.
//!
//! Connectivity is observed two ways: the platform pushes transition
//! events into [`NetworkMonitor::set_online`], and a polling fallback
//! probes a lightweight HTTP endpoint every ~10 seconds in case a
//! transition event was missed. Both paths feed one `watch` channel, so
//! consumers see a single consistent boolean.
//!
//! Transitions trigger work (a reconciliation, a prefetch); they never
//! interrupt work already in flight.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tracing::{debug, info};

/// Fallback polling interval.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(10);

/// Per-probe timeout. Short: the probe endpoint is lightweight and a slow
/// answer is as good as no answer for "are we online".
pub const PROBE_TIMEOUT: Duration = Duration::from_secs(2);

/// Default probe endpoint (a 204-no-content generator).
pub const DEFAULT_PROBE_URL: &str = "https://www.gstatic.com/generate_204";

/// Tracks connectivity as a watchable boolean.
pub struct NetworkMonitor {
    state: watch::Sender<bool>,
    client: reqwest::Client,
    probe_url: String,
}

impl NetworkMonitor {
    /// Create a monitor probing the given URL. Starts offline until a
    /// transition event or the first probe says otherwise.
    pub fn new(probe_url: impl Into<String>) -> Self {
        let (state, _) = watch::channel(false);
        Self {
            state,
            client: reqwest::Client::new(),
            probe_url: probe_url.into(),
        }
    }

    /// Current connectivity.
    pub fn is_online(&self) -> bool {
        *self.state.borrow()
    }

    /// Subscribe to connectivity changes.
    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.state.subscribe()
    }

    /// Record an externally observed transition (platform online/offline
    /// event). Only actual changes are published to subscribers.
    pub fn set_online(&self, online: bool) {
        let changed = self.state.send_if_modified(|current| {
            if *current != online {
                *current = online;
                true
            } else {
                false
            }
        });

        if changed {
            info!(
                "Connectivity changed: {}",
                if online { "online" } else { "offline" }
            );
        }
    }

    /// Probe connectivity once and publish the result.
    ///
    /// Any response counts as connectivity; only a transport failure or a
    /// timeout reads as offline.
    pub async fn check_now(&self) -> bool {
        let probe = self.client.head(&self.probe_url).send();
        let online = matches!(tokio::time::timeout(PROBE_TIMEOUT, probe).await, Ok(Ok(_)));

        debug!("Connectivity probe: {}", if online { "reachable" } else { "unreachable" });
        self.set_online(online);
        online
    }

    /// Spawn the polling fallback loop.
    pub fn spawn_polling(self: &Arc<Self>, interval: Duration) -> tokio::task::JoinHandle<()> {
        let monitor = Arc::clone(self);
        tokio::spawn(async move {
            let mut timer = tokio::time::interval(interval);
            loop {
                timer.tick().await;
                monitor.check_now().await;
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_starts_offline() {
        let monitor = NetworkMonitor::new(DEFAULT_PROBE_URL);
        assert!(!monitor.is_online());
    }

    #[test]
    fn test_set_online_publishes_transitions_only() {
        let monitor = NetworkMonitor::new(DEFAULT_PROBE_URL);
        let rx = monitor.subscribe();

        monitor.set_online(true);
        assert!(monitor.is_online());
        assert!(rx.has_changed().unwrap());

        let mut rx = monitor.subscribe();
        monitor.set_online(true); // No change, no publication
        assert!(!rx.has_changed().unwrap());

        monitor.set_online(false);
        assert!(rx.has_changed().unwrap());
        assert!(!*rx.borrow_and_update());
    }

    #[tokio::test]
    async fn test_subscribers_observe_transition() {
        let monitor = NetworkMonitor::new(DEFAULT_PROBE_URL);
        let mut rx = monitor.subscribe();

        monitor.set_online(true);
        rx.changed().await.unwrap();
        assert!(*rx.borrow());
    }
}
