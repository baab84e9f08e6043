//! Application state shared across the service tasks.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;

use waymark_core::{
    AddressResolver, AreaPrefetcher, EventDispatcher, HttpRemoteStore, HttpTileSource,
    NetworkMonitor, NominatimGeocoder, PrefetchOptions, Reconciler, RemoteMirror,
};
use waymark_store::Store;

use crate::config::Config;

/// Shared application state, constructed once at startup and torn down
/// never; the process is long-lived.
pub struct AppState {
    /// The data store (wrapped in a Mutex for shared access).
    pub store: Arc<Mutex<Store>>,
    /// Effective configuration.
    pub config: Config,
    /// Broadcast bus for tracker events.
    pub events: EventDispatcher,
    /// Connectivity state.
    pub monitor: Arc<NetworkMonitor>,
    /// Remote store client.
    pub remote: Arc<HttpRemoteStore>,
    /// Local projection of the remote change feed.
    pub mirror: Arc<RemoteMirror>,
    /// The sync engine.
    pub reconciler: Arc<Reconciler>,
    /// Tile cache prefetcher.
    pub prefetcher: AreaPrefetcher,
}

impl AppState {
    /// Assemble the component graph from configuration.
    pub async fn new(store: Store, config: Config) -> Arc<Self> {
        let store = Arc::new(Mutex::new(store));
        let events = EventDispatcher::default();
        let monitor = Arc::new(NetworkMonitor::new(config.sync.probe_url.clone()));

        let remote = Arc::new(HttpRemoteStore::new(config.remote.endpoint.clone()));
        remote.set_auth_token(config.remote.auth_token.clone()).await;

        let resolver = AddressResolver::new(
            Arc::new(NominatimGeocoder::new(config.geocoder.endpoint.clone())),
            Arc::clone(&store),
        )
        .with_timeout(Duration::from_secs(config.geocoder.timeout_secs));

        let reconciler = Arc::new(
            Reconciler::new(
                Arc::clone(&store),
                Arc::clone(&remote) as _,
                resolver,
                events.clone(),
            )
            .with_push_delay(Duration::from_millis(config.sync.push_delay_ms)),
        );

        let prefetcher = AreaPrefetcher::new(
            Arc::clone(&store),
            Arc::new(HttpTileSource::new(config.tiles.url_template.clone())),
            events.clone(),
        )
        .with_options(PrefetchOptions {
            zoom_levels: config.tiles.prefetch_zoom_levels.clone(),
            radius: 1,
            fetch_delay: Duration::from_millis(config.tiles.fetch_delay_ms),
        });

        Arc::new(Self {
            store,
            config,
            events,
            monitor,
            remote,
            mirror: Arc::new(RemoteMirror::new()),
            reconciler,
            prefetcher,
        })
    }

    /// Whether the remote store has credentials installed.
    pub async fn is_authenticated(&self) -> bool {
        self.remote.is_authenticated().await
    }
}
