//! Bulk-populating the tile cache around a point of interest.
//!
//! While online, the prefetcher walks a small grid of tiles around a
//! center at several zoom levels and caches whatever is missing, pacing
//! itself to stay friendly to third-party tile servers. Already-cached
//! tiles cost no network work, so running the same plan twice is free.

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::sync::Mutex;
use tracing::{info, warn};

use waymark_store::Store;
use waymark_types::TileCoord;

use crate::error::Result;
use crate::events::{EventDispatcher, TrackerEvent};
use crate::tiles::TileSource;

/// Default zoom levels to populate.
pub const DEFAULT_PREFETCH_ZOOM_LEVELS: [u8; 5] = [10, 11, 12, 13, 14];

/// Fixed delay between tile fetches (tile-server rate limit etiquette).
pub const DEFAULT_FETCH_DELAY: Duration = Duration::from_millis(50);

/// Prefetch plan parameters.
#[derive(Debug, Clone)]
pub struct PrefetchOptions {
    /// Zoom levels to populate.
    pub zoom_levels: Vec<u8>,
    /// Grid radius around the center tile (1 = a 3x3 grid).
    pub radius: u32,
    /// Delay after each network fetch.
    pub fetch_delay: Duration,
}

impl Default for PrefetchOptions {
    fn default() -> Self {
        Self {
            zoom_levels: DEFAULT_PREFETCH_ZOOM_LEVELS.to_vec(),
            radius: 1,
            fetch_delay: DEFAULT_FETCH_DELAY,
        }
    }
}

/// Outcome of one prefetch plan.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PrefetchReport {
    /// Tiles fetched and cached by this run.
    pub fetched: usize,
    /// Tiles already cached (no network work done).
    pub skipped: usize,
    /// Tiles that failed to fetch or store; the plan continued past them.
    pub failed: usize,
}

/// Populates the tile cache around a center point.
pub struct AreaPrefetcher {
    store: Arc<Mutex<Store>>,
    source: Arc<dyn TileSource>,
    events: EventDispatcher,
    options: PrefetchOptions,
}

impl AreaPrefetcher {
    /// Create a prefetcher over the shared store and a tile source.
    pub fn new(
        store: Arc<Mutex<Store>>,
        source: Arc<dyn TileSource>,
        events: EventDispatcher,
    ) -> Self {
        Self {
            store,
            source,
            events,
            options: PrefetchOptions::default(),
        }
    }

    /// Override the plan parameters.
    #[must_use]
    pub fn with_options(mut self, options: PrefetchOptions) -> Self {
        self.options = options;
        self
    }

    /// Populate the neighborhood of a center point at every configured
    /// zoom level.
    ///
    /// Sequential by design: one fetch at a time with a fixed delay after
    /// each. A single tile failure is logged and skipped; it never aborts
    /// the remaining plan. Idempotent: cached tiles are detected up front
    /// and cost nothing, so re-running a plan does no redundant work.
    pub async fn prefetch(&self, center_lat: f64, center_lng: f64) -> Result<PrefetchReport> {
        let mut report = PrefetchReport::default();

        info!(
            "Prefetching around {:.4},{:.4} at zoom levels {:?}",
            center_lat, center_lng, self.options.zoom_levels
        );

        for &zoom in &self.options.zoom_levels {
            let center = TileCoord::from_lat_lng(center_lat, center_lng, zoom);

            for coord in center.neighborhood(self.options.radius) {
                if self.store.lock().await.has_tile(coord)? {
                    report.skipped += 1;
                    continue;
                }

                match self.source.fetch(coord).await {
                    Ok(image) => {
                        let url = self.source.tile_url(coord);
                        match self.store.lock().await.put_tile(coord, &image, &url) {
                            Ok(()) => report.fetched += 1,
                            Err(waymark_store::Error::StorageFull) => {
                                // Cache stays in its last-good state; only
                                // this tile is lost.
                                warn!("Tile cache full, skipping {}", coord);
                                report.failed += 1;
                            }
                            Err(e) => return Err(e.into()),
                        }
                    }
                    Err(e) => {
                        warn!("Failed to fetch tile {}: {}", coord, e);
                        report.failed += 1;
                    }
                }

                tokio::time::sleep(self.options.fetch_delay).await;
            }
        }

        info!(
            "Prefetch complete: {} fetched, {} cached already, {} failed",
            report.fetched, report.skipped, report.failed
        );
        self.events.send(TrackerEvent::PrefetchCompleted {
            fetched: report.fetched,
            skipped: report.skipped,
            failed: report.failed,
        });

        Ok(report)
    }
}
