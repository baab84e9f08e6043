//! Fetching raster tiles from a slippy-map tile source.

use std::time::Duration;

use async_trait::async_trait;
use tracing::debug;

use waymark_types::TileCoord;

use crate::error::{Error, Result};

/// Default tile source URL template.
pub const DEFAULT_TILE_URL_TEMPLATE: &str = "https://tile.openstreetmap.org/{z}/{x}/{y}.png";

/// Default per-tile fetch timeout.
pub const DEFAULT_FETCH_TIMEOUT: Duration = Duration::from_secs(10);

/// A source of raster tile imagery.
#[async_trait]
pub trait TileSource: Send + Sync {
    /// Fetch the raster image for a tile.
    async fn fetch(&self, coord: TileCoord) -> Result<Vec<u8>>;

    /// The URL a tile is served from (recorded alongside the cached bytes).
    fn tile_url(&self, coord: TileCoord) -> String;
}

/// HTTP tile source with a `{z}/{x}/{y}` URL template.
pub struct HttpTileSource {
    client: reqwest::Client,
    template: String,
    timeout: Duration,
}

impl HttpTileSource {
    /// Create a source from a URL template containing `{z}`, `{x}` and
    /// `{y}` placeholders.
    pub fn new(template: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            template: template.into(),
            timeout: DEFAULT_FETCH_TIMEOUT,
        }
    }

    /// Override the per-tile fetch timeout.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

impl Default for HttpTileSource {
    fn default() -> Self {
        Self::new(DEFAULT_TILE_URL_TEMPLATE)
    }
}

#[async_trait]
impl TileSource for HttpTileSource {
    async fn fetch(&self, coord: TileCoord) -> Result<Vec<u8>> {
        let url = self.tile_url(coord);
        debug!("Fetching tile {} from {}", coord, url);

        let request = self
            .client
            .get(&url)
            .header(reqwest::header::USER_AGENT, crate::HTTP_USER_AGENT)
            .send();
        let response = tokio::time::timeout(self.timeout, request)
            .await
            .map_err(|_| Error::timeout(format!("fetch tile {coord}"), self.timeout))??;

        if !response.status().is_success() {
            return Err(Error::TileUnavailable {
                coord,
                status: response.status().as_u16(),
            });
        }

        Ok(response.bytes().await?.to_vec())
    }

    fn tile_url(&self, coord: TileCoord) -> String {
        self.template
            .replace("{z}", &coord.zoom.to_string())
            .replace("{x}", &coord.x.to_string())
            .replace("{y}", &coord.y.to_string())
    }
}
