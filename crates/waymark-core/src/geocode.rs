//! Reverse geocoding with a rounded-coordinate cache.
//!
//! Addresses are presentation sugar, not data the sync depends on: the
//! resolver never fails and never blocks a push. Lookup order is cache,
//! then the HTTP geocoder (if online, under a hard timeout), then a
//! coordinate-derived placeholder.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use waymark_store::Store;

use crate::error::{Error, Result};

/// Default reverse-geocoding endpoint.
pub const DEFAULT_GEOCODER_URL: &str = "https://nominatim.openstreetmap.org/reverse";

/// Default per-lookup timeout.
pub const DEFAULT_RESOLVE_TIMEOUT: Duration = Duration::from_secs(3);

/// An external reverse-geocoding service.
#[async_trait]
pub trait ReverseGeocoder: Send + Sync {
    /// Resolve a human-readable address for a coordinate pair.
    async fn reverse(&self, lat: f64, lng: f64) -> Result<String>;
}

/// Nominatim-style HTTP reverse geocoder.
pub struct NominatimGeocoder {
    client: reqwest::Client,
    endpoint: String,
}

impl NominatimGeocoder {
    /// Create a geocoder for the given `reverse` endpoint.
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint: endpoint.into(),
        }
    }
}

impl Default for NominatimGeocoder {
    fn default() -> Self {
        Self::new(DEFAULT_GEOCODER_URL)
    }
}

#[async_trait]
impl ReverseGeocoder for NominatimGeocoder {
    async fn reverse(&self, lat: f64, lng: f64) -> Result<String> {
        let url = format!(
            "{}?format=json&lat={}&lon={}&zoom=18",
            self.endpoint, lat, lng
        );

        let response = self
            .client
            .get(&url)
            .header(reqwest::header::USER_AGENT, crate::HTTP_USER_AGENT)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(Error::remote_rejected(format!(
                "geocoder returned HTTP {}",
                response.status()
            )));
        }

        let body: serde_json::Value = response.json().await?;
        body.get("display_name")
            .and_then(|v| v.as_str())
            .map(str::to_string)
            .ok_or_else(|| Error::remote_rejected("geocoder response missing display_name"))
    }
}

/// Caching, timeout-enforcing address resolver.
pub struct AddressResolver {
    geocoder: Arc<dyn ReverseGeocoder>,
    store: Arc<Mutex<Store>>,
    timeout: Duration,
}

impl AddressResolver {
    /// Create a resolver over a geocoder and the shared store (which holds
    /// the persisted address cache).
    pub fn new(geocoder: Arc<dyn ReverseGeocoder>, store: Arc<Mutex<Store>>) -> Self {
        Self {
            geocoder,
            store,
            timeout: DEFAULT_RESOLVE_TIMEOUT,
        }
    }

    /// Override the per-lookup timeout.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Cache key for a coordinate pair, rounded to 4 decimal places.
    ///
    /// The rounding aliases points within ~11 m to one cached address.
    /// Accepted lossy behavior, kept for compatibility with the data
    /// already in the field.
    pub fn cache_key(lat: f64, lng: f64) -> String {
        format!("{lat:.4},{lng:.4}")
    }

    /// Coordinate-derived fallback address.
    pub fn placeholder(lat: f64, lng: f64) -> String {
        format!("Near {lat:.4}, {lng:.4}")
    }

    /// Resolve an address for a coordinate pair. Infallible by contract:
    /// cache hit, geocoder answer, or placeholder — in that order.
    pub async fn resolve(&self, lat: f64, lng: f64, online: bool) -> String {
        let key = Self::cache_key(lat, lng);

        match self.store.lock().await.cached_address(&key) {
            Ok(Some(address)) => {
                debug!("Address cache hit for {}", key);
                return address;
            }
            Ok(None) => {}
            Err(e) => warn!("Address cache read failed: {}", e),
        }

        if !online {
            return Self::placeholder(lat, lng);
        }

        match tokio::time::timeout(self.timeout, self.geocoder.reverse(lat, lng)).await {
            Ok(Ok(address)) => {
                if let Err(e) = self.store.lock().await.put_cached_address(&key, &address) {
                    warn!("Failed to cache address for {}: {}", key, e);
                }
                address
            }
            Ok(Err(e)) => {
                warn!("Address resolution failed for {}: {}", key, e);
                Self::placeholder(lat, lng)
            }
            Err(_) => {
                warn!("Address resolution timed out after {:?} for {}", self.timeout, key);
                Self::placeholder(lat, lng)
            }
        }
    }
}
