//! The remote authoritative store.
//!
//! An append-only per-user collection reached over HTTPS. The trait is the
//! seam: the sync engine only ever talks to [`RemoteStore`], so tests run
//! against [`MockRemoteStore`](crate::mock::MockRemoteStore) and the
//! service wires up [`HttpRemoteStore`].

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use tokio::sync::{RwLock, broadcast};
use tracing::debug;

use waymark_store::StoredRecord;

use crate::error::{Error, Result};

/// A record as held by the remote store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoteRecord {
    /// Remotely-assigned identifier.
    pub id: String,
    /// Latitude in decimal degrees.
    pub lat: f64,
    /// Longitude in decimal degrees.
    pub lng: f64,
    /// Received signal strength in dBm.
    pub rssi: i16,
    /// Status tag from the beacon.
    pub status: String,
    /// Resolved address.
    pub address: String,
    /// When the event was captured.
    #[serde(with = "time::serde::rfc3339")]
    pub captured_at: OffsetDateTime,
    /// Local id of the offline record this push originated from.
    ///
    /// The idempotency key: a pass that partially completed before the
    /// local mark can push the same record twice, and the merged view
    /// deduplicates on this field.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub origin_id: Option<String>,
}

impl RemoteRecord {
    /// The remote form of a pushed local record.
    pub fn from_push(record: &StoredRecord, address: &str, id: String) -> Self {
        Self {
            id,
            lat: record.lat,
            lng: record.lng,
            rssi: record.rssi,
            status: record.status.clone(),
            address: address.to_string(),
            captured_at: record.captured_at,
            origin_id: Some(record.id.clone()),
        }
    }
}

/// One entry of the remote store's live change feed.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
#[non_exhaustive]
pub enum RemoteChange {
    /// A record was inserted.
    Added { record: RemoteRecord },
    /// A record was deleted.
    Removed { id: String },
    /// The whole collection was deleted.
    Cleared,
}

/// The remote authoritative store.
#[async_trait]
pub trait RemoteStore: Send + Sync {
    /// Push a record with its resolved address. Returns the
    /// remotely-assigned id on acknowledgment.
    async fn insert(&self, record: &StoredRecord, address: &str) -> Result<String>;

    /// Delete a single record by its remote id.
    async fn delete_by_id(&self, id: &str) -> Result<()>;

    /// Delete the whole collection.
    async fn delete_all(&self) -> Result<()>;

    /// Subscribe to the live change feed.
    fn subscribe_changes(&self) -> broadcast::Receiver<RemoteChange>;
}

/// Wire form of a push.
#[derive(Serialize)]
struct PushPayload<'a> {
    lat: f64,
    lng: f64,
    rssi: i16,
    status: &'a str,
    address: &'a str,
    #[serde(with = "time::serde::rfc3339")]
    captured_at: OffsetDateTime,
    origin_id: &'a str,
}

#[derive(Deserialize)]
struct InsertResponse {
    id: String,
}

/// HTTPS implementation of [`RemoteStore`] against a JSON document API.
///
/// Inserts acknowledged by the server are echoed onto the local change
/// feed, so subscribers see this client's own writes without a round trip.
pub struct HttpRemoteStore {
    client: reqwest::Client,
    base_url: String,
    auth_token: RwLock<Option<String>>,
    changes: broadcast::Sender<RemoteChange>,
}

impl HttpRemoteStore {
    /// Create a client for the collection rooted at `base_url`.
    pub fn new(base_url: impl Into<String>) -> Self {
        let (changes, _) = broadcast::channel(100);
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            auth_token: RwLock::new(None),
            changes,
        }
    }

    /// Install or clear the bearer token.
    pub async fn set_auth_token(&self, token: Option<String>) {
        *self.auth_token.write().await = token;
    }

    /// Whether a bearer token is installed.
    pub async fn is_authenticated(&self) -> bool {
        self.auth_token.read().await.is_some()
    }

    async fn authorize(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match self.auth_token.read().await.as_deref() {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }
}

#[async_trait]
impl RemoteStore for HttpRemoteStore {
    async fn insert(&self, record: &StoredRecord, address: &str) -> Result<String> {
        let payload = PushPayload {
            lat: record.lat,
            lng: record.lng,
            rssi: record.rssi,
            status: &record.status,
            address,
            captured_at: record.captured_at,
            origin_id: &record.id,
        };

        let request = self
            .client
            .post(format!("{}/records", self.base_url))
            .json(&payload);
        let response = self.authorize(request).await.send().await?;

        if !response.status().is_success() {
            return Err(Error::remote_rejected(format!(
                "insert returned HTTP {}",
                response.status()
            )));
        }

        let id = response.json::<InsertResponse>().await?.id;
        debug!("Remote accepted {} as {}", record.id, id);

        let _ = self.changes.send(RemoteChange::Added {
            record: RemoteRecord::from_push(record, address, id.clone()),
        });
        Ok(id)
    }

    async fn delete_by_id(&self, id: &str) -> Result<()> {
        let request = self
            .client
            .delete(format!("{}/records/{}", self.base_url, id));
        let response = self.authorize(request).await.send().await?;

        if !response.status().is_success() {
            return Err(Error::remote_rejected(format!(
                "delete returned HTTP {}",
                response.status()
            )));
        }

        let _ = self.changes.send(RemoteChange::Removed { id: id.to_string() });
        Ok(())
    }

    async fn delete_all(&self) -> Result<()> {
        let request = self.client.delete(format!("{}/records", self.base_url));
        let response = self.authorize(request).await.send().await?;

        if !response.status().is_success() {
            return Err(Error::remote_rejected(format!(
                "delete_all returned HTTP {}",
                response.status()
            )));
        }

        let _ = self.changes.send(RemoteChange::Cleared);
        Ok(())
    }

    fn subscribe_changes(&self) -> broadcast::Receiver<RemoteChange> {
        self.changes.subscribe()
    }
}
