//! Service configuration.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use waymark_core::geocode::DEFAULT_GEOCODER_URL;
use waymark_core::monitor::DEFAULT_PROBE_URL;
use waymark_core::prefetch::DEFAULT_PREFETCH_ZOOM_LEVELS;
use waymark_core::tiles::DEFAULT_TILE_URL_TEMPLATE;

/// Service configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Storage settings.
    pub storage: StorageConfig,
    /// Sensor link settings.
    pub link: LinkConfig,
    /// Remote store settings.
    pub remote: RemoteConfig,
    /// Reverse geocoder settings.
    pub geocoder: GeocoderConfig,
    /// Tile source and prefetch settings.
    pub tiles: TileConfig,
    /// Sync pacing settings.
    pub sync: SyncConfig,
}

impl Config {
    /// Load configuration from the default path.
    pub fn load_default() -> Result<Self, ConfigError> {
        let path = default_config_path();
        if path.exists() {
            Self::load(&path)
        } else {
            Ok(Self::default())
        }
    }

    /// Load configuration from a file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path.as_ref()).map_err(|e| ConfigError::Read {
            path: path.as_ref().to_path_buf(),
            source: e,
        })?;
        toml::from_str(&content).map_err(|e| ConfigError::Parse {
            path: path.as_ref().to_path_buf(),
            source: e,
        })
    }

    /// Save configuration to a file.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<(), ConfigError> {
        let content = toml::to_string_pretty(self).map_err(ConfigError::Serialize)?;

        // Create parent directories if needed
        if let Some(parent) = path.as_ref().parent() {
            std::fs::create_dir_all(parent).map_err(|e| ConfigError::Write {
                path: parent.to_path_buf(),
                source: e,
            })?;
        }

        std::fs::write(path.as_ref(), content).map_err(|e| ConfigError::Write {
            path: path.as_ref().to_path_buf(),
            source: e,
        })
    }

    /// Validate the configuration and return any errors.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut errors = Vec::new();

        errors.extend(self.storage.validate());
        errors.extend(self.link.validate());
        errors.extend(self.remote.validate());
        errors.extend(self.geocoder.validate());
        errors.extend(self.tiles.validate());
        errors.extend(self.sync.validate());

        if errors.is_empty() {
            Ok(())
        } else {
            Err(ConfigError::Validation(errors))
        }
    }

    /// Load and validate configuration from a file.
    ///
    /// This is a convenience method that combines `load()` and `validate()`.
    pub fn load_validated<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let config = Self::load(path)?;
        config.validate()?;
        Ok(config)
    }
}

/// Storage configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Database file path.
    pub path: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            path: waymark_store::default_db_path(),
        }
    }
}

impl StorageConfig {
    fn validate(&self) -> Vec<ValidationError> {
        let mut errors = Vec::new();

        if self.path.as_os_str().is_empty() {
            errors.push(ValidationError {
                field: "storage.path".to_string(),
                message: "database path cannot be empty".to_string(),
            });
        }

        errors
    }
}

/// Sensor link configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LinkConfig {
    /// Device path of the receiver's serial byte stream.
    pub device: PathBuf,
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            device: PathBuf::from("/dev/ttyUSB0"),
        }
    }
}

impl LinkConfig {
    fn validate(&self) -> Vec<ValidationError> {
        let mut errors = Vec::new();

        if self.device.as_os_str().is_empty() {
            errors.push(ValidationError {
                field: "link.device".to_string(),
                message: "device path cannot be empty".to_string(),
            });
        }

        errors
    }
}

/// Remote store configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RemoteConfig {
    /// Base URL of the remote record collection.
    pub endpoint: String,
    /// Bearer token for the remote store. Sync is skipped while unset.
    pub auth_token: Option<String>,
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            endpoint: "https://sync.waymark.app/v1".to_string(),
            auth_token: None,
        }
    }
}

impl RemoteConfig {
    fn validate(&self) -> Vec<ValidationError> {
        let mut errors = Vec::new();

        if self.endpoint.is_empty() {
            errors.push(ValidationError {
                field: "remote.endpoint".to_string(),
                message: "endpoint cannot be empty".to_string(),
            });
        } else if !self.endpoint.starts_with("http://") && !self.endpoint.starts_with("https://") {
            errors.push(ValidationError {
                field: "remote.endpoint".to_string(),
                message: format!("endpoint '{}' must be an http(s) URL", self.endpoint),
            });
        }

        if let Some(token) = &self.auth_token
            && token.is_empty()
        {
            errors.push(ValidationError {
                field: "remote.auth_token".to_string(),
                message: "auth token cannot be empty string (use null/omit instead)".to_string(),
            });
        }

        errors
    }
}

/// Reverse geocoder configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeocoderConfig {
    /// Reverse-geocoding endpoint.
    pub endpoint: String,
    /// Per-lookup timeout in seconds.
    pub timeout_secs: u64,
}

/// Minimum geocoder timeout in seconds.
pub const MIN_GEOCODER_TIMEOUT: u64 = 1;
/// Maximum geocoder timeout in seconds.
pub const MAX_GEOCODER_TIMEOUT: u64 = 30;

impl Default for GeocoderConfig {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_GEOCODER_URL.to_string(),
            timeout_secs: 3,
        }
    }
}

impl GeocoderConfig {
    fn validate(&self) -> Vec<ValidationError> {
        let mut errors = Vec::new();

        if self.endpoint.is_empty() {
            errors.push(ValidationError {
                field: "geocoder.endpoint".to_string(),
                message: "endpoint cannot be empty".to_string(),
            });
        }

        if self.timeout_secs < MIN_GEOCODER_TIMEOUT || self.timeout_secs > MAX_GEOCODER_TIMEOUT {
            errors.push(ValidationError {
                field: "geocoder.timeout_secs".to_string(),
                message: format!(
                    "timeout {} is outside valid range ({}-{} seconds)",
                    self.timeout_secs, MIN_GEOCODER_TIMEOUT, MAX_GEOCODER_TIMEOUT
                ),
            });
        }

        errors
    }
}

/// Tile source and prefetch configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TileConfig {
    /// Tile source URL template with `{z}`, `{x}`, `{y}` placeholders.
    pub url_template: String,
    /// Zoom levels populated by a prefetch.
    pub prefetch_zoom_levels: Vec<u8>,
    /// Prefetch center latitude.
    pub center_lat: f64,
    /// Prefetch center longitude.
    pub center_lng: f64,
    /// Delay between tile fetches in milliseconds.
    pub fetch_delay_ms: u64,
}

/// Maximum usable slippy-map zoom level.
pub const MAX_ZOOM_LEVEL: u8 = 19;

impl Default for TileConfig {
    fn default() -> Self {
        Self {
            url_template: DEFAULT_TILE_URL_TEMPLATE.to_string(),
            prefetch_zoom_levels: DEFAULT_PREFETCH_ZOOM_LEVELS.to_vec(),
            // Batangas City, the deployment's home region
            center_lat: 13.7565,
            center_lng: 121.0583,
            fetch_delay_ms: 50,
        }
    }
}

impl TileConfig {
    fn validate(&self) -> Vec<ValidationError> {
        let mut errors = Vec::new();

        for placeholder in ["{z}", "{x}", "{y}"] {
            if !self.url_template.contains(placeholder) {
                errors.push(ValidationError {
                    field: "tiles.url_template".to_string(),
                    message: format!("template is missing the {} placeholder", placeholder),
                });
            }
        }

        if self.prefetch_zoom_levels.is_empty() {
            errors.push(ValidationError {
                field: "tiles.prefetch_zoom_levels".to_string(),
                message: "at least one zoom level is required".to_string(),
            });
        }

        for &zoom in &self.prefetch_zoom_levels {
            if zoom > MAX_ZOOM_LEVEL {
                errors.push(ValidationError {
                    field: "tiles.prefetch_zoom_levels".to_string(),
                    message: format!("zoom level {} exceeds maximum of {}", zoom, MAX_ZOOM_LEVEL),
                });
            }
        }

        if !self.center_lat.is_finite() || self.center_lat.abs() > 90.0 {
            errors.push(ValidationError {
                field: "tiles.center_lat".to_string(),
                message: format!("latitude {} is not a valid coordinate", self.center_lat),
            });
        }

        if !self.center_lng.is_finite() || self.center_lng.abs() > 180.0 {
            errors.push(ValidationError {
                field: "tiles.center_lng".to_string(),
                message: format!("longitude {} is not a valid coordinate", self.center_lng),
            });
        }

        errors
    }
}

/// Sync pacing configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Delay between record pushes in milliseconds.
    pub push_delay_ms: u64,
    /// Delay between coming online and the triggered reconciliation, in
    /// seconds, so the link can settle first.
    pub online_sync_delay_secs: u64,
    /// Connectivity poll fallback interval in seconds.
    pub poll_interval_secs: u64,
    /// Connectivity probe URL.
    pub probe_url: String,
}

/// Minimum connectivity poll interval in seconds.
pub const MIN_POLL_INTERVAL: u64 = 1;
/// Maximum connectivity poll interval in seconds (5 minutes).
pub const MAX_POLL_INTERVAL: u64 = 300;

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            push_delay_ms: 200,
            online_sync_delay_secs: 3,
            poll_interval_secs: 10,
            probe_url: DEFAULT_PROBE_URL.to_string(),
        }
    }
}

impl SyncConfig {
    fn validate(&self) -> Vec<ValidationError> {
        let mut errors = Vec::new();

        if self.poll_interval_secs < MIN_POLL_INTERVAL || self.poll_interval_secs > MAX_POLL_INTERVAL
        {
            errors.push(ValidationError {
                field: "sync.poll_interval_secs".to_string(),
                message: format!(
                    "poll interval {} is outside valid range ({}-{} seconds)",
                    self.poll_interval_secs, MIN_POLL_INTERVAL, MAX_POLL_INTERVAL
                ),
            });
        }

        if self.probe_url.is_empty() {
            errors.push(ValidationError {
                field: "sync.probe_url".to_string(),
                message: "probe URL cannot be empty".to_string(),
            });
        }

        errors
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
    #[error("Failed to serialize config: {0}")]
    Serialize(toml::ser::Error),
    #[error("Failed to write config file {path}: {source}")]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Configuration validation failed:\n{}", format_validation_errors(.0))]
    Validation(Vec<ValidationError>),
}

/// A single validation error with context.
#[derive(Debug, Clone)]
pub struct ValidationError {
    /// The field path (e.g., `remote.endpoint` or `tiles.center_lat`).
    pub field: String,
    /// Description of the validation failure.
    pub message: String,
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

fn format_validation_errors(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(|e| format!("  - {}", e))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Default configuration file path.
pub fn default_config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("waymark")
        .join("service.toml")
}
