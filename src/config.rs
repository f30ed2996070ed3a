//! Application-level configuration loading, including the static music library.

use std::{env, fmt, fs, io::ErrorKind, path::PathBuf, str::FromStr};

use serde::Deserialize;
use tracing::{info, warn};

use crate::{
    dao::catalog::{CatalogEntry, Track, mime_from_path},
    state::{broadcaster::DEFAULT_SUBSCRIBER_CAPACITY, ids::TrackId},
};

/// Default location on disk where the server looks for the JSON configuration.
const DEFAULT_CONFIG_PATH: &str = "config/app.json";
/// Environment variable that overrides [`DEFAULT_CONFIG_PATH`].
const CONFIG_PATH_ENV: &str = "NOW_PLAYING_CONFIG_PATH";
/// Environment variable that overrides the configured storage backend.
const STORAGE_BACKEND_ENV: &str = "STORAGE_BACKEND";

/// Persistence backend selected at startup.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    /// Process-local store; state is lost on restart.
    #[default]
    Memory,
    /// MongoDB, configured through `MONGO_URI` / `MONGO_DB`.
    Mongo,
    /// CouchDB, configured through the `COUCH_*` variables.
    Couch,
}

impl fmt::Display for StorageBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            StorageBackend::Memory => "memory",
            StorageBackend::Mongo => "mongo",
            StorageBackend::Couch => "couch",
        })
    }
}

impl FromStr for StorageBackend {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "memory" => Ok(StorageBackend::Memory),
            "mongo" | "mongodb" => Ok(StorageBackend::Mongo),
            "couch" | "couchdb" => Ok(StorageBackend::Couch),
            other => Err(format!("unknown storage backend '{other}'")),
        }
    }
}

#[derive(Debug, Clone)]
/// Immutable runtime configuration shared across the application.
pub struct AppConfig {
    storage_backend: StorageBackend,
    broadcast_capacity: usize,
    library: Vec<CatalogEntry>,
}

impl AppConfig {
    /// Load the application configuration from disk, falling back to built-in defaults,
    /// then apply environment overrides.
    pub fn load() -> Self {
        let path = resolve_config_path();
        let mut config = match fs::read_to_string(&path) {
            Ok(contents) => match Self::from_json(&contents) {
                Ok(app_config) => {
                    info!(
                        path = %path.display(),
                        tracks = app_config.library.len(),
                        backend = %app_config.storage_backend,
                        "loaded configuration"
                    );
                    app_config
                }
                Err(err) => {
                    warn!(
                        path = %path.display(),
                        error = %err,
                        "failed to parse config; falling back to defaults"
                    );
                    Self::default()
                }
            },
            Err(err) if err.kind() == ErrorKind::NotFound => {
                info!(
                    path = %path.display(),
                    "config file not found; using built-in defaults"
                );
                Self::default()
            }
            Err(err) => {
                warn!(
                    path = %path.display(),
                    error = %err,
                    "failed to read config; falling back to defaults"
                );
                Self::default()
            }
        };

        if let Ok(raw) = env::var(STORAGE_BACKEND_ENV) {
            match raw.parse() {
                Ok(backend) => config.storage_backend = backend,
                Err(err) => warn!(error = %err, "ignoring {STORAGE_BACKEND_ENV}"),
            }
        }
        config
    }

    /// Parse a configuration document.
    pub fn from_json(contents: &str) -> serde_json::Result<Self> {
        serde_json::from_str::<RawConfig>(contents).map(Into::into)
    }

    /// Backend to connect at startup.
    pub fn storage_backend(&self) -> StorageBackend {
        self.storage_backend
    }

    /// Per-subscriber broadcast buffer.
    pub fn broadcast_capacity(&self) -> usize {
        self.broadcast_capacity
    }

    /// Tracks making up the static catalog.
    pub fn library(&self) -> &[CatalogEntry] {
        &self.library
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            storage_backend: StorageBackend::default(),
            broadcast_capacity: DEFAULT_SUBSCRIBER_CAPACITY,
            library: Vec::new(),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
/// JSON representation of the configuration file located at [`DEFAULT_CONFIG_PATH`].
struct RawConfig {
    #[serde(default)]
    storage: RawStorage,
    #[serde(default)]
    broadcast: RawBroadcast,
    #[serde(default)]
    library: RawLibrary,
}

#[derive(Debug, Default, Deserialize)]
struct RawStorage {
    backend: Option<StorageBackend>,
}

#[derive(Debug, Default, Deserialize)]
struct RawBroadcast {
    capacity: Option<usize>,
}

#[derive(Debug, Default, Deserialize)]
struct RawLibrary {
    /// Base directory for relative track paths.
    root: Option<PathBuf>,
    #[serde(default)]
    tracks: Vec<RawTrack>,
}

#[derive(Debug, Deserialize)]
/// JSON representation of a single library entry.
struct RawTrack {
    id: String,
    title: String,
    artist: Option<String>,
    album: Option<String>,
    duration_seconds: Option<f64>,
    path: PathBuf,
    mime_type: Option<String>,
}

impl From<RawConfig> for AppConfig {
    fn from(value: RawConfig) -> Self {
        let root = value.library.root;
        let library = value
            .library
            .tracks
            .into_iter()
            .map(|raw| {
                let path = match &root {
                    Some(root) if raw.path.is_relative() => root.join(&raw.path),
                    _ => raw.path,
                };
                let mime_type = raw
                    .mime_type
                    .unwrap_or_else(|| mime_from_path(&path).to_string());
                CatalogEntry {
                    track: Track {
                        id: TrackId::from(raw.id),
                        title: raw.title,
                        artist: raw.artist,
                        album: raw.album,
                        duration_seconds: raw.duration_seconds,
                        mime_type,
                    },
                    path,
                }
            })
            .collect();

        Self {
            storage_backend: value.storage.backend.unwrap_or_default(),
            broadcast_capacity: value
                .broadcast
                .capacity
                .filter(|capacity| *capacity > 0)
                .unwrap_or(DEFAULT_SUBSCRIBER_CAPACITY),
            library,
        }
    }
}

/// Resolve the configuration path taking the environment override into account.
fn resolve_config_path() -> PathBuf {
    env::var_os(CONFIG_PATH_ENV)
        .map(PathBuf::from)
        .filter(|path| !path.as_os_str().is_empty())
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH))
}
