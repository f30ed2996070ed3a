/// Topic based fan-out of committed states.
pub mod broadcaster;
/// Serialized command execution over the canonical state.
pub mod coordinator;
/// Listening-session bookkeeping.
pub mod history;
/// Typed track and device identifiers.
pub mod ids;
/// The canonical playback record.
pub mod playback;
/// Client-side view of the shared state with stale-event filtering.
pub mod player_view;
/// Commands and the pure transition rules.
pub mod state_machine;
/// Installed storage backend and degraded flag.
pub mod storage;

use std::{sync::Arc, time::SystemTime};

use dashmap::DashMap;
use uuid::Uuid;

use crate::{
    config::AppConfig,
    dao::{catalog::Catalog, playback_store::PlaybackStore, storage::StorageResult},
    dto::sse::PlaybackEnvelope,
};

use self::{
    broadcaster::Broadcaster, coordinator::PlaybackCoordinator, ids::DeviceId,
    state_machine::ClientMode, storage::StorageSlot,
};

/// Shared handle to the [`AppState`] used as axum state.
pub type SharedState = Arc<AppState>;

#[derive(Debug, Clone)]
/// A WebSocket client that has identified itself.
pub struct ClientConnection {
    /// Identity claimed in the identification frame.
    pub device_id: DeviceId,
    /// Mode claimed in the identification frame.
    pub mode: ClientMode,
    /// When the identification was accepted.
    pub connected_at: SystemTime,
}

/// Central application state: storage handle, broadcast hub, coordinator and live
/// connections.
pub struct AppState {
    storage: Arc<StorageSlot>,
    broadcaster: Arc<Broadcaster<PlaybackEnvelope>>,
    catalog: Arc<dyn Catalog>,
    playback: PlaybackCoordinator,
    connections: DashMap<Uuid, ClientConnection>,
}

impl AppState {
    /// Construct a new [`AppState`] wrapped in an [`Arc`] so it can be cloned cheaply.
    ///
    /// The application starts in degraded mode until a storage backend is installed.
    pub fn new(config: &AppConfig, catalog: Arc<dyn Catalog>) -> SharedState {
        let storage = Arc::new(StorageSlot::new());
        let broadcaster = Arc::new(Broadcaster::new(config.broadcast_capacity()));
        let playback =
            PlaybackCoordinator::new(storage.clone(), catalog.clone(), broadcaster.clone());
        Arc::new(Self {
            storage,
            broadcaster,
            catalog,
            playback,
            connections: DashMap::new(),
        })
    }

    /// Hydrate the coordinator from `store`, then install it and leave degraded mode.
    pub async fn install_store(&self, store: Arc<dyn PlaybackStore>) -> StorageResult<()> {
        self.playback.hydrate(store.as_ref()).await?;
        self.storage.install(store).await;
        Ok(())
    }

    /// Storage slot holding the installed backend.
    pub fn storage(&self) -> &StorageSlot {
        &self.storage
    }

    /// Current degraded flag.
    pub fn is_degraded(&self) -> bool {
        self.storage.is_degraded()
    }

    /// Topic hub carrying committed playback states.
    pub fn broadcaster(&self) -> &Broadcaster<PlaybackEnvelope> {
        &self.broadcaster
    }

    /// Track catalog used to resolve and describe tracks.
    pub fn catalog(&self) -> &dyn Catalog {
        self.catalog.as_ref()
    }

    /// Owner of the canonical playback state.
    pub fn playback(&self) -> &PlaybackCoordinator {
        &self.playback
    }

    /// Registry of identified WebSocket clients keyed by connection id.
    pub fn connections(&self) -> &DashMap<Uuid, ClientConnection> {
        &self.connections
    }
}
