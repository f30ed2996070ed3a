use std::sync::Arc;

use tokio::sync::{RwLock, watch};

use crate::{dao::playback_store::PlaybackStore, error::ServiceError};

/// Holds the installed [`PlaybackStore`] and the degraded flag derived from it.
///
/// The slot starts empty and degraded; the storage supervisor installs a backend once a
/// connection succeeds and flips the flag whenever health checks fail or recover.
pub struct StorageSlot {
    store: RwLock<Option<Arc<dyn PlaybackStore>>>,
    degraded: watch::Sender<bool>,
}

impl Default for StorageSlot {
    fn default() -> Self {
        Self::new()
    }
}

impl StorageSlot {
    /// Empty slot, starting in degraded mode.
    pub fn new() -> Self {
        let (degraded, _rx) = watch::channel(true);
        Self {
            store: RwLock::new(None),
            degraded,
        }
    }

    /// Handle to the installed store, if any.
    pub async fn get(&self) -> Option<Arc<dyn PlaybackStore>> {
        self.store.read().await.as_ref().cloned()
    }

    /// Handle to the installed store, or [`ServiceError::Degraded`] when commands cannot
    /// be persisted right now.
    pub async fn require(&self) -> Result<Arc<dyn PlaybackStore>, ServiceError> {
        if self.is_degraded() {
            return Err(ServiceError::Degraded);
        }
        self.get().await.ok_or(ServiceError::Degraded)
    }

    /// Install a new backend and leave degraded mode.
    pub async fn install(&self, store: Arc<dyn PlaybackStore>) {
        {
            let mut guard = self.store.write().await;
            *guard = Some(store);
        }
        self.update_degraded(false);
    }

    /// Remove the backend and enter degraded mode.
    pub async fn clear(&self) {
        {
            let mut guard = self.store.write().await;
            guard.take();
        }
        self.update_degraded(true);
    }

    /// Whether commands must currently be refused.
    pub fn is_degraded(&self) -> bool {
        *self.degraded.borrow()
    }

    /// Subscribe to degraded mode updates.
    pub fn degraded_watcher(&self) -> watch::Receiver<bool> {
        self.degraded.subscribe()
    }

    /// Update the degraded flag, notifying watchers only on change.
    pub fn update_degraded(&self, value: bool) {
        self.degraded.send_if_modified(|current| {
            if *current == value {
                return false;
            }
            *current = value;
            true
        });
    }
}
