//! Process-local store used when no database is configured and throughout the tests.

use std::sync::Arc;

use futures::future::BoxFuture;
use tokio::sync::RwLock;

use crate::dao::{
    models::{HistoryEntryEntity, PlaybackStateEntity},
    playback_store::{PlaybackStore, select_recent},
    storage::{StorageError, StorageResult},
};

#[derive(Default)]
struct MemoryInner {
    state: Option<PlaybackStateEntity>,
    history: Vec<HistoryEntryEntity>,
}

/// Volatile [`PlaybackStore`] keeping everything behind a single lock.
#[derive(Clone, Default)]
pub struct MemoryPlaybackStore {
    inner: Arc<RwLock<MemoryInner>>,
}

impl MemoryPlaybackStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }
}

impl PlaybackStore for MemoryPlaybackStore {
    fn load_state(&self) -> BoxFuture<'static, StorageResult<Option<PlaybackStateEntity>>> {
        let inner = self.inner.clone();
        Box::pin(async move { Ok(inner.read().await.state.clone()) })
    }

    fn upsert_state(&self, state: PlaybackStateEntity) -> BoxFuture<'static, StorageResult<()>> {
        let inner = self.inner.clone();
        Box::pin(async move {
            inner.write().await.state = Some(state);
            Ok(())
        })
    }

    fn insert_history(&self, entry: HistoryEntryEntity) -> BoxFuture<'static, StorageResult<()>> {
        let inner = self.inner.clone();
        Box::pin(async move {
            let mut guard = inner.write().await;
            if guard.history.iter().any(|existing| existing.id == entry.id) {
                return Err(StorageError::rejected(format!(
                    "history entry `{}` already exists",
                    entry.id
                )));
            }
            guard.history.push(entry);
            Ok(())
        })
    }

    fn update_history(&self, entry: HistoryEntryEntity) -> BoxFuture<'static, StorageResult<()>> {
        let inner = self.inner.clone();
        Box::pin(async move {
            let mut guard = inner.write().await;
            match guard.history.iter_mut().find(|existing| existing.id == entry.id) {
                Some(slot) => {
                    *slot = entry;
                    Ok(())
                }
                None => Err(StorageError::rejected(format!(
                    "history entry `{}` does not exist",
                    entry.id
                ))),
            }
        })
    }

    fn open_history(&self) -> BoxFuture<'static, StorageResult<Vec<HistoryEntryEntity>>> {
        let inner = self.inner.clone();
        Box::pin(async move {
            let guard = inner.read().await;
            Ok(guard
                .history
                .iter()
                .filter(|entry| entry.is_open())
                .cloned()
                .collect())
        })
    }

    fn list_history(
        &self,
        device_id: Option<String>,
        limit: usize,
    ) -> BoxFuture<'static, StorageResult<Vec<HistoryEntryEntity>>> {
        let inner = self.inner.clone();
        Box::pin(async move {
            let entries = inner.read().await.history.clone();
            Ok(select_recent(entries, device_id.as_deref(), limit))
        })
    }

    fn health_check(&self) -> BoxFuture<'static, StorageResult<()>> {
        Box::pin(async { Ok(()) })
    }

    fn try_reconnect(&self) -> BoxFuture<'static, StorageResult<()>> {
        Box::pin(async { Ok(()) })
    }
}

#[cfg(test)]
mod tests {
    use std::time::{Duration, SystemTime};

    use uuid::Uuid;

    use super::*;

    fn entry(device: &str, started_at: SystemTime) -> HistoryEntryEntity {
        HistoryEntryEntity {
            id: Uuid::new_v4(),
            track_id: "track-a".into(),
            device_id: device.into(),
            started_at,
            completed_at: None,
            duration_listened_seconds: 0,
        }
    }

    #[tokio::test]
    async fn list_history_is_newest_first_and_filtered() {
        let store = MemoryPlaybackStore::new();
        let t0 = SystemTime::UNIX_EPOCH + Duration::from_secs(1_000);
        store.insert_history(entry("kitchen", t0)).await.unwrap();
        store
            .insert_history(entry("desk", t0 + Duration::from_secs(5)))
            .await
            .unwrap();
        store
            .insert_history(entry("kitchen", t0 + Duration::from_secs(10)))
            .await
            .unwrap();

        let all = store.list_history(None, 10).await.unwrap();
        assert_eq!(all.len(), 3);
        assert!(all.windows(2).all(|w| w[0].started_at >= w[1].started_at));

        let kitchen = store.list_history(Some("kitchen".into()), 1).await.unwrap();
        assert_eq!(kitchen.len(), 1);
        assert_eq!(kitchen[0].started_at, t0 + Duration::from_secs(10));
    }

    #[tokio::test]
    async fn updating_unknown_entry_is_rejected() {
        let store = MemoryPlaybackStore::new();
        let err = store
            .update_history(entry("desk", SystemTime::UNIX_EPOCH))
            .await
            .unwrap_err();
        assert!(matches!(err, StorageError::Rejected { .. }));
    }
}
