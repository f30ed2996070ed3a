use std::time::{Duration, SystemTime};

use tracing::debug;
use uuid::Uuid;

use crate::{
    dao::{
        models::HistoryEntryEntity,
        playback_store::{DEFAULT_HISTORY_LIMIT, MAX_HISTORY_LIMIT, PlaybackStore},
        storage::StorageResult,
    },
    state::{
        ids::{DeviceId, TrackId},
        state_machine::HistoryEffect,
    },
};

/// Listening-session bookkeeping on top of a [`PlaybackStore`].
///
/// History is scoped to the shared player: opening a session closes every session that
/// is still open, so at most one entry is ever open at a time.
pub struct HistoryTracker<'a> {
    store: &'a dyn PlaybackStore,
}

impl<'a> HistoryTracker<'a> {
    /// Tracker writing through `store`.
    pub fn new(store: &'a dyn PlaybackStore) -> Self {
        Self { store }
    }

    /// Run the side effect planned by a committed transition.
    pub async fn apply(&self, effect: HistoryEffect, now: SystemTime) -> StorageResult<()> {
        match effect {
            HistoryEffect::None => Ok(()),
            HistoryEffect::Finalize => self.finalize_open_session(now).await.map(|_| ()),
            HistoryEffect::Start {
                track_id,
                device_id,
            } => self
                .start_session(&track_id, &device_id, now)
                .await
                .map(|_| ()),
        }
    }

    /// Close the open session (if any) and open a new one for `track_id` on `device_id`.
    pub async fn start_session(
        &self,
        track_id: &TrackId,
        device_id: &DeviceId,
        now: SystemTime,
    ) -> StorageResult<HistoryEntryEntity> {
        self.finalize_open_session(now).await?;

        let entry = HistoryEntryEntity {
            id: Uuid::new_v4(),
            track_id: track_id.to_string(),
            device_id: device_id.to_string(),
            started_at: now,
            completed_at: None,
            duration_listened_seconds: 0,
        };
        self.store.insert_history(entry.clone()).await?;
        debug!(entry = %entry.id, track = %track_id, device = %device_id, "listening session opened");
        Ok(entry)
    }

    /// Close whatever session is open. Returns the entries that were closed, which is
    /// empty when nothing was open.
    pub async fn finalize_open_session(
        &self,
        now: SystemTime,
    ) -> StorageResult<Vec<HistoryEntryEntity>> {
        let open = self.store.open_history().await?;
        let mut finalized = Vec::with_capacity(open.len());
        for entry in open.into_iter().filter(HistoryEntryEntity::is_open) {
            let closed = finalize_entry(entry, now);
            self.store.update_history(closed.clone()).await?;
            debug!(
                entry = %closed.id,
                seconds = closed.duration_listened_seconds,
                "listening session finalized"
            );
            finalized.push(closed);
        }
        Ok(finalized)
    }

    /// Most recent sessions, newest first.
    pub async fn recent(
        &self,
        device_id: Option<&DeviceId>,
        limit: Option<usize>,
    ) -> StorageResult<Vec<HistoryEntryEntity>> {
        let limit = limit
            .unwrap_or(DEFAULT_HISTORY_LIMIT)
            .clamp(1, MAX_HISTORY_LIMIT);
        self.store
            .list_history(device_id.map(ToString::to_string), limit)
            .await
    }
}

/// Stamp completion on an open entry; a clock that went backwards yields zero seconds.
pub fn finalize_entry(mut entry: HistoryEntryEntity, now: SystemTime) -> HistoryEntryEntity {
    let listened = now
        .duration_since(entry.started_at)
        .unwrap_or(Duration::ZERO);
    entry.completed_at = Some(now);
    entry.duration_listened_seconds = listened.as_secs();
    entry
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dao::playback_store::memory::MemoryPlaybackStore;

    fn at(seconds: u64) -> SystemTime {
        SystemTime::UNIX_EPOCH + Duration::from_secs(1_700_000_000 + seconds)
    }

    #[tokio::test]
    async fn switching_tracks_closes_previous_session() {
        let store = MemoryPlaybackStore::new();
        let tracker = HistoryTracker::new(&store);

        let first = tracker
            .start_session(&"a".into(), &"d".into(), at(0))
            .await
            .unwrap();
        tracker
            .start_session(&"b".into(), &"d".into(), at(30))
            .await
            .unwrap();

        let entries = tracker.recent(None, None).await.unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].track_id, "b");
        assert!(entries[0].is_open());

        let closed = entries.iter().find(|entry| entry.id == first.id).unwrap();
        assert_eq!(closed.completed_at, Some(at(30)));
        assert_eq!(closed.duration_listened_seconds, 30);
    }

    #[tokio::test]
    async fn finalize_is_idempotent() {
        let store = MemoryPlaybackStore::new();
        let tracker = HistoryTracker::new(&store);
        tracker
            .start_session(&"a".into(), &"d".into(), at(0))
            .await
            .unwrap();

        assert_eq!(tracker.finalize_open_session(at(5)).await.unwrap().len(), 1);
        assert!(tracker.finalize_open_session(at(9)).await.unwrap().is_empty());

        let entries = tracker.recent(None, None).await.unwrap();
        assert_eq!(entries[0].completed_at, Some(at(5)));
        assert_eq!(entries[0].duration_listened_seconds, 5);
    }

    #[tokio::test]
    async fn replaying_a_track_opens_a_new_entry() {
        let store = MemoryPlaybackStore::new();
        let tracker = HistoryTracker::new(&store);
        let first = tracker
            .start_session(&"a".into(), &"d".into(), at(0))
            .await
            .unwrap();
        let second = tracker
            .start_session(&"a".into(), &"d".into(), at(1))
            .await
            .unwrap();

        assert_ne!(first.id, second.id);
        assert_ne!(first.started_at, second.started_at);
    }

    #[test]
    fn clock_skew_yields_zero_duration() {
        let entry = HistoryEntryEntity {
            id: Uuid::new_v4(),
            track_id: "a".into(),
            device_id: "d".into(),
            started_at: at(10),
            completed_at: None,
            duration_listened_seconds: 0,
        };
        let closed = finalize_entry(entry, at(4));
        assert_eq!(closed.duration_listened_seconds, 0);
        assert_eq!(closed.completed_at, Some(at(4)));
    }

    #[tokio::test]
    async fn recent_filters_by_device() {
        let store = MemoryPlaybackStore::new();
        let tracker = HistoryTracker::new(&store);
        tracker
            .start_session(&"a".into(), &"kitchen".into(), at(0))
            .await
            .unwrap();
        tracker
            .start_session(&"b".into(), &"office".into(), at(1))
            .await
            .unwrap();

        let office = tracker
            .recent(Some(&"office".into()), Some(10))
            .await
            .unwrap();
        assert_eq!(office.len(), 1);
        assert_eq!(office[0].track_id, "b");
    }
}
