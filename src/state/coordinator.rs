use std::{
    collections::HashSet,
    sync::Arc,
    time::{Duration, SystemTime},
};

use tokio::{
    sync::{Mutex, RwLock},
    time::timeout,
};
use tracing::{debug, info, warn};

use crate::{
    dao::{catalog::Catalog, playback_store::PlaybackStore, storage::StorageResult},
    dto::{format_system_time, sse::PlaybackEnvelope},
    error::ServiceError,
    state::{
        broadcaster::Broadcaster,
        history::HistoryTracker,
        ids::TrackId,
        playback::PlaybackState,
        state_machine::{
            CommandOrigin, HistoryEffect, PlaybackCommand, Transition, plan_transition,
        },
        storage::StorageSlot,
    },
};

/// Topic every playback state envelope is published on.
pub const PLAYBACK_TOPIC: &str = "playback";
/// Upper bound on a single store write before the command is abandoned.
pub const DEFAULT_WRITE_TIMEOUT: Duration = Duration::from_secs(5);

/// Source of commit timestamps.
pub type Clock = Arc<dyn Fn() -> SystemTime + Send + Sync>;

/// Owner of the canonical playback state.
///
/// Commands are serialized by a gate so each one reads, plans, persists and publishes
/// without interleaving; the last command through the gate wins.
pub struct PlaybackCoordinator {
    canonical: RwLock<PlaybackState>,
    gate: Mutex<()>,
    storage: Arc<StorageSlot>,
    catalog: Arc<dyn Catalog>,
    broadcaster: Arc<Broadcaster<PlaybackEnvelope>>,
    clock: Clock,
    write_timeout: Duration,
}

impl PlaybackCoordinator {
    /// Coordinator starting from an empty state at revision 0, with the system clock
    /// and [`DEFAULT_WRITE_TIMEOUT`].
    pub fn new(
        storage: Arc<StorageSlot>,
        catalog: Arc<dyn Catalog>,
        broadcaster: Arc<Broadcaster<PlaybackEnvelope>>,
    ) -> Self {
        Self {
            canonical: RwLock::new(PlaybackState::default()),
            gate: Mutex::new(()),
            storage,
            catalog,
            broadcaster,
            clock: Arc::new(SystemTime::now),
            write_timeout: DEFAULT_WRITE_TIMEOUT,
        }
    }

    /// Replace the commit clock.
    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }

    /// Replace the bound on store writes.
    pub fn with_write_timeout(mut self, limit: Duration) -> Self {
        self.write_timeout = limit;
        self
    }

    /// Copy of the last committed state.
    pub async fn snapshot(&self) -> PlaybackState {
        self.canonical.read().await.clone()
    }

    /// Load the persisted record from `store`, keeping whichever side is newer.
    ///
    /// Returns the revision the coordinator ends up at.
    pub async fn hydrate(&self, store: &dyn PlaybackStore) -> StorageResult<u64> {
        let _gate = self.gate.lock().await;
        let persisted = store.load_state().await?;
        let mut canonical = self.canonical.write().await;
        match persisted {
            Some(entity) if entity.revision >= canonical.revision => {
                *canonical = PlaybackState::from(entity);
                info!(revision = canonical.revision, "playback state hydrated from storage");
            }
            Some(entity) => {
                warn!(
                    persisted = entity.revision,
                    in_memory = canonical.revision,
                    "persisted playback state is older than the in-memory one; keeping memory"
                );
            }
            None => debug!("no persisted playback state; starting fresh"),
        }
        Ok(canonical.revision)
    }

    /// Apply `command` on behalf of `origin` and return the resulting state.
    ///
    /// On success the new state is durable before it is published. On failure nothing
    /// is committed and nothing is published.
    pub async fn execute(
        &self,
        origin: &CommandOrigin,
        command: PlaybackCommand,
    ) -> Result<PlaybackState, ServiceError> {
        let name = command.name();
        let _gate = self.gate.lock().await;
        let store = self.storage.require().await?;

        self.ensure_known(&command).await?;
        let current = self.snapshot().await;
        let dangling = if command.advances_queue() {
            self.dangling_entries(&current.queue).await
        } else {
            HashSet::new()
        };

        let Transition {
            mut next,
            history,
            commit,
        } = plan_transition(&current, origin, command, &dangling)?;
        if !commit {
            debug!(command = name, device = %origin.device_id, "command left state unchanged");
            return Ok(current);
        }

        let now = (self.clock)();
        next.revision = current.revision + 1;
        next.updated_at = now;

        self.persist(store.as_ref(), &next).await.inspect_err(|err| {
            warn!(
                command = name,
                device = %origin.device_id,
                revision = next.revision,
                error = %err,
                "playback command not committed"
            );
        })?;
        *self.canonical.write().await = next.clone();

        self.record_history(store.as_ref(), history, now).await;
        let delivered = self.publish(&next);
        info!(
            command = name,
            device = %origin.device_id,
            mode = %origin.mode,
            revision = next.revision,
            delivered,
            "playback command committed"
        );
        Ok(next)
    }

    async fn persist(&self, store: &dyn PlaybackStore, next: &PlaybackState) -> Result<(), ServiceError> {
        match timeout(self.write_timeout, store.upsert_state(next.clone().into())).await {
            Ok(result) => result.map_err(ServiceError::from),
            Err(_) => self.confirm_late_write(store, next.revision).await,
        }
    }

    /// An abandoned write may still land on the backend. Read the record back so a
    /// revision that became durable is committed rather than reused by the next command.
    async fn confirm_late_write(&self, store: &dyn PlaybackStore, revision: u64) -> Result<(), ServiceError> {
        match timeout(self.write_timeout, store.load_state()).await {
            Ok(Ok(Some(persisted))) if persisted.revision == revision => {
                warn!(revision, "store write timed out but was applied; committing");
                Ok(())
            }
            Ok(Ok(_)) => Err(ServiceError::Timeout),
            Ok(Err(err)) => {
                warn!(revision, error = %err, "could not read back playback state after write timeout");
                Err(ServiceError::Timeout)
            }
            Err(_) => {
                warn!(revision, "read back after write timeout also timed out");
                Err(ServiceError::Timeout)
            }
        }
    }

    /// History is written after the state commit; a failure here cannot undo the
    /// commit, so it is logged and the command still succeeds.
    async fn record_history(&self, store: &dyn PlaybackStore, effect: HistoryEffect, now: SystemTime) {
        if effect == HistoryEffect::None {
            return;
        }
        if let Err(err) = HistoryTracker::new(store).apply(effect, now).await {
            warn!(error = %err, "failed to record listening history");
        }
    }

    fn publish(&self, state: &PlaybackState) -> usize {
        let envelope =
            PlaybackEnvelope::state(PLAYBACK_TOPIC, state, format_system_time((self.clock)()));
        self.broadcaster.publish(PLAYBACK_TOPIC, envelope)
    }

    /// Reject commands that reference tracks the catalog does not know.
    async fn ensure_known(&self, command: &PlaybackCommand) -> Result<(), ServiceError> {
        let ids: &[TrackId] = match command {
            PlaybackCommand::Play { track_id } => std::slice::from_ref(track_id),
            PlaybackCommand::UpdateQueue(op) => op.introduced_tracks(),
            _ => &[],
        };
        if ids.is_empty() {
            return Ok(());
        }

        let known: HashSet<TrackId> = self
            .catalog
            .lookup(ids)
            .await
            .into_iter()
            .map(|track| track.id)
            .collect();
        let missing: Vec<&str> = ids
            .iter()
            .filter(|id| !known.contains(*id))
            .map(TrackId::as_str)
            .collect();
        if missing.is_empty() {
            Ok(())
        } else {
            Err(ServiceError::NotFound(format!(
                "unknown track(s): {}",
                missing.join(", ")
            )))
        }
    }

    async fn dangling_entries(&self, queue: &[TrackId]) -> HashSet<TrackId> {
        if queue.is_empty() {
            return HashSet::new();
        }
        let known: HashSet<TrackId> = self
            .catalog
            .lookup(queue)
            .await
            .into_iter()
            .map(|track| track.id)
            .collect();
        queue
            .iter()
            .filter(|id| !known.contains(*id))
            .cloned()
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        dao::{
            catalog::{CatalogEntry, StaticCatalog, Track},
            models::{HistoryEntryEntity, PlaybackStateEntity},
            playback_store::memory::MemoryPlaybackStore,
            storage::StorageError,
        },
        state::state_machine::QueueOp,
    };
    use futures::future::BoxFuture;
    use std::sync::atomic::{AtomicU64, Ordering};

    fn catalog(ids: &[&str]) -> Arc<dyn Catalog> {
        Arc::new(StaticCatalog::new(ids.iter().map(|id| CatalogEntry {
            track: Track {
                id: TrackId::from(*id),
                title: format!("Track {id}"),
                artist: None,
                album: None,
                duration_seconds: None,
                mime_type: "audio/mpeg".into(),
            },
            path: format!("/music/{id}.mp3").into(),
        })))
    }

    struct Harness {
        coordinator: PlaybackCoordinator,
        broadcaster: Arc<Broadcaster<PlaybackEnvelope>>,
        store: MemoryPlaybackStore,
        seconds: Arc<AtomicU64>,
    }

    async fn harness(tracks: &[&str]) -> Harness {
        let store = MemoryPlaybackStore::new();
        let slot = Arc::new(StorageSlot::new());
        slot.install(Arc::new(store.clone())).await;
        let broadcaster = Arc::new(Broadcaster::new(16));
        let seconds = Arc::new(AtomicU64::new(0));
        let clock_seconds = seconds.clone();
        let coordinator = PlaybackCoordinator::new(slot, catalog(tracks), broadcaster.clone())
            .with_clock(Arc::new(move || {
                SystemTime::UNIX_EPOCH
                    + Duration::from_secs(1_700_000_000 + clock_seconds.load(Ordering::SeqCst))
            }));
        Harness {
            coordinator,
            broadcaster,
            store,
            seconds,
        }
    }

    fn play(id: &str) -> PlaybackCommand {
        PlaybackCommand::Play {
            track_id: id.into(),
        }
    }

    #[tokio::test]
    async fn each_commit_bumps_revision_and_publishes() {
        let h = harness(&["a"]).await;
        let mut subscriber = h.broadcaster.subscribe(PLAYBACK_TOPIC);
        let origin = CommandOrigin::player("d1");

        let first = h.coordinator.execute(&origin, play("a")).await.unwrap();
        let second = h
            .coordinator
            .execute(&origin, PlaybackCommand::Pause)
            .await
            .unwrap();

        assert_eq!(first.revision, 1);
        assert_eq!(second.revision, 2);
        assert_eq!(subscriber.recv().await.unwrap().revision, 1);
        let envelope = subscriber.recv().await.unwrap();
        assert_eq!(envelope.revision, 2);
        assert_eq!(envelope.topic, PLAYBACK_TOPIC);
        assert!(!envelope.data.playing);

        let persisted = h.store.load_state().await.unwrap().unwrap();
        assert_eq!(persisted.revision, 2);
    }

    #[tokio::test]
    async fn concurrent_seeks_resolve_to_last_commit() {
        let h = harness(&["a"]).await;
        h.coordinator
            .execute(&CommandOrigin::player("a"), play("a"))
            .await
            .unwrap();

        let from_a = CommandOrigin::player("a");
        let from_b = CommandOrigin::player("b");
        let (ra, rb) = tokio::join!(
            h.coordinator.execute(
                &from_a,
                PlaybackCommand::Seek {
                    position_seconds: 30.0
                }
            ),
            h.coordinator.execute(
                &from_b,
                PlaybackCommand::Seek {
                    position_seconds: 45.0
                }
            ),
        );
        let (ra, rb) = (ra.unwrap(), rb.unwrap());
        let last = if ra.revision > rb.revision { ra } else { rb };

        let state = h.coordinator.snapshot().await;
        assert_eq!(state.revision, 3);
        assert_eq!(state, last);
        assert!(state.position_seconds == 30.0 || state.position_seconds == 45.0);
    }

    #[tokio::test]
    async fn next_on_empty_queue_stops_and_closes_session() {
        let h = harness(&["a"]).await;
        let origin = CommandOrigin::player("d1");
        h.coordinator.execute(&origin, play("a")).await.unwrap();
        h.seconds.store(12, Ordering::SeqCst);

        let state = h
            .coordinator
            .execute(&origin, PlaybackCommand::Next)
            .await
            .unwrap();
        assert!(!state.playing);
        assert_eq!(state.current_track_id, Some("a".into()));

        let history = h.store.list_history(None, 10).await.unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].duration_listened_seconds, 12);
        assert!(!history[0].is_open());
    }

    #[tokio::test]
    async fn session_lifecycle_follows_track_changes() {
        let h = harness(&["a", "b"]).await;
        let origin = CommandOrigin::player("d1");

        h.coordinator.execute(&origin, play("a")).await.unwrap();
        h.seconds.store(30, Ordering::SeqCst);
        h.coordinator.execute(&origin, play("b")).await.unwrap();
        h.seconds.store(50, Ordering::SeqCst);
        h.coordinator
            .execute(&origin, PlaybackCommand::Pause)
            .await
            .unwrap();

        let history = h.store.list_history(None, 10).await.unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].track_id, "b");
        assert_eq!(history[0].duration_listened_seconds, 20);
        assert_eq!(history[1].track_id, "a");
        assert_eq!(history[1].duration_listened_seconds, 30);
        assert!(history.iter().all(|entry| entry.device_id == "d1"));
    }

    #[tokio::test]
    async fn active_player_survives_remote_seek() {
        let h = harness(&["a"]).await;
        let state = h
            .coordinator
            .execute(&CommandOrigin::player("a"), play("a"))
            .await
            .unwrap();
        assert_eq!(state.active_player_id, Some("a".into()));

        let state = h
            .coordinator
            .execute(
                &CommandOrigin::remote("b"),
                PlaybackCommand::Seek {
                    position_seconds: 20.0,
                },
            )
            .await
            .unwrap();
        assert_eq!(state.active_player_id, Some("a".into()));
        assert_eq!(state.position_seconds, 20.0);
    }

    #[tokio::test]
    async fn unknown_tracks_are_rejected_before_commit() {
        let h = harness(&["a"]).await;
        let origin = CommandOrigin::player("d1");

        let err = h.coordinator.execute(&origin, play("zzz")).await.unwrap_err();
        assert!(matches!(err, ServiceError::NotFound(_)));

        let err = h
            .coordinator
            .execute(
                &origin,
                PlaybackCommand::UpdateQueue(QueueOp::Append(vec!["a".into(), "nope".into()])),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::NotFound(message) if message.contains("nope")));
        assert_eq!(h.coordinator.snapshot().await.revision, 0);
    }

    #[tokio::test]
    async fn next_skips_tracks_removed_from_catalog() {
        let store = MemoryPlaybackStore::new();
        store
            .upsert_state(PlaybackStateEntity {
                current_track_id: Some("a".into()),
                position_seconds: 5.0,
                playing: true,
                queue: vec!["removed".into(), "b".into()],
                active_player_id: Some("d1".into()),
                revision: 7,
                updated_at: SystemTime::UNIX_EPOCH,
            })
            .await
            .unwrap();
        let slot = Arc::new(StorageSlot::new());
        slot.install(Arc::new(store.clone())).await;
        let coordinator =
            PlaybackCoordinator::new(slot, catalog(&["a", "b"]), Arc::new(Broadcaster::new(4)));

        assert_eq!(coordinator.hydrate(&store).await.unwrap(), 7);
        let state = coordinator
            .execute(&CommandOrigin::player("d1"), PlaybackCommand::Next)
            .await
            .unwrap();
        assert_eq!(state.current_track_id, Some("b".into()));
        assert!(state.queue.is_empty());
        assert_eq!(state.revision, 8);
    }

    #[tokio::test]
    async fn degraded_mode_rejects_commands() {
        let coordinator = PlaybackCoordinator::new(
            Arc::new(StorageSlot::new()),
            catalog(&["a"]),
            Arc::new(Broadcaster::new(4)),
        );
        let err = coordinator
            .execute(&CommandOrigin::player("d1"), play("a"))
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::Degraded));
    }

    struct RejectingStore;

    impl PlaybackStore for RejectingStore {
        fn load_state(&self) -> BoxFuture<'static, StorageResult<Option<PlaybackStateEntity>>> {
            Box::pin(async { Ok(None) })
        }
        fn upsert_state(&self, _state: PlaybackStateEntity) -> BoxFuture<'static, StorageResult<()>> {
            Box::pin(async { Err(StorageError::rejected("disk full")) })
        }
        fn insert_history(&self, _entry: HistoryEntryEntity) -> BoxFuture<'static, StorageResult<()>> {
            Box::pin(async { Ok(()) })
        }
        fn update_history(&self, _entry: HistoryEntryEntity) -> BoxFuture<'static, StorageResult<()>> {
            Box::pin(async { Ok(()) })
        }
        fn open_history(&self) -> BoxFuture<'static, StorageResult<Vec<HistoryEntryEntity>>> {
            Box::pin(async { Ok(Vec::new()) })
        }
        fn list_history(
            &self,
            _device_id: Option<String>,
            _limit: usize,
        ) -> BoxFuture<'static, StorageResult<Vec<HistoryEntryEntity>>> {
            Box::pin(async { Ok(Vec::new()) })
        }
        fn health_check(&self) -> BoxFuture<'static, StorageResult<()>> {
            Box::pin(async { Ok(()) })
        }
        fn try_reconnect(&self) -> BoxFuture<'static, StorageResult<()>> {
            Box::pin(async { Ok(()) })
        }
    }

    /// Delegates to a memory store but answers upserts late, applying the write before
    /// the delay or never applying it.
    struct SlowStore {
        inner: MemoryPlaybackStore,
        applies_write: bool,
    }

    impl PlaybackStore for SlowStore {
        fn load_state(&self) -> BoxFuture<'static, StorageResult<Option<PlaybackStateEntity>>> {
            self.inner.load_state()
        }
        fn upsert_state(&self, state: PlaybackStateEntity) -> BoxFuture<'static, StorageResult<()>> {
            let write = self.applies_write.then(|| self.inner.upsert_state(state));
            Box::pin(async move {
                if let Some(write) = write {
                    write.await?;
                }
                tokio::time::sleep(Duration::from_secs(5)).await;
                Ok(())
            })
        }
        fn insert_history(&self, entry: HistoryEntryEntity) -> BoxFuture<'static, StorageResult<()>> {
            self.inner.insert_history(entry)
        }
        fn update_history(&self, entry: HistoryEntryEntity) -> BoxFuture<'static, StorageResult<()>> {
            self.inner.update_history(entry)
        }
        fn open_history(&self) -> BoxFuture<'static, StorageResult<Vec<HistoryEntryEntity>>> {
            self.inner.open_history()
        }
        fn list_history(
            &self,
            device_id: Option<String>,
            limit: usize,
        ) -> BoxFuture<'static, StorageResult<Vec<HistoryEntryEntity>>> {
            self.inner.list_history(device_id, limit)
        }
        fn health_check(&self) -> BoxFuture<'static, StorageResult<()>> {
            self.inner.health_check()
        }
        fn try_reconnect(&self) -> BoxFuture<'static, StorageResult<()>> {
            self.inner.try_reconnect()
        }
    }

    async fn slow_coordinator(
        applies_write: bool,
    ) -> (PlaybackCoordinator, MemoryPlaybackStore, Arc<Broadcaster<PlaybackEnvelope>>) {
        let inner = MemoryPlaybackStore::new();
        let slot = Arc::new(StorageSlot::new());
        slot.install(Arc::new(SlowStore {
            inner: inner.clone(),
            applies_write,
        }))
        .await;
        let broadcaster = Arc::new(Broadcaster::new(4));
        let coordinator = PlaybackCoordinator::new(slot, catalog(&["a"]), broadcaster.clone())
            .with_write_timeout(Duration::from_millis(50));
        (coordinator, inner, broadcaster)
    }

    #[tokio::test]
    async fn timed_out_write_that_landed_is_committed() {
        let (coordinator, inner, broadcaster) = slow_coordinator(true).await;
        let mut subscriber = broadcaster.subscribe(PLAYBACK_TOPIC);

        let next = coordinator
            .execute(&CommandOrigin::player("d1"), play("a"))
            .await
            .unwrap();

        assert_eq!(next.revision, 1);
        assert_eq!(coordinator.snapshot().await.revision, 1);
        assert_eq!(subscriber.try_recv().unwrap().revision, 1);
        assert_eq!(inner.load_state().await.unwrap().unwrap().revision, 1);
        assert_eq!(inner.list_history(None, 10).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn timed_out_write_that_never_landed_is_abandoned() {
        let (coordinator, inner, broadcaster) = slow_coordinator(false).await;
        let mut subscriber = broadcaster.subscribe(PLAYBACK_TOPIC);

        let err = coordinator
            .execute(&CommandOrigin::player("d1"), play("a"))
            .await
            .unwrap_err();

        assert!(matches!(err, ServiceError::Timeout));
        assert_eq!(coordinator.snapshot().await, PlaybackState::default());
        assert!(subscriber.try_recv().is_none());
        assert!(inner.load_state().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn persistence_failure_leaves_state_and_subscribers_untouched() {
        let slot = Arc::new(StorageSlot::new());
        slot.install(Arc::new(RejectingStore)).await;
        let broadcaster = Arc::new(Broadcaster::new(4));
        let mut subscriber = broadcaster.subscribe(PLAYBACK_TOPIC);
        let coordinator = PlaybackCoordinator::new(slot, catalog(&["a"]), broadcaster.clone());

        let err = coordinator
            .execute(&CommandOrigin::player("d1"), play("a"))
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::Persistence(_)));
        assert_eq!(coordinator.snapshot().await, PlaybackState::default());
        assert!(subscriber.try_recv().is_none());
    }
}
