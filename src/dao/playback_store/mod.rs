/// CouchDB backend.
#[cfg(feature = "couch-store")]
pub mod couchdb;
/// In-process backend.
pub mod memory;
/// MongoDB backend.
#[cfg(feature = "mongo-store")]
pub mod mongodb;

use crate::dao::models::{HistoryEntryEntity, PlaybackStateEntity};
use crate::dao::storage::StorageResult;
use futures::future::BoxFuture;

/// Default number of history entries returned when callers do not specify a limit.
pub const DEFAULT_HISTORY_LIMIT: usize = 50;
/// Upper bound on history entries returned by a single listing.
pub const MAX_HISTORY_LIMIT: usize = 500;

/// Abstraction over the persistence layer for the playback record and listening history.
///
/// `upsert_state` replaces the single playback record as one atomic write; callers
/// serialize read-modify-write cycles around it.
pub trait PlaybackStore: Send + Sync {
    fn load_state(&self) -> BoxFuture<'static, StorageResult<Option<PlaybackStateEntity>>>;
    fn upsert_state(&self, state: PlaybackStateEntity) -> BoxFuture<'static, StorageResult<()>>;
    fn insert_history(&self, entry: HistoryEntryEntity) -> BoxFuture<'static, StorageResult<()>>;
    fn update_history(&self, entry: HistoryEntryEntity) -> BoxFuture<'static, StorageResult<()>>;
    fn open_history(&self) -> BoxFuture<'static, StorageResult<Vec<HistoryEntryEntity>>>;
    fn list_history(
        &self,
        device_id: Option<String>,
        limit: usize,
    ) -> BoxFuture<'static, StorageResult<Vec<HistoryEntryEntity>>>;
    fn health_check(&self) -> BoxFuture<'static, StorageResult<()>>;
    fn try_reconnect(&self) -> BoxFuture<'static, StorageResult<()>>;
}

/// Sort entries newest first, optionally keep a single device, and cap the result.
pub(crate) fn select_recent(
    mut entries: Vec<HistoryEntryEntity>,
    device_id: Option<&str>,
    limit: usize,
) -> Vec<HistoryEntryEntity> {
    if let Some(device) = device_id {
        entries.retain(|entry| entry.device_id == device);
    }
    entries.sort_by(|a, b| b.started_at.cmp(&a.started_at));
    entries.truncate(limit);
    entries
}
