use serde::{Deserialize, Serialize};
use std::time::SystemTime;
use uuid::Uuid;

/// Key of the single persisted playback record.
pub const PLAYBACK_RECORD_ID: &str = "now_playing";

/// Canonical playback record persisted by the storage layer.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PlaybackStateEntity {
    /// Identifier of the track currently loaded, if any.
    pub current_track_id: Option<String>,
    /// Last known playback offset in seconds.
    pub position_seconds: f64,
    /// Whether audio should currently be advancing.
    pub playing: bool,
    /// Ordered upcoming track identifiers, front first.
    pub queue: Vec<String>,
    /// Device allowed to render audio locally.
    pub active_player_id: Option<String>,
    /// Commit counter of the record.
    pub revision: u64,
    /// Time of the commit that produced this record.
    pub updated_at: SystemTime,
}

/// One listening session of a track on a device.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct HistoryEntryEntity {
    /// Primary key of the entry.
    pub id: Uuid,
    /// Track that was listened to.
    pub track_id: String,
    /// Device that rendered the track.
    pub device_id: String,
    /// When the session was opened.
    pub started_at: SystemTime,
    /// When the session was finalized; `None` while still open.
    pub completed_at: Option<SystemTime>,
    /// Whole seconds between start and completion.
    pub duration_listened_seconds: u64,
}

impl HistoryEntryEntity {
    /// Whether the session is still waiting to be finalized.
    pub fn is_open(&self) -> bool {
        self.completed_at.is_none()
    }
}
