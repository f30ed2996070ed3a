use std::time::SystemTime;

use crate::{
    dao::models::PlaybackStateEntity,
    state::ids::{DeviceId, TrackId},
};

/// Canonical shared "now playing" record.
///
/// `position_seconds` only carries meaning while `current_track_id` is set.
#[derive(Debug, Clone, PartialEq)]
pub struct PlaybackState {
    /// Track loaded on the active player, if any.
    pub current_track_id: Option<TrackId>,
    /// Playhead offset in seconds, never negative.
    pub position_seconds: f64,
    /// Whether the active player should be producing audio.
    pub playing: bool,
    /// Upcoming tracks, front first. May contain ids the catalog dropped.
    pub queue: Vec<TrackId>,
    /// Device that renders audio.
    pub active_player_id: Option<DeviceId>,
    /// Commit counter, bumped by one on every commit.
    pub revision: u64,
    /// Time of the commit that produced this state.
    pub updated_at: SystemTime,
}

impl Default for PlaybackState {
    fn default() -> Self {
        Self {
            current_track_id: None,
            position_seconds: 0.0,
            playing: false,
            queue: Vec::new(),
            active_player_id: None,
            revision: 0,
            updated_at: SystemTime::UNIX_EPOCH,
        }
    }
}

impl From<PlaybackState> for PlaybackStateEntity {
    fn from(value: PlaybackState) -> Self {
        Self {
            current_track_id: value.current_track_id.map(Into::into),
            position_seconds: value.position_seconds,
            playing: value.playing,
            queue: value.queue.into_iter().map(Into::into).collect(),
            active_player_id: value.active_player_id.map(Into::into),
            revision: value.revision,
            updated_at: value.updated_at,
        }
    }
}

impl From<PlaybackStateEntity> for PlaybackState {
    fn from(value: PlaybackStateEntity) -> Self {
        Self {
            current_track_id: value.current_track_id.map(TrackId::from),
            position_seconds: value.position_seconds.max(0.0),
            playing: value.playing,
            queue: value.queue.into_iter().map(TrackId::from).collect(),
            active_player_id: value.active_player_id.map(DeviceId::from),
            revision: value.revision,
            updated_at: value.updated_at,
        }
    }
}
