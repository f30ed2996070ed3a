use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use validator::{Validate, ValidationErrors};

use crate::{
    dao::catalog::Track,
    dto::{format_system_time, validation::validate_identifier},
    state::{
        ids::{DeviceId, TrackId},
        playback::PlaybackState,
        state_machine::QueueOp,
    },
};

/// Shared playback state as seen by clients.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct PlaybackStateView {
    #[schema(value_type = Option<String>)]
    pub current_track_id: Option<TrackId>,
    pub position_seconds: f64,
    pub playing: bool,
    #[schema(value_type = Vec<String>)]
    pub queue: Vec<TrackId>,
    #[schema(value_type = Option<String>)]
    pub active_player_id: Option<DeviceId>,
    pub revision: u64,
    /// RFC 3339 timestamp of the commit that produced this state.
    pub updated_at: String,
}

impl From<&PlaybackState> for PlaybackStateView {
    fn from(state: &PlaybackState) -> Self {
        Self {
            current_track_id: state.current_track_id.clone(),
            position_seconds: state.position_seconds,
            playing: state.playing,
            queue: state.queue.clone(),
            active_player_id: state.active_player_id.clone(),
            revision: state.revision,
            updated_at: format_system_time(state.updated_at),
        }
    }
}

impl From<PlaybackState> for PlaybackStateView {
    fn from(state: PlaybackState) -> Self {
        Self::from(&state)
    }
}

/// Start playing a track from the beginning.
#[derive(Debug, Deserialize, ToSchema)]
pub struct PlayRequest {
    pub track_id: String,
}

impl Validate for PlayRequest {
    fn validate(&self) -> Result<(), ValidationErrors> {
        let mut errors = ValidationErrors::new();
        if let Err(e) = validate_identifier(&self.track_id) {
            errors.add("track_id", e);
        }
        if errors.is_empty() { Ok(()) } else { Err(errors) }
    }
}

/// Move the playhead of the current track.
#[derive(Debug, Deserialize, ToSchema, Validate)]
pub struct SeekRequest {
    #[validate(range(min = 0.0))]
    pub position_seconds: f64,
}

/// Periodic position report from the rendering client.
#[derive(Debug, Deserialize, ToSchema, Validate)]
pub struct PositionReport {
    #[validate(range(min = 0.0))]
    pub position_seconds: f64,
}

/// Hand rendering over to a device. Defaults to the calling device.
#[derive(Debug, Default, Deserialize, ToSchema)]
pub struct ActivePlayerRequest {
    #[serde(default)]
    pub device_id: Option<String>,
}

impl Validate for ActivePlayerRequest {
    fn validate(&self) -> Result<(), ValidationErrors> {
        let mut errors = ValidationErrors::new();
        if let Some(ref id) = self.device_id {
            if let Err(e) = validate_identifier(id) {
                errors.add("device_id", e);
            }
        }
        if errors.is_empty() { Ok(()) } else { Err(errors) }
    }
}

/// Signal that the rendering client reached the end of a track.
#[derive(Debug, Deserialize, ToSchema)]
pub struct TrackEndedRequest {
    pub track_id: String,
}

impl Validate for TrackEndedRequest {
    fn validate(&self) -> Result<(), ValidationErrors> {
        let mut errors = ValidationErrors::new();
        if let Err(e) = validate_identifier(&self.track_id) {
            errors.add("track_id", e);
        }
        if errors.is_empty() { Ok(()) } else { Err(errors) }
    }
}

/// Queue edit, discriminated by `op`.
#[derive(Debug, Clone, Deserialize, Serialize, ToSchema)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum QueueRequest {
    /// Add tracks at the end of the queue.
    Append { track_ids: Vec<String> },
    /// Insert tracks before `index`; index 0 plays them next.
    Insert { index: usize, track_ids: Vec<String> },
    /// Remove the entry at `index`.
    Remove { index: usize },
    /// Move the entry at `from` to `to`.
    Move { from: usize, to: usize },
    /// Replace the whole queue.
    Replace { track_ids: Vec<String> },
    /// Empty the queue.
    Clear,
}

fn into_track_ids(ids: Vec<String>) -> Vec<TrackId> {
    ids.into_iter().map(TrackId::from).collect()
}

impl From<QueueRequest> for QueueOp {
    fn from(value: QueueRequest) -> Self {
        match value {
            QueueRequest::Append { track_ids } => QueueOp::Append(into_track_ids(track_ids)),
            QueueRequest::Insert { index, track_ids } => QueueOp::Insert {
                index,
                track_ids: into_track_ids(track_ids),
            },
            QueueRequest::Remove { index } => QueueOp::Remove { index },
            QueueRequest::Move { from, to } => QueueOp::Move { from, to },
            QueueRequest::Replace { track_ids } => QueueOp::Replace(into_track_ids(track_ids)),
            QueueRequest::Clear => QueueOp::Clear,
        }
    }
}

/// Catalog metadata of a track.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct TrackView {
    pub id: String,
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub artist: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub album: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_seconds: Option<f64>,
    pub mime_type: String,
}

impl From<Track> for TrackView {
    fn from(track: Track) -> Self {
        Self {
            id: track.id.into(),
            title: track.title,
            artist: track.artist,
            album: track.album,
            duration_seconds: track.duration_seconds,
            mime_type: track.mime_type,
        }
    }
}

/// Current track and queue materialized through the catalog.
#[derive(Debug, Serialize, ToSchema)]
pub struct QueueView {
    pub revision: u64,
    pub current: Option<TrackView>,
    /// Upcoming tracks, front first; ids the catalog no longer knows are left out.
    pub tracks: Vec<TrackView>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::{Duration, SystemTime};

    #[test]
    fn queue_request_parses_tagged_ops() {
        let request: QueueRequest =
            serde_json::from_str(r#"{"op":"insert","index":0,"track_ids":["a","b"]}"#).unwrap();
        assert_eq!(
            QueueOp::from(request),
            QueueOp::Insert {
                index: 0,
                track_ids: vec!["a".into(), "b".into()],
            }
        );

        let clear: QueueRequest = serde_json::from_str(r#"{"op":"clear"}"#).unwrap();
        assert_eq!(QueueOp::from(clear), QueueOp::Clear);
    }

    #[test]
    fn view_formats_commit_time() {
        let state = PlaybackState {
            revision: 3,
            updated_at: SystemTime::UNIX_EPOCH + Duration::from_secs(86_400),
            ..PlaybackState::default()
        };
        let view = PlaybackStateView::from(&state);
        assert_eq!(view.revision, 3);
        assert_eq!(view.updated_at, "1970-01-02T00:00:00Z");
    }

    #[test]
    fn negative_seek_fails_validation() {
        let request = SeekRequest {
            position_seconds: -1.0,
        };
        assert!(request.validate().is_err());
        assert!(
            PlayRequest {
                track_id: String::new()
            }
            .validate()
            .is_err()
        );
    }
}
