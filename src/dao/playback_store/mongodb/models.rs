use mongodb::bson::{DateTime, Document, doc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::error::MongoDaoError;
use crate::dao::models::{HistoryEntryEntity, PLAYBACK_RECORD_ID, PlaybackStateEntity};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MongoPlaybackDocument {
    #[serde(rename = "_id")]
    id: String,
    current_track_id: Option<String>,
    position_seconds: f64,
    playing: bool,
    #[serde(default)]
    queue: Vec<String>,
    active_player_id: Option<String>,
    revision: i64,
    updated_at: DateTime,
}

impl From<PlaybackStateEntity> for MongoPlaybackDocument {
    fn from(value: PlaybackStateEntity) -> Self {
        Self {
            id: PLAYBACK_RECORD_ID.to_owned(),
            current_track_id: value.current_track_id,
            position_seconds: value.position_seconds,
            playing: value.playing,
            queue: value.queue,
            active_player_id: value.active_player_id,
            revision: i64::try_from(value.revision).unwrap_or(i64::MAX),
            updated_at: DateTime::from_system_time(value.updated_at),
        }
    }
}

impl From<MongoPlaybackDocument> for PlaybackStateEntity {
    fn from(value: MongoPlaybackDocument) -> Self {
        Self {
            current_track_id: value.current_track_id,
            position_seconds: value.position_seconds,
            playing: value.playing,
            queue: value.queue,
            active_player_id: value.active_player_id,
            revision: u64::try_from(value.revision).unwrap_or_default(),
            updated_at: value.updated_at.to_system_time(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MongoHistoryDocument {
    #[serde(rename = "_id")]
    id: String,
    track_id: String,
    device_id: String,
    started_at: DateTime,
    completed_at: Option<DateTime>,
    duration_listened_seconds: i64,
}

impl From<HistoryEntryEntity> for MongoHistoryDocument {
    fn from(value: HistoryEntryEntity) -> Self {
        Self {
            id: value.id.to_string(),
            track_id: value.track_id,
            device_id: value.device_id,
            started_at: DateTime::from_system_time(value.started_at),
            completed_at: value.completed_at.map(DateTime::from_system_time),
            duration_listened_seconds: i64::try_from(value.duration_listened_seconds)
                .unwrap_or(i64::MAX),
        }
    }
}

impl TryFrom<MongoHistoryDocument> for HistoryEntryEntity {
    type Error = MongoDaoError;

    fn try_from(value: MongoHistoryDocument) -> Result<Self, Self::Error> {
        let id = Uuid::parse_str(&value.id).map_err(|_| MongoDaoError::InvalidDocId {
            doc_id: value.id.clone(),
        })?;
        Ok(Self {
            id,
            track_id: value.track_id,
            device_id: value.device_id,
            started_at: value.started_at.to_system_time(),
            completed_at: value.completed_at.map(|at| at.to_system_time()),
            duration_listened_seconds: u64::try_from(value.duration_listened_seconds)
                .unwrap_or_default(),
        })
    }
}

pub fn history_doc_id(id: Uuid) -> Document {
    doc! {"_id": id.to_string()}
}

pub fn playback_doc_id() -> Document {
    doc! {"_id": PLAYBACK_RECORD_ID}
}
