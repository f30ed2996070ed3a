use std::time::SystemTime;

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use uuid::Uuid;

use crate::dao::models::{HistoryEntryEntity, PLAYBACK_RECORD_ID, PlaybackStateEntity};

pub const PLAYBACK_PREFIX: &str = "playback::";
pub const HISTORY_PREFIX: &str = "history::";
pub const END_SUFFIX: &str = "\u{ffff}";

/// Body of a `_find` answer.
#[derive(Debug, Deserialize)]
pub struct FindResponse {
    pub docs: Vec<Value>,
    #[serde(default)]
    pub warning: Option<String>,
}

/// Sort key of history documents; `SystemTime` serializes as a seconds/nanos pair.
pub const STARTED_AT_FIELD: &str = "started_at.secs_since_epoch";
/// Upper bound on open sessions fetched in one query; normally there is at most one.
pub const OPEN_HISTORY_LIMIT: usize = 100;

/// Mango indexes backing the history queries, as `(name, fields)`.
pub fn history_indexes() -> [(&'static str, Vec<&'static str>); 3] {
    [
        ("history-started", vec![STARTED_AT_FIELD]),
        ("history-device-started", vec!["device_id", STARTED_AT_FIELD]),
        ("history-open", vec!["completed_at"]),
    ]
}

/// Index creation request for `POST /{db}/_index`.
pub fn index_request(name: &str, fields: &[&str]) -> Value {
    json!({
        "index": { "fields": fields },
        "name": name,
        "ddoc": name,
        "type": "json",
    })
}

fn history_id_range() -> Value {
    json!({
        "$gt": HISTORY_PREFIX,
        "$lt": format!("{HISTORY_PREFIX}{END_SUFFIX}"),
    })
}

/// `_find` body selecting sessions that were never finalized.
pub fn open_history_query() -> Value {
    json!({
        "selector": {
            "_id": history_id_range(),
            "completed_at": null,
        },
        "limit": OPEN_HISTORY_LIMIT,
        "use_index": "history-open",
    })
}

/// `_find` body selecting the `limit` most recent sessions, optionally for one device.
pub fn recent_history_query(device_id: Option<&str>, limit: usize) -> Value {
    match device_id {
        Some(device) => json!({
            "selector": {
                "_id": history_id_range(),
                "device_id": device,
                STARTED_AT_FIELD: { "$gte": 0 },
            },
            "sort": [{ "device_id": "desc" }, { STARTED_AT_FIELD: "desc" }],
            "limit": limit,
            "use_index": "history-device-started",
        }),
        None => json!({
            "selector": {
                "_id": history_id_range(),
                STARTED_AT_FIELD: { "$gte": 0 },
            },
            "sort": [{ STARTED_AT_FIELD: "desc" }],
            "limit": limit,
            "use_index": "history-started",
        }),
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CouchPlaybackDocument {
    #[serde(rename = "_id")]
    pub id: String,
    #[serde(rename = "_rev", skip_serializing_if = "Option::is_none")]
    pub rev: Option<String>,
    #[serde(flatten)]
    pub body: PlaybackBody,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlaybackBody {
    pub current_track_id: Option<String>,
    pub position_seconds: f64,
    pub playing: bool,
    #[serde(default)]
    pub queue: Vec<String>,
    pub active_player_id: Option<String>,
    pub revision: u64,
    pub updated_at: SystemTime,
}

impl CouchPlaybackDocument {
    pub fn from_entity(state: PlaybackStateEntity) -> Self {
        Self {
            id: playback_doc_id(),
            rev: None,
            body: PlaybackBody {
                current_track_id: state.current_track_id,
                position_seconds: state.position_seconds,
                playing: state.playing,
                queue: state.queue,
                active_player_id: state.active_player_id,
                revision: state.revision,
                updated_at: state.updated_at,
            },
        }
    }

    pub fn into_entity(self) -> PlaybackStateEntity {
        let body = self.body;
        PlaybackStateEntity {
            current_track_id: body.current_track_id,
            position_seconds: body.position_seconds,
            playing: body.playing,
            queue: body.queue,
            active_player_id: body.active_player_id,
            revision: body.revision,
            updated_at: body.updated_at,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CouchHistoryDocument {
    #[serde(rename = "_id")]
    pub id: String,
    #[serde(rename = "_rev", skip_serializing_if = "Option::is_none")]
    pub rev: Option<String>,
    #[serde(flatten)]
    pub entry: HistoryEntryEntity,
}

impl CouchHistoryDocument {
    pub fn from_entity(entry: HistoryEntryEntity) -> Self {
        Self {
            id: history_doc_id(entry.id),
            rev: None,
            entry,
        }
    }
}

pub fn playback_doc_id() -> String {
    format!("{PLAYBACK_PREFIX}{PLAYBACK_RECORD_ID}")
}

pub fn history_doc_id(id: Uuid) -> String {
    format!("{HISTORY_PREFIX}{id}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn open_query_selects_unfinished_history_only() {
        let query = open_history_query();
        assert_eq!(query["selector"]["completed_at"], Value::Null);
        assert_eq!(query["selector"]["_id"]["$gt"], HISTORY_PREFIX);
        assert_eq!(query["use_index"], "history-open");
    }

    #[test]
    fn recent_query_sorts_on_an_indexed_field_and_limits() {
        let query = recent_history_query(None, 20);
        assert_eq!(query["limit"], 20);
        assert_eq!(query["sort"][0][STARTED_AT_FIELD], "desc");

        let query = recent_history_query(Some("kitchen"), 5);
        assert_eq!(query["selector"]["device_id"], "kitchen");
        assert_eq!(query["sort"][0]["device_id"], "desc");
        assert_eq!(query["sort"][1][STARTED_AT_FIELD], "desc");

        let indexes = history_indexes();
        let (name, fields) = &indexes[1];
        assert_eq!(query["use_index"], *name);
        assert_eq!(fields, &vec!["device_id", STARTED_AT_FIELD]);
    }

    #[test]
    fn started_at_serializes_with_the_indexed_seconds_field() {
        let entry = HistoryEntryEntity {
            id: Uuid::nil(),
            track_id: "t".into(),
            device_id: "d".into(),
            started_at: SystemTime::UNIX_EPOCH + std::time::Duration::from_secs(42),
            completed_at: None,
            duration_listened_seconds: 0,
        };
        let doc = serde_json::to_value(CouchHistoryDocument::from_entity(entry)).unwrap();
        assert_eq!(doc["started_at"]["secs_since_epoch"], 42);
        assert_eq!(doc["completed_at"], Value::Null);
    }
}
