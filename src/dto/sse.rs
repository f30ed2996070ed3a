use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::{dto::playback::PlaybackStateView, state::playback::PlaybackState};

/// Event name of playback state envelopes.
pub const PLAYBACK_STATE_EVENT: &str = "playback.state";
/// Event name of degraded mode changes.
pub const SYSTEM_STATUS_EVENT: &str = "system.status";
/// Event name of the first message on every stream.
pub const HANDSHAKE_EVENT: &str = "handshake";

#[derive(Clone, Debug)]
/// Dispatched payload carried across SSE channels.
pub struct ServerEvent {
    pub event: Option<String>,
    pub data: String,
}

impl ServerEvent {
    /// Convenience wrapper that serialises `payload` into the SSE data field.
    pub fn json<E, T>(event: E, payload: &T) -> serde_json::Result<Self>
    where
        E: Into<Option<String>>,
        T: Serialize,
    {
        Ok(Self {
            event: event.into(),
            data: serde_json::to_string(payload)?,
        })
    }
}

/// Committed playback state as fanned out to every subscriber of a topic.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct PlaybackEnvelope {
    /// Event kind, always `playback.state` for state envelopes.
    #[serde(rename = "type")]
    pub kind: String,
    pub topic: String,
    pub data: PlaybackStateView,
    /// RFC 3339 emission time.
    pub timestamp: String,
    /// Revision of `data`, repeated here so clients can drop stale events cheaply.
    pub revision: u64,
}

impl PlaybackEnvelope {
    pub fn state(topic: &str, state: &PlaybackState, timestamp: String) -> Self {
        Self {
            kind: PLAYBACK_STATE_EVENT.to_string(),
            topic: topic.to_string(),
            data: PlaybackStateView::from(state),
            timestamp,
            revision: state.revision,
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
/// Initial metadata sent to an SSE client when it connects.
pub struct Handshake {
    /// Topic the stream is bound to.
    pub topic: String,
    /// Human-readable message confirming the subscription.
    pub message: String,
    /// Whether the backend is running without a storage backend connection.
    pub degraded: bool,
}

#[derive(Debug, Serialize, ToSchema)]
/// Sent when the backend enters or leaves degraded mode.
pub struct SystemStatus {
    pub degraded: bool,
}
