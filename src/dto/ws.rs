use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use validator::{Validate, ValidationError, ValidationErrors};

use crate::{
    dto::{
        playback::QueueRequest, sse::PlaybackEnvelope, validation::validate_identifier,
    },
    state::state_machine::{ClientMode, CommandOrigin, PlaybackCommand},
};

#[derive(Debug, Deserialize, Serialize)]
/// Messages accepted from WebSocket clients.
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientInboundMessage {
    /// Must be the first frame of every connection.
    Identification {
        device_id: String,
        #[serde(default)]
        mode: ClientMode,
    },
    /// Drive the shared playback state.
    Command {
        /// Echoed back in the matching `ack` or `error` frame.
        #[serde(default)]
        request_id: Option<String>,
        command: CommandPayload,
    },
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
/// Playback command carried by a `command` frame, discriminated by `action`.
#[serde(tag = "action", rename_all = "snake_case")]
pub enum CommandPayload {
    Play { track_id: String },
    Pause,
    Resume,
    Seek { position_seconds: f64 },
    Next,
    Previous,
    Queue(QueueRequest),
    Position { position_seconds: f64 },
    ClaimActivePlayer {
        #[serde(default)]
        device_id: Option<String>,
    },
    TrackEnded { track_id: String },
}

impl Validate for CommandPayload {
    fn validate(&self) -> Result<(), ValidationErrors> {
        let mut errors = ValidationErrors::new();
        match self {
            CommandPayload::Play { track_id } | CommandPayload::TrackEnded { track_id } => {
                if let Err(e) = validate_identifier(track_id) {
                    errors.add("track_id", e);
                }
            }
            CommandPayload::ClaimActivePlayer {
                device_id: Some(device_id),
            } => {
                if let Err(e) = validate_identifier(device_id) {
                    errors.add("device_id", e);
                }
            }
            CommandPayload::Seek { position_seconds }
            | CommandPayload::Position { position_seconds } => {
                if !position_seconds.is_finite() || *position_seconds < 0.0 {
                    errors.add("position_seconds", ValidationError::new("range"));
                }
            }
            CommandPayload::Queue(
                QueueRequest::Append { track_ids }
                | QueueRequest::Insert { track_ids, .. }
                | QueueRequest::Replace { track_ids },
            ) => {
                for track_id in track_ids {
                    if let Err(e) = validate_identifier(track_id) {
                        errors.add("track_ids", e);
                        break;
                    }
                }
            }
            _ => {}
        }
        if errors.is_empty() { Ok(()) } else { Err(errors) }
    }
}

impl CommandPayload {
    /// Resolve the payload into a coordinator command issued by `origin`.
    pub fn into_command(self, origin: &CommandOrigin) -> PlaybackCommand {
        match self {
            CommandPayload::Play { track_id } => PlaybackCommand::Play {
                track_id: track_id.into(),
            },
            CommandPayload::Pause => PlaybackCommand::Pause,
            CommandPayload::Resume => PlaybackCommand::Resume,
            CommandPayload::Seek { position_seconds } => {
                PlaybackCommand::Seek { position_seconds }
            }
            CommandPayload::Next => PlaybackCommand::Next,
            CommandPayload::Previous => PlaybackCommand::Previous,
            CommandPayload::Queue(request) => PlaybackCommand::UpdateQueue(request.into()),
            CommandPayload::Position { position_seconds } => {
                PlaybackCommand::ReportPosition { position_seconds }
            }
            CommandPayload::ClaimActivePlayer { device_id } => {
                PlaybackCommand::ClaimActivePlayer {
                    device_id: device_id
                        .map(Into::into)
                        .unwrap_or_else(|| origin.device_id.clone()),
                }
            }
            CommandPayload::TrackEnded { track_id } => PlaybackCommand::TrackEnded {
                track_id: track_id.into(),
            },
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
/// Frames pushed to WebSocket clients.
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerOutboundMessage {
    /// Positive acknowledgement of the identification frame, with the current state.
    Welcome {
        device_id: String,
        mode: ClientMode,
        render: bool,
        state: PlaybackEnvelope,
    },
    /// A newer committed state. `render` tells this device whether it should be
    /// producing audio.
    State {
        render: bool,
        event: PlaybackEnvelope,
    },
    /// The command with `request_id` was committed at `revision`.
    Ack {
        #[serde(skip_serializing_if = "Option::is_none")]
        request_id: Option<String>,
        revision: u64,
    },
    /// A frame could not be processed.
    Error {
        #[serde(skip_serializing_if = "Option::is_none")]
        request_id: Option<String>,
        message: String,
    },
}

/// A client currently connected over WebSocket.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct ConnectedDevice {
    pub device_id: String,
    pub mode: ClientMode,
    /// RFC 3339 time the identification frame was accepted.
    pub connected_at: String,
    /// Whether this device is the active player.
    pub active: bool,
}
