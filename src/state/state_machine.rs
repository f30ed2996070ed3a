use std::{collections::HashSet, fmt, str::FromStr};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use utoipa::ToSchema;

use crate::state::{
    ids::{DeviceId, TrackId},
    playback::PlaybackState,
};

/// How a connected client participates in playback.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum ClientMode {
    /// The client renders audio and may become the active player.
    #[default]
    Player,
    /// The client only drives playback and never takes over rendering.
    RemoteControl,
}

impl ClientMode {
    /// Wire name of the mode.
    pub fn as_str(self) -> &'static str {
        match self {
            ClientMode::Player => "player",
            ClientMode::RemoteControl => "remote_control",
        }
    }
}

impl fmt::Display for ClientMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ClientMode {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "player" => Ok(ClientMode::Player),
            "remote_control" | "remote-control" | "remote" => Ok(ClientMode::RemoteControl),
            other => Err(format!("unknown client mode '{other}'")),
        }
    }
}

/// Device and mode a command was issued from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandOrigin {
    /// Device the command comes from.
    pub device_id: DeviceId,
    /// Whether the device renders audio or only drives playback.
    pub mode: ClientMode,
}

impl CommandOrigin {
    /// Origin with an explicit mode.
    pub fn new(device_id: impl Into<DeviceId>, mode: ClientMode) -> Self {
        Self {
            device_id: device_id.into(),
            mode,
        }
    }

    /// Origin of a rendering client.
    pub fn player(device_id: impl Into<DeviceId>) -> Self {
        Self::new(device_id, ClientMode::Player)
    }

    /// Origin of a remote control.
    pub fn remote(device_id: impl Into<DeviceId>) -> Self {
        Self::new(device_id, ClientMode::RemoteControl)
    }
}

/// Edits that can be applied to the upcoming-tracks queue.
#[derive(Debug, Clone, PartialEq)]
pub enum QueueOp {
    /// Add tracks at the back of the queue.
    Append(Vec<TrackId>),
    /// Insert tracks before `index` (0 plays them next).
    Insert { index: usize, track_ids: Vec<TrackId> },
    /// Drop the entry at `index`.
    Remove { index: usize },
    /// Move the entry at `from` so it ends up at `to`.
    Move { from: usize, to: usize },
    /// Swap the whole queue for a new list.
    Replace(Vec<TrackId>),
    /// Empty the queue.
    Clear,
}

impl QueueOp {
    /// Track ids introduced into the queue by this edit, which must exist in the catalog.
    pub fn introduced_tracks(&self) -> &[TrackId] {
        match self {
            QueueOp::Append(ids) | QueueOp::Replace(ids) => ids,
            QueueOp::Insert { track_ids, .. } => track_ids,
            QueueOp::Remove { .. } | QueueOp::Move { .. } | QueueOp::Clear => &[],
        }
    }
}

/// Inbound commands accepted by the playback coordinator.
#[derive(Debug, Clone, PartialEq)]
pub enum PlaybackCommand {
    /// Start a track from the beginning.
    Play { track_id: TrackId },
    /// Stop rendering and keep the position.
    Pause,
    /// Continue the current track where it was paused.
    Resume,
    /// Jump within the current track.
    Seek { position_seconds: f64 },
    /// Advance to the head of the queue.
    Next,
    /// Restart the current track.
    Previous,
    /// Edit the queue.
    UpdateQueue(QueueOp),
    /// Periodic position update from the rendering client.
    ReportPosition { position_seconds: f64 },
    /// Make a device the active player.
    ClaimActivePlayer { device_id: DeviceId },
    /// The rendering client reached the end of a track.
    TrackEnded { track_id: TrackId },
}

impl PlaybackCommand {
    /// Short name used in logs.
    pub fn name(&self) -> &'static str {
        match self {
            PlaybackCommand::Play { .. } => "play",
            PlaybackCommand::Pause => "pause",
            PlaybackCommand::Resume => "resume",
            PlaybackCommand::Seek { .. } => "seek",
            PlaybackCommand::Next => "next",
            PlaybackCommand::Previous => "previous",
            PlaybackCommand::UpdateQueue(_) => "update_queue",
            PlaybackCommand::ReportPosition { .. } => "report_position",
            PlaybackCommand::ClaimActivePlayer { .. } => "claim_active_player",
            PlaybackCommand::TrackEnded { .. } => "track_ended",
        }
    }

    /// Commands that move the transport and therefore elect the issuing player.
    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            PlaybackCommand::Play { .. }
                | PlaybackCommand::Pause
                | PlaybackCommand::Resume
                | PlaybackCommand::Seek { .. }
                | PlaybackCommand::Next
                | PlaybackCommand::Previous
                | PlaybackCommand::TrackEnded { .. }
        )
    }

    /// Whether resolving this command needs to know which queued ids are dangling.
    pub fn advances_queue(&self) -> bool {
        matches!(
            self,
            PlaybackCommand::Next | PlaybackCommand::TrackEnded { .. }
        )
    }
}

/// Listening-history side effect produced by a transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HistoryEffect {
    /// Nothing to record.
    None,
    /// Close the open session and open a new one for `track_id`.
    Start {
        /// Track that started.
        track_id: TrackId,
        /// Player rendering it.
        device_id: DeviceId,
    },
    /// Close the open session, if any.
    Finalize,
}

/// Outcome of planning a command against the current state.
#[derive(Debug, Clone, PartialEq)]
pub struct Transition {
    /// State to commit. Revision and timestamp are stamped by the coordinator.
    pub next: PlaybackState,
    /// History side effect to run once the state is committed.
    pub history: HistoryEffect,
    /// `false` when the command turned out to be a no-op that must not be committed.
    pub commit: bool,
}

/// Reasons a command is rejected before anything is persisted.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CommandError {
    /// Malformed value, such as a negative position or an out-of-range index.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    /// The command does not apply to the current state.
    #[error("invalid state: {0}")]
    InvalidState(String),
}

/// Compute the next playback state for `command`.
///
/// Pure: no I/O and no revision bump. `dangling` lists queued ids the catalog can no
/// longer resolve; they are skipped when the queue advances.
pub fn plan_transition(
    current: &PlaybackState,
    origin: &CommandOrigin,
    command: PlaybackCommand,
    dangling: &HashSet<TrackId>,
) -> Result<Transition, CommandError> {
    let mut next = current.clone();

    if command.is_transport() && origin.mode == ClientMode::Player {
        next.active_player_id = Some(origin.device_id.clone());
    }

    let history = match command {
        PlaybackCommand::Play { track_id } => {
            next.current_track_id = Some(track_id.clone());
            next.position_seconds = 0.0;
            next.playing = true;
            HistoryEffect::Start {
                device_id: session_device(&next, origin),
                track_id,
            }
        }
        PlaybackCommand::Pause => {
            next.playing = false;
            HistoryEffect::Finalize
        }
        PlaybackCommand::Resume => {
            if next.current_track_id.is_none() {
                return Err(CommandError::InvalidState(
                    "nothing to resume: no current track".into(),
                ));
            }
            next.playing = true;
            HistoryEffect::None
        }
        PlaybackCommand::Seek { position_seconds }
        | PlaybackCommand::ReportPosition { position_seconds } => {
            next.position_seconds = validate_position(position_seconds)?;
            HistoryEffect::None
        }
        PlaybackCommand::Next => advance_queue(&mut next, origin, dangling),
        PlaybackCommand::TrackEnded { track_id } => {
            let stale = current.current_track_id.as_ref() != Some(&track_id)
                || current
                    .active_player_id
                    .as_ref()
                    .is_some_and(|active| active != &origin.device_id);
            if stale {
                return Ok(Transition {
                    next: current.clone(),
                    history: HistoryEffect::None,
                    commit: false,
                });
            }
            advance_queue(&mut next, origin, dangling)
        }
        PlaybackCommand::Previous => {
            next.position_seconds = 0.0;
            HistoryEffect::None
        }
        PlaybackCommand::UpdateQueue(op) => {
            apply_queue_op(&mut next.queue, op)?;
            HistoryEffect::None
        }
        PlaybackCommand::ClaimActivePlayer { device_id } => {
            next.active_player_id = Some(device_id);
            HistoryEffect::None
        }
    };

    Ok(Transition {
        next,
        history,
        commit: true,
    })
}

fn validate_position(position_seconds: f64) -> Result<f64, CommandError> {
    if !position_seconds.is_finite() || position_seconds < 0.0 {
        return Err(CommandError::InvalidArgument(format!(
            "position must be a finite, non-negative number of seconds (got {position_seconds})"
        )));
    }
    Ok(position_seconds)
}

/// Sessions belong to the device rendering them, or to the issuer when nobody renders.
fn session_device(state: &PlaybackState, origin: &CommandOrigin) -> DeviceId {
    state
        .active_player_id
        .clone()
        .unwrap_or_else(|| origin.device_id.clone())
}

fn advance_queue(
    state: &mut PlaybackState,
    origin: &CommandOrigin,
    dangling: &HashSet<TrackId>,
) -> HistoryEffect {
    while !state.queue.is_empty() {
        let candidate = state.queue.remove(0);
        if dangling.contains(&candidate) {
            continue;
        }
        state.current_track_id = Some(candidate.clone());
        state.position_seconds = 0.0;
        state.playing = true;
        return HistoryEffect::Start {
            device_id: session_device(state, origin),
            track_id: candidate,
        };
    }

    state.playing = false;
    HistoryEffect::Finalize
}

fn apply_queue_op(queue: &mut Vec<TrackId>, op: QueueOp) -> Result<(), CommandError> {
    let len = queue.len();
    let out_of_range = |what: &str, index: usize, bound: usize| {
        CommandError::InvalidArgument(format!(
            "{what} index {index} is out of range for a queue of {bound} entries"
        ))
    };

    match op {
        QueueOp::Append(track_ids) => {
            if track_ids.is_empty() {
                return Err(CommandError::InvalidArgument(
                    "append requires at least one track id".into(),
                ));
            }
            queue.extend(track_ids);
        }
        QueueOp::Insert { index, track_ids } => {
            if track_ids.is_empty() {
                return Err(CommandError::InvalidArgument(
                    "insert requires at least one track id".into(),
                ));
            }
            if index > len {
                return Err(out_of_range("insert", index, len));
            }
            queue.splice(index..index, track_ids);
        }
        QueueOp::Remove { index } => {
            if index >= len {
                return Err(out_of_range("remove", index, len));
            }
            queue.remove(index);
        }
        QueueOp::Move { from, to } => {
            if from >= len {
                return Err(out_of_range("move source", from, len));
            }
            if to >= len {
                return Err(out_of_range("move target", to, len));
            }
            let track = queue.remove(from);
            queue.insert(to, track);
        }
        QueueOp::Replace(track_ids) => {
            *queue = track_ids;
        }
        QueueOp::Clear => queue.clear(),
    }

    Ok(())
}
