use tracing::debug;

use crate::{
    dto::{
        format_system_time,
        playback::{PlaybackStateView, QueueView, TrackView},
        ws::ConnectedDevice,
    },
    error::ServiceError,
    state::{
        SharedState,
        state_machine::{CommandOrigin, PlaybackCommand},
    },
};

/// Run a command through the coordinator and return the committed state.
pub async fn execute(
    state: &SharedState,
    origin: &CommandOrigin,
    command: PlaybackCommand,
) -> Result<PlaybackStateView, ServiceError> {
    debug!(command = command.name(), device = %origin.device_id, mode = %origin.mode, "playback command received");
    let next = state.playback().execute(origin, command).await?;
    Ok(PlaybackStateView::from(&next))
}

/// Last committed playback state.
pub async fn current_state(state: &SharedState) -> PlaybackStateView {
    PlaybackStateView::from(&state.playback().snapshot().await)
}

/// Current track and queue materialized through the catalog, skipping dangling ids.
pub async fn queue(state: &SharedState) -> QueueView {
    let snapshot = state.playback().snapshot().await;
    let current = match &snapshot.current_track_id {
        Some(id) => state
            .catalog()
            .lookup(std::slice::from_ref(id))
            .await
            .into_iter()
            .next()
            .map(TrackView::from),
        None => None,
    };
    let tracks = state
        .catalog()
        .lookup(&snapshot.queue)
        .await
        .into_iter()
        .map(TrackView::from)
        .collect();

    QueueView {
        revision: snapshot.revision,
        current,
        tracks,
    }
}

/// Identified WebSocket clients, oldest connection first.
pub async fn connected_devices(state: &SharedState) -> Vec<ConnectedDevice> {
    let active = state.playback().snapshot().await.active_player_id;
    let mut connections: Vec<_> = state
        .connections()
        .iter()
        .map(|entry| entry.value().clone())
        .collect();
    connections.sort_by_key(|connection| connection.connected_at);

    connections
        .into_iter()
        .map(|connection| ConnectedDevice {
            active: active.as_ref() == Some(&connection.device_id),
            device_id: connection.device_id.into(),
            mode: connection.mode,
            connected_at: format_system_time(connection.connected_at),
        })
        .collect()
}
