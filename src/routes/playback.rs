use axum::{
    Json, Router,
    extract::{FromRequestParts, State},
    http::request::Parts,
    routing::{get, post},
};
use validator::Validate;

use crate::{
    dto::{
        playback::{
            ActivePlayerRequest, PlayRequest, PlaybackStateView, PositionReport, QueueRequest,
            QueueView, SeekRequest, TrackEndedRequest,
        },
        validation::validate_identifier,
        ws::ConnectedDevice,
    },
    error::{AppError, ErrorBody},
    services::playback_service,
    state::{
        SharedState,
        state_machine::{ClientMode, CommandOrigin, PlaybackCommand},
    },
};

/// Header naming the device a command comes from.
pub const DEVICE_ID_HEADER: &str = "x-device-id";
/// Header selecting the client mode; absent means `player`.
pub const CLIENT_MODE_HEADER: &str = "x-client-mode";

/// Command origin taken from the `X-Device-Id` and `X-Client-Mode` headers.
pub struct DeviceOrigin(pub CommandOrigin);

impl<S: Send + Sync> FromRequestParts<S> for DeviceOrigin {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let device_id = parts
            .headers
            .get(DEVICE_ID_HEADER)
            .and_then(|value| value.to_str().ok())
            .map(str::trim)
            .ok_or_else(|| AppError::BadRequest("missing X-Device-Id header".into()))?;
        validate_identifier(device_id)
            .map_err(|err| AppError::BadRequest(format!("invalid X-Device-Id header: {err}")))?;

        let mode = match parts
            .headers
            .get(CLIENT_MODE_HEADER)
            .and_then(|value| value.to_str().ok())
        {
            Some(raw) => raw.parse::<ClientMode>().map_err(AppError::BadRequest)?,
            None => ClientMode::Player,
        };

        Ok(Self(CommandOrigin::new(device_id, mode)))
    }
}

/// Routes exposing the shared playback state and its command surface.
pub fn router() -> Router<SharedState> {
    Router::new()
        .route("/playback/state", get(get_state))
        .route("/playback/queue", get(get_queue).post(update_queue))
        .route("/playback/devices", get(list_devices))
        .route("/playback/play", post(play))
        .route("/playback/pause", post(pause))
        .route("/playback/resume", post(resume))
        .route("/playback/seek", post(seek))
        .route("/playback/next", post(next))
        .route("/playback/previous", post(previous))
        .route("/playback/position", post(report_position))
        .route("/playback/active-player", post(claim_active_player))
        .route("/playback/track-ended", post(track_ended))
}

async fn run(
    state: &SharedState,
    origin: &CommandOrigin,
    command: PlaybackCommand,
) -> Result<Json<PlaybackStateView>, AppError> {
    Ok(Json(playback_service::execute(state, origin, command).await?))
}

/// Last committed playback state.
#[utoipa::path(
    get,
    path = "/playback/state",
    tag = "playback",
    responses((status = 200, description = "Current playback state", body = PlaybackStateView))
)]
pub async fn get_state(State(state): State<SharedState>) -> Json<PlaybackStateView> {
    Json(playback_service::current_state(&state).await)
}

/// Current track and upcoming queue with catalog metadata.
#[utoipa::path(
    get,
    path = "/playback/queue",
    tag = "playback",
    responses((status = 200, description = "Materialized queue", body = QueueView))
)]
pub async fn get_queue(State(state): State<SharedState>) -> Json<QueueView> {
    Json(playback_service::queue(&state).await)
}

/// Devices currently connected over WebSocket.
#[utoipa::path(
    get,
    path = "/playback/devices",
    tag = "playback",
    responses((status = 200, description = "Connected devices", body = [ConnectedDevice]))
)]
pub async fn list_devices(State(state): State<SharedState>) -> Json<Vec<ConnectedDevice>> {
    Json(playback_service::connected_devices(&state).await)
}

/// Start a track from the beginning on the calling device.
#[utoipa::path(
    post,
    path = "/playback/play",
    tag = "playback",
    params(
        ("X-Device-Id" = String, Header, description = "Identifier of the calling device"),
        ("X-Client-Mode" = Option<String>, Header, description = "`player` (default) or `remote_control`")
    ),
    request_body = PlayRequest,
    responses(
        (status = 200, description = "Playback started", body = PlaybackStateView),
        (status = 404, description = "Unknown track", body = ErrorBody),
        (status = 503, description = "State could not be persisted", body = ErrorBody)
    )
)]
pub async fn play(
    State(state): State<SharedState>,
    DeviceOrigin(origin): DeviceOrigin,
    Json(payload): Json<PlayRequest>,
) -> Result<Json<PlaybackStateView>, AppError> {
    payload.validate()?;
    run(
        &state,
        &origin,
        PlaybackCommand::Play {
            track_id: payload.track_id.into(),
        },
    )
    .await
}

/// Pause playback and close the listening session.
#[utoipa::path(
    post,
    path = "/playback/pause",
    tag = "playback",
    params(
        ("X-Device-Id" = String, Header, description = "Identifier of the calling device"),
        ("X-Client-Mode" = Option<String>, Header, description = "`player` (default) or `remote_control`")
    ),
    responses(
        (status = 200, description = "Playback paused", body = PlaybackStateView),
        (status = 503, description = "State could not be persisted", body = ErrorBody)
    )
)]
pub async fn pause(
    State(state): State<SharedState>,
    DeviceOrigin(origin): DeviceOrigin,
) -> Result<Json<PlaybackStateView>, AppError> {
    run(&state, &origin, PlaybackCommand::Pause).await
}

/// Resume the current track.
#[utoipa::path(
    post,
    path = "/playback/resume",
    tag = "playback",
    params(
        ("X-Device-Id" = String, Header, description = "Identifier of the calling device"),
        ("X-Client-Mode" = Option<String>, Header, description = "`player` (default) or `remote_control`")
    ),
    responses(
        (status = 200, description = "Playback resumed", body = PlaybackStateView),
        (status = 409, description = "No current track", body = ErrorBody)
    )
)]
pub async fn resume(
    State(state): State<SharedState>,
    DeviceOrigin(origin): DeviceOrigin,
) -> Result<Json<PlaybackStateView>, AppError> {
    run(&state, &origin, PlaybackCommand::Resume).await
}

/// Move the playhead of the current track.
#[utoipa::path(
    post,
    path = "/playback/seek",
    tag = "playback",
    params(
        ("X-Device-Id" = String, Header, description = "Identifier of the calling device"),
        ("X-Client-Mode" = Option<String>, Header, description = "`player` (default) or `remote_control`")
    ),
    request_body = SeekRequest,
    responses(
        (status = 200, description = "Position updated", body = PlaybackStateView),
        (status = 400, description = "Invalid position", body = ErrorBody)
    )
)]
pub async fn seek(
    State(state): State<SharedState>,
    DeviceOrigin(origin): DeviceOrigin,
    Json(payload): Json<SeekRequest>,
) -> Result<Json<PlaybackStateView>, AppError> {
    payload.validate()?;
    run(
        &state,
        &origin,
        PlaybackCommand::Seek {
            position_seconds: payload.position_seconds,
        },
    )
    .await
}

/// Advance to the head of the queue, or stop when it is empty.
#[utoipa::path(
    post,
    path = "/playback/next",
    tag = "playback",
    params(
        ("X-Device-Id" = String, Header, description = "Identifier of the calling device"),
        ("X-Client-Mode" = Option<String>, Header, description = "`player` (default) or `remote_control`")
    ),
    responses((status = 200, description = "Advanced", body = PlaybackStateView))
)]
pub async fn next(
    State(state): State<SharedState>,
    DeviceOrigin(origin): DeviceOrigin,
) -> Result<Json<PlaybackStateView>, AppError> {
    run(&state, &origin, PlaybackCommand::Next).await
}

/// Restart the current track.
#[utoipa::path(
    post,
    path = "/playback/previous",
    tag = "playback",
    params(
        ("X-Device-Id" = String, Header, description = "Identifier of the calling device"),
        ("X-Client-Mode" = Option<String>, Header, description = "`player` (default) or `remote_control`")
    ),
    responses((status = 200, description = "Restarted", body = PlaybackStateView))
)]
pub async fn previous(
    State(state): State<SharedState>,
    DeviceOrigin(origin): DeviceOrigin,
) -> Result<Json<PlaybackStateView>, AppError> {
    run(&state, &origin, PlaybackCommand::Previous).await
}

/// Edit the upcoming-tracks queue.
#[utoipa::path(
    post,
    path = "/playback/queue",
    tag = "playback",
    params(
        ("X-Device-Id" = String, Header, description = "Identifier of the calling device"),
        ("X-Client-Mode" = Option<String>, Header, description = "`player` (default) or `remote_control`")
    ),
    request_body = QueueRequest,
    responses(
        (status = 200, description = "Queue updated", body = PlaybackStateView),
        (status = 400, description = "Index out of range", body = ErrorBody),
        (status = 404, description = "Unknown track", body = ErrorBody)
    )
)]
pub async fn update_queue(
    State(state): State<SharedState>,
    DeviceOrigin(origin): DeviceOrigin,
    Json(payload): Json<QueueRequest>,
) -> Result<Json<PlaybackStateView>, AppError> {
    run(&state, &origin, PlaybackCommand::UpdateQueue(payload.into())).await
}

/// Throttled position report from the rendering client.
#[utoipa::path(
    post,
    path = "/playback/position",
    tag = "playback",
    params(
        ("X-Device-Id" = String, Header, description = "Identifier of the calling device"),
        ("X-Client-Mode" = Option<String>, Header, description = "`player` (default) or `remote_control`")
    ),
    request_body = PositionReport,
    responses(
        (status = 200, description = "Position recorded", body = PlaybackStateView),
        (status = 400, description = "Invalid position", body = ErrorBody)
    )
)]
pub async fn report_position(
    State(state): State<SharedState>,
    DeviceOrigin(origin): DeviceOrigin,
    Json(payload): Json<PositionReport>,
) -> Result<Json<PlaybackStateView>, AppError> {
    payload.validate()?;
    run(
        &state,
        &origin,
        PlaybackCommand::ReportPosition {
            position_seconds: payload.position_seconds,
        },
    )
    .await
}

/// Make a device (the caller by default) the active player.
#[utoipa::path(
    post,
    path = "/playback/active-player",
    tag = "playback",
    params(
        ("X-Device-Id" = String, Header, description = "Identifier of the calling device"),
        ("X-Client-Mode" = Option<String>, Header, description = "`player` (default) or `remote_control`")
    ),
    request_body = ActivePlayerRequest,
    responses((status = 200, description = "Active player updated", body = PlaybackStateView))
)]
pub async fn claim_active_player(
    State(state): State<SharedState>,
    DeviceOrigin(origin): DeviceOrigin,
    payload: Option<Json<ActivePlayerRequest>>,
) -> Result<Json<PlaybackStateView>, AppError> {
    let payload = payload.map(|Json(payload)| payload).unwrap_or_default();
    payload.validate()?;
    let device_id = payload
        .device_id
        .map(Into::into)
        .unwrap_or_else(|| origin.device_id.clone());
    run(
        &state,
        &origin,
        PlaybackCommand::ClaimActivePlayer { device_id },
    )
    .await
}

/// Natural end of a track on the rendering client.
#[utoipa::path(
    post,
    path = "/playback/track-ended",
    tag = "playback",
    params(
        ("X-Device-Id" = String, Header, description = "Identifier of the calling device"),
        ("X-Client-Mode" = Option<String>, Header, description = "`player` (default) or `remote_control`")
    ),
    request_body = TrackEndedRequest,
    responses((status = 200, description = "Advanced, or unchanged when the signal is stale", body = PlaybackStateView))
)]
pub async fn track_ended(
    State(state): State<SharedState>,
    DeviceOrigin(origin): DeviceOrigin,
    Json(payload): Json<TrackEndedRequest>,
) -> Result<Json<PlaybackStateView>, AppError> {
    payload.validate()?;
    run(
        &state,
        &origin,
        PlaybackCommand::TrackEnded {
            track_id: payload.track_id.into(),
        },
    )
    .await
}
