use axum::{
    Router,
    extract::{Path, State},
    http::{HeaderMap, header},
    response::Response,
    routing::get,
};

use crate::{
    error::{AppError, ErrorBody},
    services::stream_service,
    state::{SharedState, ids::TrackId},
};

/// Routes serving audio bytes.
pub fn router() -> Router<SharedState> {
    Router::new().route("/audio/{track_id}", get(stream_audio))
}

/// Stream a track, honouring a single `Range: bytes=` request.
#[utoipa::path(
    get,
    path = "/audio/{track_id}",
    tag = "audio",
    params(
        ("track_id" = String, Path, description = "Identifier of the track to stream"),
        ("Range" = Option<String>, Header, description = "Single byte range, e.g. `bytes=0-1023`")
    ),
    responses(
        (status = 200, description = "Whole file", content_type = "audio/*", body = Vec<u8>),
        (status = 206, description = "Requested byte range", content_type = "audio/*", body = Vec<u8>),
        (status = 404, description = "Unknown track or missing file", body = ErrorBody)
    )
)]
pub async fn stream_audio(
    State(state): State<SharedState>,
    Path(track_id): Path<String>,
    headers: HeaderMap,
) -> Result<Response, AppError> {
    let range = headers
        .get(header::RANGE)
        .and_then(|value| value.to_str().ok());
    let track_id = TrackId::from(track_id);
    Ok(stream_service::stream_track(&state, &track_id, range).await?)
}
