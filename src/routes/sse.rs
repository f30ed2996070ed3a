use std::convert::Infallible;

use axum::{Router, extract::State, response::sse::Sse, routing::get};
use futures::Stream;

use crate::{services::sse_service, state::SharedState};

#[utoipa::path(
    get,
    path = "/sse/playback",
    tag = "sse",
    responses((status = 200, description = "Playback state stream", content_type = "text/event-stream", body = String))
)]
/// Stream committed playback states to connected clients.
pub async fn playback_stream(
    State(state): State<SharedState>,
) -> Sse<impl Stream<Item = Result<axum::response::sse::Event, Infallible>>> {
    sse_service::playback_stream(&state).await
}

/// Configure the SSE endpoints.
pub fn router() -> Router<SharedState> {
    Router::<SharedState>::new().route("/sse/playback", get(playback_stream))
}
