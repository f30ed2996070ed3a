use axum::Router;

use crate::state::SharedState;

/// Audio streaming endpoint.
pub mod audio;
/// OpenAPI and Swagger UI.
pub mod docs;
/// Health check endpoint.
pub mod health;
/// Listening history endpoint.
pub mod history;
/// Playback queries and commands.
pub mod playback;
/// Server-sent event stream.
pub mod sse;
/// WebSocket upgrade endpoint.
pub mod websocket;

/// Compose all route trees, wiring in shared state and documentation routes.
pub fn router(state: SharedState) -> Router<()> {
    let api_router = health::router()
        .merge(playback::router())
        .merge(history::router())
        .merge(audio::router())
        .merge(sse::router())
        .merge(websocket::router());

    let docs_router = docs::router(state.clone());

    api_router.merge(docs_router).with_state(state)
}
