use utoipa::OpenApi;

#[derive(OpenApi)]
/// Aggregated OpenAPI specification for the now-playing backend.
#[openapi(
    paths(
        crate::routes::health::healthcheck,
        crate::routes::playback::get_state,
        crate::routes::playback::get_queue,
        crate::routes::playback::list_devices,
        crate::routes::playback::play,
        crate::routes::playback::pause,
        crate::routes::playback::resume,
        crate::routes::playback::seek,
        crate::routes::playback::next,
        crate::routes::playback::previous,
        crate::routes::playback::update_queue,
        crate::routes::playback::report_position,
        crate::routes::playback::claim_active_player,
        crate::routes::playback::track_ended,
        crate::routes::history::list_history,
        crate::routes::audio::stream_audio,
        crate::routes::sse::playback_stream,
        crate::routes::websocket::ws_handler,
    ),
    components(
        schemas(
            crate::error::ErrorBody,
            crate::dto::health::HealthResponse,
            crate::dto::playback::PlaybackStateView,
            crate::dto::playback::QueueRequest,
            crate::dto::playback::QueueView,
            crate::dto::playback::TrackView,
            crate::dto::history::HistoryEntryView,
            crate::dto::sse::PlaybackEnvelope,
            crate::dto::sse::Handshake,
            crate::dto::sse::SystemStatus,
            crate::dto::ws::ServerOutboundMessage,
            crate::dto::ws::ConnectedDevice,
            crate::state::state_machine::ClientMode,
        )
    ),
    tags(
        (name = "health", description = "Health check endpoints"),
        (name = "playback", description = "Shared playback state and commands"),
        (name = "history", description = "Listening history"),
        (name = "audio", description = "Byte-range audio streaming"),
        (name = "sse", description = "Server-sent events streams"),
        (name = "websocket", description = "Bidirectional playback sessions"),
    )
)]
pub struct ApiDoc;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn document_lists_command_routes() {
        let doc = ApiDoc::openapi();
        for path in ["/playback/play", "/playback/queue", "/audio/{track_id}", "/history"] {
            assert!(doc.paths.paths.contains_key(path), "missing {path}");
        }
    }
}
