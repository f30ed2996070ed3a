/// OpenAPI documentation generation.
pub mod documentation;
/// Health check service.
pub mod health_service;
/// Listening history queries.
pub mod history_service;
/// Playback commands and read models.
pub mod playback_service;
/// Server-Sent Events broadcasting service.
pub mod sse_service;
/// Storage connection supervisor with backoff and degraded mode.
pub mod storage_supervisor;
/// Byte-range audio streaming.
pub mod stream_service;
/// WebSocket connection and message handling service.
pub mod websocket_service;
