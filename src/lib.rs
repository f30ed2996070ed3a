//! Library crate for now-playing-back, exposing modules for binaries and integration tests.

/// Environment driven configuration.
pub mod config;
/// Catalog and storage backends.
pub mod dao;
/// Wire types for HTTP, SSE and WebSocket.
pub mod dto;
/// HTTP error mapping.
pub mod error;
/// Axum router and handlers.
pub mod routes;
/// Business logic between routes and state.
pub mod services;
/// Shared application state and the playback coordinator.
pub mod state;
