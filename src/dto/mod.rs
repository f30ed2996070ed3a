use std::time::SystemTime;
use time::{OffsetDateTime, format_description::well_known::Rfc3339};

/// Health check payloads.
pub mod health;
/// Listening history payloads.
pub mod history;
/// Playback state views and command bodies.
pub mod playback;
/// Server-sent event envelopes.
pub mod sse;
/// Shared field validators.
pub mod validation;
/// WebSocket frames.
pub mod ws;

pub(crate) fn format_system_time(time: SystemTime) -> String {
    OffsetDateTime::from(time)
        .format(&Rfc3339)
        .unwrap_or_else(|_| "invalid-timestamp".into())
}
