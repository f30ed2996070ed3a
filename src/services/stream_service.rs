use std::io::{self, SeekFrom};

use async_stream::stream;
use axum::{
    body::{Body, Bytes},
    http::{StatusCode, header},
    response::Response,
};
use futures::{Stream, StreamExt};
use tokio::{
    fs::File,
    io::{AsyncReadExt, AsyncSeekExt},
};
use tokio_util::io::ReaderStream;
use tracing::{debug, info};

use crate::{
    dao::catalog::ResolvedTrack,
    error::ServiceError,
    state::{SharedState, ids::TrackId},
};

/// Bytes read from disk per chunk.
pub const STREAM_CHUNK_SIZE: usize = 64 * 1024;

/// Portion of a resource selected by a `Range` header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ByteRange {
    /// Serve everything with `200 OK`.
    Full,
    /// Serve `start..=end` with `206 Partial Content`.
    Partial { start: u64, end: u64 },
}

/// Interpret a `Range` header against a resource of `total` bytes.
///
/// Anything that is not a single satisfiable `bytes=` range falls back to [`ByteRange::Full`].
pub fn parse_range(header: Option<&str>, total: u64) -> ByteRange {
    let Some(spec) = header.and_then(|raw| raw.trim().strip_prefix("bytes=")) else {
        return ByteRange::Full;
    };
    if total == 0 || spec.contains(',') {
        return ByteRange::Full;
    }
    let Some((first, last)) = spec.split_once('-') else {
        return ByteRange::Full;
    };
    let (first, last) = (first.trim(), last.trim());
    let last_byte = total - 1;

    match (first.is_empty(), last.is_empty()) {
        (true, true) => ByteRange::Full,
        (true, false) => match last.parse::<u64>() {
            Ok(suffix) if suffix > 0 => ByteRange::Partial {
                start: total - suffix.min(total),
                end: last_byte,
            },
            _ => ByteRange::Full,
        },
        (false, _) => {
            let Ok(start) = first.parse::<u64>() else {
                return ByteRange::Full;
            };
            let end = if last.is_empty() {
                Ok(last_byte)
            } else {
                last.parse::<u64>()
            };
            match end {
                Ok(end) if start <= end && start < total => ByteRange::Partial {
                    start,
                    end: end.min(last_byte),
                },
                _ => ByteRange::Full,
            }
        }
    }
}

/// Resolve `track_id` through the catalog and stream it.
pub async fn stream_track(
    state: &SharedState,
    track_id: &TrackId,
    range: Option<&str>,
) -> Result<Response, ServiceError> {
    let resource = state.catalog().resolve(track_id).await?;
    serve(track_id, &resource, range).await
}

/// Stream `resource` honouring `range`.
///
/// Every failure happens before the response head is produced, so a client never
/// receives a partial body for a request that could not be served.
pub async fn serve(
    track_id: &TrackId,
    resource: &ResolvedTrack,
    range: Option<&str>,
) -> Result<Response, ServiceError> {
    let mut file = File::open(&resource.path)
        .await
        .map_err(|err| match err.kind() {
            io::ErrorKind::NotFound => {
                ServiceError::NotFound(format!("audio file for track `{track_id}` is missing"))
            }
            _ => io_failure(track_id, err),
        })?;
    let total = file
        .metadata()
        .await
        .map_err(|err| io_failure(track_id, err))?
        .len();

    let range = parse_range(range, total);
    let (status, start, length) = match range {
        ByteRange::Full => (StatusCode::OK, 0, total),
        ByteRange::Partial { start, end } => (StatusCode::PARTIAL_CONTENT, start, end - start + 1),
    };
    if start > 0 {
        file.seek(SeekFrom::Start(start))
            .await
            .map_err(|err| io_failure(track_id, err))?;
    }

    let reader = ReaderStream::with_capacity(file.take(length), STREAM_CHUNK_SIZE);
    let body = Body::from_stream(track_transfer(reader, track_id.clone(), length));

    let mut builder = Response::builder()
        .status(status)
        .header(header::CONTENT_TYPE, resource.mime_type.as_str())
        .header(header::ACCEPT_RANGES, "bytes")
        .header(header::CONTENT_LENGTH, length);
    if let ByteRange::Partial { start, end } = range {
        builder = builder.header(header::CONTENT_RANGE, format!("bytes {start}-{end}/{total}"));
    }
    debug!(track = %track_id, ?range, total, "streaming audio");

    builder
        .body(body)
        .map_err(|err| ServiceError::Internal(err.to_string()))
}

fn io_failure(track_id: &TrackId, err: io::Error) -> ServiceError {
    ServiceError::Internal(format!("failed to read audio for track `{track_id}`: {err}"))
}

/// Counts delivered bytes and reports transfers cut short when the body is dropped.
struct TransferGuard {
    track_id: TrackId,
    expected: u64,
    sent: u64,
}

impl Drop for TransferGuard {
    fn drop(&mut self) {
        if self.sent < self.expected {
            info!(
                track = %self.track_id,
                sent = self.sent,
                expected = self.expected,
                "audio stream aborted before completion"
            );
        }
    }
}

fn track_transfer<S>(
    inner: S,
    track_id: TrackId,
    expected: u64,
) -> impl Stream<Item = io::Result<Bytes>> + Send + 'static
where
    S: Stream<Item = io::Result<Bytes>> + Send + 'static,
{
    stream! {
        let mut guard = TransferGuard {
            track_id,
            expected,
            sent: 0,
        };
        let mut inner = Box::pin(inner);
        while let Some(chunk) = inner.next().await {
            if let Ok(bytes) = &chunk {
                guard.sent += bytes.len() as u64;
            }
            yield chunk;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_header_serves_everything() {
        assert_eq!(parse_range(None, 1000), ByteRange::Full);
    }

    #[test]
    fn closed_range_is_clamped_to_the_last_byte() {
        assert_eq!(
            parse_range(Some("bytes=0-499"), 1000),
            ByteRange::Partial { start: 0, end: 499 }
        );
        assert_eq!(
            parse_range(Some("bytes=900-5000"), 1000),
            ByteRange::Partial {
                start: 900,
                end: 999
            }
        );
    }

    #[test]
    fn open_and_suffix_ranges() {
        assert_eq!(
            parse_range(Some("bytes=500-"), 1000),
            ByteRange::Partial {
                start: 500,
                end: 999
            }
        );
        assert_eq!(
            parse_range(Some("bytes=-100"), 1000),
            ByteRange::Partial {
                start: 900,
                end: 999
            }
        );
        assert_eq!(
            parse_range(Some("bytes=-5000"), 1000),
            ByteRange::Partial { start: 0, end: 999 }
        );
    }

    #[test]
    fn unusable_ranges_fall_back_to_full_content() {
        for header in [
            "bytes=1500-",
            "bytes=600-500",
            "bytes=0-10,20-30",
            "bytes=-0",
            "bytes=abc-def",
            "items=0-10",
            "bytes=-",
        ] {
            assert_eq!(parse_range(Some(header), 1000), ByteRange::Full, "{header}");
        }
        assert_eq!(parse_range(Some("bytes=0-0"), 0), ByteRange::Full);
    }
}
