//! Catalog collaborator: resolves track identifiers to playable resources.
//!
//! Library scanning and metadata extraction live outside this service; the catalog
//! only answers `resolve` and `lookup` for the ids it was configured with.

use std::{collections::HashMap, path::PathBuf, sync::Arc};

use futures::future::BoxFuture;
use serde::Serialize;
use thiserror::Error;
use utoipa::ToSchema;

use crate::state::ids::TrackId;

/// Catalog metadata for a single track.
#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct Track {
    /// Catalog identifier.
    pub id: TrackId,
    /// Display title.
    pub title: String,
    /// Performing artist, when tagged.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub artist: Option<String>,
    /// Album name, when tagged.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub album: Option<String>,
    /// Length in seconds, when known.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_seconds: Option<f64>,
    /// Content type served for the audio file.
    pub mime_type: String,
}

/// Backing resource of a track, ready to be streamed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedTrack {
    /// File holding the audio bytes.
    pub path: PathBuf,
    /// Size of the file when it was resolved.
    pub byte_size: u64,
    /// Content type served for the audio file.
    pub mime_type: String,
}

/// Failures reported by [`Catalog::resolve`].
#[derive(Debug, Error)]
pub enum CatalogError {
    /// The id is not part of the catalog.
    #[error("unknown track `{0}`")]
    UnknownTrack(TrackId),
    /// The id is known but its file is gone from disk.
    #[error("audio file for track `{track_id}` is missing")]
    MissingResource {
        track_id: TrackId,
        #[source]
        source: std::io::Error,
    },
}

/// Read-only view over the music library.
pub trait Catalog: Send + Sync {
    /// Resolve a track to its on-disk resource.
    fn resolve(&self, id: &TrackId) -> BoxFuture<'static, Result<ResolvedTrack, CatalogError>>;
    /// Return the tracks matching `ids`, in request order; unknown ids are omitted.
    fn lookup(&self, ids: &[TrackId]) -> BoxFuture<'static, Vec<Track>>;
}

/// A catalog entry pairing metadata with the file that backs it.
#[derive(Debug, Clone)]
pub struct CatalogEntry {
    /// Metadata exposed to clients.
    pub track: Track,
    /// Audio file on disk.
    pub path: PathBuf,
}

/// Catalog built from a fixed list of entries, typically loaded from configuration.
#[derive(Clone, Default)]
pub struct StaticCatalog {
    entries: Arc<HashMap<TrackId, CatalogEntry>>,
}

impl StaticCatalog {
    /// Index the given entries by track id; later duplicates win.
    pub fn new(entries: impl IntoIterator<Item = CatalogEntry>) -> Self {
        let entries = entries
            .into_iter()
            .map(|entry| (entry.track.id.clone(), entry))
            .collect();
        Self {
            entries: Arc::new(entries),
        }
    }

    /// Number of tracks known to the catalog.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the catalog holds no track at all.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Catalog for StaticCatalog {
    fn resolve(&self, id: &TrackId) -> BoxFuture<'static, Result<ResolvedTrack, CatalogError>> {
        let entry = self.entries.get(id).cloned();
        let id = id.clone();
        Box::pin(async move {
            let entry = entry.ok_or_else(|| CatalogError::UnknownTrack(id.clone()))?;
            let metadata = tokio::fs::metadata(&entry.path).await.map_err(|source| {
                CatalogError::MissingResource {
                    track_id: id.clone(),
                    source,
                }
            })?;
            Ok(ResolvedTrack {
                path: entry.path,
                byte_size: metadata.len(),
                mime_type: entry.track.mime_type,
            })
        })
    }

    fn lookup(&self, ids: &[TrackId]) -> BoxFuture<'static, Vec<Track>> {
        let tracks = ids
            .iter()
            .filter_map(|id| self.entries.get(id).map(|entry| entry.track.clone()))
            .collect();
        Box::pin(async move { tracks })
    }
}

/// Guess an audio MIME type from a file extension.
pub fn mime_from_path(path: &std::path::Path) -> &'static str {
    let extension = path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(str::to_ascii_lowercase);
    match extension.as_deref() {
        Some("mp3") => "audio/mpeg",
        Some("flac") => "audio/flac",
        Some("ogg") | Some("oga") => "audio/ogg",
        Some("opus") => "audio/opus",
        Some("m4a") | Some("aac") => "audio/mp4",
        Some("wav") => "audio/wav",
        _ => "application/octet-stream",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(id: &str, path: &str) -> CatalogEntry {
        CatalogEntry {
            track: Track {
                id: TrackId::new(id),
                title: id.to_uppercase(),
                artist: None,
                album: None,
                duration_seconds: None,
                mime_type: "audio/mpeg".into(),
            },
            path: PathBuf::from(path),
        }
    }

    #[tokio::test]
    async fn lookup_keeps_request_order_and_omits_unknown_ids() {
        let catalog = StaticCatalog::new([entry("a", "/a.mp3"), entry("b", "/b.mp3")]);
        let tracks = catalog
            .lookup(&[TrackId::new("b"), TrackId::new("ghost"), TrackId::new("a")])
            .await;
        let ids: Vec<_> = tracks.iter().map(|t| t.id.as_str()).collect();
        assert_eq!(ids, vec!["b", "a"]);
    }

    #[tokio::test]
    async fn resolve_reports_unknown_and_missing_files() {
        let catalog = StaticCatalog::new([entry("gone", "/definitely/not/here.mp3")]);

        let err = catalog.resolve(&TrackId::new("nope")).await.unwrap_err();
        assert!(matches!(err, CatalogError::UnknownTrack(_)));

        let err = catalog.resolve(&TrackId::new("gone")).await.unwrap_err();
        assert!(matches!(err, CatalogError::MissingResource { .. }));
    }

    #[test]
    fn mime_guess_is_case_insensitive() {
        assert_eq!(mime_from_path(std::path::Path::new("x/Song.FLAC")), "audio/flac");
        assert_eq!(mime_from_path(std::path::Path::new("x/noext")), "application/octet-stream");
    }
}
