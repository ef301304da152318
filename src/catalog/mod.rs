//! Read-only access to the music catalog.
//!
//! The player only needs track descriptors; the catalog is where they come
//! from. Two sources are supported:
//! - [`JsonCatalog`]: an exported JSON document on disk
//! - [`RestCatalog`]: the hosted backend's PostgREST interface
//!
//! Both implement [`Catalog`], so the CLI (and tests) can swap them freely.

mod json;
mod rest;

pub use json::{CatalogData, JsonCatalog};
pub use rest::RestCatalog;

use std::path::PathBuf;

use async_trait::async_trait;

use crate::model::{Album, Playlist, PlaylistEntry, TrackDescriptor};

/// Which tracks to list.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum TrackScope {
    #[default]
    All,
    /// Tracks of one album, in track-number order
    Album(String),
    /// Tracks of one playlist, in playlist order
    Playlist(String),
}

/// Catalog errors
#[derive(Debug, thiserror::Error)]
pub enum CatalogError {
    #[error("Failed to read catalog {0}: {1}")]
    Read(PathBuf, std::io::Error),

    #[error("Failed to parse catalog data: {0}")]
    Parse(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Backend returned HTTP {status}: {message}")]
    Status { status: u16, message: String },

    #[error("Track not found: {0}")]
    TrackNotFound(String),

    #[error("Catalog backend not configured: {0}")]
    NotConfigured(String),
}

/// Read-only catalog lookups.
///
/// Implement this trait to create mock implementations for testing.
#[async_trait]
pub trait Catalog: Send + Sync {
    /// List tracks in the given scope.
    async fn tracks(&self, scope: &TrackScope) -> Result<Vec<TrackDescriptor>, CatalogError>;

    /// Look up a single track.
    async fn track(&self, id: &str) -> Result<TrackDescriptor, CatalogError>;

    async fn albums(&self) -> Result<Vec<Album>, CatalogError>;

    async fn playlists(&self) -> Result<Vec<Playlist>, CatalogError>;
}

/// Sort album tracks by track number; unnumbered tracks go last, by title.
pub(crate) fn sort_album_tracks(tracks: &mut [TrackDescriptor]) {
    tracks.sort_by(|a, b| {
        let key = |t: &TrackDescriptor| (t.track_number.is_none(), t.track_number);
        key(a).cmp(&key(b)).then_with(|| a.title.cmp(&b.title))
    });
}

/// Arrange tracks in playlist order. Entries pointing at unknown tracks are skipped.
pub(crate) fn playlist_order(
    mut entries: Vec<PlaylistEntry>,
    tracks: &[TrackDescriptor],
) -> Vec<TrackDescriptor> {
    // Stable: entries without a position keep their listed order, after the rest
    entries.sort_by_key(|e| (e.position.is_none(), e.position));
    entries
        .iter()
        .filter_map(|entry| {
            let found = tracks.iter().find(|t| t.id == entry.track_id);
            if found.is_none() {
                tracing::debug!(
                    playlist_id = %entry.playlist_id,
                    track_id = %entry.track_id,
                    "Playlist entry points at a missing track"
                );
            }
            found.cloned()
        })
        .collect()
}
