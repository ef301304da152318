//! Catalog backed by an exported JSON document.
//!
//! The document mirrors the backend tables:
//!
//! ```json
//! { "albums": [...], "playlists": [...], "tracks": [...], "playlist_tracks": [...] }
//! ```
//!
//! Every key is optional. The file is read once, up front.

use std::path::Path;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::{Catalog, CatalogError, TrackScope, playlist_order, sort_album_tracks};
use crate::model::{Album, Playlist, PlaylistEntry, TrackDescriptor};

/// The raw catalog tables.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CatalogData {
    pub albums: Vec<Album>,
    pub playlists: Vec<Playlist>,
    pub tracks: Vec<TrackDescriptor>,
    pub playlist_tracks: Vec<PlaylistEntry>,
}

/// In-memory catalog loaded from a JSON file.
#[derive(Debug, Clone, Default)]
pub struct JsonCatalog {
    data: CatalogData,
}

impl JsonCatalog {
    /// Read and parse a catalog file.
    pub fn load(path: &Path) -> Result<Self, CatalogError> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| CatalogError::Read(path.to_path_buf(), e))?;
        let catalog = Self::from_json(&contents)?;
        tracing::info!(
            tracks = catalog.data.tracks.len(),
            albums = catalog.data.albums.len(),
            playlists = catalog.data.playlists.len(),
            "Loaded catalog from {:?}",
            path
        );
        Ok(catalog)
    }

    pub fn from_json(json: &str) -> Result<Self, CatalogError> {
        let data = serde_json::from_str(json).map_err(|e| CatalogError::Parse(e.to_string()))?;
        Ok(Self { data })
    }

    pub fn from_data(data: CatalogData) -> Self {
        Self { data }
    }

    fn scoped(&self, scope: &TrackScope) -> Vec<TrackDescriptor> {
        match scope {
            TrackScope::All => self.data.tracks.clone(),
            TrackScope::Album(album_id) => {
                let mut tracks: Vec<_> = self
                    .data
                    .tracks
                    .iter()
                    .filter(|t| t.album_id.as_deref() == Some(album_id.as_str()))
                    .cloned()
                    .collect();
                sort_album_tracks(&mut tracks);
                tracks
            }
            TrackScope::Playlist(playlist_id) => {
                let entries = self
                    .data
                    .playlist_tracks
                    .iter()
                    .filter(|e| &e.playlist_id == playlist_id)
                    .cloned()
                    .collect();
                playlist_order(entries, &self.data.tracks)
            }
        }
    }
}

#[async_trait]
impl Catalog for JsonCatalog {
    async fn tracks(&self, scope: &TrackScope) -> Result<Vec<TrackDescriptor>, CatalogError> {
        Ok(self.scoped(scope))
    }

    async fn track(&self, id: &str) -> Result<TrackDescriptor, CatalogError> {
        self.data
            .tracks
            .iter()
            .find(|t| t.id == id)
            .cloned()
            .ok_or_else(|| CatalogError::TrackNotFound(id.to_string()))
    }

    async fn albums(&self) -> Result<Vec<Album>, CatalogError> {
        Ok(self.data.albums.clone())
    }

    async fn playlists(&self) -> Result<Vec<Playlist>, CatalogError> {
        Ok(self.data.playlists.clone())
    }
}
