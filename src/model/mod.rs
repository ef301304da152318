//! Core data models for the music catalog.
//!
//! Defines the entities the playback core and the catalog exchange:
//! [`TrackDescriptor`], [`Album`], and [`Playlist`].
//!
//! # Backend Schema
//!
//! The models deserialize directly from the hosted backend's rows:
//! - `albums` - Album records with artist and optional cover image
//! - `playlists` - Named, user-curated track lists
//! - `tracks` - Individual audio items; `audio_url` may be empty

use serde::{Deserialize, Deserializer, Serialize};

/// Nullable backend columns map onto plain defaults.
fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// A track as handed to the playback coordinator.
///
/// `audio_url` is a storage path or an absolute URL. It is optional because
/// catalog rows can exist before their audio has been uploaded.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TrackDescriptor {
    /// Opaque unique identifier
    pub id: String,
    /// Track title
    pub title: String,
    /// Artist name
    #[serde(default, deserialize_with = "null_as_default")]
    pub artist: String,
    /// Id of the album this track belongs to
    #[serde(default)]
    pub album_id: Option<String>,
    /// Album title, when the row was joined with its album
    #[serde(default)]
    pub album: Option<String>,
    /// Genre label
    #[serde(default)]
    pub genre: Option<String>,
    /// Path or URL of the audio resource
    #[serde(default, alias = "url", alias = "audio_path")]
    pub audio_url: Option<String>,
    /// Position within the parent album or playlist
    #[serde(default)]
    pub track_number: Option<u32>,
    /// Duration reported by the catalog, in seconds
    #[serde(default, alias = "duration")]
    pub duration_secs: Option<u32>,
    /// UI-only "liked" flag
    #[serde(default, deserialize_with = "null_as_default")]
    pub liked: bool,
}

impl TrackDescriptor {
    /// Create a descriptor with only the required fields set.
    pub fn new(id: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            ..Default::default()
        }
    }

    /// Builder: set the audio reference.
    pub fn with_audio(mut self, url: impl Into<String>) -> Self {
        self.audio_url = Some(url.into());
        self
    }

    /// Builder: set the artist.
    pub fn with_artist(mut self, artist: impl Into<String>) -> Self {
        self.artist = artist.into();
        self
    }

    /// The playable reference, if present and not blank.
    pub fn playable_reference(&self) -> Option<&str> {
        self.audio_url
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
    }

    /// Whether this track can be handed to the coordinator at all.
    pub fn is_playable(&self) -> bool {
        self.playable_reference().is_some()
    }

    /// Get display artist.
    pub fn display_artist(&self) -> &str {
        if self.artist.is_empty() {
            "Unknown Artist"
        } else {
            &self.artist
        }
    }
}

/// An album in the catalog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Album {
    pub id: String,
    pub title: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub artist: String,
    /// Release year (optional)
    #[serde(default)]
    pub year: Option<i32>,
    #[serde(default, alias = "cover")]
    pub cover_url: Option<String>,
}

/// A playlist in the catalog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Playlist {
    pub id: String,
    #[serde(alias = "title")]
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
}

/// Membership row linking a playlist to a track.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlaylistEntry {
    pub playlist_id: String,
    pub track_id: String,
    /// Position within the playlist
    #[serde(default)]
    pub position: Option<u32>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_playable_reference_ignores_blank() {
        let mut track = TrackDescriptor::new("t1", "Song");
        assert!(!track.is_playable());

        track.audio_url = Some("   ".to_string());
        assert!(!track.is_playable());

        track.audio_url = Some(" audio/a.mp3 ".to_string());
        assert_eq!(track.playable_reference(), Some("audio/a.mp3"));
    }

    #[test]
    fn test_descriptor_from_backend_row() {
        let json = r#"{
            "id": "8c1f",
            "title": "Night Drive",
            "artist": "Lumen",
            "album_id": "a1",
            "url": "tracks/night-drive.mp3",
            "track_number": 3,
            "duration": 241
        }"#;
        let track: TrackDescriptor = serde_json::from_str(json).unwrap();
        assert_eq!(track.album_id.as_deref(), Some("a1"));
        assert!(track.album.is_none());
        assert_eq!(track.audio_url.as_deref(), Some("tracks/night-drive.mp3"));
        assert_eq!(track.duration_secs, Some(241));
        assert!(!track.liked);
    }

    #[test]
    fn test_album_title_and_id_are_separate() {
        let json = r#"{"id": "t1", "title": "Intro", "album_id": "a1", "album": "First Light"}"#;
        let track: TrackDescriptor = serde_json::from_str(json).unwrap();
        assert_eq!(track.album_id.as_deref(), Some("a1"));
        assert_eq!(track.album.as_deref(), Some("First Light"));
    }

    #[test]
    fn test_null_columns_use_defaults() {
        let json = r#"{"id": "t9", "title": "Sketch", "artist": null, "liked": null}"#;
        let track: TrackDescriptor = serde_json::from_str(json).unwrap();
        assert_eq!(track.artist, "");
        assert!(!track.liked);
    }

    #[test]
    fn test_display_artist_fallback() {
        let track = TrackDescriptor::new("t1", "Song");
        assert_eq!(track.display_artist(), "Unknown Artist");
        assert_eq!(track.with_artist("Lumen").display_artist(), "Lumen");
    }
}
