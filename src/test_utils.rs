//! Test utilities and fixtures for soundshelf tests.
//!
//! This module provides a ready-wired playback service on the virtual
//! backend, track factories and a small catalog fixture, to reduce
//! boilerplate in tests.
//!
//! # Example
//!
//! ```ignore
//! use crate::test_utils::{ServiceRig, descriptor};
//!
//! #[tokio::test(start_paused = true)]
//! async fn test_something() {
//!     let rig = ServiceRig::new();
//!     rig.service.play_track(descriptor("t1", "/audio/a.mp3")).unwrap();
//!     // ... test logic
//! }
//! ```

use std::path::PathBuf;
use std::sync::Arc;

use tempfile::TempDir;
use tokio::sync::broadcast;

use crate::model::TrackDescriptor;
use crate::player::{
    PlaybackEvent, PlaybackService, ServiceOptions, SourceResolver, VirtualBackend,
    VirtualOptions,
};
use crate::ui::toast::{SharedToasts, ToastSettings};

/// A playback service wired to a virtual backend and an in-memory toast queue.
///
/// Must be created inside a tokio runtime. Tests normally use
/// `#[tokio::test(start_paused = true)]` so the virtual clock is deterministic.
pub struct ServiceRig {
    pub service: PlaybackService,
    pub backend: Arc<VirtualBackend>,
    pub toasts: SharedToasts,
    /// Subscribed right after construction
    pub events: broadcast::Receiver<PlaybackEvent>,
}

impl ServiceRig {
    /// Default options: 100ms settling delay, full volume.
    pub fn new() -> Self {
        Self::with_options(ServiceOptions::default())
    }

    pub fn with_options(options: ServiceOptions) -> Self {
        let (backend, signals) = VirtualBackend::new(VirtualOptions::default());
        let toasts = SharedToasts::new(ToastSettings::default());
        let service = PlaybackService::new(
            backend.clone(),
            signals,
            SourceResolver::default(),
            Arc::new(toasts.clone()),
            options,
        );
        let events = service.subscribe();
        Self {
            service,
            backend,
            toasts,
            events,
        }
    }
}

/// Creates a playable track with the given id and audio reference.
pub fn descriptor(id: &str, audio_url: &str) -> TrackDescriptor {
    TrackDescriptor::new(id, format!("Track {}", id)).with_audio(audio_url)
}

/// Collects every event currently buffered on the receiver.
pub fn drain(rx: &mut broadcast::Receiver<PlaybackEvent>) -> Vec<PlaybackEvent> {
    let mut out = Vec::new();
    while let Ok(event) = rx.try_recv() {
        out.push(event);
    }
    out
}

/// A small catalog export: two albums, one playlist, four tracks.
///
/// Track `t3` has no audio reference.
pub const CATALOG_JSON: &str = r#"{
  "albums": [
    {"id": "a1", "title": "First Light", "artist": "The Examples", "year": 2021},
    {"id": "a2", "title": "Second Wind", "artist": "The Examples"}
  ],
  "playlists": [
    {"id": "p1", "name": "Favourites"}
  ],
  "tracks": [
    {"id": "t1", "title": "Intro", "artist": "The Examples", "album_id": "a1",
     "audio_url": "albums/a1/01 Intro.mp3", "track_number": 1, "duration": 95},
    {"id": "t2", "title": "Outro", "artist": "The Examples", "album_id": "a1",
     "audio_url": "albums/a1/02 Outro.mp3", "track_number": 2},
    {"id": "t3", "title": "Demo", "album_id": "a2"},
    {"id": "t4", "title": "Remote", "album_id": "a2",
     "audio_url": "https://cdn.example.com/remote.mp3", "liked": true}
  ],
  "playlist_tracks": [
    {"playlist_id": "p1", "track_id": "t4", "position": 0},
    {"playlist_id": "p1", "track_id": "t1", "position": 1}
  ]
}"#;

/// Writes [`CATALOG_JSON`] into a temporary directory.
///
/// Keep the `TempDir` alive for the duration of your test.
pub fn temp_catalog() -> (PathBuf, TempDir) {
    let dir = TempDir::new().expect("Failed to create temp dir");
    let path = dir.path().join("catalog.json");
    std::fs::write(&path, CATALOG_JSON).expect("Failed to write catalog fixture");
    (path, dir)
}
