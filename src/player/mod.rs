//! Audio playback: one shared element, one coordinator, many observers.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────┐  play_track   ┌──────────────────┐  load / play   ┌──────────────┐
//! │ UI / CLI /   │──────────────▶│ PlaybackService  │───────────────▶│ AudioElement │
//! │ selection ch │               │ (coordinator)    │                │              │
//! └──────────────┘               └────────┬─────────┘                └──────┬───────┘
//!                                         │ TrackSelected                    │ MediaBackend
//!                                         ▼                                  ▼
//!                                ┌──────────────────┐  state/time   ┌──────────────┐
//!                                │ broadcast events │◀──────────────│ device or    │
//!                                │ (now playing)    │               │ virtual      │
//!                                └──────────────────┘               └──────────────┘
//! ```
//!
//! The device backend decodes with symphonia and plays through cpal on a
//! dedicated audio thread. The virtual backend runs on the tokio clock and
//! is what the tests drive.

mod audio;
pub mod backend;
mod coordinator;
mod decoder;
mod element;
pub mod events;
mod resolve;
pub mod selection;
mod state;
pub mod virtual_backend;

pub use audio::{DeviceBackend, list_audio_devices};
pub use backend::{MediaBackend, MediaError, SourceId};
pub use coordinator::{PlaybackService, ServiceOptions};
pub use element::AudioElement;
pub use events::PlaybackEvent;
pub use resolve::SourceResolver;
pub use selection::{SelectionRequest, SelectionSender};
pub use state::{PlaybackStatus, PlayerState, format_duration, position_fraction};
pub use virtual_backend::{VirtualBackend, VirtualMedia, VirtualOptions};

use crate::ui::notify::Notice;

/// Playback errors.
///
/// Everything except [`PlaybackError::SupersededAbort`] and
/// [`PlaybackError::NoAudioLoaded`] is shown to the user.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PlaybackError {
    #[error("Track {track_id} has no audio file")]
    MissingAudioReference { track_id: String },

    #[error("Audio could not be loaded: {0}")]
    ResourceLoadFailure(String),

    #[error("Playback was refused: {0}")]
    PlaybackRejected(String),

    #[error("Superseded by a newer selection")]
    SupersededAbort,

    #[error("No audio loaded")]
    NoAudioLoaded,

    #[error("Audio output initialization failed: {0}")]
    AudioInit(String),
}

impl PlaybackError {
    /// Whether this error is expected and never shown to the user.
    pub fn is_silent(&self) -> bool {
        matches!(
            self,
            PlaybackError::SupersededAbort | PlaybackError::NoAudioLoaded
        )
    }

    /// The notification to show for this error, if any.
    pub fn notice(&self) -> Option<Notice> {
        let title = match self {
            PlaybackError::MissingAudioReference { .. } => "No audio available",
            PlaybackError::ResourceLoadFailure(_) => "Couldn't load audio",
            PlaybackError::PlaybackRejected(_) => "Playback blocked",
            PlaybackError::AudioInit(_) => "Audio output unavailable",
            PlaybackError::SupersededAbort | PlaybackError::NoAudioLoaded => return None,
        };
        Some(Notice::error(title, self.to_string()))
    }
}
