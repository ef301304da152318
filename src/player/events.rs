//! Playback events.
//!
//! Everything an observer needs to render now-playing state is published on
//! one broadcast channel:
//! - Selection (emitted by the coordinator before playback starts)
//! - State changes (loading/playing/paused/ended)
//! - Duration and position updates from the audio element
//! - Volume changes

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use super::state::PlaybackStatus;
use crate::model::TrackDescriptor;

/// Capacity of the event channel. Slow observers see `Lagged` and resync
/// from the next event.
pub const EVENT_CAPACITY: usize = 256;

/// Events emitted by the playback system
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum PlaybackEvent {
    /// A track became the current selection. Published synchronously by
    /// `play_track`, before any play request is issued.
    TrackSelected { track: TrackDescriptor },

    /// The audio element changed status
    StateChanged { status: PlaybackStatus },

    /// The backend reported the length of the current source
    DurationKnown { duration: Duration },

    /// Periodic position update while playing (and after seeks)
    TimeUpdate {
        position: Duration,
        duration: Option<Duration>,
    },

    /// The current source played to its end. Emitted once per source.
    Ended,

    /// Volume changed (0.0 - 1.0)
    VolumeChanged { volume: f32 },
}

/// Create the shared event channel.
pub fn channel() -> broadcast::Sender<PlaybackEvent> {
    broadcast::channel(EVENT_CAPACITY).0
}

/// Send without caring whether anyone is listening.
pub(crate) fn publish(events: &broadcast::Sender<PlaybackEvent>, event: PlaybackEvent) {
    // Err only means there are no receivers right now
    let _ = events.send(event);
}
