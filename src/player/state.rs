//! Player status and snapshot types.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::model::TrackDescriptor;

/// Playback status of the shared audio element.
///
/// ```text
/// Idle/Ended --load--> Loading --ready--> Paused <--> Playing --end--> Ended
///                         └──────play resolved──────────┘
/// any state --load(new source)--> Loading
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum PlaybackStatus {
    /// Nothing loaded, or the last load failed
    #[default]
    Idle,
    Loading,
    Playing,
    Paused,
    Ended,
}

impl PlaybackStatus {
    /// Whether audio is (or is about to be) audible.
    pub fn is_playing(self) -> bool {
        self == PlaybackStatus::Playing
    }
}

/// Snapshot of the player as seen by the coordinator.
#[derive(Debug, Clone)]
pub struct PlayerState {
    /// Current playback status
    pub status: PlaybackStatus,
    /// Selected track (if any)
    pub current_track: Option<TrackDescriptor>,
    /// Resolved URL assigned to the element
    pub source: Option<String>,
    /// Current position in the track
    pub position: Duration,
    /// Total duration, once the backend has reported it
    pub duration: Option<Duration>,
    /// Volume level (0.0 - 1.0)
    pub volume: f32,
}

impl Default for PlayerState {
    fn default() -> Self {
        Self {
            status: PlaybackStatus::Idle,
            current_track: None,
            source: None,
            position: Duration::ZERO,
            duration: None,
            volume: 1.0,
        }
    }
}

impl PlayerState {
    /// Get position as a fraction (0.0 - 1.0).
    pub fn position_fraction(&self) -> f32 {
        position_fraction(self.position, self.duration)
    }

    /// Format position as MM:SS.
    pub fn position_str(&self) -> String {
        format_duration(self.position)
    }

    /// Format duration as MM:SS.
    pub fn duration_str(&self) -> String {
        format_duration(self.duration.unwrap_or_default())
    }
}

/// Position as a fraction of duration, clamped to 0.0 - 1.0.
pub fn position_fraction(position: Duration, duration: Option<Duration>) -> f32 {
    match duration {
        Some(d) if !d.is_zero() => (position.as_secs_f32() / d.as_secs_f32()).clamp(0.0, 1.0),
        _ => 0.0,
    }
}

/// Format a duration as MM:SS or HH:MM:SS.
pub fn format_duration(d: Duration) -> String {
    let secs = d.as_secs();
    let hours = secs / 3600;
    let mins = (secs % 3600) / 60;
    let secs = secs % 60;

    if hours > 0 {
        format!("{}:{:02}:{:02}", hours, mins, secs)
    } else {
        format!("{}:{:02}", mins, secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration(Duration::from_secs(0)), "0:00");
        assert_eq!(format_duration(Duration::from_secs(65)), "1:05");
        assert_eq!(format_duration(Duration::from_secs(3661)), "1:01:01");
    }

    #[test]
    fn test_position_fraction() {
        let mut state = PlayerState::default();
        assert_eq!(state.position_fraction(), 0.0);

        state.duration = Some(Duration::from_secs(100));
        state.position = Duration::from_secs(50);
        assert!((state.position_fraction() - 0.5).abs() < 0.01);
    }

    #[test]
    fn test_unknown_duration_formats_as_zero() {
        let state = PlayerState::default();
        assert_eq!(state.duration_str(), "0:00");
    }

    proptest! {
        #[test]
        fn fraction_is_always_clamped(pos in 0u64..100_000, dur in 0u64..100_000) {
            let f = position_fraction(Duration::from_millis(pos), Some(Duration::from_millis(dur)));
            prop_assert!((0.0..=1.0).contains(&f));
        }
    }
}
