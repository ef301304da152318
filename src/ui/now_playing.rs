//! Now-playing view state.
//!
//! Folds [`PlaybackEvent`]s into a [`NowPlayingView`] that a renderer can
//! draw without touching the player. This is a pure observer: it never
//! calls back into the coordinator.

use std::time::Duration;

use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;

use super::meter::LevelMeter;
use crate::model::TrackDescriptor;
use crate::player::{PlaybackEvent, PlaybackStatus, format_duration, position_fraction};

/// Everything the now-playing strip shows.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NowPlayingView {
    pub track: Option<TrackDescriptor>,
    pub status: PlaybackStatus,
    pub position: Duration,
    pub duration: Option<Duration>,
    pub volume: Option<f32>,
    pub meter: LevelMeter,
}

impl NowPlayingView {
    /// Progress as a percentage (0 - 100).
    pub fn progress_percent(&self) -> f32 {
        position_fraction(self.position, self.duration) * 100.0
    }

    pub fn elapsed_text(&self) -> String {
        format_duration(self.position)
    }

    /// Time left, prefixed with `-`. Unknown duration shows `-0:00`.
    pub fn remaining_text(&self) -> String {
        let remaining = self
            .duration
            .map(|d| d.saturating_sub(self.position))
            .unwrap_or_default();
        format!("-{}", format_duration(remaining))
    }

    /// Whether a track row should be highlighted as the current selection.
    pub fn is_highlighted(&self, track_id: &str) -> bool {
        self.track.as_ref().is_some_and(|t| t.id == track_id)
    }

    /// One-line summary, e.g. `▶ Intro - The Examples  0:12 / 1:35`.
    pub fn status_line(&self) -> String {
        let Some(track) = &self.track else {
            return "Nothing playing".to_string();
        };
        let icon = match self.status {
            PlaybackStatus::Playing => "▶",
            PlaybackStatus::Paused => "⏸",
            PlaybackStatus::Loading => "…",
            PlaybackStatus::Ended => "■",
            PlaybackStatus::Idle => "·",
        };
        let total = self
            .duration
            .map(format_duration)
            .unwrap_or_else(|| "--:--".to_string());
        format!(
            "{} {} - {}  {} / {}  {}",
            icon,
            track.title,
            track.display_artist(),
            self.elapsed_text(),
            total,
            self.meter.render()
        )
    }

    /// Apply one event. Returns whether anything visible changed.
    pub fn apply(&mut self, event: &PlaybackEvent) -> bool {
        match event {
            PlaybackEvent::TrackSelected { track } => {
                self.track = Some(track.clone());
                self.position = Duration::ZERO;
                self.duration = None;
                self.meter.flatten();
                true
            }
            PlaybackEvent::StateChanged { status } => {
                if self.status == *status {
                    return false;
                }
                self.status = *status;
                if !status.is_playing() {
                    self.meter.flatten();
                }
                true
            }
            PlaybackEvent::DurationKnown { duration } => {
                let changed = self.duration != Some(*duration);
                self.duration = Some(*duration);
                changed
            }
            PlaybackEvent::TimeUpdate { position, duration } => {
                self.position = *position;
                if duration.is_some() {
                    self.duration = *duration;
                }
                if self.status.is_playing() {
                    self.meter.advance();
                }
                true
            }
            PlaybackEvent::Ended => {
                if let Some(duration) = self.duration {
                    self.position = duration;
                }
                self.meter.flatten();
                true
            }
            PlaybackEvent::VolumeChanged { volume } => {
                let changed = self.volume != Some(*volume);
                self.volume = Some(*volume);
                changed
            }
        }
    }
}

/// Follow an event stream and publish view snapshots.
///
/// The task ends when the event channel closes or every view receiver is
/// dropped.
pub fn bind(
    mut events: broadcast::Receiver<PlaybackEvent>,
) -> (watch::Receiver<NowPlayingView>, JoinHandle<()>) {
    let (tx, rx) = watch::channel(NowPlayingView::default());
    let handle = tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(event) => {
                    tx.send_if_modified(|view| view.apply(&event));
                    if tx.is_closed() {
                        break;
                    }
                }
                Err(broadcast::error::RecvError::Lagged(missed)) => {
                    tracing::debug!(missed, "Now-playing view lagged behind events");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    });
    (rx, handle)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{ServiceRig, descriptor};

    fn playing_view(position: u64, duration: u64) -> NowPlayingView {
        NowPlayingView {
            track: Some(descriptor("t1", "/audio/a.mp3")),
            status: PlaybackStatus::Playing,
            position: Duration::from_secs(position),
            duration: Some(Duration::from_secs(duration)),
            ..Default::default()
        }
    }

    #[test]
    fn test_progress_and_text() {
        let view = playing_view(30, 120);
        assert_eq!(view.progress_percent(), 25.0);
        assert_eq!(view.elapsed_text(), "0:30");
        assert_eq!(view.remaining_text(), "-1:30");
    }

    #[test]
    fn test_long_tracks_use_hours() {
        let view = playing_view(60, 3725);
        assert_eq!(view.remaining_text(), "-1:01:05");
    }

    #[test]
    fn test_unknown_duration() {
        let view = NowPlayingView {
            position: Duration::from_secs(5),
            ..Default::default()
        };
        assert_eq!(view.progress_percent(), 0.0);
        assert_eq!(view.remaining_text(), "-0:00");
        assert_eq!(view.status_line(), "Nothing playing");
    }

    #[test]
    fn test_highlight_follows_selection() {
        let mut view = NowPlayingView::default();
        assert!(!view.is_highlighted("t1"));
        view.apply(&PlaybackEvent::TrackSelected {
            track: descriptor("t1", "/audio/a.mp3"),
        });
        assert!(view.is_highlighted("t1"));
        assert!(!view.is_highlighted("t2"));
    }

    #[test]
    fn test_meter_only_moves_while_playing() {
        let mut view = NowPlayingView::default();
        let update = PlaybackEvent::TimeUpdate {
            position: Duration::from_secs(1),
            duration: None,
        };
        view.apply(&update);
        assert!(view.meter.is_flat());

        view.apply(&PlaybackEvent::StateChanged {
            status: PlaybackStatus::Playing,
        });
        view.apply(&update);
        assert!(!view.meter.is_flat());

        view.apply(&PlaybackEvent::StateChanged {
            status: PlaybackStatus::Paused,
        });
        assert!(view.meter.is_flat());
    }

    #[test]
    fn test_repeated_status_is_not_a_change() {
        let mut view = NowPlayingView::default();
        let paused = PlaybackEvent::StateChanged {
            status: PlaybackStatus::Paused,
        };
        assert!(view.apply(&paused));
        assert!(!view.apply(&paused));
    }

    #[tokio::test(start_paused = true)]
    async fn test_bind_follows_service() {
        let rig = ServiceRig::new();
        let (view, _task) = bind(rig.service.subscribe());

        rig.service
            .play_track(descriptor("t1", "/audio/a.mp3"))
            .unwrap();
        tokio::time::sleep(Duration::from_secs(2)).await;

        let snapshot = view.borrow().clone();
        assert!(snapshot.is_highlighted("t1"));
        assert_eq!(snapshot.status, PlaybackStatus::Playing);
        assert!(snapshot.position > Duration::ZERO);
        assert!(snapshot.duration.is_some());
    }
}
