//! The playback coordinator.
//!
//! [`PlaybackService`] is the single authority deciding which track is
//! loaded. Every way of starting a track (a direct call, the selection
//! channel, the CLI) ends up in [`PlaybackService::play_track`].
//!
//! # Supersession
//!
//! Selecting a track bumps a generation counter, loads the new URL into the
//! shared [`AudioElement`] and schedules a settled play. When the settling
//! delay elapses the task plays only if both the generation and the
//! element's source id still match what it captured. The previous task is
//! also aborted, but correctness does not depend on the abort winning.

use std::sync::{Arc, Weak};
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

use super::PlaybackError;
use super::backend::{BackendEventStream, MediaBackend, SourceId};
use super::element::AudioElement;
use super::events::{self, PlaybackEvent};
use super::resolve::SourceResolver;
use super::state::{PlaybackStatus, PlayerState};
use crate::config::PlaybackConfig;
use crate::model::TrackDescriptor;
use crate::ui::notify::Notifier;

/// Knobs the coordinator takes from configuration.
#[derive(Debug, Clone, Copy)]
pub struct ServiceOptions {
    /// Wait between assigning a source and issuing play
    pub settle_delay: Duration,
    /// Initial volume (0.0 - 1.0)
    pub volume: f32,
}

impl Default for ServiceOptions {
    fn default() -> Self {
        Self {
            settle_delay: Duration::from_millis(100),
            volume: 1.0,
        }
    }
}

impl From<&PlaybackConfig> for ServiceOptions {
    fn from(config: &PlaybackConfig) -> Self {
        Self {
            settle_delay: Duration::from_millis(config.settle_delay_ms),
            volume: config.volume,
        }
    }
}

#[derive(Default)]
struct Selection {
    generation: u64,
    track: Option<TrackDescriptor>,
    pending: Option<JoinHandle<()>>,
}

struct Inner {
    element: AudioElement,
    resolver: SourceResolver,
    notifier: Arc<dyn Notifier>,
    events: broadcast::Sender<PlaybackEvent>,
    settle_delay: Duration,
    selection: Mutex<Selection>,
}

/// Cloneable handle to the playback coordinator.
#[derive(Clone)]
pub struct PlaybackService {
    inner: Arc<Inner>,
}

impl PlaybackService {
    /// Build the service around a media backend.
    ///
    /// Must be called from within a tokio runtime.
    pub fn new(
        backend: Arc<dyn MediaBackend>,
        signals: BackendEventStream,
        resolver: SourceResolver,
        notifier: Arc<dyn Notifier>,
        options: ServiceOptions,
    ) -> Self {
        let events = events::channel();
        let element = AudioElement::attach(backend, signals, Arc::clone(&notifier), events.clone());
        element.set_volume(options.volume);

        Self {
            inner: Arc::new(Inner {
                element,
                resolver,
                notifier,
                events,
                settle_delay: options.settle_delay,
                selection: Mutex::new(Selection::default()),
            }),
        }
    }

    /// Make `track` the current selection and start it after the settling delay.
    ///
    /// Returns immediately. A track without audio (or whose reference cannot
    /// be resolved) is reported to the user and leaves playback untouched.
    pub fn play_track(&self, track: TrackDescriptor) -> Result<(), PlaybackError> {
        let Some(reference) = track.playable_reference() else {
            return Err(self.report(PlaybackError::MissingAudioReference {
                track_id: track.id.clone(),
            }));
        };
        let url = self
            .inner
            .resolver
            .resolve(reference)
            .map_err(|e| self.report(e))?;

        let mut sel = self.inner.selection.lock();
        sel.generation += 1;
        let generation = sel.generation;
        if let Some(stale) = sel.pending.take() {
            stale.abort();
        }

        tracing::info!(track_id = %track.id, generation, "Selected \"{}\"", track.title);
        sel.track = Some(track.clone());
        events::publish(&self.inner.events, PlaybackEvent::TrackSelected { track });
        let source = self.inner.element.load(&url);
        self.inner.element.expect_play(source);

        let weak = Arc::downgrade(&self.inner);
        let delay = self.inner.settle_delay;
        sel.pending = Some(tokio::spawn(async move {
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            settled_play(weak, generation, source).await;
        }));
        Ok(())
    }

    /// Pause playback.
    ///
    /// A settled play that has not fired yet is cancelled, so the track
    /// stays paused once it finishes loading.
    pub fn pause(&self) {
        {
            let mut sel = self.inner.selection.lock();
            if let Some(pending) = sel.pending.take() {
                sel.generation += 1;
                pending.abort();
                tracing::debug!(generation = sel.generation, "Pending settled play cancelled");
            }
        }
        self.inner.element.pause();
    }

    /// Play / resume the loaded track.
    pub async fn resume(&self) -> Result<(), PlaybackError> {
        self.inner.element.play().await
    }

    /// Toggle play/pause.
    pub async fn toggle(&self) -> Result<(), PlaybackError> {
        match self.inner.element.status() {
            PlaybackStatus::Playing => {
                self.pause();
                Ok(())
            }
            PlaybackStatus::Loading => Ok(()),
            PlaybackStatus::Idle | PlaybackStatus::Paused | PlaybackStatus::Ended => {
                self.resume().await
            }
        }
    }

    /// Seek to a position (0.0 - 1.0).
    pub fn seek(&self, fraction: f32) {
        if let Some(duration) = self.inner.element.snapshot().duration {
            self.inner
                .element
                .seek(duration.mul_f32(fraction.clamp(0.0, 1.0)));
        }
    }

    /// Set volume (0.0 - 1.0).
    pub fn set_volume(&self, volume: f32) {
        self.inner.element.set_volume(volume);
    }

    /// The currently selected track.
    pub fn current_track(&self) -> Option<TrackDescriptor> {
        self.inner.selection.lock().track.clone()
    }

    /// Get current playback state snapshot.
    pub fn state(&self) -> PlayerState {
        let mut state = self.inner.element.snapshot();
        state.current_track = self.current_track();
        state
    }

    /// Subscribe to playback events.
    pub fn subscribe(&self) -> broadcast::Receiver<PlaybackEvent> {
        self.inner.events.subscribe()
    }

    /// The shared audio element.
    pub fn element(&self) -> &AudioElement {
        &self.inner.element
    }

    fn report(&self, err: PlaybackError) -> PlaybackError {
        if let Some(notice) = err.notice() {
            tracing::warn!("{}", err);
            self.inner.notifier.notify(notice);
        }
        err
    }
}

/// Body of the settling task: play only if the selection is still current.
async fn settled_play(inner: Weak<Inner>, generation: u64, source: SourceId) {
    let Some(inner) = inner.upgrade() else {
        return;
    };
    if inner.selection.lock().generation != generation {
        tracing::debug!(generation, "Settling delay elapsed for a replaced selection");
        return;
    }

    match inner.element.play_source(source).await {
        Ok(()) => tracing::debug!(generation, "Settled play started"),
        Err(e) if e.is_silent() => tracing::debug!(generation, "Settled play dropped: {}", e),
        // Already reported by the element
        Err(e) => tracing::debug!(generation, "Settled play failed: {}", e),
    }

    let mut sel = inner.selection.lock();
    if sel.generation == generation {
        sel.pending = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::player::virtual_backend::VirtualMedia;
    use crate::test_utils::{ServiceRig, descriptor, drain};

    #[tokio::test(start_paused = true)]
    async fn test_missing_reference_changes_nothing() {
        let mut rig = ServiceRig::new();
        let before = rig.service.state();

        let err = rig
            .service
            .play_track(TrackDescriptor::new("t2", "Song B"))
            .unwrap_err();
        tokio::time::sleep(Duration::from_secs(1)).await;

        assert_eq!(
            err,
            PlaybackError::MissingAudioReference {
                track_id: "t2".into()
            }
        );
        assert_eq!(rig.toasts.error_count(), 1);
        assert!(drain(&mut rig.events).is_empty());
        let after = rig.service.state();
        assert_eq!(after.status, before.status);
        assert_eq!(after.source, before.source);
        assert!(after.current_track.is_none());
        assert!(rig.backend.calls().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_selection_is_published_synchronously() {
        let mut rig = ServiceRig::new();
        let track = descriptor("t1", "/audio/a.mp3");
        rig.service.play_track(track.clone()).unwrap();

        let events = drain(&mut rig.events);
        assert!(events.contains(&PlaybackEvent::TrackSelected { track }));
        assert_eq!(rig.backend.play_calls("/audio/a.mp3"), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_superseded_timer_is_a_noop() {
        let rig = ServiceRig::new();
        rig.service
            .play_track(descriptor("a", "/audio/a.mp3"))
            .unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;
        rig.service
            .play_track(descriptor("b", "/audio/b.mp3"))
            .unwrap();
        tokio::time::sleep(Duration::from_secs(1)).await;

        assert_eq!(rig.backend.play_calls("/audio/a.mp3"), 0);
        assert_eq!(rig.backend.play_calls("/audio/b.mp3"), 1);
        assert_eq!(rig.service.state().status, PlaybackStatus::Playing);
        assert_eq!(rig.service.current_track().unwrap().id, "b");
    }

    #[tokio::test(start_paused = true)]
    async fn test_stale_generation_never_plays() {
        // Even when the old task is not aborted, the generation check stops it
        let rig = ServiceRig::new();
        rig.service
            .play_track(descriptor("a", "/audio/a.mp3"))
            .unwrap();
        let source_a = rig.service.element().source_id();
        rig.service
            .play_track(descriptor("b", "/audio/b.mp3"))
            .unwrap();

        settled_play(Arc::downgrade(&rig.service.inner), 1, source_a).await;
        assert_eq!(rig.backend.play_calls("/audio/a.mp3"), 0);
        assert_eq!(rig.backend.play_calls("/audio/b.mp3"), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_reselecting_restarts_from_zero() {
        let rig = ServiceRig::new();
        rig.service
            .play_track(descriptor("a", "/audio/a.mp3"))
            .unwrap();
        tokio::time::sleep(Duration::from_secs(3)).await;
        assert!(rig.service.state().position > Duration::ZERO);

        rig.service
            .play_track(descriptor("b", "/audio/b.mp3"))
            .unwrap();
        tokio::time::sleep(Duration::from_secs(2)).await;
        rig.service
            .play_track(descriptor("a", "/audio/a.mp3"))
            .unwrap();

        assert_eq!(rig.service.state().position, Duration::ZERO);
        assert_eq!(rig.backend.position(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn test_unloadable_track_reports_once() {
        let rig = ServiceRig::new();
        rig.backend
            .insert("/audio/gone.mp3", VirtualMedia::Unavailable("HTTP 404".into()));
        rig.service
            .play_track(descriptor("g", "/audio/gone.mp3"))
            .unwrap();
        tokio::time::sleep(Duration::from_secs(1)).await;

        assert_eq!(rig.toasts.error_count(), 1);
        assert_eq!(rig.service.state().status, PlaybackStatus::Idle);
    }

    #[tokio::test(start_paused = true)]
    async fn test_explicit_retry_after_load_failure_is_reported() {
        let rig = ServiceRig::new();
        rig.backend
            .insert("/audio/gone.mp3", VirtualMedia::Unavailable("HTTP 404".into()));
        rig.service
            .play_track(descriptor("g", "/audio/gone.mp3"))
            .unwrap();
        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(rig.toasts.error_count(), 1);

        let err = rig.service.resume().await.unwrap_err();
        assert_eq!(err, PlaybackError::ResourceLoadFailure("HTTP 404".into()));
        assert_eq!(rig.toasts.error_count(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_pause_during_settling_delay_holds() {
        let rig = ServiceRig::new();
        rig.service
            .play_track(descriptor("a", "/audio/a.mp3"))
            .unwrap();
        tokio::time::sleep(Duration::from_millis(30)).await;

        rig.service.pause();
        tokio::time::sleep(Duration::from_secs(1)).await;

        assert_eq!(rig.service.state().status, PlaybackStatus::Paused);
        assert_eq!(rig.backend.play_calls("/audio/a.mp3"), 0);
        assert!(!rig.backend.is_running());

        rig.service.resume().await.unwrap();
        assert_eq!(rig.service.state().status, PlaybackStatus::Playing);
    }

    #[tokio::test(start_paused = true)]
    async fn test_pause_while_still_loading_holds() {
        let rig = ServiceRig::new();
        rig.service
            .play_track(descriptor("a", "/audio/a.mp3"))
            .unwrap();
        rig.service.pause();
        tokio::time::sleep(Duration::from_secs(1)).await;

        assert_eq!(rig.service.state().status, PlaybackStatus::Paused);
        assert_eq!(rig.backend.play_calls("/audio/a.mp3"), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_track_plays_through_to_a_single_end() {
        let mut rig = ServiceRig::new();
        let duration = Duration::from_secs(2);
        rig.backend
            .insert("/audio/a.mp3", VirtualMedia::Track(duration));
        let track = TrackDescriptor::new("t1", "Song A").with_audio("/audio/a.mp3");
        assert_eq!(rig.service.state().status, PlaybackStatus::Idle);

        rig.service.play_track(track.clone()).unwrap();
        assert_eq!(
            rig.events.try_recv().unwrap(),
            PlaybackEvent::TrackSelected { track }
        );

        tokio::time::sleep(Duration::from_secs(5)).await;
        let events = drain(&mut rig.events);

        let statuses: Vec<_> = events
            .iter()
            .filter_map(|e| match e {
                PlaybackEvent::StateChanged { status } => Some(*status),
                _ => None,
            })
            .collect();
        assert_eq!(
            statuses,
            vec![
                PlaybackStatus::Loading,
                PlaybackStatus::Playing,
                PlaybackStatus::Ended
            ]
        );

        let positions: Vec<_> = events
            .iter()
            .filter_map(|e| match e {
                PlaybackEvent::TimeUpdate { position, .. } => Some(*position),
                _ => None,
            })
            .collect();
        assert!(!positions.is_empty());
        assert!(positions.windows(2).all(|w| w[0] < w[1]));
        assert_eq!(positions.last(), Some(&duration));

        assert_eq!(
            events.iter().filter(|e| **e == PlaybackEvent::Ended).count(),
            1
        );
        assert_eq!(events.last(), Some(&PlaybackEvent::Ended));
        assert_eq!(rig.backend.play_calls("/audio/a.mp3"), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_toggle_and_seek() {
        let rig = ServiceRig::new();
        rig.backend
            .insert("/audio/a.mp3", VirtualMedia::Track(Duration::from_secs(100)));
        rig.service
            .play_track(descriptor("a", "/audio/a.mp3"))
            .unwrap();
        tokio::time::sleep(Duration::from_millis(500)).await;
        assert_eq!(rig.service.state().status, PlaybackStatus::Playing);

        rig.service.toggle().await.unwrap();
        assert_eq!(rig.service.state().status, PlaybackStatus::Paused);

        rig.service.seek(0.5);
        assert_eq!(rig.service.state().position, Duration::from_secs(50));

        rig.service.toggle().await.unwrap();
        assert_eq!(rig.service.state().status, PlaybackStatus::Playing);
    }

    #[tokio::test(start_paused = true)]
    async fn test_zero_delay_waits_for_ready_instead() {
        let rig = ServiceRig::with_options(ServiceOptions {
            settle_delay: Duration::ZERO,
            volume: 1.0,
        });
        rig.service
            .play_track(descriptor("a", "/audio/a.mp3"))
            .unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;

        assert_eq!(rig.service.state().status, PlaybackStatus::Playing);
        assert_eq!(rig.backend.play_calls("/audio/a.mp3"), 1);
    }
}
