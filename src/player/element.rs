//! The shared audio element.
//!
//! [`AudioElement`] wraps exactly one [`MediaBackend`] and gives it a small
//! imperative surface (`load`, `play`, `pause`, `seek`, `set_volume`) with
//! the guarantees the rest of the app relies on:
//!
//! - `load` always resets position to zero and never autoplays
//! - at most one play request is in flight; a second one is suppressed
//! - `play` while playing and `pause` while paused are silent no-ops
//! - a play request overtaken by `load` or `pause` is dropped without noise
//! - backend signals for replaced sources are discarded
//!
//! # Concurrency
//!
//! State lives behind a `parking_lot::Mutex` that is never held across an
//! await. The play ticket is bumped by `load` and `pause`; a play request
//! only takes effect if the ticket it captured is still current when the
//! backend answers.

use std::sync::{Arc, Weak};
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::broadcast;

use super::PlaybackError;
use super::backend::{BackendEvent, BackendEventStream, MediaBackend, MediaError, SourceId};
use super::events::{self, PlaybackEvent};
use super::state::{PlaybackStatus, PlayerState};
use crate::ui::notify::{Notice, Notifier};

struct ElementState {
    source: Option<String>,
    source_id: SourceId,
    status: PlaybackStatus,
    position: Duration,
    duration: Option<Duration>,
    volume: f32,
    play_in_flight: bool,
    /// The coordinator will issue play once its settling delay elapses
    play_expected: bool,
    /// The backend reported the current source ready
    ready: bool,
    play_ticket: u64,
    /// A load failure for this source has already been shown to the user
    failure_reported: bool,
}

impl ElementState {
    fn set_status(&mut self, status: PlaybackStatus, out: &mut Vec<PlaybackEvent>) {
        if self.status != status {
            self.status = status;
            out.push(PlaybackEvent::StateChanged { status });
        }
    }

    fn not_playing(&mut self, out: &mut Vec<PlaybackEvent>) {
        let status = if self.duration.is_some() {
            PlaybackStatus::Paused
        } else {
            PlaybackStatus::Idle
        };
        self.set_status(status, out);
    }
}

struct Shared {
    backend: Arc<dyn MediaBackend>,
    state: Mutex<ElementState>,
    events: broadcast::Sender<PlaybackEvent>,
    notifier: Arc<dyn Notifier>,
}

/// Cloneable handle to the single audio element.
#[derive(Clone)]
pub struct AudioElement {
    shared: Arc<Shared>,
}

impl AudioElement {
    /// Wrap a backend and start consuming its signals.
    ///
    /// Must be called from within a tokio runtime.
    pub fn attach(
        backend: Arc<dyn MediaBackend>,
        signals: BackendEventStream,
        notifier: Arc<dyn Notifier>,
        events: broadcast::Sender<PlaybackEvent>,
    ) -> Self {
        let shared = Arc::new(Shared {
            backend,
            state: Mutex::new(ElementState {
                source: None,
                source_id: 0,
                status: PlaybackStatus::Idle,
                position: Duration::ZERO,
                duration: None,
                volume: 1.0,
                play_in_flight: false,
                play_expected: false,
                ready: false,
                play_ticket: 0,
                failure_reported: false,
            }),
            events,
            notifier,
        });
        tokio::spawn(pump(Arc::downgrade(&shared), signals));
        Self { shared }
    }

    /// Assign a new source. Position resets to zero; playback does not start.
    ///
    /// A blank `url` leaves the element with no audio: status becomes
    /// `Idle` and later `play()` calls are rejected.
    pub fn load(&self, url: &str) -> SourceId {
        let url = url.trim();
        let mut out = Vec::new();
        let id = {
            let mut st = self.shared.state.lock();
            st.source_id += 1;
            st.play_ticket += 1;
            st.play_in_flight = false;
            st.play_expected = false;
            st.ready = false;
            st.failure_reported = false;
            st.position = Duration::ZERO;
            st.duration = None;

            if url.is_empty() {
                tracing::warn!("Empty source assigned, no audio available");
                st.source = None;
                self.shared.backend.clear();
                st.set_status(PlaybackStatus::Idle, &mut out);
            } else {
                tracing::info!(source = st.source_id, "Loading {}", url);
                st.source = Some(url.to_string());
                self.shared.backend.set_source(st.source_id, url);
                st.set_status(PlaybackStatus::Loading, &mut out);
            }
            st.source_id
        };
        self.emit(out);
        id
    }

    /// Mark `source` as about to be played, so becoming ready keeps it in
    /// `Loading` instead of `Paused`.
    pub(crate) fn expect_play(&self, source: SourceId) {
        let mut st = self.shared.state.lock();
        if st.source_id == source && st.source.is_some() {
            st.play_expected = true;
        }
    }

    /// Request playback of whatever is loaded.
    ///
    /// An explicit request is a new attempt: a failure is reported again
    /// even if an earlier attempt on the same source already was.
    pub async fn play(&self) -> Result<(), PlaybackError> {
        let id = {
            let mut st = self.shared.state.lock();
            st.failure_reported = false;
            st.source_id
        };
        self.play_source(id).await
    }

    /// Request playback, but only if `expected` is still the loaded source.
    pub(crate) async fn play_source(&self, expected: SourceId) -> Result<(), PlaybackError> {
        let (ticket, request) = {
            let mut st = self.shared.state.lock();
            if st.source_id != expected {
                tracing::debug!(expected, current = st.source_id, "Play for replaced source ignored");
                return Err(PlaybackError::SupersededAbort);
            }
            if st.source.is_none() {
                tracing::warn!("Play requested with no audio loaded");
                return Err(PlaybackError::NoAudioLoaded);
            }
            st.play_expected = false;
            if st.status == PlaybackStatus::Playing {
                return Ok(());
            }
            if st.play_in_flight {
                tracing::debug!("Play request already in flight");
                return Ok(());
            }
            st.play_in_flight = true;
            (st.play_ticket, self.shared.backend.play())
        };

        let outcome = request.await;

        let mut out = Vec::new();
        let mut notice = None;
        let result = {
            let mut st = self.shared.state.lock();
            if st.play_ticket != ticket {
                tracing::debug!("Play request overtaken by load/pause");
                return Err(PlaybackError::SupersededAbort);
            }
            st.play_in_flight = false;

            match outcome {
                Ok(()) => {
                    if st.status == PlaybackStatus::Ended {
                        st.position = Duration::ZERO;
                        out.push(PlaybackEvent::TimeUpdate {
                            position: Duration::ZERO,
                            duration: st.duration,
                        });
                    }
                    st.set_status(PlaybackStatus::Playing, &mut out);
                    Ok(())
                }
                Err(MediaError::Aborted) => {
                    tracing::debug!("Backend aborted play request");
                    st.not_playing(&mut out);
                    Err(PlaybackError::SupersededAbort)
                }
                Err(MediaError::LoadFailed(reason)) => {
                    st.set_status(PlaybackStatus::Idle, &mut out);
                    let err = PlaybackError::ResourceLoadFailure(reason);
                    if !st.failure_reported {
                        st.failure_reported = true;
                        notice = err.notice();
                    }
                    Err(err)
                }
                Err(other @ (MediaError::NotAllowed(_) | MediaError::NoSource)) => {
                    st.not_playing(&mut out);
                    let reason = match other {
                        MediaError::NotAllowed(reason) => reason,
                        other => other.to_string(),
                    };
                    let err = PlaybackError::PlaybackRejected(reason);
                    notice = err.notice();
                    Err(err)
                }
            }
        };

        self.emit(out);
        if let Some(notice) = notice {
            tracing::warn!("{}", notice.description);
            self.shared.notifier.notify(notice);
        }
        result
    }

    /// Stop playback, keeping the position. No-op unless something is
    /// playing or a play request is pending or expected.
    pub fn pause(&self) {
        let mut out = Vec::new();
        {
            let mut st = self.shared.state.lock();
            if st.source.is_none() {
                return;
            }
            if st.status == PlaybackStatus::Playing {
                self.shared.backend.pause();
                st.play_ticket += 1;
                st.play_in_flight = false;
                st.set_status(PlaybackStatus::Paused, &mut out);
            } else if st.play_in_flight {
                self.shared.backend.pause();
                st.play_ticket += 1;
                st.play_in_flight = false;
            } else if st.play_expected {
                st.play_expected = false;
                if st.ready && st.status == PlaybackStatus::Loading {
                    st.set_status(PlaybackStatus::Paused, &mut out);
                }
            } else {
                return;
            }
        }
        self.emit(out);
    }

    /// Jump to a position. Ignored until the duration is known.
    pub fn seek(&self, position: Duration) {
        let mut out = Vec::new();
        {
            let mut st = self.shared.state.lock();
            let Some(duration) = st.duration.filter(|_| st.source.is_some()) else {
                return;
            };
            let position = position.min(duration);
            self.shared.backend.seek(position);
            if st.position != position {
                st.position = position;
                out.push(PlaybackEvent::TimeUpdate {
                    position,
                    duration: Some(duration),
                });
            }
        }
        self.emit(out);
    }

    /// Set volume (0.0 - 1.0).
    pub fn set_volume(&self, volume: f32) {
        let volume = volume.clamp(0.0, 1.0);
        {
            let mut st = self.shared.state.lock();
            if (st.volume - volume).abs() < f32::EPSILON {
                return;
            }
            st.volume = volume;
            self.shared.backend.set_volume(volume);
        }
        self.emit(vec![PlaybackEvent::VolumeChanged { volume }]);
    }

    /// Current status.
    pub fn status(&self) -> PlaybackStatus {
        self.shared.state.lock().status
    }

    /// Current position.
    pub fn position(&self) -> Duration {
        self.shared.state.lock().position
    }

    /// Identity of the loaded source.
    pub fn source_id(&self) -> SourceId {
        self.shared.state.lock().source_id
    }

    /// Snapshot of element state. `current_track` is left empty; the
    /// coordinator fills it in.
    pub fn snapshot(&self) -> PlayerState {
        let st = self.shared.state.lock();
        PlayerState {
            status: st.status,
            current_track: None,
            source: st.source.clone(),
            position: st.position,
            duration: st.duration,
            volume: st.volume,
        }
    }

    fn handle_signal(&self, signal: BackendEvent) {
        let mut out = Vec::new();
        let mut notice: Option<Notice> = None;
        {
            let mut st = self.shared.state.lock();
            if signal.source() != st.source_id || st.source.is_none() {
                tracing::trace!(source = signal.source(), "Dropping signal for replaced source");
                return;
            }

            match signal {
                BackendEvent::Ready { duration, .. } => {
                    if let Some(duration) = duration
                        && st.duration != Some(duration)
                    {
                        st.duration = Some(duration);
                        out.push(PlaybackEvent::DurationKnown { duration });
                    }
                    st.ready = true;
                    if st.status == PlaybackStatus::Loading
                        && !st.play_in_flight
                        && !st.play_expected
                    {
                        st.set_status(PlaybackStatus::Paused, &mut out);
                    }
                }
                BackendEvent::TimeUpdate { position, .. } => {
                    if st.position != position {
                        st.position = position;
                        out.push(PlaybackEvent::TimeUpdate {
                            position,
                            duration: st.duration,
                        });
                    }
                }
                BackendEvent::Ended { .. } => {
                    if st.status != PlaybackStatus::Ended {
                        st.play_in_flight = false;
                        if let Some(duration) = st.duration {
                            st.position = duration;
                        }
                        st.set_status(PlaybackStatus::Ended, &mut out);
                        out.push(PlaybackEvent::Ended);
                    }
                }
                BackendEvent::Failed { error, .. } => {
                    st.set_status(PlaybackStatus::Idle, &mut out);
                    if !st.failure_reported {
                        st.failure_reported = true;
                        let reason = match error {
                            MediaError::LoadFailed(reason) => reason,
                            other => other.to_string(),
                        };
                        notice = PlaybackError::ResourceLoadFailure(reason).notice();
                    }
                }
            }
        }

        self.emit(out);
        if let Some(notice) = notice {
            tracing::error!("{}", notice.description);
            self.shared.notifier.notify(notice);
        }
    }

    fn emit(&self, out: Vec<PlaybackEvent>) {
        for event in out {
            events::publish(&self.shared.events, event);
        }
    }
}

/// Forward backend signals into the element until either side goes away.
async fn pump(shared: Weak<Shared>, mut signals: BackendEventStream) {
    while let Some(signal) = signals.recv().await {
        let Some(shared) = shared.upgrade() else {
            break;
        };
        AudioElement { shared }.handle_signal(signal);
    }
    tracing::debug!("Audio element signal pump stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::player::virtual_backend::{BackendCall, VirtualBackend, VirtualMedia, VirtualOptions};
    use crate::ui::toast::{SharedToasts, ToastSettings};

    struct Rig {
        element: AudioElement,
        backend: Arc<VirtualBackend>,
        toasts: SharedToasts,
        events: broadcast::Receiver<PlaybackEvent>,
    }

    fn rig() -> Rig {
        let (backend, signals) = VirtualBackend::new(VirtualOptions::default());
        let toasts = SharedToasts::new(ToastSettings::default());
        let tx = events::channel();
        let events = tx.subscribe();
        let element = AudioElement::attach(backend.clone(), signals, Arc::new(toasts.clone()), tx);
        Rig {
            element,
            backend,
            toasts,
            events,
        }
    }

    fn drain(rx: &mut broadcast::Receiver<PlaybackEvent>) -> Vec<PlaybackEvent> {
        let mut out = Vec::new();
        while let Ok(e) = rx.try_recv() {
            out.push(e);
        }
        out
    }

    async fn settle() {
        tokio::time::sleep(Duration::from_millis(100)).await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_duplicate_end_signal_is_ignored() {
        let (backend, _own_signals) = VirtualBackend::new(VirtualOptions::default());
        let (signals_tx, signals) = crate::player::backend::event_channel();
        let tx = events::channel();
        let mut events = tx.subscribe();
        let element = AudioElement::attach(backend, signals, Arc::new(SharedToasts::default()), tx);

        let source = element.load("a.mp3");
        for signal in [
            BackendEvent::Ready {
                source,
                duration: Some(Duration::from_secs(1)),
            },
            BackendEvent::Ended { source },
            BackendEvent::Ended { source },
        ] {
            signals_tx.send(signal).unwrap();
        }
        tokio::time::sleep(Duration::from_millis(10)).await;

        let events = drain(&mut events);
        assert_eq!(events.iter().filter(|e| **e == PlaybackEvent::Ended).count(), 1);
        assert_eq!(element.status(), PlaybackStatus::Ended);
        assert_eq!(element.position(), Duration::from_secs(1));
    }

    #[tokio::test(start_paused = true)]
    async fn test_expected_play_stays_loading_until_paused() {
        let mut r = rig();
        let source = r.element.load("a.mp3");
        r.element.expect_play(source);
        settle().await;
        assert_eq!(r.element.status(), PlaybackStatus::Loading);

        r.element.pause();
        assert_eq!(r.element.status(), PlaybackStatus::Paused);
        assert!(drain(&mut r.events).contains(&PlaybackEvent::StateChanged {
            status: PlaybackStatus::Paused
        }));
        assert_eq!(r.backend.play_calls("a.mp3"), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_load_does_not_autoplay() {
        let mut r = rig();
        r.element.load("a.mp3");
        settle().await;

        assert_eq!(r.element.status(), PlaybackStatus::Paused);
        assert_eq!(r.backend.play_calls("a.mp3"), 0);
        let events = drain(&mut r.events);
        assert_eq!(
            events.first(),
            Some(&PlaybackEvent::StateChanged {
                status: PlaybackStatus::Loading
            })
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_play_without_source_is_rejected() {
        let r = rig();
        r.element.load("   ");

        let result = r.element.play().await;
        assert_eq!(result, Err(PlaybackError::NoAudioLoaded));
        assert_eq!(r.element.status(), PlaybackStatus::Idle);
        assert!(r.backend.calls().iter().all(|c| !matches!(c, BackendCall::Play(_))));
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_play_is_suppressed() {
        let r = rig();
        r.element.load("a.mp3");

        // Source still loading: the first request waits, the second is dropped
        let (first, second) = tokio::join!(r.element.play(), r.element.play());
        assert!(first.is_ok());
        assert!(second.is_ok());
        assert_eq!(r.backend.play_calls("a.mp3"), 1);
        assert_eq!(r.element.status(), PlaybackStatus::Playing);
    }

    #[tokio::test(start_paused = true)]
    async fn test_pause_then_play_keeps_position() {
        let r = rig();
        r.element.load("a.mp3");
        r.element.play().await.unwrap();
        tokio::time::sleep(Duration::from_secs(2)).await;
        settle().await;

        r.element.pause();
        let paused_at = r.element.position();
        assert!(paused_at >= Duration::from_secs(2));

        r.element.play().await.unwrap();
        assert_eq!(r.element.position(), paused_at);
        assert_eq!(r.backend.position(), paused_at);
        assert_eq!(r.backend.play_calls("a.mp3"), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_idempotent_pause_and_play() {
        let mut r = rig();
        r.element.load("a.mp3");
        r.element.play().await.unwrap();
        drain(&mut r.events);

        r.element.play().await.unwrap();
        assert_eq!(r.backend.play_calls("a.mp3"), 1);

        r.element.pause();
        r.element.pause();
        let changes: Vec<_> = drain(&mut r.events)
            .into_iter()
            .filter(|e| matches!(e, PlaybackEvent::StateChanged { .. }))
            .collect();
        assert_eq!(
            changes,
            vec![PlaybackEvent::StateChanged {
                status: PlaybackStatus::Paused
            }]
        );
        assert_eq!(
            r.backend
                .calls()
                .iter()
                .filter(|c| **c == BackendCall::Pause)
                .count(),
            1
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_load_failure_reported_once() {
        let r = rig();
        r.backend
            .insert("gone.mp3", VirtualMedia::Unavailable("HTTP 404".into()));
        r.element.load("gone.mp3");

        let result = r.element.play().await;
        settle().await;

        assert_eq!(
            result,
            Err(PlaybackError::ResourceLoadFailure("HTTP 404".into()))
        );
        assert_eq!(r.element.status(), PlaybackStatus::Idle);
        assert_eq!(r.toasts.error_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_rejected_play_reverts_to_paused() {
        let r = rig();
        r.backend
            .insert("locked.mp3", VirtualMedia::Blocked("autoplay policy".into()));
        r.element.load("locked.mp3");
        settle().await;

        let result = r.element.play().await;
        assert_eq!(
            result,
            Err(PlaybackError::PlaybackRejected("autoplay policy".into()))
        );
        assert_eq!(r.element.status(), PlaybackStatus::Paused);
        assert_eq!(r.toasts.error_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_load_during_pending_play_is_silent() {
        let r = rig();
        r.element.load("a.mp3");
        let mut pending = Box::pin(r.element.play());
        assert!(futures::poll!(&mut pending).is_pending());

        r.element.load("b.mp3");
        let result = pending.await;

        assert_eq!(result, Err(PlaybackError::SupersededAbort));
        assert_eq!(r.toasts.error_count(), 0);
        assert_eq!(r.backend.play_calls("b.mp3"), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stale_signals_are_dropped() {
        let r = rig();
        r.backend
            .insert("a.mp3", VirtualMedia::Track(Duration::from_secs(300)));
        r.backend
            .insert("b.mp3", VirtualMedia::Track(Duration::from_secs(60)));
        r.element.load("a.mp3");
        r.element.load("b.mp3");
        settle().await;

        assert_eq!(r.element.snapshot().duration, Some(Duration::from_secs(60)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_seek_clamps_to_duration() {
        let r = rig();
        r.backend
            .insert("a.mp3", VirtualMedia::Track(Duration::from_secs(10)));
        r.element.load("a.mp3");
        r.element.seek(Duration::from_secs(5));
        assert_eq!(r.element.position(), Duration::ZERO);

        settle().await;
        r.element.seek(Duration::from_secs(50));
        assert_eq!(r.element.position(), Duration::from_secs(10));
    }

    #[tokio::test(start_paused = true)]
    async fn test_volume_is_clamped_and_deduplicated() {
        let mut r = rig();
        r.element.set_volume(2.0);
        r.element.set_volume(1.0);
        r.element.set_volume(0.5);

        let volumes: Vec<_> = drain(&mut r.events);
        assert_eq!(volumes, vec![PlaybackEvent::VolumeChanged { volume: 0.5 }]);
        assert_eq!(r.element.snapshot().volume, 0.5);
    }
}
