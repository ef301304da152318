//! Silent, clock-driven media backend.
//!
//! Behaves like a real media element without touching an audio device:
//! sources "load" after a short latency, playback advances on a timer, and
//! the end of the source is reported once. Used by the test suite and by
//! `play --virtual` for headless runs.
//!
//! Sources can be scripted per URL with [`VirtualMedia`] to simulate missing
//! files or a refused play request.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;
use futures::future::{self, BoxFuture};
use parking_lot::Mutex;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

use super::backend::{
    BackendEvent, BackendEventStream, BackendEvents, MediaBackend, MediaError, SourceId,
    event_channel,
};

/// How a scripted URL behaves.
#[derive(Debug, Clone, PartialEq)]
pub enum VirtualMedia {
    /// A playable track of the given length
    Track(Duration),
    /// The resource cannot be fetched
    Unavailable(String),
    /// The resource loads, but every play request is refused
    Blocked(String),
}

/// A recorded call, for asserting what the element asked for.
#[derive(Debug, Clone, PartialEq)]
pub enum BackendCall {
    SetSource(String),
    Play(String),
    Pause,
    Seek(Duration),
    Volume(f32),
    Clear,
}

/// Timing knobs for the virtual clock.
#[derive(Debug, Clone, Copy)]
pub struct VirtualOptions {
    /// Time between `set_source` and the `Ready` signal
    pub load_latency: Duration,
    /// Interval between time updates while playing
    pub tick: Duration,
    /// Length of URLs that were not scripted
    pub default_duration: Duration,
}

impl Default for VirtualOptions {
    fn default() -> Self {
        Self {
            load_latency: Duration::from_millis(20),
            tick: Duration::from_millis(250),
            default_duration: Duration::from_secs(180),
        }
    }
}

struct Current {
    id: SourceId,
    url: String,
    media: VirtualMedia,
    ready: bool,
    failed: Option<String>,
    playing: bool,
    position: Duration,
    duration: Duration,
}

#[derive(Default)]
struct VirtualState {
    current: Option<Current>,
    /// Play requests waiting for the source to become ready
    waiting: Vec<oneshot::Sender<Result<(), MediaError>>>,
    ticker: Option<JoinHandle<()>>,
    loader: Option<JoinHandle<()>>,
    calls: Vec<BackendCall>,
}

impl VirtualState {
    fn stop_tasks(&mut self) {
        if let Some(t) = self.ticker.take() {
            t.abort();
        }
        if let Some(l) = self.loader.take() {
            l.abort();
        }
    }

    fn settle_waiting(&mut self, result: Result<(), MediaError>) {
        for tx in self.waiting.drain(..) {
            let _ = tx.send(result.clone());
        }
    }
}

/// A media backend driven by the tokio clock.
pub struct VirtualBackend {
    state: Arc<Mutex<VirtualState>>,
    scripted: Mutex<HashMap<String, VirtualMedia>>,
    events: BackendEvents,
    options: VirtualOptions,
}

impl VirtualBackend {
    /// Create a backend and the signal stream to hand to an audio element.
    pub fn new(options: VirtualOptions) -> (Arc<Self>, BackendEventStream) {
        let (events, stream) = event_channel();
        let backend = Arc::new(Self {
            state: Arc::new(Mutex::new(VirtualState::default())),
            scripted: Mutex::new(HashMap::new()),
            events,
            options,
        });
        (backend, stream)
    }

    /// Script how a URL behaves when loaded.
    pub fn insert(&self, url: impl Into<String>, media: VirtualMedia) {
        self.scripted.lock().insert(url.into(), media);
    }

    /// Every call received so far, oldest first.
    pub fn calls(&self) -> Vec<BackendCall> {
        self.state.lock().calls.clone()
    }

    /// Number of play requests issued while `url` was the source.
    pub fn play_calls(&self, url: &str) -> usize {
        self.state
            .lock()
            .calls
            .iter()
            .filter(|c| matches!(c, BackendCall::Play(u) if u == url))
            .count()
    }

    /// Current position of the loaded source.
    pub fn position(&self) -> Duration {
        self.state
            .lock()
            .current
            .as_ref()
            .map(|c| c.position)
            .unwrap_or_default()
    }

    /// Whether the clock is currently running.
    pub fn is_running(&self) -> bool {
        self.state
            .lock()
            .current
            .as_ref()
            .is_some_and(|c| c.playing)
    }

    fn media_for(&self, url: &str) -> VirtualMedia {
        self.scripted
            .lock()
            .get(url)
            .cloned()
            .unwrap_or(VirtualMedia::Track(self.options.default_duration))
    }
}

impl MediaBackend for VirtualBackend {
    fn set_source(&self, source: SourceId, url: &str) {
        let media = self.media_for(url);
        let mut st = self.state.lock();
        st.calls.push(BackendCall::SetSource(url.to_string()));
        st.stop_tasks();
        st.settle_waiting(Err(MediaError::Aborted));

        let duration = match &media {
            VirtualMedia::Track(d) => *d,
            _ => self.options.default_duration,
        };
        st.current = Some(Current {
            id: source,
            url: url.to_string(),
            media,
            ready: false,
            failed: None,
            playing: false,
            position: Duration::ZERO,
            duration,
        });

        let shared = Arc::clone(&self.state);
        let events = self.events.clone();
        let options = self.options;
        st.loader = Some(tokio::spawn(async move {
            tokio::time::sleep(options.load_latency).await;
            finish_load(&shared, &events, source, options.tick);
        }));
    }

    fn play(&self) -> BoxFuture<'static, Result<(), MediaError>> {
        let mut st = self.state.lock();
        let url = st.current.as_ref().map(|c| c.url.clone()).unwrap_or_default();
        st.calls.push(BackendCall::Play(url));

        let Some(cur) = st.current.as_ref() else {
            return future::ready(Err(MediaError::NoSource)).boxed();
        };
        if let Some(reason) = &cur.failed {
            return future::ready(Err(MediaError::LoadFailed(reason.clone()))).boxed();
        }
        if cur.ready {
            if let VirtualMedia::Blocked(reason) = &cur.media {
                return future::ready(Err(MediaError::NotAllowed(reason.clone()))).boxed();
            }
            if !cur.playing {
                start_clock(&mut st, &self.state, &self.events, self.options.tick);
            }
            return future::ready(Ok(())).boxed();
        }

        let (tx, rx) = oneshot::channel();
        st.waiting.push(tx);
        async move { rx.await.unwrap_or(Err(MediaError::Aborted)) }.boxed()
    }

    fn pause(&self) {
        let mut st = self.state.lock();
        st.calls.push(BackendCall::Pause);
        if let Some(t) = st.ticker.take() {
            t.abort();
        }
        if let Some(cur) = st.current.as_mut() {
            cur.playing = false;
        }
        st.settle_waiting(Err(MediaError::Aborted));
    }

    fn seek(&self, position: Duration) {
        let mut st = self.state.lock();
        st.calls.push(BackendCall::Seek(position));
        let Some(cur) = st.current.as_mut() else {
            return;
        };
        if !cur.ready {
            return;
        }
        cur.position = position.min(cur.duration);
        let _ = self.events.send(BackendEvent::TimeUpdate {
            source: cur.id,
            position: cur.position,
        });
    }

    fn set_volume(&self, volume: f32) {
        self.state.lock().calls.push(BackendCall::Volume(volume));
    }

    fn clear(&self) {
        let mut st = self.state.lock();
        st.calls.push(BackendCall::Clear);
        st.stop_tasks();
        st.settle_waiting(Err(MediaError::Aborted));
        st.current = None;
    }
}

/// Mark a source ready (or failed) and release waiting play requests.
fn finish_load(
    shared: &Arc<Mutex<VirtualState>>,
    events: &BackendEvents,
    source: SourceId,
    tick: Duration,
) {
    let mut st = shared.lock();
    st.loader = None;
    let Some(cur) = st.current.as_mut().filter(|c| c.id == source) else {
        return;
    };

    match cur.media.clone() {
        VirtualMedia::Unavailable(reason) => {
            cur.failed = Some(reason.clone());
            let _ = events.send(BackendEvent::Failed {
                source,
                error: MediaError::LoadFailed(reason.clone()),
            });
            st.settle_waiting(Err(MediaError::LoadFailed(reason)));
        }
        VirtualMedia::Blocked(reason) => {
            cur.ready = true;
            let _ = events.send(BackendEvent::Ready {
                source,
                duration: Some(cur.duration),
            });
            st.settle_waiting(Err(MediaError::NotAllowed(reason)));
        }
        VirtualMedia::Track(duration) => {
            cur.ready = true;
            let _ = events.send(BackendEvent::Ready {
                source,
                duration: Some(duration),
            });
            if !st.waiting.is_empty() {
                start_clock(&mut st, shared, events, tick);
                st.settle_waiting(Ok(()));
            }
        }
    }
}

fn start_clock(
    st: &mut VirtualState,
    shared: &Arc<Mutex<VirtualState>>,
    events: &BackendEvents,
    tick: Duration,
) {
    let Some(cur) = st.current.as_mut() else {
        return;
    };
    if cur.position >= cur.duration {
        // Playing an ended source starts it over
        cur.position = Duration::ZERO;
    }
    cur.playing = true;
    let source = cur.id;

    if let Some(t) = st.ticker.take() {
        t.abort();
    }
    st.ticker = Some(tokio::spawn(run_clock(
        Arc::clone(shared),
        events.clone(),
        source,
        tick,
    )));
}

async fn run_clock(
    shared: Arc<Mutex<VirtualState>>,
    events: BackendEvents,
    source: SourceId,
    tick: Duration,
) {
    loop {
        tokio::time::sleep(tick).await;
        let mut st = shared.lock();
        let Some(cur) = st.current.as_mut().filter(|c| c.id == source && c.playing) else {
            return;
        };
        cur.position = (cur.position + tick).min(cur.duration);
        let position = cur.position;
        let _ = events.send(BackendEvent::TimeUpdate { source, position });

        if position >= cur.duration {
            cur.playing = false;
            let _ = events.send(BackendEvent::Ended { source });
            st.ticker = None;
            return;
        }
    }
}
