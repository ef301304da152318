//! The media backend seam.
//!
//! A backend owns whatever actually produces sound for one source at a time.
//! Its contract mirrors a browser media element: assigning a source is
//! synchronous, a play request completes later (and may be aborted), and
//! progress is reported as signals.
//!
//! Every signal carries the [`SourceId`] it belongs to. The audio element
//! drops signals for sources it has already replaced, so backends never need
//! to flush in-flight work before accepting a new source.

use std::time::Duration;

use futures::future::BoxFuture;
use tokio::sync::mpsc;

/// Identity of one `set_source` assignment. Strictly increasing per element.
pub type SourceId = u64;

/// Signals flowing from a backend to its audio element.
pub type BackendEvents = mpsc::UnboundedSender<BackendEvent>;
pub type BackendEventStream = mpsc::UnboundedReceiver<BackendEvent>;

/// Create the backend signal channel.
pub fn event_channel() -> (BackendEvents, BackendEventStream) {
    mpsc::unbounded_channel()
}

/// Why a backend could not do what it was asked.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MediaError {
    /// The request was abandoned because the source changed or playback was paused
    #[error("Play request aborted")]
    Aborted,

    /// The backend refused to start (device busy, policy, ...)
    #[error("Playback not allowed: {0}")]
    NotAllowed(String),

    /// The source could not be fetched or decoded
    #[error("Source could not be loaded: {0}")]
    LoadFailed(String),

    /// No source assigned
    #[error("No source assigned")]
    NoSource,
}

/// A signal from the backend about one source.
#[derive(Debug, Clone, PartialEq)]
pub enum BackendEvent {
    /// Source metadata is available and playback can start
    Ready {
        source: SourceId,
        duration: Option<Duration>,
    },
    /// Playback position advanced (or jumped after a seek)
    TimeUpdate { source: SourceId, position: Duration },
    /// Playback reached the end of the source
    Ended { source: SourceId },
    /// The source failed to load or decode
    Failed { source: SourceId, error: MediaError },
}

impl BackendEvent {
    pub fn source(&self) -> SourceId {
        match self {
            BackendEvent::Ready { source, .. }
            | BackendEvent::TimeUpdate { source, .. }
            | BackendEvent::Ended { source }
            | BackendEvent::Failed { source, .. } => *source,
        }
    }
}

/// Low-level control surface of a single playable resource.
pub trait MediaBackend: Send + Sync {
    /// Replace the current source. Resets position to zero and does not
    /// start playback. Pending play requests for the old source resolve
    /// with [`MediaError::Aborted`].
    fn set_source(&self, source: SourceId, url: &str);

    /// Request playback of the current source.
    ///
    /// Resolves once audio is actually running. If the source is still
    /// loading, the request waits for it.
    fn play(&self) -> BoxFuture<'static, Result<(), MediaError>>;

    /// Stop producing sound, keeping the position.
    fn pause(&self);

    /// Jump to a position in the current source.
    fn seek(&self, position: Duration);

    /// Set output volume (0.0 - 1.0).
    fn set_volume(&self, volume: f32);

    /// Drop the current source entirely.
    fn clear(&self);
}
