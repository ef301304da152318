//! Event-style entry point for starting tracks.
//!
//! Older callers announce a selection instead of calling the coordinator:
//! they send a `TrackSelected` signal, or an explicit `PlayTrack` request.
//! A listener task turns both into [`PlaybackService::play_track`], so there
//! is exactly one code path that changes the current track.

use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use super::coordinator::PlaybackService;
use crate::model::TrackDescriptor;

/// A request arriving on the selection channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SelectionRequest {
    /// Legacy "a row was selected" signal
    TrackSelected(TrackDescriptor),
    /// Explicit request to play a track
    PlayTrack(TrackDescriptor),
}

impl SelectionRequest {
    fn into_track(self) -> TrackDescriptor {
        match self {
            SelectionRequest::TrackSelected(track) | SelectionRequest::PlayTrack(track) => track,
        }
    }
}

/// Sending half of the selection channel. Cheap to clone.
#[derive(Debug, Clone)]
pub struct SelectionSender {
    tx: mpsc::UnboundedSender<SelectionRequest>,
}

impl SelectionSender {
    /// Send a request. Returns `false` if the listener has stopped.
    pub fn send(&self, request: SelectionRequest) -> bool {
        self.tx.send(request).is_ok()
    }

    /// Announce a selected track (legacy signal).
    pub fn track_selected(&self, track: TrackDescriptor) -> bool {
        self.send(SelectionRequest::TrackSelected(track))
    }

    /// Ask for a track to be played.
    pub fn play_track(&self, track: TrackDescriptor) -> bool {
        self.send(SelectionRequest::PlayTrack(track))
    }
}

/// Start the listener. It runs until every sender has been dropped.
pub fn listen(service: &PlaybackService) -> (SelectionSender, JoinHandle<()>) {
    let (tx, mut rx) = mpsc::unbounded_channel::<SelectionRequest>();
    let service = service.clone();
    let handle = tokio::spawn(async move {
        while let Some(request) = rx.recv().await {
            let track = request.into_track();
            let id = track.id.clone();
            // Errors are already reported to the user by the service
            if let Err(e) = service.play_track(track) {
                tracing::debug!(track_id = %id, "Selection not played: {}", e);
            }
        }
        tracing::debug!("Selection listener stopped");
    });
    (SelectionSender { tx }, handle)
}
