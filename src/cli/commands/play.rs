//! Headless playback of a single track.

use std::io::Write;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use tokio::runtime::Runtime;
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::sync::watch;

use super::{Cli, open_catalog};
use crate::config::Config;
use crate::model::TrackDescriptor;
use crate::player::backend::BackendEventStream;
use crate::player::selection::listen;
use crate::player::{
    DeviceBackend, MediaBackend, PlaybackEvent, PlaybackService, ServiceOptions, SourceResolver,
    VirtualBackend, VirtualOptions,
};
use crate::ui::notify::NoticeLevel;
use crate::ui::now_playing::{self, NowPlayingView};
use crate::ui::toast::{SharedToasts, Toast, ToastSettings};

/// How often pending toasts are checked when no event arrives
const NOTICE_POLL: Duration = Duration::from_millis(250);

/// Play one track through the coordinator until it ends or Ctrl-C
pub fn cmd_play(
    rt: &Runtime,
    cli: &Cli,
    config: &Config,
    track_id: &str,
    virtual_output: bool,
    json: bool,
) -> anyhow::Result<()> {
    rt.block_on(async {
        let catalog = open_catalog(cli, config)?;
        let track = catalog
            .track(track_id)
            .await
            .with_context(|| format!("Looking up track {}", track_id))?;

        let resolver = SourceResolver::new(config.storage.base_url.as_deref())?;
        let (backend, signals) = open_backend(config, &track, virtual_output)?;
        let toasts = SharedToasts::new(ToastSettings::from(&config.notifications));
        let service = PlaybackService::new(
            backend,
            signals,
            resolver,
            Arc::new(toasts.clone()),
            ServiceOptions::from(&config.playback),
        );

        let events = service.subscribe();
        let (view, view_task) = now_playing::bind(service.subscribe());
        let (selection, listener) = listen(&service);
        selection.play_track(track);

        let outcome = follow(&service, events, view, &toasts, json).await;

        drop(selection);
        view_task.abort();
        if let Err(e) = listener.await {
            tracing::debug!("Selection listener ended abnormally: {}", e);
        }
        outcome
    })
}

fn open_backend(
    config: &Config,
    track: &TrackDescriptor,
    virtual_output: bool,
) -> anyhow::Result<(Arc<dyn MediaBackend>, BackendEventStream)> {
    if virtual_output {
        let mut options = VirtualOptions {
            tick: config.playback.tick(),
            ..Default::default()
        };
        if let Some(secs) = track.duration_secs.filter(|s| *s > 0) {
            options.default_duration = Duration::from_secs(u64::from(secs));
        }
        let (backend, signals) = VirtualBackend::new(options);
        let backend: Arc<dyn MediaBackend> = backend;
        return Ok((backend, signals));
    }

    let (backend, signals) =
        DeviceBackend::open(config.playback.output_device(), config.playback.tick())?;
    let backend: Arc<dyn MediaBackend> = backend;
    Ok((backend, signals))
}

/// Print progress until the track ends, an error is reported, or the user
/// interrupts.
///
/// Failures (missing audio, load errors, a refused play) reach the user as
/// toasts; the first error toast ends the command.
async fn follow(
    service: &PlaybackService,
    mut events: broadcast::Receiver<PlaybackEvent>,
    mut view: watch::Receiver<NowPlayingView>,
    toasts: &SharedToasts,
    json: bool,
) -> anyhow::Result<()> {
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);
    let mut poll = tokio::time::interval(NOTICE_POLL);
    let mut last_toast = None;

    let outcome = loop {
        tokio::select! {
            _ = &mut ctrl_c => {
                service.pause();
                break Ok(());
            }
            changed = view.changed(), if !json => {
                if changed.is_err() {
                    break Ok(());
                }
                let line = view.borrow_and_update().status_line();
                print!("\r\x1b[2K{}", line);
                std::io::stdout().flush()?;
            }
            event = events.recv() => match event {
                Ok(event) => {
                    if json {
                        println!("{}", serde_json::to_string(&event)?);
                    }
                    if event == PlaybackEvent::Ended {
                        break Ok(());
                    }
                }
                Err(RecvError::Lagged(missed)) => {
                    tracing::debug!(missed, "Output fell behind playback events");
                }
                Err(RecvError::Closed) => break Ok(()),
            },
            _ = poll.tick() => {}
        }

        let fresh = toasts.since(last_toast);
        if let Some(toast) = fresh.last() {
            last_toast = Some(toast.id());
        }
        if let Some(failure) = show_toasts(&fresh, json) {
            break Err(anyhow::anyhow!(failure));
        }
    };

    if !json {
        println!();
    }
    outcome
}

/// Render toasts on stderr. Returns the first error, if any.
fn show_toasts(toasts: &[Toast], json: bool) -> Option<String> {
    let mut failure = None;
    for toast in toasts {
        if !json {
            eprintln!();
        }
        eprintln!("{}: {}", toast.title(), toast.description());
        if toast.level() == NoticeLevel::Error && failure.is_none() {
            failure = Some(format!("{}: {}", toast.title(), toast.description()));
        }
    }
    failure
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::player::VirtualMedia;
    use crate::test_utils::{ServiceRig, descriptor};

    async fn follow_rig(rig: &ServiceRig, track: TrackDescriptor) -> anyhow::Result<()> {
        let events = rig.service.subscribe();
        let (view, _view_task) = now_playing::bind(rig.service.subscribe());
        let (selection, _listener) = listen(&rig.service);
        selection.play_track(track);
        tokio::time::timeout(
            Duration::from_secs(60),
            follow(&rig.service, events, view, &rig.toasts, true),
        )
        .await
        .expect("follow should finish on its own")
    }

    #[tokio::test(start_paused = true)]
    async fn test_follow_stops_at_end_of_track() {
        let rig = ServiceRig::new();
        rig.backend
            .insert("/audio/a.mp3", VirtualMedia::Track(Duration::from_secs(2)));

        follow_rig(&rig, descriptor("a", "/audio/a.mp3"))
            .await
            .unwrap();
        assert_eq!(rig.toasts.error_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_follow_stops_when_play_is_refused_after_ready() {
        let rig = ServiceRig::new();
        rig.backend
            .insert("/audio/a.mp3", VirtualMedia::Blocked("autoplay".into()));

        let err = follow_rig(&rig, descriptor("a", "/audio/a.mp3"))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("Playback blocked"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_follow_stops_when_audio_fails_to_load() {
        let rig = ServiceRig::new();
        rig.backend
            .insert("/audio/gone.mp3", VirtualMedia::Unavailable("HTTP 404".into()));

        let err = follow_rig(&rig, descriptor("g", "/audio/gone.mp3"))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("HTTP 404"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_follow_stops_for_track_without_audio() {
        let rig = ServiceRig::new();

        let err = follow_rig(&rig, TrackDescriptor::new("t3", "Silent"))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("No audio available"));
    }
}
