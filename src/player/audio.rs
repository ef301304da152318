//! Audio output using cpal.
//!
//! A dedicated thread owns the output stream and the decoder. It:
//! - Takes commands from [`DeviceBackend`] over a crossbeam channel
//! - Decodes ahead into a small bounded buffer
//! - Reports readiness, position and end of stream as backend signals
//!
//! The stream callback only copies samples and applies volume.

use std::path::PathBuf;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Device, SampleFormat, Stream, StreamConfig};
use crossbeam_channel::{Receiver, RecvTimeoutError, SendTimeoutError, Sender, bounded, unbounded};
use futures::FutureExt;
use futures::future::BoxFuture;
use parking_lot::{Mutex, RwLock};
use reqwest::Url;
use tokio::sync::oneshot;

use super::PlaybackError;
use super::backend::{
    BackendEvent, BackendEventStream, BackendEvents, MediaBackend, MediaError, SourceId,
    event_channel,
};
use super::decoder::{AudioDecoder, MediaData};

/// Decoded chunks buffered ahead of the output callback
const AUDIO_BUFFER_CHUNKS: usize = 8;
/// Command poll interval while nothing is playing
const IDLE_POLL: Duration = Duration::from_millis(100);
/// How long the decoder waits for buffer space before checking commands again
const SEND_TIMEOUT: Duration = Duration::from_millis(20);

/// List output device names on the default host.
pub fn list_audio_devices() -> Result<Vec<String>, PlaybackError> {
    let host = cpal::default_host();
    let devices = host
        .output_devices()
        .map_err(|e| PlaybackError::AudioInit(e.to_string()))?;
    Ok(devices.filter_map(|d| d.name().ok()).collect())
}

/// Output state shared between the audio thread and the stream callback.
#[derive(Debug)]
struct OutputState {
    playing: bool,
    volume: f32,
    source: SourceId,
    position: Duration,
    underruns: u64,
}

impl Default for OutputState {
    fn default() -> Self {
        Self {
            playing: false,
            volume: 1.0,
            source: 0,
            position: Duration::ZERO,
            underruns: 0,
        }
    }
}

enum DeviceCommand {
    SetSource(SourceId),
    Open { source: SourceId, media: MediaData },
    LoadFailed { source: SourceId, reason: String },
    Play(oneshot::Sender<Result<(), MediaError>>),
    Pause,
    Seek(Duration),
    Clear,
    Shutdown,
}

/// A chunk of audio samples, tagged with the source it was decoded from.
struct AudioChunk {
    source: SourceId,
    samples: Vec<f32>,
    timestamp: Duration,
}

/// Where a resolved URL points.
#[derive(Debug, PartialEq, Eq)]
enum Location {
    Local(PathBuf),
    Remote(Url),
}

fn classify(url: &str) -> Result<Location, String> {
    match Url::parse(url) {
        Ok(parsed) if matches!(parsed.scheme(), "http" | "https") => Ok(Location::Remote(parsed)),
        Ok(parsed) if parsed.scheme() == "file" => parsed
            .to_file_path()
            .map(Location::Local)
            .map_err(|_| format!("Invalid file URL: {}", url)),
        Ok(parsed) if parsed.scheme().len() > 1 => {
            Err(format!("Unsupported scheme '{}'", parsed.scheme()))
        }
        // Plain paths, including Windows drive letters
        _ => Ok(Location::Local(PathBuf::from(url))),
    }
}

fn url_extension(url: &Url) -> Option<String> {
    url.path_segments()
        .and_then(|mut segments| segments.next_back())
        .and_then(|name| name.rsplit_once('.'))
        .map(|(_, ext)| ext.to_ascii_lowercase())
        .filter(|ext| !ext.is_empty())
}

/// Plays sources through the system output device.
pub struct DeviceBackend {
    commands: Sender<DeviceCommand>,
    output: Arc<RwLock<OutputState>>,
    http: reqwest::Client,
    fetch: Mutex<Option<tokio::task::JoinHandle<()>>>,
    thread: Mutex<Option<JoinHandle<()>>>,
}

impl DeviceBackend {
    /// Open the output device and start the audio thread.
    ///
    /// `device` selects an output by (case-insensitive) name fragment.
    /// `tick` is how often position updates are reported while playing.
    pub fn open(
        device: Option<&str>,
        tick: Duration,
    ) -> Result<(Arc<Self>, BackendEventStream), PlaybackError> {
        let (signals, signal_rx) = event_channel();
        let (command_tx, command_rx) = unbounded::<DeviceCommand>();
        let (init_tx, init_rx) = bounded::<Result<(), PlaybackError>>(1);
        let output = Arc::new(RwLock::new(OutputState::default()));

        let device = device.map(str::to_string);
        let thread_output = Arc::clone(&output);
        let thread = thread::Builder::new()
            .name("audio-output".to_string())
            .spawn(move || {
                // The stream must live on the thread that created it
                let (_stream, sink) = match open_stream(device.as_deref(), &thread_output) {
                    Ok(parts) => parts,
                    Err(e) => {
                        let _ = init_tx.send(Err(e));
                        return;
                    }
                };
                let _ = init_tx.send(Ok(()));
                audio_thread_main(thread_output, command_rx, sink, signals, tick);
            })
            .map_err(|e| PlaybackError::AudioInit(e.to_string()))?;

        match init_rx.recv() {
            Ok(Ok(())) => {}
            Ok(Err(e)) => return Err(e),
            Err(_) => {
                return Err(PlaybackError::AudioInit(
                    "audio thread exited during startup".to_string(),
                ));
            }
        }

        let backend = Arc::new(Self {
            commands: command_tx,
            output,
            http: reqwest::Client::new(),
            fetch: Mutex::new(None),
            thread: Mutex::new(Some(thread)),
        });
        Ok((backend, signal_rx))
    }

    fn send(&self, command: DeviceCommand) {
        if self.commands.send(command).is_err() {
            tracing::warn!("Audio thread is gone; command dropped");
        }
    }

    fn cancel_fetch(&self) {
        if let Some(fetch) = self.fetch.lock().take() {
            fetch.abort();
        }
    }

    fn start_fetch(&self, source: SourceId, url: Url) {
        let http = self.http.clone();
        let commands = self.commands.clone();
        let handle = tokio::spawn(async move {
            let extension = url_extension(&url);
            tracing::debug!(source, %url, "Fetching audio");
            let command = match fetch_bytes(&http, url).await {
                Ok(data) => DeviceCommand::Open {
                    source,
                    media: MediaData::Bytes { data, extension },
                },
                Err(reason) => DeviceCommand::LoadFailed { source, reason },
            };
            let _ = commands.send(command);
        });
        *self.fetch.lock() = Some(handle);
    }
}

async fn fetch_bytes(http: &reqwest::Client, url: Url) -> Result<Vec<u8>, String> {
    let response = http
        .get(url)
        .send()
        .await
        .map_err(|e| e.to_string())?
        .error_for_status()
        .map_err(|e| e.to_string())?;
    let bytes = response.bytes().await.map_err(|e| e.to_string())?;
    Ok(bytes.to_vec())
}

impl MediaBackend for DeviceBackend {
    fn set_source(&self, source: SourceId, url: &str) {
        self.cancel_fetch();
        self.send(DeviceCommand::SetSource(source));

        match classify(url) {
            Ok(Location::Local(path)) => self.send(DeviceCommand::Open {
                source,
                media: MediaData::File(path),
            }),
            Ok(Location::Remote(url)) => self.start_fetch(source, url),
            Err(reason) => self.send(DeviceCommand::LoadFailed { source, reason }),
        }
    }

    fn play(&self) -> BoxFuture<'static, Result<(), MediaError>> {
        let (reply, rx) = oneshot::channel();
        let sent = self.commands.send(DeviceCommand::Play(reply)).is_ok();
        async move {
            if !sent {
                return Err(MediaError::NotAllowed("audio output stopped".to_string()));
            }
            rx.await.unwrap_or(Err(MediaError::Aborted))
        }
        .boxed()
    }

    fn pause(&self) {
        self.send(DeviceCommand::Pause);
    }

    fn seek(&self, position: Duration) {
        self.send(DeviceCommand::Seek(position));
    }

    fn set_volume(&self, volume: f32) {
        self.output.write().volume = volume.clamp(0.0, 1.0);
    }

    fn clear(&self) {
        self.cancel_fetch();
        self.send(DeviceCommand::Clear);
    }
}

impl Drop for DeviceBackend {
    fn drop(&mut self) {
        self.cancel_fetch();
        let _ = self.commands.send(DeviceCommand::Shutdown);
        if let Some(thread) = self.thread.lock().take()
            && thread.join().is_err()
        {
            tracing::error!("Audio thread panicked");
        }
        let underruns = self.output.read().underruns;
        if underruns > 0 {
            tracing::warn!(underruns, "Audio output ran dry during playback");
        }
    }
}

/// Open the output device and start its stream.
fn open_stream(
    preferred: Option<&str>,
    output: &Arc<RwLock<OutputState>>,
) -> Result<(Stream, OutputSink), PlaybackError> {
    let host = cpal::default_host();
    let device = select_device(&host, preferred)?;

    let device_name = device.name().unwrap_or_else(|_| "Unknown".to_string());
    tracing::info!("Using audio device: {}", device_name);

    let supported_config = device
        .default_output_config()
        .map_err(|e| PlaybackError::AudioInit(e.to_string()))?;

    let sample_rate = supported_config.sample_rate().0;
    let channels = supported_config.channels();
    tracing::info!("Audio format: {}Hz, {} channels", sample_rate, channels);

    let config = StreamConfig {
        channels,
        sample_rate: supported_config.sample_rate(),
        buffer_size: cpal::BufferSize::Default,
    };

    // Carries decoded audio from the audio thread to the output callback
    let (audio_tx, audio_rx) = bounded::<AudioChunk>(AUDIO_BUFFER_CHUNKS);
    let callback_output = Arc::clone(output);

    let stream = match supported_config.sample_format() {
        SampleFormat::F32 => build_stream::<f32>(&device, &config, audio_rx, callback_output),
        SampleFormat::I16 => build_stream::<i16>(&device, &config, audio_rx, callback_output),
        SampleFormat::U16 => build_stream::<u16>(&device, &config, audio_rx, callback_output),
        format => {
            return Err(PlaybackError::AudioInit(format!(
                "Unsupported sample format: {:?}",
                format
            )));
        }
    }
    .map_err(|e| PlaybackError::AudioInit(e.to_string()))?;

    stream
        .play()
        .map_err(|e| PlaybackError::AudioInit(e.to_string()))?;

    Ok((
        stream,
        OutputSink {
            tx: audio_tx,
            sample_rate,
            channels,
        },
    ))
}

/// Pick the output device: the configured one, else headphones, else the default.
fn select_device(host: &cpal::Host, preferred: Option<&str>) -> Result<Device, PlaybackError> {
    let devices: Vec<Device> = host
        .output_devices()
        .map_err(|e| PlaybackError::AudioInit(e.to_string()))?
        .collect();

    for device in &devices {
        if let Ok(name) = device.name() {
            tracing::debug!("Available audio device: {}", name);
        }
    }

    if let Some(wanted) = preferred.map(str::to_lowercase) {
        let found = devices.iter().find(|d| {
            d.name()
                .map(|n| n.to_lowercase().contains(&wanted))
                .unwrap_or(false)
        });
        match found {
            Some(device) => return Ok(device.clone()),
            None => tracing::warn!("Output device '{}' not found, using default", wanted),
        }
    }

    let headphone_keywords = ["headphone", "headset", "earphone", "airpod", "buds"];
    for device in &devices {
        if let Ok(name) = device.name() {
            let name_lower = name.to_lowercase();
            if headphone_keywords.iter().any(|k| name_lower.contains(k)) {
                tracing::info!("Selected headphones: {}", name);
                return Ok(device.clone());
            }
        }
    }

    host.default_output_device()
        .ok_or_else(|| PlaybackError::AudioInit("No output device found".to_string()))
}

/// Build the output stream for any sample type cpal supports.
fn build_stream<T>(
    device: &Device,
    config: &StreamConfig,
    audio_rx: Receiver<AudioChunk>,
    output: Arc<RwLock<OutputState>>,
) -> Result<Stream, cpal::BuildStreamError>
where
    T: cpal::SizedSample + cpal::FromSample<f32>,
{
    let mut chunk_buffer: Option<(AudioChunk, usize)> = None;

    device.build_output_stream(
        config,
        move |data: &mut [T], _: &cpal::OutputCallbackInfo| {
            let (playing, volume, source) = {
                let s = output.read();
                (s.playing, s.volume, s.source)
            };

            if !playing {
                data.fill(T::from_sample(0.0f32));
                return;
            }

            let mut output_pos = 0;
            while output_pos < data.len() {
                if chunk_buffer.is_none() {
                    match audio_rx.try_recv() {
                        // Leftovers from a replaced source
                        Ok(chunk) if chunk.source != source => continue,
                        Ok(chunk) => {
                            output.write().position = chunk.timestamp;
                            chunk_buffer = Some((chunk, 0));
                        }
                        Err(_) => {
                            output.write().underruns += 1;
                            data[output_pos..].fill(T::from_sample(0.0f32));
                            return;
                        }
                    }
                }

                if let Some((ref chunk, ref mut chunk_pos)) = chunk_buffer {
                    let to_copy = (chunk.samples.len() - *chunk_pos).min(data.len() - output_pos);
                    for i in 0..to_copy {
                        let sample = chunk.samples[*chunk_pos + i] * volume;
                        data[output_pos + i] = T::from_sample(sample);
                    }

                    *chunk_pos += to_copy;
                    output_pos += to_copy;

                    if *chunk_pos >= chunk.samples.len() {
                        chunk_buffer = None;
                    }
                }
            }
        },
        |err| {
            tracing::error!("Audio stream error: {}", err);
        },
        None,
    )
}

/// The audio thread's end of the sample buffer.
struct OutputSink {
    tx: Sender<AudioChunk>,
    sample_rate: u32,
    channels: u16,
}

/// Reshape interleaved samples from one channel count to another.
fn remap_channels(samples: Vec<f32>, from: u16, to: u16) -> Vec<f32> {
    let (from, to) = (from.max(1) as usize, to.max(1) as usize);
    if from == to {
        return samples;
    }
    let frames = samples.len() / from;
    let mut out = Vec::with_capacity(frames * to);
    for frame in samples.chunks_exact(from) {
        for ch in 0..to {
            // Mono is duplicated; extra inputs are dropped
            out.push(frame[ch.min(from - 1)]);
        }
    }
    out
}

/// Audio thread context - everything the thread owns between commands.
struct AudioThreadContext {
    decoder: Option<AudioDecoder>,
    /// Source the thread is working on (0 = none)
    source: SourceId,
    failed: Option<String>,
    waiting: Vec<oneshot::Sender<Result<(), MediaError>>>,
    pending_chunk: Option<AudioChunk>,
    finished_decoding: bool,
    ended: bool,
    last_reported: Option<Duration>,
    signals: BackendEvents,
    tick: Duration,
}

impl AudioThreadContext {
    fn new(signals: BackendEvents, tick: Duration) -> Self {
        Self {
            decoder: None,
            source: 0,
            failed: None,
            waiting: Vec::new(),
            pending_chunk: None,
            finished_decoding: false,
            ended: false,
            last_reported: None,
            signals,
            tick,
        }
    }

    fn emit(&self, event: BackendEvent) {
        let _ = self.signals.send(event);
    }

    fn settle_waiting(&mut self, result: Result<(), MediaError>) {
        for reply in self.waiting.drain(..) {
            let _ = reply.send(result.clone());
        }
    }

    /// Forget the current source entirely.
    fn reset(&mut self, source: SourceId, output: &RwLock<OutputState>) {
        self.settle_waiting(Err(MediaError::Aborted));
        self.decoder = None;
        self.source = source;
        self.failed = None;
        self.pending_chunk = None;
        self.finished_decoding = false;
        self.ended = false;
        self.last_reported = None;

        let mut s = output.write();
        s.playing = false;
        s.source = source;
        s.position = Duration::ZERO;
    }

    /// Handle a command, returning whether to keep running.
    fn handle_command(
        &mut self,
        cmd: DeviceCommand,
        output: &RwLock<OutputState>,
        sink: &OutputSink,
    ) -> bool {
        match cmd {
            DeviceCommand::SetSource(source) => self.reset(source, output),
            DeviceCommand::Clear => self.reset(0, output),
            DeviceCommand::Open { source, media } if source == self.source => {
                self.open(media, output, sink);
            }
            DeviceCommand::LoadFailed { source, reason } if source == self.source => {
                self.fail(reason);
            }
            // Results for a source that has since been replaced
            DeviceCommand::Open { .. } | DeviceCommand::LoadFailed { .. } => {}
            DeviceCommand::Play(reply) => self.play(reply, output),
            DeviceCommand::Pause => {
                output.write().playing = false;
                self.settle_waiting(Err(MediaError::Aborted));
            }
            DeviceCommand::Seek(position) => self.seek(position, output),
            DeviceCommand::Shutdown => {
                self.settle_waiting(Err(MediaError::Aborted));
                return false;
            }
        }
        true
    }

    fn open(&mut self, media: MediaData, output: &RwLock<OutputState>, sink: &OutputSink) {
        match AudioDecoder::open(media) {
            Ok(dec) => {
                if dec.sample_rate() != sink.sample_rate {
                    tracing::warn!(
                        "Source is {}Hz but output runs at {}Hz; pitch will be off",
                        dec.sample_rate(),
                        sink.sample_rate
                    );
                }
                let duration = Some(dec.duration()).filter(|d| !d.is_zero());
                self.decoder = Some(dec);
                self.emit(BackendEvent::Ready {
                    source: self.source,
                    duration,
                });
                if !self.waiting.is_empty() {
                    output.write().playing = true;
                    self.settle_waiting(Ok(()));
                }
            }
            Err(e) => {
                let reason = match e {
                    MediaError::LoadFailed(reason) => reason,
                    other => other.to_string(),
                };
                self.fail(reason);
            }
        }
    }

    fn fail(&mut self, reason: String) {
        tracing::warn!(source = self.source, "Audio failed to load: {}", reason);
        self.failed = Some(reason.clone());
        let error = MediaError::LoadFailed(reason);
        self.emit(BackendEvent::Failed {
            source: self.source,
            error: error.clone(),
        });
        self.settle_waiting(Err(error));
    }

    fn play(&mut self, reply: oneshot::Sender<Result<(), MediaError>>, output: &RwLock<OutputState>) {
        if self.source == 0 {
            let _ = reply.send(Err(MediaError::NoSource));
            return;
        }
        if let Some(reason) = &self.failed {
            let _ = reply.send(Err(MediaError::LoadFailed(reason.clone())));
            return;
        }
        if self.decoder.is_none() {
            self.waiting.push(reply);
            return;
        }
        if self.ended {
            self.seek(Duration::ZERO, output);
        }
        output.write().playing = true;
        let _ = reply.send(Ok(()));
    }

    fn seek(&mut self, position: Duration, output: &RwLock<OutputState>) {
        let Some(ref mut dec) = self.decoder else {
            return;
        };
        if let Err(e) = dec.seek(position) {
            tracing::warn!("Seek failed: {}", e);
            return;
        }
        self.pending_chunk = None;
        self.finished_decoding = false;
        self.ended = false;
        output.write().position = position;
        self.last_reported = Some(position);
        self.emit(BackendEvent::TimeUpdate {
            source: self.source,
            position,
        });
    }

    /// Decode ahead into the output buffer. Returns false if the output is gone.
    fn pump_audio(&mut self, output: &RwLock<OutputState>, sink: &OutputSink) -> bool {
        if self.finished_decoding {
            if sink.tx.is_empty() && !self.ended {
                // Let the callback play out what it already holds
                thread::sleep(SEND_TIMEOUT);
                self.ended = true;
                output.write().playing = false;
                tracing::info!(source = self.source, "Playback finished");
                self.emit(BackendEvent::Ended { source: self.source });
            } else {
                thread::sleep(Duration::from_millis(10));
            }
            return true;
        }

        let chunk = match self.pending_chunk.take() {
            Some(chunk) => chunk,
            None => {
                let Some(ref mut dec) = self.decoder else {
                    thread::sleep(Duration::from_millis(10));
                    return true;
                };
                let mut samples = Vec::with_capacity(4096);
                match dec.decode_next(|s| samples.extend_from_slice(s)) {
                    Ok(Some(frame)) => AudioChunk {
                        source: self.source,
                        samples: remap_channels(samples, dec.channels(), sink.channels),
                        timestamp: frame.timestamp,
                    },
                    Ok(None) => {
                        self.finished_decoding = true;
                        return true;
                    }
                    Err(e) => {
                        tracing::error!("Decode error: {}", e);
                        self.finished_decoding = true;
                        return true;
                    }
                }
            }
        };

        match sink.tx.send_timeout(chunk, SEND_TIMEOUT) {
            Ok(()) => true,
            Err(SendTimeoutError::Timeout(chunk)) => {
                self.pending_chunk = Some(chunk);
                true
            }
            Err(SendTimeoutError::Disconnected(_)) => false,
        }
    }

    fn report_position(&mut self, output: &RwLock<OutputState>) {
        let position = output.read().position;
        let due = match self.last_reported {
            Some(last) => position.abs_diff(last) >= self.tick,
            None => true,
        };
        if due {
            self.last_reported = Some(position);
            self.emit(BackendEvent::TimeUpdate {
                source: self.source,
                position,
            });
        }
    }
}

/// Main loop for the audio thread.
fn audio_thread_main(
    output: Arc<RwLock<OutputState>>,
    command_rx: Receiver<DeviceCommand>,
    sink: OutputSink,
    signals: BackendEvents,
    tick: Duration,
) {
    let mut ctx = AudioThreadContext::new(signals, tick);

    loop {
        let playing = output.read().playing;

        // Block on commands when idle, poll when playing
        let command = if playing {
            command_rx.try_recv().ok()
        } else {
            match command_rx.recv_timeout(IDLE_POLL) {
                Ok(cmd) => Some(cmd),
                Err(RecvTimeoutError::Timeout) => None,
                Err(RecvTimeoutError::Disconnected) => break,
            }
        };

        if let Some(cmd) = command
            && !ctx.handle_command(cmd, &output, &sink)
        {
            break;
        }

        if output.read().playing {
            if !ctx.pump_audio(&output, &sink) {
                break;
            }
            if !ctx.ended {
                ctx.report_position(&output);
            }
        }
    }

    tracing::debug!("Audio thread stopped");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_locations() {
        assert_eq!(
            classify("https://cdn.example.com/a.mp3").unwrap(),
            Location::Remote(Url::parse("https://cdn.example.com/a.mp3").unwrap())
        );
        assert_eq!(
            classify("/music/a.flac").unwrap(),
            Location::Local(PathBuf::from("/music/a.flac"))
        );
        assert!(classify("ftp://host/a.mp3").is_err());
    }

    #[cfg(unix)]
    #[test]
    fn test_classify_file_url() {
        assert_eq!(
            classify("file:///music/My%20Song.mp3").unwrap(),
            Location::Local(PathBuf::from("/music/My Song.mp3"))
        );
    }

    #[test]
    fn test_url_extension() {
        let url = Url::parse("https://x.co/a/b/Track.FLAC?token=1").unwrap();
        assert_eq!(url_extension(&url).as_deref(), Some("flac"));
        let url = Url::parse("https://x.co/stream").unwrap();
        assert_eq!(url_extension(&url), None);
    }

    #[test]
    fn test_remap_mono_to_stereo() {
        assert_eq!(
            remap_channels(vec![0.1, 0.2], 1, 2),
            vec![0.1, 0.1, 0.2, 0.2]
        );
    }

    #[test]
    fn test_remap_drops_extra_channels() {
        let six = vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0];
        assert_eq!(remap_channels(six, 6, 2), vec![1.0, 2.0]);
    }
}
