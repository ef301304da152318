//! Audio decoder using symphonia for multi-format support.
//!
//! Supported formats:
//! - MP3
//! - FLAC
//! - OGG Vorbis
//! - WAV/PCM
//! - AAC (in MP4 container)
//!
//! Input is either a local file or a fully downloaded remote resource held
//! in memory.

use std::fs::File;
use std::io::Cursor;
use std::path::PathBuf;
use std::time::Duration;

use symphonia::core::audio::{AudioBufferRef, Signal};
use symphonia::core::codecs::{CODEC_TYPE_NULL, Decoder, DecoderOptions};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::{FormatOptions, FormatReader, SeekMode, SeekTo};
use symphonia::core::io::{MediaSource, MediaSourceStream};
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;
use symphonia::core::units::Time;

use super::backend::MediaError;

/// Where the encoded audio comes from.
#[derive(Debug, Clone)]
pub enum MediaData {
    /// A file on disk
    File(PathBuf),
    /// A downloaded resource
    Bytes {
        data: Vec<u8>,
        extension: Option<String>,
    },
}

impl MediaData {
    fn extension(&self) -> Option<String> {
        match self {
            MediaData::File(path) => path
                .extension()
                .map(|e| e.to_string_lossy().to_string()),
            MediaData::Bytes { extension, .. } => extension.clone(),
        }
    }
}

/// Audio decoder wrapper for symphonia.
pub struct AudioDecoder {
    reader: Box<dyn FormatReader>,
    decoder: Box<dyn Decoder>,
    track_id: u32,
    sample_rate: u32,
    channels: u16,
    duration: Duration,
    time_base: Option<symphonia::core::units::TimeBase>,
}

impl AudioDecoder {
    /// Open a source for decoding.
    pub fn open(media: MediaData) -> Result<Self, MediaError> {
        let mut hint = Hint::new();
        if let Some(ext) = media.extension() {
            hint.with_extension(&ext);
        }

        let source: Box<dyn MediaSource> = match media {
            MediaData::File(path) => Box::new(File::open(&path).map_err(|e| {
                MediaError::LoadFailed(format!("{}: {}", path.display(), e))
            })?),
            MediaData::Bytes { data, .. } => Box::new(Cursor::new(data)),
        };
        let mss = MediaSourceStream::new(source, Default::default());

        let format_opts = FormatOptions {
            enable_gapless: true,
            ..Default::default()
        };
        let metadata_opts = MetadataOptions::default();

        let probed = symphonia::default::get_probe()
            .format(&hint, mss, &format_opts, &metadata_opts)
            .map_err(|e| MediaError::LoadFailed(format!("Unsupported format: {}", e)))?;

        let reader = probed.format;

        // Find the first audio track
        let track = reader
            .tracks()
            .iter()
            .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
            .ok_or_else(|| MediaError::LoadFailed("No audio track found".to_string()))?;

        let track_id = track.id;
        let codec_params = track.codec_params.clone();

        let sample_rate = codec_params
            .sample_rate
            .ok_or_else(|| MediaError::LoadFailed("Unknown sample rate".to_string()))?;
        let channels = codec_params.channels.map(|c| c.count() as u16).unwrap_or(2);

        let time_base = codec_params.time_base;
        let duration = match (codec_params.n_frames, time_base) {
            (Some(n_frames), Some(tb)) => {
                let time = tb.calc_time(n_frames);
                Duration::from_secs_f64(time.seconds as f64 + time.frac)
            }
            // Estimate from sample rate
            (Some(n_frames), None) => Duration::from_secs_f64(n_frames as f64 / sample_rate as f64),
            (None, _) => Duration::ZERO,
        };

        let decoder = symphonia::default::get_codecs()
            .make(&codec_params, &DecoderOptions::default())
            .map_err(|e| MediaError::LoadFailed(e.to_string()))?;

        Ok(Self {
            reader,
            decoder,
            track_id,
            sample_rate,
            channels,
            duration,
            time_base,
        })
    }

    /// Get the sample rate.
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Get the number of channels.
    pub fn channels(&self) -> u16 {
        self.channels
    }

    /// Get the total duration (zero when the container doesn't say).
    pub fn duration(&self) -> Duration {
        self.duration
    }

    /// Seek to an absolute position.
    pub fn seek(&mut self, position: Duration) -> Result<(), MediaError> {
        let seek_to = SeekTo::Time {
            time: Time::from(position.as_secs_f64()),
            track_id: Some(self.track_id),
        };

        self.reader
            .seek(SeekMode::Accurate, seek_to)
            .map_err(|e| MediaError::LoadFailed(format!("Seek failed: {}", e)))?;

        // Reset decoder state after seeking
        self.decoder.reset();
        Ok(())
    }

    /// Decode the next chunk of audio samples.
    ///
    /// Returns `Ok(None)` at end of stream.
    /// The callback receives interleaved f32 samples.
    pub fn decode_next<F>(&mut self, mut callback: F) -> Result<Option<DecodedFrame>, MediaError>
    where
        F: FnMut(&[f32]),
    {
        loop {
            let packet = match self.reader.next_packet() {
                Ok(p) => p,
                Err(SymphoniaError::IoError(e))
                    if e.kind() == std::io::ErrorKind::UnexpectedEof =>
                {
                    return Ok(None); // End of stream
                }
                Err(SymphoniaError::ResetRequired) => {
                    self.decoder.reset();
                    continue;
                }
                Err(e) => return Err(MediaError::LoadFailed(e.to_string())),
            };

            // Skip packets from other tracks
            if packet.track_id() != self.track_id {
                continue;
            }

            let timestamp = match self.time_base {
                Some(tb) => {
                    let time = tb.calc_time(packet.ts());
                    Duration::from_secs_f64(time.seconds as f64 + time.frac)
                }
                None => Duration::ZERO,
            };

            let decoded = match self.decoder.decode(&packet) {
                Ok(d) => d,
                Err(SymphoniaError::DecodeError(_)) => continue, // Skip bad frame
                Err(e) => return Err(MediaError::LoadFailed(e.to_string())),
            };

            let samples = interleave_f32(&decoded);
            let frame = DecodedFrame {
                samples: samples.len() / self.channels.max(1) as usize,
                timestamp,
            };

            callback(&samples);

            return Ok(Some(frame));
        }
    }
}

/// Convert a planar audio buffer to interleaved f32 samples.
fn interleave_f32(buffer: &AudioBufferRef) -> Vec<f32> {
    fn interleave<T: Copy>(planes: &[&[T]], frames: usize, to_f32: impl Fn(T) -> f32) -> Vec<f32> {
        let mut output = Vec::with_capacity(frames * planes.len());
        for frame in 0..frames {
            for plane in planes {
                output.push(to_f32(plane[frame]));
            }
        }
        output
    }

    match buffer {
        AudioBufferRef::F32(buf) => interleave(buf.planes().planes(), buf.frames(), |s| s),
        AudioBufferRef::S16(buf) => {
            interleave(buf.planes().planes(), buf.frames(), |s| s as f32 / 32768.0)
        }
        AudioBufferRef::S24(buf) => {
            interleave(buf.planes().planes(), buf.frames(), |s| s.0 as f32 / 8388608.0)
        }
        AudioBufferRef::S32(buf) => {
            interleave(buf.planes().planes(), buf.frames(), |s| s as f32 / 2147483648.0)
        }
        AudioBufferRef::U8(buf) => {
            interleave(buf.planes().planes(), buf.frames(), |s| (s as f32 - 128.0) / 128.0)
        }
        _ => Vec::new(),
    }
}

/// Information about a decoded frame.
#[derive(Debug, Clone)]
pub struct DecodedFrame {
    /// Number of samples (per channel) decoded
    pub samples: usize,
    /// Timestamp of this frame
    pub timestamp: Duration,
}
