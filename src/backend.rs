//! Decode → analyze → discard pipelines.
//!
//! A backend turns `(uri, reference level)` into a running pipeline that
//! reports back through an [`EventSink`]: at most one `Tag` carrying the
//! replay gain measurement, then `EndOfStream`, or an `Error`. The analysis
//! core only relies on that event contract.

use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;

use ebur128::{EbuR128, Mode};
use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::{Decoder, DecoderOptions};
use symphonia::core::formats::{FormatOptions, FormatReader};
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;
use tracing::debug;
use url::Url;

use crate::error::{GainError, Result};

const AUDIO_EXTENSIONS: &[&str] = &[
    "flac", "mp3", "wav", "ogg", "m4a", "opus", "wv", "aif", "aiff",
];

/// Offset between the ReplayGain dB SPL reference and LUFS (89 dB SPL = -18 LUFS).
pub const LOUDNESS_OFFSET: f64 = 107.0;

/// Check if a path has a recognized audio file extension.
fn is_audio_file(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| AUDIO_EXTENSIONS.contains(&ext.to_lowercase().as_str()))
        .unwrap_or(false)
}

/// Scan a directory for audio files, sorted by filename.
pub fn scan_audio_files(path: &Path) -> Vec<PathBuf> {
    let mut files: Vec<PathBuf> = std::fs::read_dir(path)
        .into_iter()
        .flatten()
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .filter(|p| p.is_file() && is_audio_file(p))
        .collect();
    files.sort();
    files
}

/// Turn a filesystem path into a percent-encoded `file://` URI.
pub fn path_to_uri(path: &Path) -> Result<String> {
    let absolute = if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir()?.join(path)
    };
    Url::from_file_path(&absolute)
        .map(String::from)
        .map_err(|_| GainError::Pipeline(format!("cannot make a URI of {}", absolute.display())))
}

/// Resolve a `file://` URI, or a bare path, to a filesystem path.
pub fn uri_to_path(uri: &str) -> Result<PathBuf> {
    if !uri.contains("://") {
        return Ok(PathBuf::from(uri));
    }
    let url = Url::parse(uri).map_err(|e| GainError::Pipeline(format!("invalid URI {}: {}", uri, e)))?;
    if url.scheme() != "file" {
        return Err(GainError::Pipeline(format!("unsupported URI scheme: {}", uri)));
    }
    url.to_file_path()
        .map_err(|_| GainError::Pipeline(format!("not a local file URI: {}", uri)))
}

/// Track gain relative to `reference_level` (dB SPL) for a measured loudness.
pub fn track_gain(reference_level: f64, integrated_lufs: f64) -> Option<f64> {
    if integrated_lufs.is_finite() {
        Some(reference_level - LOUDNESS_OFFSET - integrated_lufs)
    } else {
        None
    }
}

/// Asynchronous notification from a running pipeline.
#[derive(Debug, Clone, PartialEq)]
pub enum BackendEvent {
    /// Replay gain tags; either value may be missing.
    Tag { gain: Option<f64>, peak: Option<f64> },
    EndOfStream,
    Error(String),
}

/// Callback through which a pipeline delivers its events.
pub type EventSink = Arc<dyn Fn(BackendEvent) + Send + Sync>;

/// Handle on a running pipeline.
pub trait Pipeline: Send + Sync {
    /// Ask the pipeline to wind down and report `EndOfStream`.
    fn request_eos(&self);
    /// Stop immediately; no further events are delivered.
    fn halt(&self);
}

/// Factory for analysis pipelines.
pub trait AnalysisBackend: Send + Sync {
    /// Start analyzing `uri`. Events arrive on `sink` from another thread.
    fn launch(&self, uri: &str, reference_level: f64, sink: EventSink) -> Result<Box<dyn Pipeline>>;
}

const STATE_RUNNING: u8 = 0;
const STATE_EOS_REQUESTED: u8 = 1;
const STATE_HALTED: u8 = 2;

#[derive(Debug, Default)]
struct PipelineControl {
    state: AtomicU8,
}

impl PipelineControl {
    fn state(&self) -> u8 {
        self.state.load(Ordering::SeqCst)
    }

    /// Move to `next` unless the pipeline is already further along.
    fn advance(&self, next: u8) {
        self.state.fetch_max(next, Ordering::SeqCst);
    }
}

/// Pipeline handle of [`SymphoniaBackend`].
pub struct DecodePipeline {
    control: Arc<PipelineControl>,
}

impl Pipeline for DecodePipeline {
    fn request_eos(&self) {
        self.control.advance(STATE_EOS_REQUESTED);
    }

    fn halt(&self) {
        self.control.advance(STATE_HALTED);
    }
}

/// Backend decoding with symphonia and measuring with an EBU R128 meter.
#[derive(Debug, Default, Clone, Copy)]
pub struct SymphoniaBackend;

impl SymphoniaBackend {
    pub fn new() -> Self {
        Self
    }
}

impl AnalysisBackend for SymphoniaBackend {
    fn launch(&self, uri: &str, reference_level: f64, sink: EventSink) -> Result<Box<dyn Pipeline>> {
        let path = uri_to_path(uri)?;
        let source = DecodeSource::open(&path)?;
        let control = Arc::new(PipelineControl::default());

        let thread_control = Arc::clone(&control);
        let uri = uri.to_string();
        std::thread::Builder::new()
            .name("rgain-pipeline".to_string())
            .spawn(move || run_pipeline(source, reference_level, &thread_control, &sink, &uri))?;

        Ok(Box::new(DecodePipeline { control }))
    }
}

fn run_pipeline(
    source: DecodeSource,
    reference_level: f64,
    control: &PipelineControl,
    sink: &EventSink,
    uri: &str,
) {
    match source.measure(control) {
        Ok(Measurement::Complete { integrated_lufs, peak }) => {
            debug!(uri, integrated_lufs, peak, "analysis complete");
            sink(BackendEvent::Tag {
                gain: track_gain(reference_level, integrated_lufs),
                peak: Some(peak),
            });
            if control.state() != STATE_HALTED {
                sink(BackendEvent::EndOfStream);
            }
        }
        Ok(Measurement::Stopped) => {
            debug!(uri, "end of stream requested");
            sink(BackendEvent::EndOfStream);
        }
        Ok(Measurement::Halted) => debug!(uri, "pipeline halted"),
        Err(e) => sink(BackendEvent::Error(e.to_string())),
    }
}

enum Measurement {
    Complete { integrated_lufs: f64, peak: f64 },
    Stopped,
    Halted,
}

/// An opened file ready to be decoded.
struct DecodeSource {
    format: Box<dyn FormatReader>,
    decoder: Box<dyn Decoder>,
    track_id: u32,
    sample_rate: u32,
    channels: u32,
}

impl DecodeSource {
    fn open(path: &Path) -> Result<Self> {
        let file = File::open(path).map_err(|e| {
            GainError::Pipeline(format!("Failed to open {}: {}", path.display(), e))
        })?;
        let mss = MediaSourceStream::new(Box::new(file), Default::default());

        let mut hint = Hint::new();
        if let Some(ext) = path.extension().and_then(|e| e.to_str()) {
            hint.with_extension(ext);
        }

        let probed = symphonia::default::get_probe().format(
            &hint,
            mss,
            &FormatOptions::default(),
            &MetadataOptions::default(),
        )?;
        let format = probed.format;

        let track = format
            .tracks()
            .iter()
            .find(|t| t.codec_params.codec != symphonia::core::codecs::CODEC_TYPE_NULL)
            .ok_or_else(|| {
                GainError::Pipeline(format!("No audio track found in {}", path.display()))
            })?;

        let codec_params = track.codec_params.clone();
        let track_id = track.id;
        let sample_rate = codec_params.sample_rate.unwrap_or(44100);
        let channels = codec_params.channels.map(|c| c.count()).unwrap_or(2) as u32;

        let decoder = symphonia::default::get_codecs()
            .make(&codec_params, &DecoderOptions::default())?;

        Ok(Self {
            format,
            decoder,
            track_id,
            sample_rate,
            channels,
        })
    }

    /// Decode every packet into the loudness meter, checking `control`
    /// between packets.
    fn measure(mut self, control: &PipelineControl) -> Result<Measurement> {
        let mut meter = EbuR128::new(self.channels, self.sample_rate, Mode::I | Mode::SAMPLE_PEAK)?;
        let mut sample_buf: Option<SampleBuffer<f32>> = None;
        let mut sample_buf_capacity: u64 = 0;

        loop {
            match control.state() {
                STATE_EOS_REQUESTED => return Ok(Measurement::Stopped),
                STATE_HALTED => return Ok(Measurement::Halted),
                _ => {}
            }

            let packet = match self.format.next_packet() {
                Ok(packet) => packet,
                Err(symphonia::core::errors::Error::IoError(ref e))
                    if e.kind() == std::io::ErrorKind::UnexpectedEof =>
                {
                    break;
                }
                Err(symphonia::core::errors::Error::ResetRequired) => break,
                Err(e) => return Err(e.into()),
            };

            if packet.track_id() != self.track_id {
                continue;
            }

            let decoded = match self.decoder.decode(&packet) {
                Ok(d) => d,
                Err(symphonia::core::errors::Error::DecodeError(_)) => continue,
                Err(e) => return Err(e.into()),
            };

            let spec = *decoded.spec();
            let num_frames = decoded.frames() as u64;
            if num_frames == 0 {
                continue;
            }

            // Reuse SampleBuffer across packets; only reallocate if capacity is insufficient
            if sample_buf.is_none() || sample_buf_capacity < num_frames {
                sample_buf = Some(SampleBuffer::new(num_frames, spec));
                sample_buf_capacity = num_frames;
            }
            if let Some(buf) = sample_buf.as_mut() {
                buf.copy_interleaved_ref(decoded);
                meter.add_frames_f32(buf.samples())?;
            }
        }

        let integrated_lufs = meter.loudness_global()?;
        let mut peak = 0.0f64;
        for ch in 0..self.channels {
            peak = peak.max(meter.sample_peak(ch)?);
        }

        Ok(Measurement::Complete {
            integrated_lufs,
            peak,
        })
    }
}
