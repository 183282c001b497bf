//! Audio waveform thumbnails.
//!
//! Samples are decoded to per-frame peak amplitudes, bucketed into one column
//! per output pixel (max-abs per bucket), normalized and drawn as bars
//! mirrored around the centre line.

use std::fs::File;
use std::path::Path;

use image::{Rgba, RgbaImage};
use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::{DecoderOptions, CODEC_TYPE_NULL};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;

use super::canvas::fill_rect;
use super::{FileCategory, GenerationError, Generator};

/// Decoding stops after this many frames (about ten minutes at 48 kHz).
const MAX_FRAMES: usize = 48_000 * 60 * 10;

const BACKGROUND: Rgba<u8> = Rgba([30, 30, 46, 255]);
const WAVE: Rgba<u8> = Rgba([137, 180, 250, 255]);
const AXIS: Rgba<u8> = Rgba([88, 91, 112, 255]);

type Decoder = fn(&Path) -> Result<Vec<f32>, String>;

/// Renders a peak waveform.
#[derive(Debug, Default, Clone, Copy)]
pub struct AudioGenerator;

impl Generator for AudioGenerator {
    fn category(&self) -> FileCategory {
        FileCategory::Audio
    }

    fn generate(&self, path: &Path, size: u32) -> Result<RgbaImage, GenerationError> {
        let peaks = decode_peaks(path)?;
        if peaks.is_empty() {
            return Err(GenerationError::failed(path, "no audio samples"));
        }
        let buckets = bucket_peaks(&peaks, size as usize);
        Ok(render_waveform(&buckets, size))
    }
}

/// Decode `path` to one peak amplitude (`0.0..=1.0`) per frame.
///
/// WAV goes through `hound` first; everything else through `symphonia`. Each
/// decoder is the other's fallback.
fn decode_peaks(path: &Path) -> Result<Vec<f32>, GenerationError> {
    let is_wav = path
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("wav"));

    let (first, second): (Decoder, Decoder) = if is_wav {
        (decode_wav, decode_symphonia)
    } else {
        (decode_symphonia, decode_wav)
    };

    match first(path) {
        Ok(peaks) => Ok(peaks),
        Err(first_err) => {
            log::debug!(
                "Primary audio decoder failed for {}: {}",
                path.display(),
                first_err
            );
            second(path).map_err(|second_err| {
                GenerationError::failed(path, format!("{first_err}; {second_err}"))
            })
        }
    }
}

fn decode_wav(path: &Path) -> Result<Vec<f32>, String> {
    let mut reader = hound::WavReader::open(path).map_err(|e| format!("wav: {e}"))?;
    let spec = reader.spec();
    let channels = usize::from(spec.channels.max(1));
    let limit = MAX_FRAMES * channels;

    let samples: Vec<f32> = match spec.sample_format {
        hound::SampleFormat::Float => reader
            .samples::<f32>()
            .take(limit)
            .filter_map(Result::ok)
            .collect(),
        hound::SampleFormat::Int => {
            let bits = u32::from(spec.bits_per_sample.clamp(1, 32));
            let scale = 1.0 / (1_u64 << (bits - 1)) as f32;
            reader
                .samples::<i32>()
                .take(limit)
                .filter_map(Result::ok)
                .map(|s| s as f32 * scale)
                .collect()
        }
    };

    Ok(frame_peaks(&samples, channels))
}

fn decode_symphonia(path: &Path) -> Result<Vec<f32>, String> {
    let file = File::open(path).map_err(|e| e.to_string())?;
    let stream = MediaSourceStream::new(Box::new(file), Default::default());

    let mut hint = Hint::new();
    if let Some(ext) = path.extension().and_then(|e| e.to_str()) {
        hint.with_extension(ext);
    }

    let probed = symphonia::default::get_probe()
        .format(
            &hint,
            stream,
            &FormatOptions::default(),
            &MetadataOptions::default(),
        )
        .map_err(|e| format!("probe: {e}"))?;
    let mut format = probed.format;

    let track = format
        .tracks()
        .iter()
        .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
        .ok_or("no audio track")?;
    let track_id = track.id;
    let mut decoder = symphonia::default::get_codecs()
        .make(&track.codec_params, &DecoderOptions::default())
        .map_err(|e| format!("codec: {e}"))?;

    let mut peaks = Vec::new();
    loop {
        let packet = match format.next_packet() {
            Ok(packet) => packet,
            Err(SymphoniaError::IoError(e)) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                break
            }
            Err(SymphoniaError::ResetRequired) => break,
            Err(e) => return Err(format!("read: {e}")),
        };
        if packet.track_id() != track_id {
            continue;
        }

        match decoder.decode(&packet) {
            Ok(decoded) => {
                let spec = *decoded.spec();
                let channels = spec.channels.count().max(1);
                let mut buf = SampleBuffer::<f32>::new(decoded.capacity() as u64, spec);
                buf.copy_interleaved_ref(decoded);
                peaks.extend(frame_peaks(buf.samples(), channels));
            }
            Err(SymphoniaError::DecodeError(e)) => {
                log::trace!("Skipping undecodable packet in {}: {}", path.display(), e);
            }
            Err(e) => return Err(format!("decode: {e}")),
        }

        if peaks.len() >= MAX_FRAMES {
            break;
        }
    }
    Ok(peaks)
}

/// Collapse interleaved samples to one max-abs value per frame.
fn frame_peaks(samples: &[f32], channels: usize) -> Vec<f32> {
    samples
        .chunks(channels.max(1))
        .map(|frame| frame.iter().fold(0.0_f32, |m, s| m.max(s.abs())))
        .collect()
}

/// Reduce `peaks` to `buckets` values (max per bucket), normalized so the
/// loudest bucket is `1.0`. Silence stays at `0.0`.
#[must_use]
pub fn bucket_peaks(peaks: &[f32], buckets: usize) -> Vec<f32> {
    if buckets == 0 || peaks.is_empty() {
        return vec![0.0; buckets];
    }
    let mut out: Vec<f32> = (0..buckets)
        .map(|b| {
            let start = b * peaks.len() / buckets;
            let end = ((b + 1) * peaks.len() / buckets).max(start + 1).min(peaks.len());
            peaks[start.min(peaks.len() - 1)..end]
                .iter()
                .fold(0.0_f32, |m, s| m.max(s.abs()))
        })
        .collect();

    let loudest = out.iter().copied().fold(0.0_f32, f32::max);
    if loudest > 0.0 {
        for v in &mut out {
            *v /= loudest;
        }
    }
    out
}

fn render_waveform(buckets: &[f32], size: u32) -> RgbaImage {
    let mut canvas = RgbaImage::from_pixel(size, size, BACKGROUND);
    let size_i = i64::from(size);
    let centre = size_i / 2;
    let half = (size as f32 / 2.0 - (size as f32 * 0.08).max(1.0)).max(1.0);

    fill_rect(&mut canvas, 0, centre, size_i, centre + 1, AXIS);
    for (x, level) in buckets.iter().enumerate() {
        let h = (level * half).round().max(1.0) as i64;
        let x = x as i64;
        fill_rect(&mut canvas, x, centre - h, x + 1, centre + h, WAVE);
    }
    canvas
}
