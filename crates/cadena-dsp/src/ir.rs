//! Impulse-response loading and build-time conditioning.
//!
//! IRs arrive as WAV files in whatever format the capture rig produced
//! (16/24/32-bit integer or 32-bit float, any channel count). Loading
//! downmixes to mono by channel average and removes the DC offset some
//! IR captures carry. Conditioning (gain, peak normalisation, length
//! trimming) runs once at build time; the audio thread only ever sees
//! the finished sample vector inside the convolver.

use std::io;
use std::path::{Path, PathBuf};

use hound::{SampleFormat, WavReader};
use libm::cosf;
use thiserror::Error;

use crate::math::db_to_linear;

/// Length of the raised-cosine taper applied when an IR is truncated.
const TRIM_TAPER_SAMPLES: usize = 128;

/// Decoded mono impulse response.
#[derive(Debug, Clone)]
pub struct IrData {
    /// Mono samples, DC-removed.
    pub samples: Vec<f32>,
    /// Sample rate of the file.
    pub sample_rate: u32,
}

/// Errors from IR file loading.
#[derive(Debug, Error)]
pub enum IrLoadError {
    /// File could not be opened or its header parsed.
    #[error("failed to open IR file '{path}': {source}")]
    Open {
        /// Path of the file.
        path: PathBuf,
        /// Underlying decoder error.
        #[source]
        source: hound::Error,
    },

    /// A sample failed to decode.
    #[error("failed to decode IR file '{path}': {source}")]
    Decode {
        /// Path of the file.
        path: PathBuf,
        /// Underlying decoder error.
        #[source]
        source: hound::Error,
    },

    /// The file decoded to zero frames.
    #[error("IR file '{path}' contains no samples")]
    Empty {
        /// Path of the file.
        path: PathBuf,
    },

    /// Sample format not supported by the decoder path.
    #[error("IR file '{path}' has unsupported format ({bits}-bit {format:?})")]
    UnsupportedFormat {
        /// Path of the file.
        path: PathBuf,
        /// Bits per sample reported by the header.
        bits: u16,
        /// Sample format reported by the header.
        format: SampleFormat,
    },
}

impl IrLoadError {
    fn io(path: &Path, source: io::Error) -> Self {
        IrLoadError::Open {
            path: path.to_path_buf(),
            source: hound::Error::IoError(source),
        }
    }
}

/// Load a WAV impulse response as mono float samples.
///
/// Multi-channel files are downmixed by per-frame channel average; the
/// mean of the result is subtracted to remove DC.
pub fn load_ir_mono(path: &Path) -> Result<IrData, IrLoadError> {
    let file = std::fs::File::open(path).map_err(|e| IrLoadError::io(path, e))?;
    let mut reader = WavReader::new(io::BufReader::new(file)).map_err(|source| IrLoadError::Open {
        path: path.to_path_buf(),
        source,
    })?;

    let spec = reader.spec();
    let channels = spec.channels as usize;
    if channels == 0 {
        return Err(IrLoadError::Empty {
            path: path.to_path_buf(),
        });
    }

    let interleaved: Vec<f32> = match (spec.sample_format, spec.bits_per_sample) {
        (SampleFormat::Float, 32) => reader
            .samples::<f32>()
            .collect::<Result<_, _>>()
            .map_err(|source| IrLoadError::Decode {
                path: path.to_path_buf(),
                source,
            })?,
        (SampleFormat::Int, bits @ 1..=16) => {
            let scale = 1.0 / (1i32 << (bits - 1)) as f32;
            reader
                .samples::<i16>()
                .map(|s| s.map(|v| v as f32 * scale))
                .collect::<Result<_, _>>()
                .map_err(|source| IrLoadError::Decode {
                    path: path.to_path_buf(),
                    source,
                })?
        }
        (SampleFormat::Int, bits @ 17..=32) => {
            let scale = 1.0 / (1i64 << (bits - 1)) as f32;
            reader
                .samples::<i32>()
                .map(|s| s.map(|v| v as f32 * scale))
                .collect::<Result<_, _>>()
                .map_err(|source| IrLoadError::Decode {
                    path: path.to_path_buf(),
                    source,
                })?
        }
        (format, bits) => {
            return Err(IrLoadError::UnsupportedFormat {
                path: path.to_path_buf(),
                bits,
                format,
            })
        }
    };

    if interleaved.is_empty() {
        return Err(IrLoadError::Empty {
            path: path.to_path_buf(),
        });
    }

    let frames = interleaved.len() / channels;
    let mut mono = Vec::with_capacity(frames);
    if channels == 1 {
        mono = interleaved;
    } else {
        for frame in interleaved.chunks_exact(channels) {
            let sum: f32 = frame.iter().sum();
            mono.push(sum / channels as f32);
        }
    }

    // Remove DC-ish offsets; some IR captures carry a small one and it
    // turns into a step response through the convolver.
    let mean = mono.iter().sum::<f32>() / mono.len() as f32;
    for v in mono.iter_mut() {
        *v -= mean;
    }

    Ok(IrData {
        samples: mono,
        sample_rate: spec.sample_rate,
    })
}

/// Build-time IR conditioning options, already clamped by the builder.
#[derive(Debug, Clone, Copy, Default)]
pub struct IrConditioning {
    /// Fixed gain applied to every sample, dB.
    pub gain_db: f32,
    /// If set, normalise the peak to this level, dB.
    pub target_db: Option<f32>,
    /// If set, truncate to this many samples (takes precedence over
    /// `max_ms`).
    pub max_samples: Option<usize>,
    /// If set, truncate to this many milliseconds.
    pub max_ms: Option<f32>,
}

/// Apply gain, normalisation and trimming to a decoded IR.
///
/// Returns a warning string when the IR was truncated. Long IRs are
/// prohibitively expensive for uniform partitioned convolution, so a
/// truncation limit gets a 128-sample raised-cosine taper to avoid a
/// hard edge.
pub fn condition_ir(ir: &mut IrData, sample_rate: u32, opts: &IrConditioning) -> Option<String> {
    let gain_lin = db_to_linear(opts.gain_db.clamp(-24.0, 24.0));
    if gain_lin != 1.0 {
        for v in ir.samples.iter_mut() {
            *v *= gain_lin;
        }
    }

    if let Some(target_db) = opts.target_db {
        let mut peak = 0.0f32;
        for &v in &ir.samples {
            peak = peak.max(v.abs());
        }
        if peak > 0.0 {
            let target = db_to_linear(target_db.clamp(-24.0, 0.0));
            let norm = target / peak;
            for v in ir.samples.iter_mut() {
                *v *= norm;
            }
        }
    }

    let max_samples = opts.max_samples.or_else(|| {
        opts.max_ms.and_then(|ms| {
            if ms > 0.0 {
                Some((f64::from(ms) / 1000.0 * f64::from(sample_rate)).round() as usize)
            } else {
                None
            }
        })
    });

    let Some(max_samples) = max_samples.filter(|&m| m > 0 && ir.samples.len() > m) else {
        return None;
    };

    let taper = TRIM_TAPER_SAMPLES.min(max_samples);
    if taper > 1 {
        let start = max_samples - taper;
        for i in 0..taper {
            let t = i as f32 / (taper - 1) as f32;
            let g = 0.5 * (1.0 + cosf(core::f32::consts::PI * t)); // 1..0
            ir.samples[start + i] *= g;
        }
    }

    let old_len = ir.samples.len();
    ir.samples.truncate(max_samples);
    Some(format!(
        "IR trimmed from {old_len} to {max_samples} samples"
    ))
}
