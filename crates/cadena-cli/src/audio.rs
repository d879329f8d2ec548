//! cpal duplex backend.
//!
//! cpal drives capture and playback from its own callbacks, so the
//! backend bridges them to the engine's blocking period loop with two
//! SPSC rings: the capture callback downmixes interleaved frames to
//! mono and pushes samples; the playback callback pops mono samples
//! and fans them out to every channel. The processing thread sits
//! between the rings, one period at a time.
//!
//! Ring overruns (processing too slow) drop capture samples; underruns
//! play silence. Both are counted and reported, never fatal.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Context};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{BufferSize, Device, SampleRate, Stream, StreamConfig};

use cadena_engine::{DeviceError, DuplexDevice};

/// Ring capacity in periods; enough slack to ride out scheduling
/// jitter without adding meaningful latency.
const RING_PERIODS: usize = 8;

/// Device selection and stream shape for [`CpalDuplex::open`].
#[derive(Debug, Clone)]
pub struct DuplexConfig {
    /// Requested sample rate.
    pub sample_rate: u32,
    /// Period length in frames.
    pub period_frames: usize,
    /// Capture device: index, exact or partial name; `None` = default.
    pub input_device: Option<String>,
    /// Playback device: index, exact or partial name; `None` = default.
    pub output_device: Option<String>,
}

/// A cpal capture/playback pair exposed as a [`DuplexDevice`].
pub struct CpalDuplex {
    sample_rate: u32,
    period_frames: usize,
    capture_rx: rtrb::Consumer<f32>,
    playback_tx: rtrb::Producer<f32>,
    failed: Arc<AtomicBool>,
    overruns: Arc<AtomicU64>,
    _input_stream: Stream,
    _output_stream: Stream,
}

impl CpalDuplex {
    /// Open both streams and start them.
    pub fn open(config: &DuplexConfig) -> anyhow::Result<Self> {
        let host = cpal::default_host();

        let input_device = match &config.input_device {
            Some(spec) => find_device(&host, spec, true)?,
            None => host
                .default_input_device()
                .ok_or_else(|| anyhow!("no default capture device"))?,
        };
        let output_device = match &config.output_device {
            Some(spec) => find_device(&host, spec, false)?,
            None => host
                .default_output_device()
                .ok_or_else(|| anyhow!("no default playback device"))?,
        };

        log::info!(
            "capture: {} / playback: {}",
            input_device.name().unwrap_or_else(|_| "?".to_string()),
            output_device.name().unwrap_or_else(|_| "?".to_string()),
        );

        let in_channels = input_device
            .default_input_config()
            .context("querying capture format")?
            .channels() as usize;
        let out_channels = output_device
            .default_output_config()
            .context("querying playback format")?
            .channels() as usize;

        let in_config = StreamConfig {
            channels: in_channels as u16,
            sample_rate: SampleRate(config.sample_rate),
            buffer_size: BufferSize::Fixed(config.period_frames as u32),
        };
        let out_config = StreamConfig {
            channels: out_channels as u16,
            sample_rate: SampleRate(config.sample_rate),
            buffer_size: BufferSize::Fixed(config.period_frames as u32),
        };

        let ring_len = config.period_frames * RING_PERIODS;
        let (mut capture_tx, capture_rx) = rtrb::RingBuffer::<f32>::new(ring_len);
        let (playback_tx, mut playback_rx) = rtrb::RingBuffer::<f32>::new(ring_len);

        let failed = Arc::new(AtomicBool::new(false));
        let overruns = Arc::new(AtomicU64::new(0));

        let cb_overruns = overruns.clone();
        let input_stream = input_device
            .build_input_stream(
                &in_config,
                move |data: &[f32], _info| {
                    for frame in data.chunks(in_channels) {
                        let sum: f32 = frame.iter().sum();
                        let mono = sum / in_channels as f32;
                        if capture_tx.push(mono).is_err() {
                            cb_overruns.fetch_add(1, Ordering::Relaxed);
                        }
                    }
                },
                {
                    let failed = failed.clone();
                    move |err| {
                        log::error!("capture stream error: {err}");
                        failed.store(true, Ordering::Relaxed);
                    }
                },
                None,
            )
            .context("building capture stream")?;

        let output_stream = output_device
            .build_output_stream(
                &out_config,
                move |data: &mut [f32], _info| {
                    for frame in data.chunks_mut(out_channels) {
                        // Mono fan-out: every channel gets the same sample;
                        // underrun plays silence.
                        let sample = playback_rx.pop().unwrap_or(0.0);
                        for slot in frame.iter_mut() {
                            *slot = sample;
                        }
                    }
                },
                {
                    let failed = failed.clone();
                    move |err| {
                        log::error!("playback stream error: {err}");
                        failed.store(true, Ordering::Relaxed);
                    }
                },
                None,
            )
            .context("building playback stream")?;

        input_stream.play().context("starting capture stream")?;
        output_stream.play().context("starting playback stream")?;

        Ok(Self {
            sample_rate: config.sample_rate,
            period_frames: config.period_frames,
            capture_rx,
            playback_tx,
            failed,
            overruns,
            _input_stream: input_stream,
            _output_stream: output_stream,
        })
    }

    /// Capture samples dropped because the rings were full.
    pub fn overruns(&self) -> u64 {
        self.overruns.load(Ordering::Relaxed)
    }
}

impl DuplexDevice for CpalDuplex {
    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn period_frames(&self) -> usize {
        self.period_frames
    }

    fn read_period(&mut self, input: &mut [f32]) -> Result<(), DeviceError> {
        let mut filled = 0;
        while filled < input.len() {
            if self.failed.load(Ordering::Relaxed) {
                return Err(DeviceError::Capture("stream reported an error".to_string()));
            }
            match self.capture_rx.pop() {
                Ok(sample) => {
                    input[filled] = sample;
                    filled += 1;
                }
                Err(_) => std::thread::sleep(Duration::from_micros(200)),
            }
        }
        Ok(())
    }

    fn write_period(&mut self, output: &[f32]) -> Result<(), DeviceError> {
        let mut written = 0;
        while written < output.len() {
            if self.failed.load(Ordering::Relaxed) {
                return Err(DeviceError::Playback("stream reported an error".to_string()));
            }
            match self.playback_tx.push(output[written]) {
                Ok(()) => written += 1,
                Err(_) => std::thread::sleep(Duration::from_micros(200)),
            }
        }
        Ok(())
    }
}

/// Resolve a device by index, exact name, then partial name.
pub fn find_device(host: &cpal::Host, spec: &str, input: bool) -> anyhow::Result<Device> {
    let devices: Vec<Device> = if input {
        host.input_devices().context("listing capture devices")?.collect()
    } else {
        host.output_devices().context("listing playback devices")?.collect()
    };

    if let Ok(index) = spec.parse::<usize>() {
        if let Some(device) = devices.into_iter().nth(index) {
            return Ok(device);
        }
        return Err(anyhow!("device index {index} out of range"));
    }

    let mut partial: Option<Device> = None;
    for device in devices {
        let Ok(name) = device.name() else { continue };
        if name == spec {
            return Ok(device);
        }
        if partial.is_none() && name.to_lowercase().contains(&spec.to_lowercase()) {
            partial = Some(device);
        }
    }
    partial.ok_or_else(|| {
        anyhow!(
            "no {} device matches '{spec}'",
            if input { "capture" } else { "playback" }
        )
    })
}
