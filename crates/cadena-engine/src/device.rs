//! Abstract duplex-device seam.
//!
//! The engine does not open or configure audio hardware; it accepts a
//! capture/playback pair behind this trait and fixes whatever rate and
//! period the pair reports for its lifetime. Backends live outside the
//! core (the CLI ships a cpal one); tests drive periods by hand.

use thiserror::Error;

use crate::swap::SwapCoordinator;

/// Device-side failures surfaced to the audio loop.
#[derive(Debug, Error)]
pub enum DeviceError {
    /// Capture side failed and could not recover.
    #[error("capture failed: {0}")]
    Capture(String),

    /// Playback side failed and could not recover.
    #[error("playback failed: {0}")]
    Playback(String),

    /// The stream ended (device unplugged, backend shut down).
    #[error("device stream closed")]
    Closed,
}

/// A mono capture/playback pair with a fixed period.
///
/// `read_period` blocks until a full period of mono samples (−1..1) is
/// available; `write_period` blocks until the processed period is
/// queued to playback. Channel fan-out/downmix is the backend's job.
pub trait DuplexDevice {
    /// Sample rate reported at open time.
    fn sample_rate(&self) -> u32;

    /// Period length in frames; equals the convolver block size.
    fn period_frames(&self) -> usize;

    /// Fill `input` with one captured period.
    fn read_period(&mut self, input: &mut [f32]) -> Result<(), DeviceError>;

    /// Queue one processed period for playback.
    fn write_period(&mut self, output: &[f32]) -> Result<(), DeviceError>;
}

/// Drive the audio loop until shutdown or a device error.
///
/// One iteration per period: read, [`SwapCoordinator::run_period`],
/// write. This is the hot loop; it allocates its two period buffers
/// once up front.
pub fn run_audio_loop<D: DuplexDevice>(
    device: &mut D,
    coordinator: &mut SwapCoordinator,
) -> Result<(), DeviceError> {
    let frames = device.period_frames();
    let mut input = vec![0.0f32; frames];
    let mut output = vec![0.0f32; frames];

    while coordinator.shared().is_running() {
        device.read_period(&mut input)?;
        coordinator.run_period(&input, &mut output);
        device.write_period(&output)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::swap::{CoordinatorOptions, EngineShared, RETIRE_QUEUE_CAPACITY};

    /// Feeds a fixed block N times, then reports closed.
    struct ScriptedDevice {
        reads_left: usize,
        written: Vec<f32>,
    }

    impl DuplexDevice for ScriptedDevice {
        fn sample_rate(&self) -> u32 {
            48000
        }
        fn period_frames(&self) -> usize {
            4
        }
        fn read_period(&mut self, input: &mut [f32]) -> Result<(), DeviceError> {
            if self.reads_left == 0 {
                return Err(DeviceError::Closed);
            }
            self.reads_left -= 1;
            input.copy_from_slice(&[0.5, -0.5, 0.25, -0.25]);
            Ok(())
        }
        fn write_period(&mut self, output: &[f32]) -> Result<(), DeviceError> {
            self.written.extend_from_slice(output);
            Ok(())
        }
    }

    #[test]
    fn loop_runs_periods_until_device_closes() {
        let shared = EngineShared::new(false);
        let (tx, _rx) = rtrb::RingBuffer::new(RETIRE_QUEUE_CAPACITY);
        let mut coordinator = SwapCoordinator::new(
            shared,
            tx,
            None,
            CoordinatorOptions {
                ramp_samples: 0,
                timing: false,
                period_frames: 4,
                sample_rate: 48000,
            },
        );

        let mut device = ScriptedDevice {
            reads_left: 3,
            written: Vec::new(),
        };
        let err = run_audio_loop(&mut device, &mut coordinator).unwrap_err();
        assert!(matches!(err, DeviceError::Closed));
        // Chainless engine passes capture through to playback.
        assert_eq!(device.written.len(), 12);
        assert_eq!(&device.written[..4], &[0.5, -0.5, 0.25, -0.25]);
    }

    #[test]
    fn loop_observes_stop_flag() {
        let shared = EngineShared::new(false);
        shared.request_stop();
        let (tx, _rx) = rtrb::RingBuffer::new(RETIRE_QUEUE_CAPACITY);
        let mut coordinator = SwapCoordinator::new(
            shared,
            tx,
            None,
            CoordinatorOptions {
                ramp_samples: 0,
                timing: false,
                period_frames: 4,
                sample_rate: 48000,
            },
        );

        let mut device = ScriptedDevice {
            reads_left: 100,
            written: Vec::new(),
        };
        run_audio_loop(&mut device, &mut coordinator).unwrap();
        assert!(device.written.is_empty());
    }
}
