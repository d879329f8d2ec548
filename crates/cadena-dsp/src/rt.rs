//! Lock-free float cells for realtime parameter sharing.
//!
//! The engine exposes a small number of parameters (input trim, peak
//! meters) that any thread may write and the audio thread reads with
//! relaxed atomic loads. An [`AtomicF32`] stores the `f32` bit pattern
//! in an `AtomicU32`, which keeps every operation lock-free on the
//! targets we care about.

use std::sync::atomic::{AtomicU32, Ordering};

use crate::math::db_to_linear;

/// An `f32` with atomic load/store, stored as its bit pattern.
#[derive(Debug)]
pub struct AtomicF32(AtomicU32);

impl AtomicF32 {
    /// Create a cell holding `value`.
    pub fn new(value: f32) -> Self {
        Self(AtomicU32::new(value.to_bits()))
    }

    /// Atomically load the value.
    #[inline]
    pub fn load(&self, order: Ordering) -> f32 {
        f32::from_bits(self.0.load(order))
    }

    /// Atomically store a value.
    #[inline]
    pub fn store(&self, value: f32, order: Ordering) {
        self.0.store(value.to_bits(), order);
    }
}

impl Default for AtomicF32 {
    fn default() -> Self {
        Self::new(0.0)
    }
}

/// Realtime input-trim cell: dB value plus its cached linear gain.
///
/// Writers set both through [`set_db`](Self::set_db) so the audio
/// thread never converts dB per sample; it reads
/// [`linear`](Self::linear) once per block with a relaxed load.
#[derive(Debug)]
pub struct InputTrimCell {
    db: AtomicF32,
    lin: AtomicF32,
}

impl InputTrimCell {
    /// Create a trim cell at the given dB value.
    pub fn new(db: f32) -> Self {
        Self {
            db: AtomicF32::new(db),
            lin: AtomicF32::new(db_to_linear(db)),
        }
    }

    /// Set the trim in dB; the linear gain is derived here, off the
    /// audio thread.
    pub fn set_db(&self, db: f32) {
        self.db.store(db, Ordering::Relaxed);
        self.lin.store(db_to_linear(db), Ordering::Relaxed);
    }

    /// Current trim in dB.
    pub fn db(&self) -> f32 {
        self.db.load(Ordering::Relaxed)
    }

    /// Current trim as linear gain (audio-thread read).
    #[inline]
    pub fn linear(&self) -> f32 {
        self.lin.load(Ordering::Relaxed)
    }
}

impl Default for InputTrimCell {
    fn default() -> Self {
        Self::new(0.0)
    }
}

/// Running peak meter. The audio thread calls [`update`](Self::update)
/// per block; a reporter thread reads and resets.
///
/// The update is a racy read-compare-store on purpose: a lost update
/// under contention only costs one block's peak, and the audio thread
/// never spins on a CAS loop.
#[derive(Debug, Default)]
pub struct PeakMeter(AtomicF32);

impl PeakMeter {
    /// Create a meter at zero.
    pub fn new() -> Self {
        Self(AtomicF32::new(0.0))
    }

    /// Raise the stored peak if `value` exceeds it.
    #[inline]
    pub fn update(&self, value: f32) {
        let abs = value.abs();
        if abs > self.0.load(Ordering::Relaxed) {
            self.0.store(abs, Ordering::Relaxed);
        }
    }

    /// Raise the stored peak to the block's absolute maximum.
    #[inline]
    pub fn update_block(&self, block: &[f32]) {
        let mut peak = 0.0f32;
        for &s in block {
            let abs = s.abs();
            if abs > peak {
                peak = abs;
            }
        }
        self.update(peak);
    }

    /// Current peak.
    pub fn value(&self) -> f32 {
        self.0.load(Ordering::Relaxed)
    }

    /// Read the peak and reset it to zero.
    pub fn take(&self) -> f32 {
        let v = self.0.load(Ordering::Relaxed);
        self.0.store(0.0, Ordering::Relaxed);
        v
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn atomic_f32_round_trips() {
        let cell = AtomicF32::new(0.25);
        assert_eq!(cell.load(Ordering::Relaxed), 0.25);
        cell.store(-3.5, Ordering::Relaxed);
        assert_eq!(cell.load(Ordering::Relaxed), -3.5);
    }

    #[test]
    fn trim_cell_derives_linear() {
        let cell = InputTrimCell::new(0.0);
        assert!((cell.linear() - 1.0).abs() < 1e-6);

        cell.set_db(6.0206);
        assert!((cell.linear() - 2.0).abs() < 1e-3);
        assert!((cell.db() - 6.0206).abs() < 1e-6);
    }

    #[test]
    fn peak_meter_tracks_maximum() {
        let meter = PeakMeter::new();
        meter.update_block(&[0.1, -0.8, 0.3]);
        meter.update(0.2);
        assert_eq!(meter.value(), 0.8);

        assert_eq!(meter.take(), 0.8);
        assert_eq!(meter.value(), 0.0);
    }
}
