//! Level conversion and waveshaping helpers.
//!
//! Everything here is allocation-free. The transcendental functions come
//! from `libm`; nodes call them at build time only and cache the linear
//! results for the per-sample path.

use libm::{expf, logf};

/// Convert decibels to linear gain (0 dB → 1.0, −6 dB → ~0.5).
#[inline]
pub fn db_to_linear(db: f32) -> f32 {
    // 10^(dB/20) = e^(dB * ln(10)/20)
    const FACTOR: f32 = core::f32::consts::LN_10 / 20.0;
    expf(db * FACTOR)
}

/// Convert linear gain to decibels. Input is floored at 1e-10 to keep
/// the logarithm finite.
#[inline]
pub fn linear_to_db(linear: f32) -> f32 {
    const FACTOR: f32 = 20.0 / core::f32::consts::LN_10;
    logf(linear.max(1e-10)) * FACTOR
}

/// Cheap cubic soft clip: hard clamp to ±1, then `x − x³/3`.
///
/// Bounded to ±2/3, monotone on [−1, 1], and polynomial so it costs two
/// multiplies per sample. This is the default pre-model shaper and the
/// overdrive nonlinearity.
#[inline]
pub fn softclip_cubic(x: f32) -> f32 {
    let x = x.clamp(-1.0, 1.0);
    x - (1.0 / 3.0) * x * x * x
}
