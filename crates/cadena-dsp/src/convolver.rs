//! Uniform-partition frequency-domain convolution.
//!
//! The cabinet IR is split into `K = ceil(len / B)` partitions of the
//! audio period length `B`. Each partition is zero-padded to `2B` and
//! transformed once at build time. Per block, the input is transformed
//! into a ring of the last `K` input spectra, the spectral products
//! `X[w−k]·H[k]` are accumulated, and the inverse transform's first
//! half is overlap-added with the previous block's tail. Total latency
//! is one block, independent of IR length.
//!
//! All buffers, plans and scratch space are allocated in
//! [`PartitionedConvolver::new`]; `process` is allocation-free and
//! must be called with exactly `B` frames.

use std::sync::Arc;

use rustfft::num_complex::Complex;
use rustfft::{Fft, FftPlanner};
use thiserror::Error;

/// Errors from convolver construction.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConvolverBuildError {
    /// Block size was zero.
    #[error("convolver block size must be non-zero")]
    ZeroBlockSize,

    /// The impulse response had no samples.
    #[error("impulse response is empty")]
    EmptyImpulseResponse,
}

/// Partitioned FFT convolver with fixed block size.
///
/// Movable but not clonable; dropping it releases plans and buffers,
/// which must never happen on the audio thread (the engine routes
/// retired chains through the retirement worker).
pub struct PartitionedConvolver {
    block: usize,
    fft_len: usize,
    parts: usize,
    write: usize,
    ready: bool,

    fwd: Arc<dyn Fft<f32>>,
    inv: Arc<dyn Fft<f32>>,
    fwd_scratch: Vec<Complex<f32>>,
    inv_scratch: Vec<Complex<f32>>,

    /// Forward-transform workspace, length `fft_len`.
    time: Vec<Complex<f32>>,
    /// Spectral accumulator, length `fft_len`; inverse-transformed in place.
    acc: Vec<Complex<f32>>,
    /// IR partition spectra, `parts` × `fft_len`.
    h: Vec<Vec<Complex<f32>>>,
    /// Ring of input-block spectra, `parts` × `fft_len`.
    x: Vec<Vec<Complex<f32>>>,
    /// Overlap-add carry, length `block`.
    overlap: Vec<f32>,
}

impl std::fmt::Debug for PartitionedConvolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PartitionedConvolver")
            .field("block", &self.block)
            .field("fft_len", &self.fft_len)
            .field("parts", &self.parts)
            .field("write", &self.write)
            .field("ready", &self.ready)
            .finish()
    }
}

impl PartitionedConvolver {
    /// Build a convolver for `ir` at the given block size.
    ///
    /// `block_size` must equal the audio period length; `ir` must be
    /// mono at the stream's sample rate. All heavy work (partition
    /// transforms, plan construction) happens here.
    pub fn new(ir: &[f32], block_size: usize) -> Result<Self, ConvolverBuildError> {
        if block_size == 0 {
            return Err(ConvolverBuildError::ZeroBlockSize);
        }
        if ir.is_empty() {
            return Err(ConvolverBuildError::EmptyImpulseResponse);
        }

        let block = block_size;
        let fft_len = 2 * block;
        let parts = ir.len().div_ceil(block);

        let mut planner = FftPlanner::new();
        let fwd = planner.plan_fft_forward(fft_len);
        let inv = planner.plan_fft_inverse(fft_len);
        let fwd_scratch = vec![Complex::new(0.0, 0.0); fwd.get_inplace_scratch_len()];
        let inv_scratch = vec![Complex::new(0.0, 0.0); inv.get_inplace_scratch_len()];

        let mut conv = Self {
            block,
            fft_len,
            parts,
            write: 0,
            ready: false,
            fwd,
            inv,
            fwd_scratch,
            inv_scratch,
            time: vec![Complex::new(0.0, 0.0); fft_len],
            acc: vec![Complex::new(0.0, 0.0); fft_len],
            h: vec![vec![Complex::new(0.0, 0.0); fft_len]; parts],
            x: vec![vec![Complex::new(0.0, 0.0); fft_len]; parts],
            overlap: vec![0.0; block],
        };

        // Precompute each IR partition's spectrum: first half the
        // partition samples, second half zeros.
        for k in 0..parts {
            let start = k * block;
            let end = (start + block).min(ir.len());
            for c in conv.time.iter_mut() {
                *c = Complex::new(0.0, 0.0);
            }
            for (i, &s) in ir[start..end].iter().enumerate() {
                conv.time[i] = Complex::new(s, 0.0);
            }
            conv.fwd
                .process_with_scratch(&mut conv.time, &mut conv.fwd_scratch);
            conv.h[k].copy_from_slice(&conv.time);
        }

        conv.ready = true;
        Ok(conv)
    }

    /// Block size this convolver was built for.
    pub fn block_size(&self) -> usize {
        self.block
    }

    /// Number of IR partitions.
    pub fn partitions(&self) -> usize {
        self.parts
    }

    /// True once fully initialised.
    pub fn ready(&self) -> bool {
        self.ready
    }

    /// Convolve one block. `input` and `output` must both be exactly
    /// the block size; returns `false` (leaving `output` untouched)
    /// otherwise. Realtime-safe.
    pub fn process(&mut self, input: &[f32], output: &mut [f32]) -> bool {
        if !self.ready || input.len() != self.block || output.len() != self.block {
            return false;
        }

        // New input block spectrum into the ring. Only the second half
        // needs zeroing after the copy.
        for (c, &s) in self.time.iter_mut().zip(input.iter()) {
            *c = Complex::new(s, 0.0);
        }
        for c in self.time[self.block..].iter_mut() {
            *c = Complex::new(0.0, 0.0);
        }
        self.fwd
            .process_with_scratch(&mut self.time, &mut self.fwd_scratch);
        self.x[self.write].copy_from_slice(&self.time);

        // Y = sum_k X[w-k] * H[k]
        for c in self.acc.iter_mut() {
            *c = Complex::new(0.0, 0.0);
        }
        for k in 0..self.parts {
            let idx = (self.write + self.parts - k) % self.parts;
            let xk = &self.x[idx];
            let hk = &self.h[k];
            for (y, (&xv, &hv)) in self.acc.iter_mut().zip(xk.iter().zip(hk.iter())) {
                *y += xv * hv;
            }
        }

        self.inv
            .process_with_scratch(&mut self.acc, &mut self.inv_scratch);

        // rustfft's inverse is unnormalised; scale by 1/N while
        // overlap-adding the first half and saving the second.
        let norm = 1.0 / self.fft_len as f32;
        for i in 0..self.block {
            output[i] = self.acc[i].re * norm + self.overlap[i];
        }
        for i in 0..self.block {
            self.overlap[i] = self.acc[i + self.block].re * norm;
        }

        self.write = (self.write + 1) % self.parts;
        true
    }
}
