//! Chain swap coordination.
//!
//! The audio thread follows one discipline per period:
//!
//! 1. retry any deferred retirement;
//! 2. pick up a pending chain (a previously deferred swap first),
//!    then drain-coalesce to the newest (superseded chains go through
//!    the retirement ring, never freed here);
//! 3. if a chain is in hand and it is safe (no deferred retirement,
//!    ring space available), install it, immediately or via the
//!    click-safe fade-out/fade-in ramp when enabled; otherwise hold it
//!    in the deferred-swap slot;
//! 4. process the block with the installed chain (or passthrough);
//! 5. advance the ramp machine.
//!
//! Two chains are never processed in the same period, no lock is ever
//! taken, and no chain is ever dropped on the audio thread: every
//! replaced handle exits through the retirement ring.
//!
//! Ownership is exclusive end to end: the control thread builds a
//! `Box<SignalChain>`, parks it in the single-slot [`PendingSlot`]
//! (release store), and the audio thread takes it with an acquire
//! exchange. A newer publish drops the superseded pending box on the
//! control thread, which is the intended coalescing behaviour for
//! edit bursts.

use std::ptr;
use std::sync::atomic::{AtomicBool, AtomicPtr, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use cadena_dsp::{InputTrimCell, PeakMeter};

use crate::chain::SignalChain;

/// Capacity of the retirement ring. Small power of two; saturation
/// defers the swap rather than dropping a handle.
pub const RETIRE_QUEUE_CAPACITY: usize = 128;

/// Single-slot handoff cell carrying exclusive chain ownership.
///
/// The raw pointer always originates from `Box::into_raw`, and exactly
/// one side owns it at any time: the slot (until exchanged), the
/// publisher (before the swap), or the taker (after). `publish` uses a
/// release exchange so the taker's acquire sees a fully constructed
/// chain.
pub(crate) struct PendingSlot {
    ptr: AtomicPtr<SignalChain>,
}

impl PendingSlot {
    fn new() -> Self {
        Self {
            ptr: AtomicPtr::new(ptr::null_mut()),
        }
    }

    /// Control-thread side: park a chain, dropping any superseded one
    /// here (never on the audio thread).
    fn publish(&self, chain: Box<SignalChain>) {
        let old = self.ptr.swap(Box::into_raw(chain), Ordering::AcqRel);
        if !old.is_null() {
            // Safety: non-null slot contents are always a Box::into_raw
            // pointer whose ownership we just took over via the swap.
            drop(unsafe { Box::from_raw(old) });
        }
    }

    /// Audio-thread side: take the pending chain, if any.
    fn take(&self) -> Option<Box<SignalChain>> {
        let p = self.ptr.swap(ptr::null_mut(), Ordering::AcqRel);
        if p.is_null() {
            None
        } else {
            // Safety: see `publish`.
            Some(unsafe { Box::from_raw(p) })
        }
    }

    fn is_armed(&self) -> bool {
        !self.ptr.load(Ordering::Acquire).is_null()
    }
}

impl Drop for PendingSlot {
    fn drop(&mut self) {
        let p = *self.ptr.get_mut();
        if !p.is_null() {
            // Safety: sole owner at drop time.
            drop(unsafe { Box::from_raw(p) });
        }
    }
}

/// Process-wide swap state and counters, shared by every thread.
pub struct EngineShared {
    pub(crate) pending: PendingSlot,
    running: AtomicBool,
    passthrough: AtomicBool,
    active_instance: AtomicU64,
    swap_count: AtomicU64,
    retire_full: AtomicU64,
    pub(crate) retired_count: AtomicU64,
    overruns: AtomicU64,

    /// Live input-trim cell, outliving every chain that reads it.
    pub input_trim: Arc<InputTrimCell>,
    /// Peak of the mono capture signal.
    pub peak_input: PeakMeter,
    /// Peak of the processed chain output.
    pub peak_output: PeakMeter,
}

impl EngineShared {
    /// Create shared state; `passthrough` starts the engine bypassed.
    pub fn new(passthrough: bool) -> Arc<Self> {
        Arc::new(Self {
            pending: PendingSlot::new(),
            running: AtomicBool::new(true),
            passthrough: AtomicBool::new(passthrough),
            active_instance: AtomicU64::new(0),
            swap_count: AtomicU64::new(0),
            retire_full: AtomicU64::new(0),
            retired_count: AtomicU64::new(0),
            overruns: AtomicU64::new(0),
            input_trim: Arc::new(InputTrimCell::new(0.0)),
            peak_input: PeakMeter::new(),
            peak_output: PeakMeter::new(),
        })
    }

    /// Publish a freshly built chain as pending; the audio thread
    /// installs it at its next period boundary. Bursts coalesce to the
    /// newest.
    pub fn publish_chain(&self, chain: Box<SignalChain>) {
        self.pending.publish(chain);
    }

    /// True while a published chain has not been picked up yet.
    pub fn has_pending(&self) -> bool {
        self.pending.is_armed()
    }

    /// Ask every engine thread to wind down.
    pub fn request_stop(&self) {
        self.running.store(false, Ordering::Relaxed);
    }

    /// True until [`request_stop`](Self::request_stop).
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Relaxed)
    }

    /// Toggle full-engine bypass (debug knob).
    pub fn set_passthrough(&self, on: bool) {
        self.passthrough.store(on, Ordering::Relaxed);
    }

    /// Current bypass state.
    pub fn passthrough(&self) -> bool {
        self.passthrough.load(Ordering::Relaxed)
    }

    /// Instance id of the installed chain (0 when none).
    pub fn active_instance(&self) -> u64 {
        self.active_instance.load(Ordering::Acquire)
    }

    /// Number of chain installs performed by the audio thread.
    pub fn swap_count(&self) -> u64 {
        self.swap_count.load(Ordering::Relaxed)
    }

    /// Times the retirement ring was full when a handle needed
    /// enqueueing.
    pub fn retire_full(&self) -> u64 {
        self.retire_full.load(Ordering::Relaxed)
    }

    /// Chains dropped by the retirement worker.
    pub fn retired_count(&self) -> u64 {
        self.retired_count.load(Ordering::Relaxed)
    }

    /// Periods whose processing exceeded the deadline (timing enabled
    /// only).
    pub fn overruns(&self) -> u64 {
        self.overruns.load(Ordering::Relaxed)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RampState {
    Idle,
    FadeOut,
    FadeIn,
}

/// Options fixed at coordinator construction.
#[derive(Debug, Clone, Copy)]
pub struct CoordinatorOptions {
    /// Ramp length in samples; 0 disables click-safe ramping.
    pub ramp_samples: u32,
    /// Measure per-period wall clock against the deadline.
    pub timing: bool,
    /// Period length in frames.
    pub period_frames: usize,
    /// Stream sample rate.
    pub sample_rate: u32,
}

/// Audio-thread owner of the active chain and the swap protocol.
///
/// Single-producer side of the retirement ring. Constructed once and
/// moved onto the thread that drives periods.
pub struct SwapCoordinator {
    shared: Arc<EngineShared>,
    retire_tx: rtrb::Producer<Box<SignalChain>>,
    active: Option<Box<SignalChain>>,
    deferred_swap: Option<Box<SignalChain>>,
    deferred_retire: Option<Box<SignalChain>>,
    ramp_samples: u32,
    ramp: RampState,
    next: Option<Box<SignalChain>>,
    timing: bool,
    deadline: Duration,
}

impl SwapCoordinator {
    /// Create the coordinator, optionally pre-installing a boot chain.
    pub fn new(
        shared: Arc<EngineShared>,
        retire_tx: rtrb::Producer<Box<SignalChain>>,
        initial: Option<Box<SignalChain>>,
        opts: CoordinatorOptions,
    ) -> Self {
        if let Some(chain) = &initial {
            shared
                .active_instance
                .store(chain.instance_id(), Ordering::Release);
        }
        let deadline = if opts.sample_rate > 0 {
            Duration::from_secs_f64(opts.period_frames as f64 / f64::from(opts.sample_rate))
        } else {
            Duration::ZERO
        };
        Self {
            shared,
            retire_tx,
            active: initial,
            deferred_swap: None,
            deferred_retire: None,
            ramp_samples: opts.ramp_samples,
            ramp: RampState::Idle,
            next: None,
            timing: opts.timing,
            deadline,
        }
    }

    /// Shared state handle.
    pub fn shared(&self) -> &Arc<EngineShared> {
        &self.shared
    }

    fn retire_has_space(&self) -> bool {
        self.retire_tx.slots() > 0
    }

    fn enqueue_retire(&mut self, chain: Box<SignalChain>) {
        match self.retire_tx.push(chain) {
            Ok(()) => {}
            Err(rtrb::PushError::Full(chain)) => {
                self.shared.retire_full.fetch_add(1, Ordering::Relaxed);
                self.deferred_retire = Some(chain);
            }
        }
    }

    fn install(&mut self, next: Box<SignalChain>) {
        self.shared
            .active_instance
            .store(next.instance_id(), Ordering::Release);
        let old = self.active.replace(next);
        self.shared.swap_count.fetch_add(1, Ordering::Relaxed);
        if let Some(old) = old {
            self.enqueue_retire(old);
        }
    }

    /// Run one audio period: apply the swap protocol, process the
    /// block, step the ramp. Realtime-safe.
    pub fn run_period(&mut self, input: &[f32], output: &mut [f32]) {
        debug_assert_eq!(input.len(), output.len());

        // 1. A chain we could not retire last period gets first claim
        //    on ring space.
        if let Some(old) = self.deferred_retire.take() {
            self.enqueue_retire(old);
        }

        // 2. Pick up pending work; a deferred swap takes priority, and
        //    bursts coalesce to the newest publish. A superseded chain
        //    exits through the retirement ring, so coalescing pauses
        //    while the ring has no room for the loser.
        let mut pending = match self.deferred_swap.take() {
            Some(held) => Some(held),
            None => self.shared.pending.take(),
        };
        if pending.is_some() {
            while self.deferred_retire.is_none()
                && self.retire_has_space()
                && self.shared.pending.is_armed()
            {
                let Some(newer) = self.shared.pending.take() else {
                    break;
                };
                let superseded = pending.replace(newer);
                if let Some(superseded) = superseded {
                    self.enqueue_retire(superseded);
                }
            }
        }

        let passthrough = self.shared.passthrough();

        // 3. Swap now, ramp, or defer.
        if let Some(next) = pending.take() {
            let can_swap_now =
                self.active.is_none() || (self.deferred_retire.is_none() && self.retire_has_space());
            if !can_swap_now {
                self.deferred_swap = Some(next);
            } else if !passthrough && self.ramp_samples > 0 && self.active.is_some() {
                // A chain already staged for the ramp is superseded; it
                // exits through the ring like any other replaced handle.
                if let Some(replaced) = self.next.replace(next) {
                    self.enqueue_retire(replaced);
                }
                if self.ramp == RampState::Idle {
                    self.ramp = RampState::FadeOut;
                }
            } else {
                self.install(next);
            }
        }

        self.shared.peak_input.update_block(input);

        // 4. Process with the installed chain.
        let mut processed = false;
        if !passthrough {
            if let Some(chain) = self.active.as_mut() {
                if self.timing {
                    let t0 = Instant::now();
                    chain.process(input, output);
                    if !self.deadline.is_zero() && t0.elapsed() > self.deadline {
                        self.shared.overruns.fetch_add(1, Ordering::Relaxed);
                    }
                } else {
                    chain.process(input, output);
                }
                processed = true;
            }
        }
        if !processed {
            output.copy_from_slice(input);
        }

        // 5. Ramp machine: fade the old chain's last block out, swap at
        //    the boundary, fade the new chain's first block in.
        if !passthrough && self.ramp_samples > 0 {
            match self.ramp {
                RampState::FadeOut => {
                    apply_fade_out(output, self.ramp_samples);
                    match self.next.take() {
                        Some(next) => {
                            if self.deferred_retire.is_some() || !self.retire_has_space() {
                                self.deferred_swap = Some(next);
                                self.ramp = RampState::Idle;
                            } else {
                                self.install(next);
                                self.ramp = RampState::FadeIn;
                            }
                        }
                        None => self.ramp = RampState::Idle,
                    }
                }
                RampState::FadeIn => {
                    apply_fade_in(output, self.ramp_samples);
                    self.ramp = RampState::Idle;
                }
                RampState::Idle => {}
            }
        }

        self.shared.peak_output.update_block(output);
    }
}

fn apply_fade_out(buf: &mut [f32], ramp: u32) {
    if ramp == 0 || buf.is_empty() {
        return;
    }
    let len = buf.len();
    let ramp = (ramp as usize).min(len);
    if ramp == 1 {
        buf[len - 1] = 0.0;
        return;
    }
    for i in 0..ramp {
        let t = i as f32 / (ramp - 1) as f32; // 0..1
        buf[len - ramp + i] *= 1.0 - t;
    }
}

fn apply_fade_in(buf: &mut [f32], ramp: u32) {
    if ramp == 0 || buf.is_empty() {
        return;
    }
    let ramp = (ramp as usize).min(buf.len());
    if ramp == 1 {
        buf[0] = 0.0;
        return;
    }
    for (i, s) in buf.iter_mut().take(ramp).enumerate() {
        let t = i as f32 / (ramp - 1) as f32;
        *s *= t;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cadena_chain::ChainSpec;
    use cadena_dsp::ProcessContext;

    fn empty_chain() -> Box<SignalChain> {
        Box::new(SignalChain::new(
            ChainSpec::default(),
            Vec::new(),
            ProcessContext::new(48000, 8),
            None,
        ))
    }

    #[test]
    fn pending_slot_hands_over_exclusively() {
        let slot = PendingSlot::new();
        assert!(!slot.is_armed());
        assert!(slot.take().is_none());

        let chain = empty_chain();
        let id = chain.instance_id();
        slot.publish(chain);
        assert!(slot.is_armed());

        let taken = slot.take().unwrap();
        assert_eq!(taken.instance_id(), id);
        assert!(!slot.is_armed());
        assert!(slot.take().is_none());
    }

    #[test]
    fn pending_slot_coalesces_on_publish() {
        let slot = PendingSlot::new();
        slot.publish(empty_chain());
        let newer = empty_chain();
        let newer_id = newer.instance_id();
        slot.publish(newer);

        // Only the newest survives.
        assert_eq!(slot.take().unwrap().instance_id(), newer_id);
        assert!(slot.take().is_none());
    }

    #[test]
    fn pending_slot_drop_releases_contents() {
        // Must not leak; exercised under the test allocator.
        let slot = PendingSlot::new();
        slot.publish(empty_chain());
        drop(slot);
    }

    #[test]
    fn fade_out_shapes_block_tail() {
        let mut buf = [1.0f32; 8];
        apply_fade_out(&mut buf, 4);
        assert_eq!(buf[..4], [1.0; 4]);
        assert_eq!(buf[4], 1.0);
        assert!((buf[5] - 2.0 / 3.0).abs() < 1e-6);
        assert!((buf[6] - 1.0 / 3.0).abs() < 1e-6);
        assert_eq!(buf[7], 0.0);
    }

    #[test]
    fn fade_in_shapes_block_head() {
        let mut buf = [1.0f32; 8];
        apply_fade_in(&mut buf, 4);
        assert_eq!(buf[0], 0.0);
        assert!((buf[1] - 1.0 / 3.0).abs() < 1e-6);
        assert!((buf[2] - 2.0 / 3.0).abs() < 1e-6);
        assert_eq!(buf[3], 1.0);
        assert_eq!(buf[4..], [1.0; 4]);
    }

    #[test]
    fn fade_handles_degenerate_lengths() {
        let mut buf = [1.0f32; 2];
        apply_fade_out(&mut buf, 1);
        assert_eq!(buf, [1.0, 0.0]);

        let mut buf = [1.0f32; 2];
        apply_fade_in(&mut buf, 1);
        assert_eq!(buf, [0.0, 1.0]);

        // Ramp longer than the block clamps to the block.
        let mut buf = [1.0f32; 2];
        apply_fade_out(&mut buf, 100);
        assert_eq!(buf, [1.0, 0.0]);

        let mut empty: [f32; 0] = [];
        apply_fade_out(&mut empty, 4);
        apply_fade_in(&mut empty, 4);
    }
}
