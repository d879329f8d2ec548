//! Core node trait and shared node vocabulary.

use std::sync::Arc;

use cadena_chain::NodeSpec;

use crate::math::db_to_linear;
use crate::rt::InputTrimCell;

/// A realtime processor in the signal chain.
///
/// # Realtime contract
///
/// `process` runs on the audio thread: no allocation, no locks, no I/O,
/// no panics. `input` and `output` always have equal length. A node
/// built with a maximum block size must pass any overflow tail through
/// unchanged rather than touching unsized internal buffers.
pub trait Node: Send {
    /// Unique id from the spec this node was built from.
    fn id(&self) -> &str;

    /// Type tag (`"input"`, `"overdrive"`, ...).
    fn node_type(&self) -> &'static str;

    /// Process one mono block.
    fn process(&mut self, input: &[f32], output: &mut [f32]);
}

/// Build-time context shared by every node of a chain.
#[derive(Debug, Clone)]
pub struct ProcessContext {
    /// Fixed sample rate for the chain's lifetime.
    pub sample_rate: u32,
    /// Upper bound on frames per `process` call; scratch buffers are
    /// sized to this.
    pub max_block_frames: usize,
    /// Optional live input-trim cell. The engine owns it and guarantees
    /// it outlives every chain that references it (it is an `Arc`).
    pub input_trim: Option<Arc<InputTrimCell>>,
}

impl ProcessContext {
    /// Context with no realtime parameter cells.
    pub fn new(sample_rate: u32, max_block_frames: usize) -> Self {
        Self {
            sample_rate,
            max_block_frames,
            input_trim: None,
        }
    }
}

/// Parameters recognised on every node, with derived linear factors
/// cached at build time so `process` never calls `pow`.
#[derive(Debug, Clone, Copy)]
pub struct StandardParams {
    /// Disabled nodes are strict passthrough.
    pub enabled: bool,
    /// Post-gain on the wet signal, dB (clamped −48..+24).
    pub level_db: f32,
    /// Wet/dry crossfade (clamped 0..1, 1 = wet only).
    pub mix: f32,
    /// `level_db` as linear gain.
    pub level_lin: f32,
    /// Wet weight (= mix).
    pub mix_wet: f32,
    /// Dry weight (= 1 − mix).
    pub mix_dry: f32,
}

impl Default for StandardParams {
    fn default() -> Self {
        Self {
            enabled: true,
            level_db: 0.0,
            mix: 1.0,
            level_lin: 1.0,
            mix_wet: 1.0,
            mix_dry: 0.0,
        }
    }
}

impl StandardParams {
    /// Parse and clamp the standard parameters from a node spec.
    ///
    /// `outputGainDb` is accepted as an alias of `levelDb` for older
    /// chain files.
    pub fn from_spec(spec: &NodeSpec) -> Self {
        let mut p = Self {
            enabled: spec.enabled,
            ..Self::default()
        };

        if let Some(db) = spec.num_param("levelDb") {
            p.level_db = db;
        }
        if let Some(db) = spec.num_param("outputGainDb") {
            p.level_db = db;
        }
        if let Some(mix) = spec.num_param("mix") {
            p.mix = mix;
        }

        p.level_db = p.level_db.clamp(-48.0, 24.0);
        p.mix = p.mix.clamp(0.0, 1.0);

        p.level_lin = db_to_linear(p.level_db);
        p.mix_wet = p.mix;
        p.mix_dry = 1.0 - p.mix;
        p
    }

    /// Force the disabled state (used for boot-safe bypass nodes).
    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }
}
