//! Neural amp model stage.
//!
//! Wraps an opaque [`AmpModel`]. The input is pre-gained, hard-limited
//! and optionally soft-clipped before the model sees it; the model
//! output is post-gained and mixed against the dry signal. Models
//! trained at different reference levels are driven consistently by an
//! input-level scale derived from file metadata against a 12.2 dBu
//! reference.
//!
//! A model that reports a processing failure is substituted with its
//! own prepared input for that block; nothing propagates to the audio
//! thread.
//!
//! | Param | Range | Default |
//! |-------|-------|---------|
//! | `preGainDb` | −24–24 dB | −12 |
//! | `postGainDb` | −24–24 dB | 0 |
//! | `inLimit` | 0.05–1.0 | 0.90 |
//! | `softclip` | bool | true |
//! | `softclipTanh` | bool | false |
//! | `useInputLevel` | bool | true |

use cadena_chain::NODE_TYPE_NAM_MODEL;
use libm::tanhf;

use crate::math::{db_to_linear, softclip_cubic};
use crate::model::AmpModel;
use crate::node::{Node, StandardParams};

/// Reference level (dBu) that model input-level metadata is scaled to.
const REFERENCE_INPUT_DBU: f32 = 12.2;

/// Tunable knobs for [`NamModelNode`], pre-clamp.
#[derive(Debug, Clone, Copy)]
pub struct NamModelParams {
    /// Gain before the model, dB.
    pub pre_gain_db: f32,
    /// Gain after the model, dB.
    pub post_gain_db: f32,
    /// Hard clip bound before the model.
    pub in_limit: f32,
    /// Soft-clip the limited input.
    pub softclip: bool,
    /// Use `tanh` instead of the cubic shaper.
    pub softclip_tanh: bool,
    /// Apply the metadata-derived input-level scale.
    pub use_input_level: bool,
}

impl Default for NamModelParams {
    fn default() -> Self {
        Self {
            pre_gain_db: -12.0,
            post_gain_db: 0.0,
            in_limit: 0.90,
            softclip: true,
            softclip_tanh: false,
            use_input_level: true,
        }
    }
}

/// Amp-model node.
pub struct NamModelNode {
    id: String,
    std: StandardParams,
    model: Box<dyn AmpModel>,
    max_frames: usize,
    in_buf: Vec<f32>,
    out_buf: Vec<f32>,

    pre_lin: f32,
    post_lin: f32,
    limit: f32,
    softclip: bool,
    softclip_tanh: bool,
}

impl NamModelNode {
    /// Create an amp-model node; resets and prewarms the model for the
    /// stream shape (off the audio thread).
    pub fn new(
        id: impl Into<String>,
        std: StandardParams,
        mut model: Box<dyn AmpModel>,
        sample_rate: u32,
        max_frames: usize,
        params: NamModelParams,
    ) -> Self {
        model.reset_and_prewarm(sample_rate, max_frames);

        let mut level_scale_lin = 1.0;
        if params.use_input_level {
            if let Some(model_dbu) = model.input_level_dbu() {
                level_scale_lin = db_to_linear(REFERENCE_INPUT_DBU - model_dbu);
            }
        }

        Self {
            id: id.into(),
            pre_lin: db_to_linear(params.pre_gain_db.clamp(-24.0, 24.0)) * level_scale_lin,
            post_lin: db_to_linear(params.post_gain_db.clamp(-24.0, 24.0)) * std.level_lin,
            limit: params.in_limit.clamp(0.05, 1.0),
            softclip: params.softclip,
            softclip_tanh: params.softclip_tanh,
            std,
            model,
            max_frames,
            in_buf: vec![0.0; max_frames],
            out_buf: vec![0.0; max_frames],
        }
    }
}

impl Node for NamModelNode {
    fn id(&self) -> &str {
        &self.id
    }

    fn node_type(&self) -> &'static str {
        NODE_TYPE_NAM_MODEL
    }

    fn process(&mut self, input: &[f32], output: &mut [f32]) {
        if !self.std.enabled {
            output.copy_from_slice(input);
            return;
        }

        let frames = input.len().min(self.max_frames);
        let pre = self.pre_lin;
        let post = self.post_lin;
        let limit = self.limit;
        let wet_g = self.std.mix_wet;
        let dry_g = self.std.mix_dry;

        for (dst, &src) in self.in_buf[..frames].iter_mut().zip(input.iter()) {
            let x = (src * pre).clamp(-limit, limit);
            *dst = if !self.softclip {
                x
            } else if self.softclip_tanh {
                tanhf(x)
            } else {
                softclip_cubic(x)
            };
        }

        if self
            .model
            .process(&self.in_buf[..frames], &mut self.out_buf[..frames])
            .is_err()
        {
            // Degrade to passthrough of the prepared input for this block.
            self.out_buf[..frames].copy_from_slice(&self.in_buf[..frames]);
        }

        for i in 0..frames {
            let wet = self.out_buf[i] * post;
            output[i] = input[i] * dry_g + wet * wet_g;
        }

        // Overflow tail beyond the build-time bound passes through.
        for i in frames..input.len() {
            output[i] = input[i];
        }
    }
}
