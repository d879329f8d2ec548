//! Cabinet stage: partitioned IR convolution.
//!
//! Runs the block through the [`PartitionedConvolver`], then applies
//! node level and wet/dry mix. If the convolver is not ready, the node
//! is disabled, or the block length does not match the convolver's
//! partition size, the node passes through.

use cadena_chain::NODE_TYPE_IR_CONVOLVER;

use crate::convolver::PartitionedConvolver;
use crate::node::{Node, StandardParams};

/// IR cabinet node.
pub struct IrConvolverNode {
    id: String,
    std: StandardParams,
    conv: PartitionedConvolver,
    max_frames: usize,
    wet: Vec<f32>,
}

impl IrConvolverNode {
    /// Create a cabinet node around a built convolver.
    pub fn new(
        id: impl Into<String>,
        std: StandardParams,
        conv: PartitionedConvolver,
        max_frames: usize,
    ) -> Self {
        Self {
            id: id.into(),
            std,
            conv,
            max_frames,
            wet: vec![0.0; max_frames],
        }
    }
}

impl Node for IrConvolverNode {
    fn id(&self) -> &str {
        &self.id
    }

    fn node_type(&self) -> &'static str {
        NODE_TYPE_IR_CONVOLVER
    }

    fn process(&mut self, input: &[f32], output: &mut [f32]) {
        if !self.std.enabled || !self.conv.ready() {
            output.copy_from_slice(input);
            return;
        }

        let frames = input.len().min(self.max_frames);
        if !self
            .conv
            .process(&input[..frames], &mut self.wet[..frames])
        {
            // Off-size block (device reconfiguration edge); stay audible.
            self.wet[..frames].copy_from_slice(&input[..frames]);
        }

        let level = self.std.level_lin;
        let wet_g = self.std.mix_wet;
        let dry_g = self.std.mix_dry;
        for i in 0..frames {
            let wet = self.wet[i] * level;
            output[i] = input[i] * dry_g + wet * wet_g;
        }

        for i in frames..input.len() {
            output[i] = input[i];
        }
    }
}
