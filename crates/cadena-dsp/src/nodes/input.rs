//! Chain entry stage: input trim plus optional node-level gain.
//!
//! Trim is read from the engine's realtime cell once per block when one
//! is bound, so knob moves from the UI or a control client apply
//! sub-block without rebuilding the chain. The spec value is the
//! fallback when the engine runs without a cell.

use std::sync::Arc;

use cadena_chain::NODE_TYPE_INPUT;

use crate::node::{Node, StandardParams};
use crate::rt::InputTrimCell;

/// Input-trim node.
pub struct InputNode {
    id: String,
    std: StandardParams,
    trim: Option<Arc<InputTrimCell>>,
    fallback_trim_lin: f32,
}

impl InputNode {
    /// Create an input node. `fallback_trim_lin` is used when no
    /// realtime cell is bound.
    pub fn new(
        id: impl Into<String>,
        std: StandardParams,
        trim: Option<Arc<InputTrimCell>>,
        fallback_trim_lin: f32,
    ) -> Self {
        Self {
            id: id.into(),
            std,
            trim,
            fallback_trim_lin,
        }
    }
}

impl Node for InputNode {
    fn id(&self) -> &str {
        &self.id
    }

    fn node_type(&self) -> &'static str {
        NODE_TYPE_INPUT
    }

    fn process(&mut self, input: &[f32], output: &mut [f32]) {
        if !self.std.enabled {
            output.copy_from_slice(input);
            return;
        }

        let trim = match &self.trim {
            Some(cell) => cell.linear(),
            None => self.fallback_trim_lin,
        };
        let level = self.std.level_lin;
        let wet_g = self.std.mix_wet;
        let dry_g = self.std.mix_dry;

        for (o, &i) in output.iter_mut().zip(input.iter()) {
            let wet = i * trim * level;
            *o = i * dry_g + wet * wet_g;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::math::db_to_linear;

    #[test]
    fn applies_fallback_trim() {
        // +6.0206 dB is a gain of ~2.
        let mut node = InputNode::new(
            "input",
            StandardParams::default(),
            None,
            db_to_linear(6.0206),
        );
        let mut out = [0.0f32; 2];
        node.process(&[0.1, 0.2], &mut out);
        assert!((out[0] - 0.2).abs() < 1e-4);
        assert!((out[1] - 0.4).abs() < 1e-4);
    }

    #[test]
    fn follows_live_cell_updates() {
        let cell = Arc::new(InputTrimCell::new(0.0));
        let mut node = InputNode::new("input", StandardParams::default(), Some(cell.clone()), 1.0);

        let mut out = [0.0f32; 1];
        node.process(&[0.5], &mut out);
        assert!((out[0] - 0.5).abs() < 1e-6);

        cell.set_db(-6.0206);
        node.process(&[0.5], &mut out);
        assert!((out[0] - 0.25).abs() < 1e-3);
    }

    #[test]
    fn disabled_is_passthrough() {
        let mut node = InputNode::new("input", StandardParams::default().disabled(), None, 4.0);
        let mut out = [0.0f32; 2];
        node.process(&[0.5, -0.5], &mut out);
        assert_eq!(out, [0.5, -0.5]);
    }
}
