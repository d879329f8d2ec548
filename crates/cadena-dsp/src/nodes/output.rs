//! Chain exit stage: output gain only.

use cadena_chain::NODE_TYPE_OUTPUT;

use crate::node::{Node, StandardParams};

/// Output-gain node.
pub struct OutputNode {
    id: String,
    std: StandardParams,
}

impl OutputNode {
    /// Create an output node.
    pub fn new(id: impl Into<String>, std: StandardParams) -> Self {
        Self { id: id.into(), std }
    }
}

impl Node for OutputNode {
    fn id(&self) -> &str {
        &self.id
    }

    fn node_type(&self) -> &'static str {
        NODE_TYPE_OUTPUT
    }

    fn process(&mut self, input: &[f32], output: &mut [f32]) {
        if !self.std.enabled {
            output.copy_from_slice(input);
            return;
        }
        let level = self.std.level_lin;
        let wet_g = self.std.mix_wet;
        let dry_g = self.std.mix_dry;
        for (o, &i) in output.iter_mut().zip(input.iter()) {
            let wet = i * level;
            *o = i * dry_g + wet * wet_g;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unity_by_default() {
        let mut node = OutputNode::new("output", StandardParams::default());
        let input = [0.5, -0.5, 0.25, -0.25];
        let mut out = [0.0f32; 4];
        node.process(&input, &mut out);
        assert_eq!(out, input);
    }

    #[test]
    fn applies_level() {
        let std = StandardParams {
            level_lin: 0.25,
            ..StandardParams::default()
        };
        let mut node = OutputNode::new("output", std);
        let mut out = [0.0f32; 1];
        node.process(&[1.0], &mut out);
        assert_eq!(out[0], 0.25);
    }

    #[test]
    fn mix_blends_toward_dry() {
        let std = StandardParams {
            level_lin: 0.0,
            mix_wet: 0.5,
            mix_dry: 0.5,
            ..StandardParams::default()
        };
        let mut node = OutputNode::new("output", std);
        let mut out = [0.0f32; 1];
        node.process(&[1.0], &mut out);
        // Half dry, half silenced wet.
        assert!((out[0] - 0.5).abs() < 1e-6);
    }
}
