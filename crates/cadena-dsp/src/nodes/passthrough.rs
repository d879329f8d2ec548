//! Stand-in node used for boot-safe bypass.
//!
//! When an amp or cabinet node is disabled, or its asset is missing,
//! the builder substitutes one of these so the chain keeps its shape
//! and keeps running. Disabled passthroughs copy input verbatim; an
//! enabled one still honours level and mix (it stands in for a node
//! whose only remaining effect is its gain staging).

use crate::node::{Node, StandardParams};

/// Strict or gain-staged passthrough carrying a borrowed type tag.
pub struct PassthroughNode {
    id: String,
    type_tag: &'static str,
    std: StandardParams,
}

impl PassthroughNode {
    /// Create a passthrough standing in for `type_tag`.
    pub fn new(id: impl Into<String>, type_tag: &'static str, std: StandardParams) -> Self {
        Self {
            id: id.into(),
            type_tag,
            std,
        }
    }
}

impl Node for PassthroughNode {
    fn id(&self) -> &str {
        &self.id
    }

    fn node_type(&self) -> &'static str {
        self.type_tag
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
    use cadena_chain::NODE_TYPE_NAM_MODEL;

    #[test]
    fn disabled_copies_verbatim() {
        let mut node = PassthroughNode::new(
            "amp1",
            NODE_TYPE_NAM_MODEL,
            StandardParams::default().disabled(),
        );
        let input = [0.5, -0.5, 0.25];
        let mut output = [0.0; 3];
        node.process(&input, &mut output);
        assert_eq!(output, input);
        assert_eq!(node.node_type(), "nam_model");
    }

    #[test]
    fn enabled_applies_level() {
        let std = StandardParams {
            level_lin: 0.5,
            ..StandardParams::default()
        };
        let mut node = PassthroughNode::new("amp1", NODE_TYPE_NAM_MODEL, std);
        let mut output = [0.0; 2];
        node.process(&[1.0, -1.0], &mut output);
        assert_eq!(output, [0.5, -0.5]);
    }
}
