//! Node builder: spec in, realtime-ready node out.
//!
//! All heavy work happens here, on the control thread: model loading
//! and prewarm, IR decode and conditioning, convolver plan
//! construction, and precomputation of every linear factor the
//! per-sample path needs.
//!
//! Boot safety: a `nam_model` or `ir_convolver` that is disabled, or
//! whose asset path is missing, builds as a passthrough (with a
//! warning in the missing-asset case) instead of failing, so a rig
//! with a half-written config still makes sound. Asset load failures
//! and IR sample-rate mismatches are hard errors; those indicate a
//! chain that claims an asset it cannot use.

use cadena_chain::{
    NodeSpec, NODE_TYPE_INPUT, NODE_TYPE_IR_CONVOLVER, NODE_TYPE_NAM_MODEL, NODE_TYPE_OUTPUT,
    NODE_TYPE_OVERDRIVE,
};
use thiserror::Error;

use crate::convolver::{ConvolverBuildError, PartitionedConvolver};
use crate::ir::{condition_ir, load_ir_mono, IrConditioning, IrLoadError};
use crate::math::db_to_linear;
use crate::model::{ModelLoadError, ModelLoader};
use crate::node::{Node, ProcessContext, StandardParams};
use crate::nodes::{
    InputNode, IrConvolverNode, NamModelNode, NamModelParams, OutputNode, OverdriveNode,
    PassthroughNode,
};

/// Errors from building a single node.
#[derive(Debug, Error)]
pub enum BuildError {
    /// The spec named a type no builder recognises.
    #[error("unknown node type: {0}")]
    UnknownNodeType(String),

    /// Amp model failed to load.
    #[error("failed to load amp model: {0}")]
    Model(#[from] ModelLoadError),

    /// IR failed to load or decode.
    #[error("failed to load IR: {0}")]
    Ir(#[from] IrLoadError),

    /// IR sample rate does not match the engine's.
    #[error("IR sample-rate mismatch (IR={ir} engine={engine})")]
    IrSampleRateMismatch {
        /// Sample rate of the IR file.
        ir: u32,
        /// Engine sample rate.
        engine: u32,
    },

    /// Convolver construction failed.
    #[error("IR convolver init failed: {0}")]
    Convolver(#[from] ConvolverBuildError),
}

/// A built node plus any non-fatal warning.
pub struct NodeBuildResult {
    /// The realtime-ready node.
    pub node: Box<dyn Node>,
    /// Non-fatal condition worth surfacing to the control client.
    pub warning: Option<String>,
}

impl std::fmt::Debug for NodeBuildResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NodeBuildResult")
            .field("warning", &self.warning)
            .finish()
    }
}

impl NodeBuildResult {
    fn ok(node: Box<dyn Node>) -> Self {
        Self {
            node,
            warning: None,
        }
    }

    fn warn(node: Box<dyn Node>, warning: String) -> Self {
        Self {
            node,
            warning: Some(warning),
        }
    }
}

/// Build one node from its spec.
///
/// `models` is the amp-model collaborator; it is only consulted for
/// enabled `nam_model` nodes with an asset path.
pub fn build_node(
    spec: &NodeSpec,
    ctx: &ProcessContext,
    models: &dyn ModelLoader,
) -> Result<NodeBuildResult, BuildError> {
    match spec.node_type.as_str() {
        NODE_TYPE_INPUT => Ok(build_input(spec, ctx)),
        NODE_TYPE_OUTPUT => Ok(NodeBuildResult::ok(Box::new(OutputNode::new(
            spec.id.clone(),
            StandardParams::from_spec(spec),
        )))),
        NODE_TYPE_OVERDRIVE => Ok(build_overdrive(spec)),
        NODE_TYPE_NAM_MODEL => build_nam_model(spec, ctx, models),
        NODE_TYPE_IR_CONVOLVER => build_ir_convolver(spec, ctx),
        other => Err(BuildError::UnknownNodeType(other.to_string())),
    }
}

fn build_input(spec: &NodeSpec, ctx: &ProcessContext) -> NodeBuildResult {
    let std = StandardParams::from_spec(spec);
    let trim_db = spec
        .num_param("inputTrimDb")
        .map(|v| v.clamp(-24.0, 24.0))
        .unwrap_or(0.0);
    let trim_lin = db_to_linear(trim_db);

    // Seed the engine's realtime cell from the spec so boot config sets
    // the initial trim and runtime controls keep updating it.
    if let Some(cell) = &ctx.input_trim {
        cell.set_db(trim_db);
    }

    NodeBuildResult::ok(Box::new(InputNode::new(
        spec.id.clone(),
        std,
        ctx.input_trim.clone(),
        trim_lin,
    )))
}

fn build_overdrive(spec: &NodeSpec) -> NodeBuildResult {
    let std = StandardParams::from_spec(spec);
    let drive = spec.num_param("drive").unwrap_or(0.6);
    let tone = spec.num_param("tone").unwrap_or(0.5);
    NodeBuildResult::ok(Box::new(OverdriveNode::new(
        spec.id.clone(),
        std,
        drive,
        tone,
    )))
}

fn build_nam_model(
    spec: &NodeSpec,
    ctx: &ProcessContext,
    models: &dyn ModelLoader,
) -> Result<NodeBuildResult, BuildError> {
    if !spec.enabled {
        let std = StandardParams::from_spec(spec).disabled();
        return Ok(NodeBuildResult::ok(Box::new(PassthroughNode::new(
            spec.id.clone(),
            NODE_TYPE_NAM_MODEL,
            std,
        ))));
    }

    let Some(asset) = spec.asset.as_ref().filter(|a| !a.path.as_os_str().is_empty()) else {
        let std = StandardParams::from_spec(spec).disabled();
        return Ok(NodeBuildResult::warn(
            Box::new(PassthroughNode::new(
                spec.id.clone(),
                NODE_TYPE_NAM_MODEL,
                std,
            )),
            "nam_model missing asset.path (bypassing)".to_string(),
        ));
    };

    let model = models.load(&asset.path)?;

    // Warn on sample-rate mismatch but keep running; models tolerate it.
    let mut warning = None;
    if let Some(expected) = model.expected_sample_rate() {
        if expected > 0.0 && expected.round() as i64 != i64::from(ctx.sample_rate) {
            warning = Some(format!(
                "model expected sampleRate={} but engine is {}",
                expected.round() as i64,
                ctx.sample_rate
            ));
        }
    }

    let params = NamModelParams {
        pre_gain_db: spec.num_param("preGainDb").unwrap_or(-12.0),
        post_gain_db: spec.num_param("postGainDb").unwrap_or(0.0),
        in_limit: spec.num_param("inLimit").unwrap_or(0.90),
        softclip: spec.bool_param("softclip").unwrap_or(true),
        softclip_tanh: spec.bool_param("softclipTanh").unwrap_or(false),
        use_input_level: spec.bool_param("useInputLevel").unwrap_or(true),
    };

    let node = NamModelNode::new(
        spec.id.clone(),
        StandardParams::from_spec(spec),
        model,
        ctx.sample_rate,
        ctx.max_block_frames,
        params,
    );

    Ok(NodeBuildResult {
        node: Box::new(node),
        warning,
    })
}

fn build_ir_convolver(spec: &NodeSpec, ctx: &ProcessContext) -> Result<NodeBuildResult, BuildError> {
    if !spec.enabled {
        let std = StandardParams::from_spec(spec).disabled();
        return Ok(NodeBuildResult::ok(Box::new(PassthroughNode::new(
            spec.id.clone(),
            NODE_TYPE_IR_CONVOLVER,
            std,
        ))));
    }

    let Some(asset) = spec.asset.as_ref().filter(|a| !a.path.as_os_str().is_empty()) else {
        let std = StandardParams::from_spec(spec).disabled();
        return Ok(NodeBuildResult::warn(
            Box::new(PassthroughNode::new(
                spec.id.clone(),
                NODE_TYPE_IR_CONVOLVER,
                std,
            )),
            "ir_convolver missing asset.path (bypassing)".to_string(),
        ));
    };

    let mut ir = load_ir_mono(&asset.path)?;
    if ir.sample_rate != ctx.sample_rate {
        return Err(BuildError::IrSampleRateMismatch {
            ir: ir.sample_rate,
            engine: ctx.sample_rate,
        });
    }

    let conditioning = IrConditioning {
        gain_db: spec.num_param("gainDb").unwrap_or(0.0),
        target_db: spec.num_param("targetDb"),
        max_samples: spec
            .num_param("maxSamples")
            .filter(|&v| v > 0.0)
            .map(|v| v.round() as usize),
        max_ms: spec.num_param("maxMs").filter(|&v| v > 0.0),
    };
    let warning = condition_ir(&mut ir, ctx.sample_rate, &conditioning);

    let conv = PartitionedConvolver::new(&ir.samples, ctx.max_block_frames)?;
    let node = IrConvolverNode::new(
        spec.id.clone(),
        StandardParams::from_spec(spec),
        conv,
        ctx.max_block_frames,
    );

    Ok(NodeBuildResult {
        node: Box::new(node),
        warning,
    })
}
