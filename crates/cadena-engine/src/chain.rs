//! Compiled signal chains.
//!
//! A [`SignalChain`] is an immutable-after-build pipeline: the spec it
//! was built from, the built nodes in order, and two scratch buffers
//! for ping-pong routing between them. Chains are exclusively owned:
//! built on the control thread, handed to the audio thread through the
//! pending slot, and eventually dropped by the retirement worker. The
//! audio thread therefore gets plain `&mut` access to node state with
//! no interior mutability.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use cadena_chain::{
    ChainSpec, NODE_TYPE_INPUT, NODE_TYPE_IR_CONVOLVER, NODE_TYPE_NAM_MODEL, NODE_TYPE_OUTPUT,
    NODE_TYPE_OVERDRIVE,
};
use cadena_dsp::{build_node, BuildError, ModelLoader, Node, ProcessContext};
use thiserror::Error;

/// Bucket order for [`NodeTimingTable`]; the node-type set is closed,
/// so buckets are a fixed array instead of a dynamic map.
const BUCKET_TYPES: [&str; 5] = [
    NODE_TYPE_INPUT,
    NODE_TYPE_OUTPUT,
    NODE_TYPE_OVERDRIVE,
    NODE_TYPE_NAM_MODEL,
    NODE_TYPE_IR_CONVOLVER,
];

fn bucket_index(node_type: &str) -> usize {
    BUCKET_TYPES
        .iter()
        .position(|&t| t == node_type)
        .unwrap_or(0)
}

#[derive(Debug, Default)]
struct TimingBucket {
    calls: AtomicU64,
    sum_us: AtomicU64,
    max_us: AtomicU64,
}

/// Per-node-type timing accumulators.
///
/// The audio thread records with relaxed atomics; any other thread can
/// snapshot (and optionally reset) without stopping playback.
#[derive(Debug, Default)]
pub struct NodeTimingTable {
    buckets: [TimingBucket; BUCKET_TYPES.len()],
}

/// One row of a timing snapshot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeTimingStat {
    /// Node type the bucket aggregates.
    pub node_type: &'static str,
    /// Number of `process` calls recorded.
    pub calls: u64,
    /// Total wall-clock across calls, microseconds.
    pub sum_us: u64,
    /// Worst single call, microseconds.
    pub max_us: u64,
}

impl NodeTimingTable {
    /// Create a zeroed table.
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    fn record(&self, bucket: usize, micros: u64) {
        let b = &self.buckets[bucket];
        b.calls.fetch_add(1, Ordering::Relaxed);
        b.sum_us.fetch_add(micros, Ordering::Relaxed);
        b.max_us.fetch_max(micros, Ordering::Relaxed);
    }

    /// Copy out all buckets; when `reset` is set, counters are zeroed
    /// after the copy. Non-RT callers only.
    pub fn snapshot(&self, reset: bool) -> Vec<NodeTimingStat> {
        BUCKET_TYPES
            .iter()
            .zip(self.buckets.iter())
            .map(|(&node_type, b)| {
                let stat = NodeTimingStat {
                    node_type,
                    calls: b.calls.load(Ordering::Relaxed),
                    sum_us: b.sum_us.load(Ordering::Relaxed),
                    max_us: b.max_us.load(Ordering::Relaxed),
                };
                if reset {
                    b.calls.store(0, Ordering::Relaxed);
                    b.sum_us.store(0, Ordering::Relaxed);
                    b.max_us.store(0, Ordering::Relaxed);
                }
                stat
            })
            .collect()
    }
}

static NEXT_INSTANCE: AtomicU64 = AtomicU64::new(1);

/// A compiled, ready-to-run chain.
pub struct SignalChain {
    spec: ChainSpec,
    nodes: Vec<Box<dyn Node>>,
    ctx: ProcessContext,
    buf_a: Vec<f32>,
    buf_b: Vec<f32>,
    timing: Option<Arc<NodeTimingTable>>,
    node_buckets: Vec<usize>,
    instance: u64,
}

impl SignalChain {
    /// Assemble a chain from already-built nodes.
    pub fn new(
        spec: ChainSpec,
        nodes: Vec<Box<dyn Node>>,
        ctx: ProcessContext,
        timing: Option<Arc<NodeTimingTable>>,
    ) -> Self {
        let node_buckets = nodes.iter().map(|n| bucket_index(n.node_type())).collect();
        Self {
            buf_a: vec![0.0; ctx.max_block_frames],
            buf_b: vec![0.0; ctx.max_block_frames],
            spec,
            nodes,
            ctx,
            timing,
            node_buckets,
            instance: NEXT_INSTANCE.fetch_add(1, Ordering::Relaxed),
        }
    }

    /// The spec this chain was built from.
    pub fn spec(&self) -> &ChainSpec {
        &self.spec
    }

    /// Process-wide unique id of this compiled instance.
    pub fn instance_id(&self) -> u64 {
        self.instance
    }

    /// Sample rate the chain was built for.
    pub fn sample_rate(&self) -> u32 {
        self.ctx.sample_rate
    }

    /// Maximum frames per `process` call.
    pub fn max_block_frames(&self) -> usize {
        self.ctx.max_block_frames
    }

    /// Number of nodes.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// True when the chain has no nodes (processes as passthrough).
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Run one block through the chain. Realtime-safe.
    ///
    /// Frames beyond the build-time maximum are copied through
    /// unchanged; an empty chain copies the whole block.
    pub fn process(&mut self, input: &[f32], output: &mut [f32]) {
        debug_assert_eq!(input.len(), output.len());

        let frames = input.len().min(self.ctx.max_block_frames);
        if self.nodes.is_empty() {
            output.copy_from_slice(input);
            return;
        }

        if self.timing.is_none() {
            self.nodes[0].process(&input[..frames], &mut self.buf_a[..frames]);
            for i in 1..self.nodes.len() {
                self.nodes[i].process(&self.buf_a[..frames], &mut self.buf_b[..frames]);
                std::mem::swap(&mut self.buf_a, &mut self.buf_b);
            }
        } else {
            self.process_timed(&input[..frames], frames);
        }

        output[..frames].copy_from_slice(&self.buf_a[..frames]);

        // Tail beyond our scratch buffers passes through untouched.
        if frames < input.len() {
            output[frames..].copy_from_slice(&input[frames..]);
        }
    }

    fn process_timed(&mut self, input: &[f32], frames: usize) {
        let table = self.timing.as_ref().map(Arc::clone);
        let Some(table) = table else { return };

        let t0 = Instant::now();
        self.nodes[0].process(input, &mut self.buf_a[..frames]);
        table.record(self.node_buckets[0], t0.elapsed().as_micros() as u64);

        for i in 1..self.nodes.len() {
            let t0 = Instant::now();
            self.nodes[i].process(&self.buf_a[..frames], &mut self.buf_b[..frames]);
            table.record(self.node_buckets[i], t0.elapsed().as_micros() as u64);
            std::mem::swap(&mut self.buf_a, &mut self.buf_b);
        }
    }
}

/// Chain build failure, naming the node that failed.
#[derive(Debug, Error)]
#[error("failed to build node '{id}' ({node_type}): {source}")]
pub struct ChainBuildError {
    /// Id of the failing node.
    pub id: String,
    /// Type of the failing node.
    pub node_type: String,
    /// Underlying build error.
    #[source]
    pub source: BuildError,
}

/// A built chain plus concatenated non-fatal warnings.
pub struct BuildChainResult {
    /// The compiled chain.
    pub chain: Box<SignalChain>,
    /// Newline-joined builder warnings, if any.
    pub warning: Option<String>,
}

impl std::fmt::Debug for BuildChainResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BuildChainResult")
            .field("warning", &self.warning)
            .finish()
    }
}

/// Build every node of a validated spec and assemble the chain.
///
/// Heavy work happens here on the calling (control) thread.
pub fn build_chain(
    spec: &ChainSpec,
    ctx: &ProcessContext,
    models: &dyn ModelLoader,
    timing: Option<Arc<NodeTimingTable>>,
) -> Result<BuildChainResult, ChainBuildError> {
    let mut nodes: Vec<Box<dyn Node>> = Vec::with_capacity(spec.chain.len());
    let mut warnings: Vec<String> = Vec::new();

    for node_spec in &spec.chain {
        let built = build_node(node_spec, ctx, models).map_err(|source| ChainBuildError {
            id: node_spec.id.clone(),
            node_type: node_spec.node_type.clone(),
            source,
        })?;
        if let Some(warning) = built.warning {
            warnings.push(warning);
        }
        nodes.push(built.node);
    }

    Ok(BuildChainResult {
        chain: Box::new(SignalChain::new(spec.clone(), nodes, ctx.clone(), timing)),
        warning: if warnings.is_empty() {
            None
        } else {
            Some(warnings.join("\n"))
        },
    })
}
