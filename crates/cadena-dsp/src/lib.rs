//! Cadena DSP - realtime nodes for the guitar signal chain.
//!
//! This crate provides the processing side of a cadena chain:
//!
//! - [`Node`] trait plus the five node types (input trim, output gain,
//!   overdrive, neural amp model, IR cabinet convolver)
//! - [`PartitionedConvolver`] uniform-partition frequency-domain
//!   convolution sized to the audio period
//! - [`build_node`], which turns a validated [`NodeSpec`] into a
//!   realtime-ready node, doing all heavy lifting (model load, IR
//!   decode and conditioning, FFT plan construction) off the audio
//!   thread
//! - lock-free float cells ([`rt`]) for parameters the UI may move
//!   between chain rebuilds
//!
//! ## Realtime contract
//!
//! Every `Node::process` implementation is allocation-free, lock-free
//! and fault-free: buffers are sized at build time, transcendental
//! math is precomputed into linear factors, and a failing amp model
//! degrades to passthrough for the block instead of propagating. If a
//! caller ever hands a node more frames than its build-time bound, the
//! overflow tail is copied through unchanged.
//!
//! [`NodeSpec`]: cadena_chain::NodeSpec

pub mod build;
pub mod convolver;
pub mod ir;
pub mod math;
pub mod model;
pub mod node;
pub mod nodes;
pub mod rt;

pub use build::{build_node, BuildError, NodeBuildResult};
pub use convolver::{ConvolverBuildError, PartitionedConvolver};
pub use ir::{load_ir_mono, IrConditioning, IrData, IrLoadError};
pub use math::{db_to_linear, linear_to_db, softclip_cubic};
pub use model::{AmpModel, ModelLoadError, ModelLoader, ModelProcessError, NamFileLoader};
pub use node::{Node, ProcessContext, StandardParams};
pub use rt::{AtomicF32, InputTrimCell, PeakMeter};
