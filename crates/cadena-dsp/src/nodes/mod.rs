//! Realtime node implementations, one per type tag.

mod input;
mod ir_convolver;
mod nam_model;
mod output;
mod overdrive;
mod passthrough;

pub use input::InputNode;
pub use ir_convolver::IrConvolverNode;
pub use nam_model::{NamModelNode, NamModelParams};
pub use output::OutputNode;
pub use overdrive::OverdriveNode;
pub use passthrough::PassthroughNode;
