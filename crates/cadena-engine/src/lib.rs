//! Cadena Engine - the realtime chain runtime.
//!
//! Ties the chain description ([`cadena_chain`]) and the DSP nodes
//! ([`cadena_dsp`]) into a running engine:
//!
//! - [`SignalChain`]: a compiled, exclusively-owned pipeline of nodes
//! - [`SwapCoordinator`]: the audio thread's per-period protocol for
//!   installing pending chains without locks, allocation or audible
//!   glitches
//! - the retirement worker, which drops replaced chains off the audio
//!   thread
//! - the control server, a unix-socket JSON endpoint for live chain
//!   edits
//! - [`ChainRuntime`], which boots the persisted chain and owns the
//!   background threads
//!
//! The audio device itself stays behind [`DuplexDevice`]; backends
//! live in host binaries.
//!
//! ## Threading picture
//!
//! ```text
//! control thread          audio thread             retirement thread
//! ==============          ============             =================
//! parse/validate
//! build chain
//! persist to disk
//! publish ──────────────▶ pending (atomic slot)
//!                         take at period boundary
//!                         [ramp] install as active
//!                         old chain ─────────────▶ SPSC ring ──▶ drop
//! ```

pub mod chain;
pub mod control;
pub mod device;
pub mod retire;
pub mod runtime;
pub mod swap;

pub use chain::{
    build_chain, BuildChainResult, ChainBuildError, NodeTimingStat, NodeTimingTable, SignalChain,
};
pub use control::{spawn_control_server, ControlContext};
pub use device::{run_audio_loop, DeviceError, DuplexDevice};
pub use retire::spawn_retirement_worker;
pub use runtime::{ChainRuntime, EngineConfig};
pub use swap::{CoordinatorOptions, EngineShared, SwapCoordinator, RETIRE_QUEUE_CAPACITY};
