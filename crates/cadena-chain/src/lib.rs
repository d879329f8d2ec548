//! Cadena Chain - declarative signal-chain descriptions.
//!
//! This crate owns the data model for a cadena signal chain: an ordered
//! list of node specifications (input trim, overdrive, neural amp model,
//! IR cabinet, output gain) described as JSON, validated against the
//! engine's structural invariants, and persisted atomically to disk.
//!
//! The crate performs no DSP and opens no devices. It is the boundary
//! between the control plane (UI, control socket, config file) and the
//! realtime engine: everything here runs on ordinary threads.
//!
//! ## Example
//!
//! ```rust
//! use cadena_chain::{parse_chain_value, validate_chain_spec};
//!
//! let doc = serde_json::json!({
//!     "version": 1,
//!     "sampleRate": 48000,
//!     "chain": [
//!         {"id": "input", "type": "input"},
//!         {"id": "amp1", "type": "nam_model", "asset": {"path": "/tmp/amp.nam"}},
//!         {"id": "cab1", "type": "ir_convolver", "asset": {"path": "/tmp/cab.wav"}},
//!         {"id": "output", "type": "output"},
//!     ],
//! });
//!
//! let spec = parse_chain_value(&doc).unwrap();
//! let spec = validate_chain_spec(spec).unwrap();
//! assert_eq!(spec.chain.len(), 4);
//! ```

pub mod manifest;
pub mod persist;
pub mod schema;
pub mod validate;

pub use manifest::node_type_manifest;
pub use persist::{load_chain_file, persist_chain, PersistError};
pub use schema::{
    chain_to_json, parse_chain_value, AssetRef, ChainSpec, NodeSpec, NODE_TYPE_INPUT,
    NODE_TYPE_IR_CONVOLVER, NODE_TYPE_NAM_MODEL, NODE_TYPE_OUTPUT, NODE_TYPE_OVERDRIVE,
};
pub use validate::{validate_chain_spec, ValidationError};
