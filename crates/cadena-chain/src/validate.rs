//! Structural validation of parsed chain specs.
//!
//! Validation enforces the invariants the engine relies on: version 1,
//! at least input and output, `input` first and `output` last, at least
//! one amp model appearing before the first cabinet convolver, and
//! unique non-empty node ids. It performs no I/O and does not inspect
//! parameter values; those are clamped by the node builder.

use std::collections::HashSet;

use thiserror::Error;

use crate::schema::{
    ChainSpec, NODE_TYPE_INPUT, NODE_TYPE_IR_CONVOLVER, NODE_TYPE_NAM_MODEL, NODE_TYPE_OUTPUT,
};

/// Errors produced while parsing or validating a chain document.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// Top-level document was not a JSON object.
    #[error("top-level chain document must be a JSON object")]
    NotAnObject,

    /// `version` was missing or not an integer.
    #[error("missing or non-integer 'version'")]
    BadVersion,

    /// `version` was an integer other than 1.
    #[error("unsupported chain version {0} (only version 1 is supported)")]
    UnsupportedVersion(i64),

    /// `sampleRate` was present but not a positive integer.
    #[error("'sampleRate' must be a positive integer")]
    BadSampleRate,

    /// `chain` was missing or not an array.
    #[error("missing or invalid 'chain' (must be an array)")]
    MissingChain,

    /// A chain element was not an object.
    #[error("each chain element must be an object")]
    NodeNotAnObject,

    /// A node was missing a required string field.
    #[error("node missing required string field '{0}'")]
    MissingNodeField(&'static str),

    /// A node field had the wrong type.
    #[error("node field '{field}' must be {expected}")]
    BadNodeField {
        /// Field name.
        field: &'static str,
        /// Expected JSON type.
        expected: &'static str,
    },

    /// A node `asset` object lacked a string `path`.
    #[error("node asset requires string field 'path'")]
    BadAsset,

    /// A legacy-shape field had the wrong type.
    #[error("legacy field '{0}' has the wrong type")]
    BadLegacyField(&'static str),

    /// A node id was empty.
    #[error("node id must be non-empty")]
    EmptyNodeId,

    /// Two nodes shared an id.
    #[error("duplicate node id: {0}")]
    DuplicateNodeId(String),

    /// A node type was empty.
    #[error("node type must be non-empty")]
    EmptyNodeType,

    /// Fewer than two nodes.
    #[error("chain must contain at least an input and an output node")]
    TooShort,

    /// The first node was not an `input`.
    #[error("first node must be type 'input'")]
    FirstNotInput,

    /// The last node was not an `output`.
    #[error("last node must be type 'output'")]
    LastNotOutput,

    /// No `nam_model` node present.
    #[error("chain must contain a 'nam_model' node")]
    MissingAmp,

    /// No `ir_convolver` node present.
    #[error("chain must contain an 'ir_convolver' node")]
    MissingCab,

    /// The first amp did not precede the first cabinet.
    #[error("invalid ordering: 'nam_model' must appear before 'ir_convolver'")]
    AmpAfterCab,
}

/// Validate a parsed [`ChainSpec`] against the structural invariants.
///
/// Consumes the spec and hands it back on success so callers cannot
/// accidentally keep using an unvalidated one.
pub fn validate_chain_spec(spec: ChainSpec) -> Result<ChainSpec, ValidationError> {
    if spec.version != 1 {
        return Err(ValidationError::UnsupportedVersion(spec.version));
    }

    if spec.chain.len() < 2 {
        return Err(ValidationError::TooShort);
    }

    let mut ids = HashSet::with_capacity(spec.chain.len());
    for node in &spec.chain {
        if node.id.is_empty() {
            return Err(ValidationError::EmptyNodeId);
        }
        if !ids.insert(node.id.as_str()) {
            return Err(ValidationError::DuplicateNodeId(node.id.clone()));
        }
        if node.node_type.is_empty() {
            return Err(ValidationError::EmptyNodeType);
        }
    }

    if spec.chain.first().map(|n| n.node_type.as_str()) != Some(NODE_TYPE_INPUT) {
        return Err(ValidationError::FirstNotInput);
    }
    if spec.chain.last().map(|n| n.node_type.as_str()) != Some(NODE_TYPE_OUTPUT) {
        return Err(ValidationError::LastNotOutput);
    }

    let amp_idx = spec
        .chain
        .iter()
        .position(|n| n.node_type == NODE_TYPE_NAM_MODEL)
        .ok_or(ValidationError::MissingAmp)?;
    let cab_idx = spec
        .chain
        .iter()
        .position(|n| n.node_type == NODE_TYPE_IR_CONVOLVER)
        .ok_or(ValidationError::MissingCab)?;
    if amp_idx >= cab_idx {
        return Err(ValidationError::AmpAfterCab);
    }

    Ok(spec)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::NodeSpec;

    fn spec_of(types_and_ids: &[(&str, &str)]) -> ChainSpec {
        ChainSpec {
            chain: types_and_ids
                .iter()
                .map(|(id, ty)| NodeSpec::new(*id, *ty))
                .collect(),
            ..ChainSpec::default()
        }
    }

    fn valid_spec() -> ChainSpec {
        spec_of(&[
            ("input", "input"),
            ("amp1", "nam_model"),
            ("cab1", "ir_convolver"),
            ("output", "output"),
        ])
    }

    #[test]
    fn accepts_minimal_amp_cab_chain() {
        assert!(validate_chain_spec(valid_spec()).is_ok());
    }

    #[test]
    fn accepts_extra_fx_between_stages() {
        let spec = spec_of(&[
            ("input", "input"),
            ("od", "overdrive"),
            ("amp1", "nam_model"),
            ("cab1", "ir_convolver"),
            ("output", "output"),
        ]);
        assert!(validate_chain_spec(spec).is_ok());
    }

    #[test]
    fn rejects_wrong_version() {
        let mut spec = valid_spec();
        spec.version = 3;
        assert_eq!(
            validate_chain_spec(spec),
            Err(ValidationError::UnsupportedVersion(3))
        );
    }

    #[test]
    fn rejects_short_chain() {
        let spec = spec_of(&[("input", "input")]);
        assert_eq!(validate_chain_spec(spec), Err(ValidationError::TooShort));
    }

    #[test]
    fn rejects_empty_id() {
        let spec = spec_of(&[
            ("", "input"),
            ("amp1", "nam_model"),
            ("cab1", "ir_convolver"),
            ("output", "output"),
        ]);
        assert_eq!(validate_chain_spec(spec), Err(ValidationError::EmptyNodeId));
    }

    #[test]
    fn rejects_duplicate_ids() {
        let spec = spec_of(&[
            ("input", "input"),
            ("x", "nam_model"),
            ("x", "ir_convolver"),
            ("output", "output"),
        ]);
        assert_eq!(
            validate_chain_spec(spec),
            Err(ValidationError::DuplicateNodeId("x".to_string()))
        );
    }

    #[test]
    fn rejects_empty_type() {
        let spec = spec_of(&[
            ("input", "input"),
            ("amp1", ""),
            ("cab1", "ir_convolver"),
            ("output", "output"),
        ]);
        assert_eq!(
            validate_chain_spec(spec),
            Err(ValidationError::EmptyNodeType)
        );
    }

    #[test]
    fn rejects_wrong_endpoints() {
        let spec = spec_of(&[
            ("amp1", "nam_model"),
            ("cab1", "ir_convolver"),
            ("output", "output"),
        ]);
        assert_eq!(
            validate_chain_spec(spec),
            Err(ValidationError::FirstNotInput)
        );

        let spec = spec_of(&[
            ("input", "input"),
            ("amp1", "nam_model"),
            ("cab1", "ir_convolver"),
        ]);
        assert_eq!(
            validate_chain_spec(spec),
            Err(ValidationError::LastNotOutput)
        );
    }

    #[test]
    fn rejects_missing_amp_or_cab() {
        let spec = spec_of(&[
            ("input", "input"),
            ("cab1", "ir_convolver"),
            ("output", "output"),
        ]);
        assert_eq!(validate_chain_spec(spec), Err(ValidationError::MissingAmp));

        let spec = spec_of(&[
            ("input", "input"),
            ("amp1", "nam_model"),
            ("output", "output"),
        ]);
        assert_eq!(validate_chain_spec(spec), Err(ValidationError::MissingCab));
    }

    #[test]
    fn rejects_cab_before_amp() {
        let spec = spec_of(&[
            ("input", "input"),
            ("cab1", "ir_convolver"),
            ("amp1", "nam_model"),
            ("output", "output"),
        ]);
        assert_eq!(validate_chain_spec(spec), Err(ValidationError::AmpAfterCab));
    }

    #[test]
    fn first_amp_before_first_cab_with_duplicates() {
        // A second amp after the cab is fine; only the first of each counts.
        let spec = spec_of(&[
            ("input", "input"),
            ("amp1", "nam_model"),
            ("cab1", "ir_convolver"),
            ("amp2", "nam_model"),
            ("output", "output"),
        ]);
        assert!(validate_chain_spec(spec).is_ok());
    }
}
