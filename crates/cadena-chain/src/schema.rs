//! Chain document parsing and canonical serialisation.
//!
//! Two input shapes are accepted:
//!
//! - **Canonical v1**: `{"version": 1, "sampleRate": 48000, "chain": [..]}`
//!   where each chain element is a node object.
//! - **Legacy**: the single-amp/single-cab shape used by early rigs
//!   (`{"audio": {..}, "chain": {"namModelPath": .., "irPath": ..}}`),
//!   auto-converted to a four-node canonical chain.
//!
//! Parsing checks field shapes only. Structural invariants (ordering,
//! id uniqueness) live in [`crate::validate`]; numeric parameter ranges
//! are clamped later by the node builder, not here.

use std::path::PathBuf;

use serde_json::{json, Map, Value};

use crate::validate::ValidationError;

/// Node type tag for the input-trim stage.
pub const NODE_TYPE_INPUT: &str = "input";
/// Node type tag for the output-gain stage.
pub const NODE_TYPE_OUTPUT: &str = "output";
/// Node type tag for the overdrive pedal.
pub const NODE_TYPE_OVERDRIVE: &str = "overdrive";
/// Node type tag for the neural amp model stage.
pub const NODE_TYPE_NAM_MODEL: &str = "nam_model";
/// Node type tag for the IR cabinet convolver.
pub const NODE_TYPE_IR_CONVOLVER: &str = "ir_convolver";

/// Reference to an on-disk asset (model file, IR wav).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssetRef {
    /// Filesystem path of the asset.
    pub path: PathBuf,
}

/// Declarative description of one chain node.
#[derive(Debug, Clone, PartialEq)]
pub struct NodeSpec {
    /// Unique id within the chain.
    pub id: String,
    /// Type tag, one of the `NODE_TYPE_*` constants once validated/built.
    pub node_type: String,
    /// Free-form category label ("amp", "cab", "fx", "utility").
    pub category: String,
    /// Disabled nodes are built as strict passthrough.
    pub enabled: bool,
    /// Heterogeneous parameter map; values are JSON scalars/bools.
    pub params: Map<String, Value>,
    /// Optional asset reference for model/IR nodes.
    pub asset: Option<AssetRef>,
}

impl NodeSpec {
    /// Create a node spec with the given id and type, enabled, with no
    /// category, parameters or asset.
    pub fn new(id: impl Into<String>, node_type: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            node_type: node_type.into(),
            category: String::new(),
            enabled: true,
            params: Map::new(),
            asset: None,
        }
    }

    /// Read a numeric parameter, if present and a number.
    pub fn num_param(&self, key: &str) -> Option<f32> {
        self.params.get(key).and_then(Value::as_f64).map(|v| v as f32)
    }

    /// Read a boolean parameter, if present and a bool.
    pub fn bool_param(&self, key: &str) -> Option<bool> {
        self.params.get(key).and_then(Value::as_bool)
    }
}

/// Ordered chain description plus format version and sample rate.
#[derive(Debug, Clone, PartialEq)]
pub struct ChainSpec {
    /// Chain document format version; only 1 is supported.
    pub version: i64,
    /// Sample rate the chain is built for.
    pub sample_rate: u32,
    /// Ordered node specifications, input first, output last.
    pub chain: Vec<NodeSpec>,
}

impl Default for ChainSpec {
    fn default() -> Self {
        Self {
            version: 1,
            sample_rate: 48000,
            chain: Vec::new(),
        }
    }
}

/// Parse a chain document into a [`ChainSpec`].
///
/// Accepts the canonical v1 shape or the legacy single-amp/single-cab
/// shape (detected by the absence of a `version` + `chain` array pair).
/// The result still needs [`crate::validate_chain_spec`].
pub fn parse_chain_value(doc: &Value) -> Result<ChainSpec, ValidationError> {
    let obj = doc.as_object().ok_or(ValidationError::NotAnObject)?;

    // Canonical documents carry a version and a chain array.
    if obj.contains_key("version") && obj.get("chain").is_some_and(Value::is_array) {
        parse_canonical_v1(obj)
    } else {
        parse_legacy(obj)
    }
}

fn parse_canonical_v1(obj: &Map<String, Value>) -> Result<ChainSpec, ValidationError> {
    let version = obj
        .get("version")
        .and_then(Value::as_i64)
        .ok_or(ValidationError::BadVersion)?;
    if version != 1 {
        return Err(ValidationError::UnsupportedVersion(version));
    }

    let mut spec = ChainSpec {
        version,
        ..ChainSpec::default()
    };

    if let Some(sr) = obj.get("sampleRate") {
        let sr = sr.as_i64().ok_or(ValidationError::BadSampleRate)?;
        if sr <= 0 {
            return Err(ValidationError::BadSampleRate);
        }
        spec.sample_rate = sr as u32;
    }

    let chain = obj
        .get("chain")
        .and_then(Value::as_array)
        .ok_or(ValidationError::MissingChain)?;
    for item in chain {
        spec.chain.push(parse_node(item)?);
    }

    Ok(spec)
}

fn parse_node(value: &Value) -> Result<NodeSpec, ValidationError> {
    let obj = value.as_object().ok_or(ValidationError::NodeNotAnObject)?;

    let id = required_string(obj, "id")?;
    let node_type = required_string(obj, "type")?;
    let mut node = NodeSpec::new(id, node_type);

    if let Some(category) = obj.get("category") {
        node.category = category
            .as_str()
            .ok_or(ValidationError::BadNodeField {
                field: "category",
                expected: "a string",
            })?
            .to_string();
    }

    if let Some(enabled) = obj.get("enabled") {
        node.enabled = enabled.as_bool().ok_or(ValidationError::BadNodeField {
            field: "enabled",
            expected: "a boolean",
        })?;
    }

    if let Some(params) = obj.get("params") {
        node.params = params
            .as_object()
            .ok_or(ValidationError::BadNodeField {
                field: "params",
                expected: "an object",
            })?
            .clone();
    }

    if let Some(asset) = obj.get("asset") {
        let asset = asset.as_object().ok_or(ValidationError::BadNodeField {
            field: "asset",
            expected: "an object",
        })?;
        let path = asset
            .get("path")
            .and_then(Value::as_str)
            .ok_or(ValidationError::BadAsset)?;
        node.asset = Some(AssetRef {
            path: PathBuf::from(path),
        });
    }

    Ok(node)
}

fn required_string(obj: &Map<String, Value>, field: &'static str) -> Result<String, ValidationError> {
    match obj.get(field) {
        None => Err(ValidationError::MissingNodeField(field)),
        Some(v) => v
            .as_str()
            .map(str::to_string)
            .ok_or(ValidationError::BadNodeField {
                field,
                expected: "a string",
            }),
    }
}

/// Convert the legacy `{audio, chain{namModelPath, irPath}}` shape to a
/// canonical input → amp1 → cab1 → output chain.
fn parse_legacy(obj: &Map<String, Value>) -> Result<ChainSpec, ValidationError> {
    let mut spec = ChainSpec::default();

    let audio = obj.get("audio").and_then(Value::as_object);
    if let Some(audio) = audio {
        if let Some(sr) = audio.get("sampleRate").and_then(Value::as_i64) {
            if sr > 0 {
                spec.sample_rate = sr as u32;
            }
        }
    }

    let mut input = NodeSpec::new("input", NODE_TYPE_INPUT);
    input.category = "utility".to_string();
    if let Some(audio) = audio {
        if let Some(trim) = audio.get("inputTrimDb") {
            if !trim.is_number() {
                return Err(ValidationError::BadLegacyField("audio.inputTrimDb"));
            }
            input.params.insert("inputTrimDb".to_string(), trim.clone());
        }
    }

    let mut amp = NodeSpec::new("amp1", NODE_TYPE_NAM_MODEL);
    amp.category = "amp".to_string();
    let mut cab = NodeSpec::new("cab1", NODE_TYPE_IR_CONVOLVER);
    cab.category = "cab".to_string();

    if let Some(chain) = obj.get("chain").and_then(Value::as_object) {
        if let Some(path) = chain.get("namModelPath") {
            let path = path
                .as_str()
                .ok_or(ValidationError::BadLegacyField("chain.namModelPath"))?;
            amp.asset = Some(AssetRef {
                path: PathBuf::from(path),
            });
        }
        if let Some(path) = chain.get("irPath") {
            let path = path
                .as_str()
                .ok_or(ValidationError::BadLegacyField("chain.irPath"))?;
            cab.asset = Some(AssetRef {
                path: PathBuf::from(path),
            });
        }
    }

    let mut output = NodeSpec::new("output", NODE_TYPE_OUTPUT);
    output.category = "utility".to_string();

    spec.chain = vec![input, amp, cab, output];
    Ok(spec)
}

/// Serialise a chain spec to the canonical v1 JSON shape.
///
/// `category` is omitted when empty; `params` is always emitted (an
/// empty object when the node has none); `asset` only when present.
pub fn chain_to_json(spec: &ChainSpec) -> Value {
    let nodes: Vec<Value> = spec.chain.iter().map(node_to_json).collect();
    json!({
        "version": spec.version,
        "sampleRate": spec.sample_rate,
        "chain": nodes,
    })
}

fn node_to_json(node: &NodeSpec) -> Value {
    let mut obj = Map::new();
    obj.insert("id".to_string(), Value::String(node.id.clone()));
    obj.insert("type".to_string(), Value::String(node.node_type.clone()));
    if !node.category.is_empty() {
        obj.insert("category".to_string(), Value::String(node.category.clone()));
    }
    obj.insert("enabled".to_string(), Value::Bool(node.enabled));
    obj.insert("params".to_string(), Value::Object(node.params.clone()));
    if let Some(asset) = &node.asset {
        obj.insert(
            "asset".to_string(),
            json!({ "path": asset.path.to_string_lossy() }),
        );
    }
    Value::Object(obj)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn canonical_doc() -> Value {
        json!({
            "version": 1,
            "sampleRate": 44100,
            "chain": [
                {"id": "input", "type": "input", "category": "utility",
                 "params": {"inputTrimDb": 3.0}},
                {"id": "amp1", "type": "nam_model", "enabled": false,
                 "asset": {"path": "/opt/rig/amp.nam"}},
                {"id": "cab1", "type": "ir_convolver",
                 "asset": {"path": "/opt/rig/cab.wav"}},
                {"id": "output", "type": "output"},
            ],
        })
    }

    #[test]
    fn parses_canonical_v1() {
        let spec = parse_chain_value(&canonical_doc()).unwrap();
        assert_eq!(spec.version, 1);
        assert_eq!(spec.sample_rate, 44100);
        assert_eq!(spec.chain.len(), 4);
        assert_eq!(spec.chain[0].num_param("inputTrimDb"), Some(3.0));
        assert!(!spec.chain[1].enabled);
        assert_eq!(
            spec.chain[2].asset.as_ref().unwrap().path,
            PathBuf::from("/opt/rig/cab.wav")
        );
    }

    #[test]
    fn sample_rate_defaults_to_48k() {
        let doc = json!({"version": 1, "chain": []});
        let spec = parse_chain_value(&doc).unwrap();
        assert_eq!(spec.sample_rate, 48000);
    }

    #[test]
    fn rejects_non_object_top_level() {
        assert_eq!(
            parse_chain_value(&json!([1, 2, 3])),
            Err(ValidationError::NotAnObject)
        );
    }

    #[test]
    fn rejects_wrong_version() {
        let doc = json!({"version": 2, "chain": []});
        assert_eq!(
            parse_chain_value(&doc),
            Err(ValidationError::UnsupportedVersion(2))
        );
    }

    #[test]
    fn rejects_float_version() {
        let doc = json!({"version": 1.5, "chain": []});
        assert_eq!(parse_chain_value(&doc), Err(ValidationError::BadVersion));
    }

    #[test]
    fn rejects_bad_sample_rate() {
        let doc = json!({"version": 1, "sampleRate": -1, "chain": []});
        assert_eq!(parse_chain_value(&doc), Err(ValidationError::BadSampleRate));
        let doc = json!({"version": 1, "sampleRate": "48000", "chain": []});
        assert_eq!(parse_chain_value(&doc), Err(ValidationError::BadSampleRate));
    }

    #[test]
    fn rejects_node_missing_id() {
        let doc = json!({"version": 1, "chain": [{"type": "input"}]});
        assert_eq!(
            parse_chain_value(&doc),
            Err(ValidationError::MissingNodeField("id"))
        );
    }

    #[test]
    fn rejects_node_bad_enabled() {
        let doc = json!({"version": 1, "chain": [
            {"id": "input", "type": "input", "enabled": "yes"}
        ]});
        assert_eq!(
            parse_chain_value(&doc),
            Err(ValidationError::BadNodeField {
                field: "enabled",
                expected: "a boolean"
            })
        );
    }

    #[test]
    fn rejects_asset_without_path() {
        let doc = json!({"version": 1, "chain": [
            {"id": "amp", "type": "nam_model", "asset": {}}
        ]});
        assert_eq!(parse_chain_value(&doc), Err(ValidationError::BadAsset));
    }

    #[test]
    fn legacy_shape_converts_to_four_nodes() {
        let doc = json!({
            "audio": {"sampleRate": 48000, "inputTrimDb": -3.0},
            "chain": {"namModelPath": "/opt/rig/amp.nam", "irPath": "/opt/rig/cab.wav"},
        });
        let spec = parse_chain_value(&doc).unwrap();
        let types: Vec<&str> = spec.chain.iter().map(|n| n.node_type.as_str()).collect();
        assert_eq!(types, ["input", "nam_model", "ir_convolver", "output"]);
        assert_eq!(spec.chain[0].num_param("inputTrimDb"), Some(-3.0));
        assert_eq!(
            spec.chain[1].asset.as_ref().unwrap().path,
            PathBuf::from("/opt/rig/amp.nam")
        );
    }

    #[test]
    fn legacy_rejects_non_numeric_trim() {
        let doc = json!({"audio": {"inputTrimDb": "loud"}});
        assert_eq!(
            parse_chain_value(&doc),
            Err(ValidationError::BadLegacyField("audio.inputTrimDb"))
        );
    }

    #[test]
    fn canonical_round_trip() {
        let spec = parse_chain_value(&canonical_doc()).unwrap();
        let doc = chain_to_json(&spec);
        let again = parse_chain_value(&doc).unwrap();
        assert_eq!(spec, again);
    }

    #[test]
    fn serialises_empty_params_as_object() {
        let spec = parse_chain_value(&canonical_doc()).unwrap();
        let doc = chain_to_json(&spec);
        assert!(doc["chain"][3]["params"].is_object());
        // Empty category stays absent.
        assert!(doc["chain"][3].get("category").is_none());
    }
}
