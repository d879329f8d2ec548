//! Node-type manifest for control clients.
//!
//! `list_types` returns this document so UIs can render node drawers
//! without hardcoding parameter tables. The shape is stable: clients may
//! cache it. Ranges and defaults here mirror the clamps applied by the
//! node builder.

use serde_json::{json, Value};

/// Build the manifest of recognised node types.
///
/// Each entry carries the type tag, category, asset requirement (when
/// the type loads one) and the recognised parameter keys with their
/// types, ranges and defaults.
pub fn node_type_manifest() -> Value {
    json!({
        "version": 1,
        "types": [
            {
                "type": "input",
                "category": "utility",
                "params": [
                    {"key": "enabled", "type": "bool", "default": true},
                    {"key": "mix", "type": "float", "min": 0.0, "max": 1.0, "default": 1.0},
                    {"key": "levelDb", "type": "float", "min": -48.0, "max": 24.0, "default": 0.0},
                    {"key": "inputTrimDb", "type": "float", "min": -24.0, "max": 24.0, "default": 0.0},
                ],
            },
            {
                "type": "output",
                "category": "utility",
                "params": [
                    {"key": "enabled", "type": "bool", "default": true},
                    {"key": "mix", "type": "float", "min": 0.0, "max": 1.0, "default": 1.0},
                    {"key": "levelDb", "type": "float", "min": -48.0, "max": 24.0, "default": 0.0},
                ],
            },
            {
                "type": "overdrive",
                "category": "fx",
                "params": [
                    {"key": "enabled", "type": "bool", "default": true},
                    {"key": "mix", "type": "float", "min": 0.0, "max": 1.0, "default": 1.0},
                    {"key": "levelDb", "type": "float", "min": -48.0, "max": 24.0, "default": 0.0},
                    {"key": "drive", "type": "float", "min": 0.0, "max": 1.0, "default": 0.6},
                    {"key": "tone", "type": "float", "min": 0.0, "max": 1.0, "default": 0.5},
                ],
            },
            {
                "type": "nam_model",
                "category": "amp",
                "asset": {"required": true, "kind": "nam_model"},
                "params": [
                    {"key": "enabled", "type": "bool", "default": true},
                    {"key": "mix", "type": "float", "min": 0.0, "max": 1.0, "default": 1.0},
                    {"key": "levelDb", "type": "float", "min": -48.0, "max": 24.0, "default": 0.0},
                    {"key": "preGainDb", "type": "float", "min": -24.0, "max": 24.0, "default": -12.0},
                    {"key": "postGainDb", "type": "float", "min": -24.0, "max": 24.0, "default": 0.0},
                    {"key": "inLimit", "type": "float", "min": 0.05, "max": 1.0, "default": 0.90},
                    {"key": "softclip", "type": "bool", "default": true},
                    {"key": "softclipTanh", "type": "bool", "default": false},
                    {"key": "useInputLevel", "type": "bool", "default": true},
                ],
            },
            {
                "type": "ir_convolver",
                "category": "cab",
                "asset": {"required": true, "kind": "ir_wav"},
                "params": [
                    {"key": "enabled", "type": "bool", "default": true},
                    {"key": "mix", "type": "float", "min": 0.0, "max": 1.0, "default": 1.0},
                    {"key": "levelDb", "type": "float", "min": -48.0, "max": 24.0, "default": 0.0},
                    {"key": "gainDb", "type": "float", "min": -24.0, "max": 24.0, "default": 0.0},
                    {"key": "targetDb", "type": "float", "min": -24.0, "max": 0.0, "default": -6.0},
                    {"key": "maxSamples", "type": "float", "min": 0.0, "max": 192000.0, "default": 0.0},
                    {"key": "maxMs", "type": "float", "min": 0.0, "max": 500.0, "default": 0.0},
                ],
            },
        ],
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lists_all_five_types() {
        let manifest = node_type_manifest();
        let types: Vec<&str> = manifest["types"]
            .as_array()
            .unwrap()
            .iter()
            .map(|t| t["type"].as_str().unwrap())
            .collect();
        assert_eq!(
            types,
            ["input", "output", "overdrive", "nam_model", "ir_convolver"]
        );
    }

    #[test]
    fn asset_kinds_marked_required() {
        let manifest = node_type_manifest();
        for entry in manifest["types"].as_array().unwrap() {
            match entry["type"].as_str().unwrap() {
                "nam_model" => {
                    assert_eq!(entry["asset"]["required"], true);
                    assert_eq!(entry["asset"]["kind"], "nam_model");
                }
                "ir_convolver" => {
                    assert_eq!(entry["asset"]["required"], true);
                    assert_eq!(entry["asset"]["kind"], "ir_wav");
                }
                _ => assert!(entry.get("asset").is_none()),
            }
        }
    }

    #[test]
    fn every_type_carries_standard_params() {
        let manifest = node_type_manifest();
        for entry in manifest["types"].as_array().unwrap() {
            let keys: Vec<&str> = entry["params"]
                .as_array()
                .unwrap()
                .iter()
                .map(|p| p["key"].as_str().unwrap())
                .collect();
            for std_key in ["enabled", "mix", "levelDb"] {
                assert!(
                    keys.contains(&std_key),
                    "type {} missing {}",
                    entry["type"],
                    std_key
                );
            }
        }
    }
}
