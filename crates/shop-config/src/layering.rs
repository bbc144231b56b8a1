//! Layered YAML: base -> environment -> local overrides, merged into one JSON
//! document and fingerprinted so a running process can report exactly which
//! effective config it booted with.

use anyhow::{Context, Result};
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};

use crate::guard::find_secret_literal;

#[derive(Debug, Clone)]
pub struct LoadedConfig {
    /// Hex SHA-256 of `canonical_json`.
    pub config_hash: String,
    pub canonical_json: String,
    pub config_json: Value,
}

/// Read each path and merge in order; later files win.
pub fn load_layered_yaml(paths: &[&str]) -> Result<LoadedConfig> {
    let docs = paths
        .iter()
        .map(|p| std::fs::read_to_string(p).with_context(|| format!("failed to read yaml path: {p}")))
        .collect::<Result<Vec<String>>>()?;
    let refs: Vec<&str> = docs.iter().map(String::as_str).collect();
    load_layered_yaml_from_strings(&refs)
}

pub fn load_layered_yaml_from_strings(yaml_docs: &[&str]) -> Result<LoadedConfig> {
    let mut merged = Value::Object(Map::new());

    for (idx, raw) in yaml_docs.iter().enumerate() {
        let layer: Value = serde_yaml::from_str::<serde_yaml::Value>(raw)
            .with_context(|| format!("invalid yaml in layer {idx}"))
            .and_then(|y| serde_json::to_value(y).context("yaml->json conversion failed"))?;
        // Empty file: no overrides.
        if layer.is_null() {
            continue;
        }
        merge_layer(&mut merged, layer);
    }

    if let Some(leaf) = find_secret_literal(&merged) {
        anyhow::bail!("CONFIG_SECRET_DETECTED leaf={leaf} value=REDACTED");
    }

    // Map is BTreeMap-backed: keys come out sorted regardless of layer order.
    let canonical_json = serde_json::to_string(&merged).context("canonical json serialize failed")?;
    let config_hash = hex::encode(Sha256::digest(canonical_json.as_bytes()));

    Ok(LoadedConfig {
        config_hash,
        canonical_json,
        config_json: merged,
    })
}

/// Objects merge key by key; any other value replaces what was there.
fn merge_layer(into: &mut Value, layer: Value) {
    match (into, layer) {
        (Value::Object(dst), Value::Object(src)) => {
            for (k, v) in src {
                match dst.get_mut(&k) {
                    Some(slot) => merge_layer(slot, v),
                    None => {
                        dst.insert(k, v);
                    }
                }
            }
        }
        (slot, other) => *slot = other,
    }
}
