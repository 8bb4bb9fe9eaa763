//! JSON response flattening.
//!
//! Converts a nested JSON body into a flat, dot/bracket-addressed
//! key→value map (`data.items[0].id`) so route matching and store
//! bindings can address any leaf uniformly. Flattening is purely
//! structural: identical input always yields identical keys.

use anyhow::{Context, Result};
use serde_json::Value;
use std::collections::HashMap;

/// Parse `body` as JSON and flatten it.
pub fn flatten(body: &str) -> Result<HashMap<String, Value>> {
    let json: Value = serde_json::from_str(body)
        .context("failed to parse response body as JSON")?;
    Ok(flatten_value(&json))
}

/// Flatten an already-parsed JSON value.
pub fn flatten_value(value: &Value) -> HashMap<String, Value> {
    let mut flat = HashMap::new();
    flatten_into("", value, &mut flat);
    flat
}

fn flatten_into(prefix: &str, value: &Value, flat: &mut HashMap<String, Value>) {
    match value {
        Value::Object(map) => {
            if map.is_empty() && !prefix.is_empty() {
                flat.insert(prefix.to_string(), value.clone());
            }
            for (key, val) in map {
                let child = if prefix.is_empty() {
                    key.clone()
                } else {
                    format!("{prefix}.{key}")
                };
                flatten_into(&child, val, flat);
            }
        }
        Value::Array(array) => {
            if array.is_empty() && !prefix.is_empty() {
                flat.insert(prefix.to_string(), value.clone());
            }
            for (idx, val) in array.iter().enumerate() {
                let child = format!("{prefix}[{idx}]");
                flatten_into(&child, val, flat);
            }
        }
        _ => {
            flat.insert(prefix.to_string(), value.clone());
        }
    }
}
