//! `{{placeholder}}` template expansion.
//!
//! Placeholders are resolved by exact key against a string-keyed value
//! map. Unresolved placeholders are left in place as literals so a
//! missing binding stays visible in the execution trace instead of
//! silently disappearing.

use serde_json::Value;
use std::collections::HashMap;
use std::sync::LazyLock;

use regex::Regex;

static PLACEHOLDER_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\{\{\s*(.+?)\s*\}\}")
        .expect("failed to compile placeholder regex")
});

/// Expand every `{{ key }}` in `template` with the stringified value
/// found in `bindings`. Unknown keys keep their placeholder text.
pub fn expand(template: &str, bindings: &HashMap<String, Value>) -> String {
    PLACEHOLDER_RE
        .replace_all(template, |caps: &regex::Captures| {
            let key = &caps[1];
            match bindings.get(key) {
                Some(Value::String(s)) => s.clone(),
                Some(v) => v.to_string(),
                None => caps[0].to_string(),
            }
        })
        .into_owned()
}

/// Expand every string value of `map` in place.
pub fn expand_map(
    map: &HashMap<String, String>,
    bindings: &HashMap<String, Value>,
) -> HashMap<String, String> {
    map.iter()
        .map(|(k, v)| (k.clone(), expand(v, bindings)))
        .collect()
}
