//! Response matching and route resolution.
//!
//! Routes are evaluated in declaration order; the first route whose
//! `expected` clause fully matches the response wins. A route without
//! an `expected` clause matches unconditionally.

use crate::model::{Route, Then};
use crate::template;
use anyhow::{bail, Result};
use serde_json::Value;
use std::collections::HashMap;
use std::str::FromStr;

/// A status-code pattern: an exact code or an inclusive range.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusPattern {
    Exact(u16),
    Range(u16, u16),
}

impl StatusPattern {
    /// Whether `status` satisfies this pattern.
    pub fn matches(&self, status: u16) -> bool {
        match *self {
            StatusPattern::Exact(code) => status == code,
            StatusPattern::Range(low, high) => low <= status && status <= high,
        }
    }
}

impl FromStr for StatusPattern {
    type Err = anyhow::Error;

    /// Parse `"200"` or `"200-299"`. Anything else, including an
    /// inverted range, is a configuration error rather than a silent
    /// no-match.
    fn from_str(s: &str) -> Result<Self> {
        let parts: Vec<&str> = s.split('-').collect();
        match parts.as_slice() {
            [exact] => {
                let code = exact
                    .trim()
                    .parse::<u16>()
                    .map_err(|_| invalid_pattern(s))?;
                Ok(StatusPattern::Exact(code))
            }
            [low, high] => {
                let low = low.trim().parse::<u16>().map_err(|_| invalid_pattern(s))?;
                let high =
                    high.trim().parse::<u16>().map_err(|_| invalid_pattern(s))?;
                if low > high {
                    bail!("inverted HTTP status range: {s}");
                }
                Ok(StatusPattern::Range(low, high))
            }
            _ => Err(invalid_pattern(s)),
        }
    }
}

fn invalid_pattern(s: &str) -> anyhow::Error {
    anyhow::anyhow!("invalid HTTP status pattern: {s}")
}

/// Select the first route matching `status` and `flat_body`.
///
/// Returns `Ok(None)` when no route matches. A malformed status
/// pattern is a configuration error; the validator rejects it before
/// execution, so hitting it here means the scenario bypassed
/// validation.
pub fn resolve<'a>(
    status: u16,
    flat_body: Option<&HashMap<String, Value>>,
    routes: &'a [Route],
) -> Result<Option<&'a Then>> {
    for route in routes {
        let Some(expected) = &route.expected else {
            return Ok(Some(&route.then));
        };

        let status_ok = match expected.status.as_deref() {
            None | Some("") => true,
            Some(pattern) => pattern.parse::<StatusPattern>()?.matches(status),
        };

        if status_ok && values_match(flat_body, &expected.value) {
            return Ok(Some(&route.then));
        }
    }
    Ok(None)
}

/// Every expected key must be present in the flattened body with an
/// equal value. Extra response keys are ignored. A response with no
/// flattened body cannot satisfy a non-empty value map.
fn values_match(
    flat_body: Option<&HashMap<String, Value>>,
    expected: &HashMap<String, Value>,
) -> bool {
    if expected.is_empty() {
        return true;
    }
    let Some(body) = flat_body else {
        return false;
    };
    expected
        .iter()
        .all(|(key, value)| body.get(key) == Some(value))
}

/// Apply the store bindings of a matched `then` to the run store.
///
/// String-typed binding values are template-expanded twice: first
/// against the flattened response body, then against the existing
/// store. Later writes overwrite earlier values for the same key.
pub fn apply_store(
    then: &Then,
    flat_body: Option<&HashMap<String, Value>>,
    store: &mut HashMap<String, Value>,
) {
    for (key, value) in &then.store {
        let resolved = match value {
            Value::String(text) => {
                let pass_one = match flat_body {
                    Some(body) => template::expand(text, body),
                    None => text.clone(),
                };
                Value::String(template::expand(&pass_one, store))
            }
            other => other.clone(),
        };
        store.insert(key.clone(), resolved);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Expected;
    use serde_json::json;

    fn route(expected: Option<Expected>, step: Option<&str>) -> Route {
        Route {
            expected,
            then: Then {
                step: step.map(String::from),
                store: HashMap::new(),
            },
        }
    }

    fn expected_status(pattern: &str) -> Option<Expected> {
        Some(Expected {
            status: Some(pattern.to_string()),
            value: HashMap::new(),
        })
    }

    // ── StatusPattern ───────────────────────────────────

    #[test]
    fn exact_pattern_matches_only_itself() {
        let pattern: StatusPattern = "200".parse().unwrap();
        assert!(pattern.matches(200));
        assert!(!pattern.matches(201));
        assert!(!pattern.matches(199));
    }

    #[test]
    fn range_pattern_is_inclusive() {
        let pattern: StatusPattern = "200-299".parse().unwrap();
        assert!(pattern.matches(200));
        assert!(pattern.matches(250));
        assert!(pattern.matches(299));
        assert!(!pattern.matches(199));
        assert!(!pattern.matches(300));
    }

    #[test]
    fn malformed_patterns_are_errors() {
        assert!("".parse::<StatusPattern>().is_err());
        assert!("2xx".parse::<StatusPattern>().is_err());
        assert!("200-299-300".parse::<StatusPattern>().is_err());
        assert!("abc-def".parse::<StatusPattern>().is_err());
    }

    #[test]
    fn inverted_range_is_rejected() {
        let err = "200-199".parse::<StatusPattern>().unwrap_err();
        assert!(err.to_string().contains("inverted"));
    }

    // ── resolve ─────────────────────────────────────────

    #[test]
    fn first_match_wins_over_later_routes() {
        let routes = vec![
            route(None, Some("fallback")),
            route(expected_status("200"), Some("specific")),
        ];
        let then = resolve(200, None, &routes).unwrap().unwrap();
        assert_eq!(then.next_step(), Some("fallback"));
    }

    #[test]
    fn status_mismatch_falls_through_to_next_route() {
        let routes = vec![
            route(expected_status("200-299"), Some("ok")),
            route(expected_status("400-499"), Some("client-error")),
            route(None, None),
        ];
        let then = resolve(404, None, &routes).unwrap().unwrap();
        assert_eq!(then.next_step(), Some("client-error"));
    }

    #[test]
    fn no_matching_route_yields_none() {
        let routes = vec![route(expected_status("200"), Some("ok"))];
        assert!(resolve(500, None, &routes).unwrap().is_none());
    }

    #[test]
    fn empty_status_pattern_matches_any_code() {
        let routes = vec![route(
            Some(Expected {
                status: None,
                value: HashMap::new(),
            }),
            Some("next"),
        )];
        let then = resolve(503, None, &routes).unwrap().unwrap();
        assert_eq!(then.next_step(), Some("next"));
    }

    #[test]
    fn value_match_requires_all_keys_equal() {
        let mut value = HashMap::new();
        value.insert("role".to_string(), json!("admin"));
        let routes = vec![route(
            Some(Expected {
                status: Some("200-299".to_string()),
                value,
            }),
            Some("done"),
        )];

        let mut body = HashMap::new();
        body.insert("role".to_string(), json!("admin"));
        body.insert("extra".to_string(), json!("ignored"));
        let then = resolve(200, Some(&body), &routes).unwrap().unwrap();
        assert_eq!(then.next_step(), Some("done"));

        // Unequal value: no match.
        body.insert("role".to_string(), json!("guest"));
        assert!(resolve(200, Some(&body), &routes).unwrap().is_none());

        // Missing key: no match.
        body.remove("role");
        assert!(resolve(200, Some(&body), &routes).unwrap().is_none());

        // No flattened body at all: no match.
        assert!(resolve(200, None, &routes).unwrap().is_none());
    }

    #[test]
    fn malformed_pattern_in_route_is_an_error() {
        let routes = vec![route(expected_status("2xx"), Some("ok"))];
        assert!(resolve(200, None, &routes).is_err());
    }

    // ── apply_store ─────────────────────────────────────

    #[test]
    fn store_binding_resolves_from_flattened_body() {
        let then = Then {
            step: None,
            store: HashMap::from([(
                "token".to_string(),
                json!("{{accessToken}}"),
            )]),
        };
        let body = HashMap::from([("accessToken".to_string(), json!("abc"))]);
        let mut store = HashMap::new();

        apply_store(&then, Some(&body), &mut store);
        assert_eq!(store["token"], json!("abc"));

        // A later template can read the stored value back.
        assert_eq!(
            template::expand("Bearer {{token}}", &store),
            "Bearer abc"
        );
    }

    #[test]
    fn store_binding_falls_back_to_existing_store() {
        let then = Then {
            step: None,
            store: HashMap::from([(
                "echo".to_string(),
                json!("{{previous}}"),
            )]),
        };
        let mut store =
            HashMap::from([("previous".to_string(), json!("kept"))]);

        apply_store(&then, None, &mut store);
        assert_eq!(store["echo"], json!("kept"));
    }

    #[test]
    fn non_string_bindings_are_copied_verbatim() {
        let then = Then {
            step: None,
            store: HashMap::from([("count".to_string(), json!(3))]),
        };
        let mut store = HashMap::new();
        apply_store(&then, None, &mut store);
        assert_eq!(store["count"], json!(3));
    }

    #[test]
    fn later_bindings_overwrite_earlier_values() {
        let then = Then {
            step: None,
            store: HashMap::from([("token".to_string(), json!("new"))]),
        };
        let mut store =
            HashMap::from([("token".to_string(), json!("old"))]);
        apply_store(&then, None, &mut store);
        assert_eq!(store["token"], json!("new"));
    }

    #[test]
    fn unresolved_binding_stays_visible() {
        let then = Then {
            step: None,
            store: HashMap::from([(
                "token".to_string(),
                json!("{{missing}}"),
            )]),
        };
        let mut store = HashMap::new();
        apply_store(&then, None, &mut store);
        assert_eq!(store["token"], json!("{{missing}}"));
    }
}
