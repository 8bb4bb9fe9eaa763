//! Static scenario validation.
//!
//! Runs once before any request is dispatched: a cyclic step graph
//! would otherwise only surface after burning the time budget mid-run.
//! Checks step references, status patterns, and cycle freedom of the
//! transition graph reachable from the entry step.

use crate::model::Scenario;
use crate::resolver::StatusPattern;
use anyhow::{bail, Context, Result};
use std::collections::HashSet;

/// Validate `scenario` before execution.
///
/// Fails on: an empty step map, a malformed status pattern, a
/// `then.step` referencing a step that does not exist, or a cycle in
/// the transition graph reachable from the entry step.
pub fn validate(scenario: &Scenario) -> Result<()> {
    let entry = scenario
        .entry_step()
        .context("scenario has no steps")?;

    for (step_name, step) in &scenario.steps {
        for route in &step.route {
            if let Some(expected) = &route.expected {
                if let Some(pattern) = expected.status.as_deref() {
                    if !pattern.is_empty() {
                        pattern.parse::<StatusPattern>().with_context(|| {
                            format!("step '{step_name}': bad route")
                        })?;
                    }
                }
            }
            if let Some(target) = route.then.next_step() {
                if !scenario.steps.contains_key(target) {
                    bail!(
                        "step '{step_name}' routes to unknown step '{target}'"
                    );
                }
            }
        }
    }

    let mut visited = HashSet::new();
    let mut on_path = Vec::new();
    walk(scenario, entry, &mut visited, &mut on_path)
}

/// Depth-first walk tracking the active recursion path. Revisiting a
/// step that is still on the path is a cycle.
fn walk<'a>(
    scenario: &'a Scenario,
    step_name: &'a str,
    visited: &mut HashSet<&'a str>,
    on_path: &mut Vec<&'a str>,
) -> Result<()> {
    if on_path.contains(&step_name) {
        bail!(
            "cycle in step graph at '{step_name}' (path: {})",
            on_path.join(" -> ")
        );
    }
    if !visited.insert(step_name) {
        return Ok(());
    }

    on_path.push(step_name);
    // Reference validity was checked above, so lookups cannot miss.
    if let Some(step) = scenario.steps.get(step_name) {
        for route in &step.route {
            if let Some(target) = route.then.next_step() {
                walk(scenario, target, visited, on_path)?;
            }
        }
    }
    on_path.pop();
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Scenario;

    fn scenario(yaml: &str) -> Scenario {
        Scenario::from_yaml(yaml).expect("fixture should parse")
    }

    const LINEAR: &str = r#"
name: linear
steps:
  a:
    type: HTTP
    request: {method: GET, url: http://localhost/a}
    route:
      - expected: {status: "200-299"}
        then: {step: b}
      - then: {}
  b:
    type: HTTP
    request: {method: GET, url: http://localhost/b}
    route:
      - then: {}
"#;

    #[test]
    fn acyclic_fully_referenced_graph_is_valid() {
        assert!(validate(&scenario(LINEAR)).is_ok());
    }

    #[test]
    fn branching_to_a_shared_tail_is_not_a_cycle() {
        // a -> b -> d and a -> c -> d: d is visited twice but never
        // while still on the active path.
        let yaml = r#"
name: diamond
steps:
  a:
    type: HTTP
    request: {method: GET, url: http://localhost/a}
    route:
      - expected: {status: "200"}
        then: {step: b}
      - then: {step: c}
  b:
    type: HTTP
    request: {method: GET, url: http://localhost/b}
    route:
      - then: {step: d}
  c:
    type: HTTP
    request: {method: GET, url: http://localhost/c}
    route:
      - then: {step: d}
  d:
    type: HTTP
    request: {method: GET, url: http://localhost/d}
    route:
      - then: {}
"#;
        assert!(validate(&scenario(yaml)).is_ok());
    }

    #[test]
    fn cycle_reachable_from_entry_is_rejected() {
        let yaml = r#"
name: cyclic
steps:
  a:
    type: HTTP
    request: {method: GET, url: http://localhost/a}
    route:
      - then: {step: b}
  b:
    type: HTTP
    request: {method: GET, url: http://localhost/b}
    route:
      - then: {step: a}
"#;
        let err = validate(&scenario(yaml)).unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("cycle"), "message: {msg}");
        assert!(msg.contains('a') || msg.contains('b'), "message: {msg}");
    }

    #[test]
    fn self_loop_is_rejected() {
        let yaml = r#"
name: self-loop
steps:
  again:
    type: HTTP
    request: {method: GET, url: http://localhost/x}
    route:
      - then: {step: again}
"#;
        let err = validate(&scenario(yaml)).unwrap_err();
        assert!(err.to_string().contains("again"));
    }

    #[test]
    fn unknown_step_reference_is_rejected() {
        let yaml = r#"
name: dangling
steps:
  a:
    type: HTTP
    request: {method: GET, url: http://localhost/a}
    route:
      - then: {step: nowhere}
"#;
        let err = validate(&scenario(yaml)).unwrap_err();
        assert!(err.to_string().contains("nowhere"));
    }

    #[test]
    fn empty_next_step_is_a_terminal_not_a_reference() {
        let yaml = r#"
name: empty-step
steps:
  a:
    type: HTTP
    request: {method: GET, url: http://localhost/a}
    route:
      - then: {step: ""}
"#;
        assert!(validate(&scenario(yaml)).is_ok());
    }

    #[test]
    fn malformed_status_pattern_is_rejected_up_front() {
        let yaml = r#"
name: bad-pattern
steps:
  a:
    type: HTTP
    request: {method: GET, url: http://localhost/a}
    route:
      - expected: {status: "2xx"}
        then: {}
"#;
        let err = validate(&scenario(yaml)).unwrap_err();
        assert!(format!("{err:#}").contains("invalid HTTP status pattern"));
    }

    #[test]
    fn inverted_range_is_rejected_up_front() {
        let yaml = r#"
name: inverted
steps:
  a:
    type: HTTP
    request: {method: GET, url: http://localhost/a}
    route:
      - expected: {status: "200-199"}
        then: {}
"#;
        let err = validate(&scenario(yaml)).unwrap_err();
        assert!(format!("{err:#}").contains("inverted"));
    }

    #[test]
    fn scenario_without_steps_is_rejected() {
        let yaml = "name: empty\nsteps: {}\n";
        assert!(validate(&scenario(yaml)).is_err());
    }
}
