//! Folds per-step results into the scenario-level summary.

use crate::model::{ResultStep, ScenarioResult};
use chrono::Utc;

/// Build the final [`ScenarioResult`] from the ordered step trace.
///
/// Total duration is the sum of step durations, average is total over
/// step count (zero steps yields zero, not a division fault), and
/// overall success is the AND of every step's matched flag.
pub fn aggregate(
    name: &str,
    description: Option<&str>,
    results: Vec<ResultStep>,
) -> ScenarioResult {
    let total_duration_ms: u64 =
        results.iter().map(|step| step.duration_ms).sum();
    let average_duration_ms = if results.is_empty() {
        0
    } else {
        total_duration_ms / results.len() as u64
    };
    let is_scenario_success =
        results.iter().all(|step| step.is_request_success);

    ScenarioResult {
        name: name.to_string(),
        description: description.map(String::from),
        executed_at: Utc::now(),
        total_duration_ms,
        average_duration_ms,
        is_scenario_success,
        results,
    }
}
