//! Scenario execution engine.
//!
//! Validates the scenario, then walks the step graph: dispatch the
//! current step over its protocol, resolve the matched route against
//! the response, apply store bindings, emit the step result to the
//! caller's sink, and continue with the designated next step until a
//! route ends the chain or a failure terminates the run. The whole
//! run shares one monotonically decreasing time budget.

use crate::aggregator;
use crate::executor::{Dispatch, HttpStepExecutor, StepExecutor};
use crate::flattener;
use crate::model::{
    ProtocolType, ResultStep, Scenario, ScenarioResult, Step,
};
use crate::resolver;
use crate::validator;
use crate::websocket::WebSocketStepExecutor;
use anyhow::Result;
use serde_json::Value;
use std::collections::HashMap;
use std::time::Duration;
use tracing::{debug, error, info, instrument, warn};

/// Drives scenario runs. One instance can serve many concurrent runs;
/// each run gets its own store, result stream, and WebSocket sessions.
#[derive(Debug, Default)]
pub struct ScenarioRunner {
    http: HttpStepExecutor,
}

impl ScenarioRunner {
    pub fn new() -> Self {
        Self {
            http: HttpStepExecutor::new(),
        }
    }

    /// Use a custom reqwest client for HTTP dispatch.
    pub fn with_client(client: reqwest::Client) -> Self {
        Self {
            http: HttpStepExecutor::with_client(client),
        }
    }

    /// Execute `scenario`, emitting each [`ResultStep`] to `on_step`
    /// in execution order before the next step is dispatched.
    ///
    /// Configuration errors (cyclic graph, unknown step reference,
    /// malformed status pattern) return `Err` before any request is
    /// sent. Execution failures (timeout, unmatched route, transport
    /// fault) end the run early but still yield a complete
    /// [`ScenarioResult`] with `is_scenario_success == false`.
    #[instrument(skip(self, scenario, on_step), fields(name = %scenario.name))]
    pub async fn run(
        &self,
        scenario: &Scenario,
        mut on_step: impl FnMut(&ResultStep),
    ) -> Result<ScenarioResult> {
        validator::validate(scenario)?;

        info!("scenario run start: {}", scenario.name);
        let websocket = WebSocketStepExecutor::new();
        let outcome = self
            .drive(scenario, &websocket, &mut on_step)
            .await;
        // Sessions are released no matter how the run ended.
        websocket.close_all().await;

        let (results, run_ok) = outcome?;
        let mut result = aggregator::aggregate(
            &scenario.name,
            scenario.description.as_deref(),
            results,
        );
        result.is_scenario_success &= run_ok;

        info!(
            "scenario run finished: {} ({} ms, success: {})",
            scenario.name,
            result.total_duration_ms,
            result.is_scenario_success
        );
        Ok(result)
    }

    async fn drive(
        &self,
        scenario: &Scenario,
        websocket: &WebSocketStepExecutor,
        on_step: &mut impl FnMut(&ResultStep),
    ) -> Result<(Vec<ResultStep>, bool)> {
        let mut store = scenario.store.clone();
        let mut results = Vec::new();
        let mut remaining_ms = scenario.timeout_ms;
        let mut run_ok = true;
        // Checked by the validator: at least one step exists.
        let mut current = scenario
            .entry_step()
            .expect("validated scenario has an entry step")
            .to_string();

        loop {
            let step = &scenario.steps[&current];
            debug!(
                "step '{current}' ({:?}), remaining budget {remaining_ms} ms",
                step.protocol
            );

            let budget = Duration::from_millis(remaining_ms);
            let dispatch = match step.protocol {
                ProtocolType::Http => {
                    self.http.execute(&current, step, &store, budget).await
                }
                ProtocolType::Websocket => {
                    websocket.execute(&current, step, &store, budget).await
                }
            };

            if let Some(failure) = &dispatch.response.failure {
                error!("step '{current}' failed: {failure}");
                let result_step =
                    build_result_step(&current, step, &dispatch, false, None);
                on_step(&result_step);
                results.push(result_step);
                run_ok = false;
                break;
            }

            let flat_body = flatten_if_json(&current, &dispatch);
            let matched = resolver::resolve(
                dispatch.response.status,
                flat_body.as_ref(),
                &step.route,
            )?;

            let Some(then) = matched else {
                warn!(
                    "step '{current}': no route matched status {}",
                    dispatch.response.status
                );
                let result_step =
                    build_result_step(&current, step, &dispatch, false, None);
                on_step(&result_step);
                results.push(result_step);
                run_ok = false;
                break;
            };

            resolver::apply_store(then, flat_body.as_ref(), &mut store);
            let next = then.next_step().map(String::from);

            let result_step = build_result_step(
                &current,
                step,
                &dispatch,
                true,
                next.clone(),
            );
            remaining_ms =
                remaining_ms.saturating_sub(dispatch.response.duration_ms);
            on_step(&result_step);
            results.push(result_step);

            match next {
                None => break,
                Some(name) if !scenario.steps.contains_key(&name) => {
                    // The validator rejects dangling references, so
                    // this only fires for scenarios that bypassed it.
                    error!("step '{current}' routed to unknown step '{name}'");
                    run_ok = false;
                    break;
                }
                Some(name) => current = name,
            }
        }

        Ok((results, run_ok))
    }
}

/// Flatten the response body when the content type indicates JSON.
fn flatten_if_json(
    step_name: &str,
    dispatch: &Dispatch,
) -> Option<HashMap<String, Value>> {
    let is_json = dispatch
        .response
        .headers
        .get("content-type")
        .is_some_and(|ct| ct.contains("application/json"));
    if !is_json {
        return None;
    }
    match flattener::flatten(&dispatch.response.body) {
        Ok(flat) => Some(flat),
        Err(err) => {
            warn!("step '{step_name}': {err:#}");
            None
        }
    }
}

fn build_result_step(
    step_name: &str,
    step: &Step,
    dispatch: &Dispatch,
    matched: bool,
    next_step: Option<String>,
) -> ResultStep {
    let response = &dispatch.response;
    ResultStep {
        step_name: step_name.to_string(),
        protocol: step.protocol,
        url: dispatch.request.url.clone(),
        method: dispatch.request.method.clone(),
        request_header: dispatch.request.header.clone(),
        request_body: dispatch.request.body.clone(),
        status: response.status,
        response_headers: response.headers.clone(),
        response_body: (!response.body.is_empty())
            .then(|| response.body.clone()),
        start_time: response.start_time,
        end_time: response.end_time,
        duration_ms: response.duration_ms,
        is_request_success: matched,
        next_step,
    }
}
