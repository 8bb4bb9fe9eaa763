//! Scenario and result data model.
//!
//! A [`Scenario`] is an ordered map of named [`Step`]s. Each step sends
//! one request and carries a list of [`Route`]s that decide, based on
//! the response, which step runs next and which values are persisted
//! into the run-scoped store.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

/// A named, ordered chain of request/response steps.
///
/// The first key of `steps` is the entry step; insertion order is
/// preserved by the loader.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Scenario {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    /// Total time budget for the whole run, in milliseconds.
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    /// Initial contents of the run-scoped variable store.
    #[serde(default)]
    pub store: HashMap<String, Value>,
    pub steps: IndexMap<String, Step>,
}

fn default_timeout_ms() -> u64 {
    30_000
}

impl Scenario {
    /// Deserialize a scenario from a YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self, serde_yaml::Error> {
        serde_yaml::from_str(yaml)
    }

    /// Serialize the scenario to a YAML string.
    pub fn to_yaml(&self) -> Result<String, serde_yaml::Error> {
        serde_yaml::to_string(self)
    }

    /// Name of the entry step (first key of the step map), if any.
    pub fn entry_step(&self) -> Option<&str> {
        self.steps.keys().next().map(String::as_str)
    }
}

/// One request/response unit within a scenario.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Step {
    /// Protocol used to dispatch the request.
    #[serde(rename = "type")]
    pub protocol: ProtocolType,
    pub request: Request,
    /// Evaluated in declaration order; the first match wins.
    #[serde(default)]
    pub route: Vec<Route>,
}

/// Protocols a step can be dispatched over.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ProtocolType {
    Http,
    Websocket,
}

/// Outbound request template. URL, header values and body may contain
/// `{{placeholder}}` references resolved against the store.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Request {
    pub method: HttpMethod,
    pub url: String,
    #[serde(default)]
    pub header: HashMap<String, String>,
    /// Raw body template, sent as `application/json` when present.
    #[serde(default)]
    pub body: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HttpMethod {
    Get,
    Post,
    Put,
    Delete,
    Patch,
    Head,
    Options,
}

impl HttpMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            HttpMethod::Get => "GET",
            HttpMethod::Post => "POST",
            HttpMethod::Put => "PUT",
            HttpMethod::Delete => "DELETE",
            HttpMethod::Patch => "PATCH",
            HttpMethod::Head => "HEAD",
            HttpMethod::Options => "OPTIONS",
        }
    }
}

/// A conditional transition rule. A route without `expected` matches
/// unconditionally and serves as a terminal fallback.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Route {
    #[serde(default)]
    pub expected: Option<Expected>,
    pub then: Then,
}

/// Response shape a route matches against.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Expected {
    /// Status pattern: exact (`"200"`) or inclusive range (`"200-299"`).
    /// Absent or empty matches any status.
    #[serde(default)]
    pub status: Option<String>,
    /// Flattened-body key/value pairs that must all be present and
    /// equal. Extra response keys are ignored.
    #[serde(default)]
    pub value: HashMap<String, Value>,
}

/// Transition directive of a matched route.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Then {
    /// Name of the next step. Absent or empty ends the chain.
    #[serde(default)]
    pub step: Option<String>,
    /// Store bindings. String values are template-expanded against the
    /// flattened response body, then the existing store, before merge.
    #[serde(default)]
    pub store: HashMap<String, Value>,
}

impl Then {
    /// The designated next step, with absent and empty both meaning
    /// "end of chain".
    pub fn next_step(&self) -> Option<&str> {
        self.step.as_deref().filter(|s| !s.is_empty())
    }
}

/// Outcome of one protocol dispatch, before route resolution.
#[derive(Debug, Clone)]
pub struct ResponseResult {
    pub status: u16,
    pub headers: HashMap<String, String>,
    pub body: String,
    pub start_time: chrono::DateTime<chrono::Utc>,
    pub end_time: chrono::DateTime<chrono::Utc>,
    pub duration_ms: u64,
    /// Set when the dispatch timed out or the transport failed; the
    /// runner turns this into a terminal unmatched step.
    pub failure: Option<String>,
}

/// Sentinel status reported when the remaining budget expired before a
/// response arrived.
pub const STATUS_REQUEST_TIMEOUT: u16 = 408;

impl ResponseResult {
    /// Build the sentinel result for a dispatch that exceeded the
    /// remaining time budget.
    pub fn timed_out(
        start_time: chrono::DateTime<chrono::Utc>,
        duration_ms: u64,
    ) -> Self {
        Self {
            status: STATUS_REQUEST_TIMEOUT,
            headers: HashMap::new(),
            body: String::new(),
            start_time,
            end_time: chrono::Utc::now(),
            duration_ms,
            failure: Some("request timeout".to_string()),
        }
    }

    /// Build the sentinel result for a transport-level fault.
    pub fn transport_fault(
        start_time: chrono::DateTime<chrono::Utc>,
        duration_ms: u64,
        error: String,
    ) -> Self {
        Self {
            status: 0,
            headers: HashMap::new(),
            body: String::new(),
            start_time,
            end_time: chrono::Utc::now(),
            duration_ms,
            failure: Some(error),
        }
    }
}

/// Immutable record of one executed step.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResultStep {
    pub step_name: String,
    #[serde(rename = "type")]
    pub protocol: ProtocolType,
    /// Fully expanded URL the request was sent to.
    pub url: String,
    pub method: String,
    #[serde(default)]
    pub request_header: HashMap<String, String>,
    #[serde(default)]
    pub request_body: Option<String>,
    pub status: u16,
    #[serde(default)]
    pub response_headers: HashMap<String, String>,
    #[serde(default)]
    pub response_body: Option<String>,
    pub start_time: chrono::DateTime<chrono::Utc>,
    pub end_time: chrono::DateTime<chrono::Utc>,
    pub duration_ms: u64,
    /// Whether some route matched the response.
    pub is_request_success: bool,
    /// Resolved next-step name, if the matched route designated one.
    #[serde(default)]
    pub next_step: Option<String>,
}

/// Aggregate outcome of a scenario run.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScenarioResult {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    pub executed_at: chrono::DateTime<chrono::Utc>,
    pub total_duration_ms: u64,
    pub average_duration_ms: u64,
    pub is_scenario_success: bool,
    pub results: Vec<ResultStep>,
}

impl ScenarioResult {
    /// Serialize the result to a pretty JSON string.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    /// Serialize the result to a YAML string.
    pub fn to_yaml(&self) -> Result<String, serde_yaml::Error> {
        serde_yaml::to_string(self)
    }
}
