//! Protocol-specific step dispatch.
//!
//! A [`StepExecutor`] expands the request templates against the run
//! store, sends the request under a hard deadline, and reports the
//! outcome as a [`ResponseResult`]. Deadline expiry and transport
//! faults are reported through the result, never as an `Err`, so the
//! runner can treat every dispatch uniformly.

use crate::model::{HttpMethod, ResponseResult, Step};
use crate::template;
use async_trait::async_trait;
use chrono::Utc;
use reqwest::Method as ReqMethod;
use serde_json::Value;
use std::collections::HashMap;
use std::time::{Duration, Instant};
use tracing::{debug, instrument, warn};

/// Snapshot of the fully expanded request, kept for the result trace.
#[derive(Debug, Clone)]
pub struct RequestSnapshot {
    pub url: String,
    pub method: String,
    pub header: HashMap<String, String>,
    pub body: Option<String>,
}

/// One dispatch: what was sent and what came back.
#[derive(Debug, Clone)]
pub struct Dispatch {
    pub request: RequestSnapshot,
    pub response: ResponseResult,
}

/// Contract shared by the HTTP and WebSocket executors.
#[async_trait]
pub trait StepExecutor: Send + Sync {
    /// Send the step's request with `remaining_budget` as a hard
    /// per-call deadline.
    async fn execute(
        &self,
        step_name: &str,
        step: &Step,
        store: &HashMap<String, Value>,
        remaining_budget: Duration,
    ) -> Dispatch;
}

/// HTTP step executor backed by a shared reqwest client.
#[derive(Debug, Default)]
pub struct HttpStepExecutor {
    client: reqwest::Client,
}

impl HttpStepExecutor {
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::new(),
        }
    }

    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

/// Expand URL, headers, and body templates against the store.
pub(crate) fn expand_request(
    step: &Step,
    store: &HashMap<String, Value>,
) -> RequestSnapshot {
    RequestSnapshot {
        url: template::expand(&step.request.url, store),
        method: step.request.method.as_str().to_string(),
        header: template::expand_map(&step.request.header, store),
        body: step
            .request
            .body
            .as_deref()
            .map(|body| template::expand(body, store)),
    }
}

/// Fold a reqwest header map into single-valued entries, joining
/// repeated headers with `", "`.
pub(crate) fn fold_headers(
    headers: &reqwest::header::HeaderMap,
) -> HashMap<String, String> {
    let mut folded: HashMap<String, String> = HashMap::new();
    for (name, value) in headers {
        let text = value.to_str().unwrap_or("").to_string();
        folded
            .entry(name.to_string())
            .and_modify(|existing| {
                existing.push_str(", ");
                existing.push_str(&text);
            })
            .or_insert(text);
    }
    folded
}

fn convert_method(method: HttpMethod) -> ReqMethod {
    match method {
        HttpMethod::Get => ReqMethod::GET,
        HttpMethod::Post => ReqMethod::POST,
        HttpMethod::Put => ReqMethod::PUT,
        HttpMethod::Delete => ReqMethod::DELETE,
        HttpMethod::Patch => ReqMethod::PATCH,
        HttpMethod::Head => ReqMethod::HEAD,
        HttpMethod::Options => ReqMethod::OPTIONS,
    }
}

#[async_trait]
impl StepExecutor for HttpStepExecutor {
    #[instrument(skip_all, fields(step = %step_name, url = %step.request.url))]
    async fn execute(
        &self,
        step_name: &str,
        step: &Step,
        store: &HashMap<String, Value>,
        remaining_budget: Duration,
    ) -> Dispatch {
        let snapshot = expand_request(step, store);
        let start_time = Utc::now();
        let started = Instant::now();

        if remaining_budget.is_zero() {
            warn!("time budget exhausted before dispatch");
            return Dispatch {
                request: snapshot,
                response: ResponseResult::timed_out(start_time, 0),
            };
        }

        let mut builder = self
            .client
            .request(convert_method(step.request.method), &snapshot.url)
            .timeout(remaining_budget);
        for (name, value) in &snapshot.header {
            builder = builder.header(name, value);
        }
        if let Some(body) = &snapshot.body {
            builder = builder
                .header("Content-Type", "application/json")
                .body(body.clone());
        }

        debug!("dispatching {} {}", snapshot.method, snapshot.url);
        let result = builder.send().await;
        let elapsed_ms = || started.elapsed().as_millis() as u64;

        let response = match result {
            Ok(resp) => {
                let status = resp.status().as_u16();
                let headers = fold_headers(resp.headers());
                match resp.text().await {
                    Ok(body) => ResponseResult {
                        status,
                        headers,
                        body,
                        start_time,
                        end_time: Utc::now(),
                        duration_ms: elapsed_ms(),
                        failure: None,
                    },
                    Err(err) => ResponseResult::transport_fault(
                        start_time,
                        elapsed_ms(),
                        format!("failed to read response body: {err}"),
                    ),
                }
            }
            Err(err) if err.is_timeout() => {
                warn!("request timed out after {:?}", remaining_budget);
                ResponseResult::timed_out(start_time, elapsed_ms())
            }
            Err(err) => {
                warn!("request failed: {err}");
                ResponseResult::transport_fault(
                    start_time,
                    elapsed_ms(),
                    err.to_string(),
                )
            }
        };

        Dispatch {
            request: snapshot,
            response,
        }
    }
}
