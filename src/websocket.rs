//! WebSocket step dispatch.
//!
//! Each executor instance owns the sessions opened during one
//! scenario run, keyed by step name. A step sends its expanded body as
//! a text message and awaits the first reply within the remaining
//! budget. Sessions stay open across steps so a later step can reuse
//! the same connection, and are all released at run end regardless of
//! outcome.

use crate::executor::{expand_request, Dispatch, StepExecutor};
use crate::model::{ResponseResult, Step};
use async_trait::async_trait;
use chrono::Utc;
use futures_util::{SinkExt, StreamExt};
use serde_json::Value;
use std::collections::HashMap;
use std::time::{Duration, Instant};
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, instrument, warn};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// WebSocket step executor holding one run's named sessions.
#[derive(Default)]
pub struct WebSocketStepExecutor {
    sessions: Mutex<HashMap<String, WsStream>>,
}

impl WebSocketStepExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Close every session opened during the run. Called
    /// unconditionally when the run ends.
    pub async fn close_all(&self) {
        let mut sessions = self.sessions.lock().await;
        for (name, mut stream) in sessions.drain() {
            debug!("closing websocket session '{name}'");
            if let Err(err) = stream.close(None).await {
                warn!("failed to close websocket session '{name}': {err}");
            }
        }
    }

    async fn connect(
        url: &str,
        header: &HashMap<String, String>,
    ) -> anyhow::Result<(WsStream, HashMap<String, String>)> {
        let mut request = normalize_scheme(url).into_client_request()?;
        for (name, value) in header {
            let name: tokio_tungstenite::tungstenite::http::HeaderName =
                name.parse()?;
            let value = value.parse()?;
            request.headers_mut().insert(name, value);
        }

        let (stream, response) = connect_async(request).await?;
        let mut handshake = HashMap::new();
        for (name, value) in response.headers() {
            handshake.insert(
                name.to_string(),
                value.to_str().unwrap_or("").to_string(),
            );
        }
        Ok((stream, handshake))
    }

    /// Await the next data frame, skipping control frames.
    async fn next_message(stream: &mut WsStream) -> anyhow::Result<String> {
        loop {
            match stream.next().await {
                Some(Ok(Message::Text(text))) => return Ok(text),
                Some(Ok(Message::Binary(data))) => {
                    return Ok(String::from_utf8_lossy(&data).into_owned())
                }
                Some(Ok(Message::Close(_))) => {
                    anyhow::bail!("connection closed by peer")
                }
                Some(Ok(_)) => continue,
                Some(Err(err)) => return Err(err.into()),
                None => anyhow::bail!("connection ended without a message"),
            }
        }
    }
}

/// Map `http`/`https` URLs onto `ws`/`wss` so scenarios can share a
/// base URL between protocols.
fn normalize_scheme(url: &str) -> String {
    if let Some(rest) = url.strip_prefix("https://") {
        format!("wss://{rest}")
    } else if let Some(rest) = url.strip_prefix("http://") {
        format!("ws://{rest}")
    } else {
        url.to_string()
    }
}

#[async_trait]
impl StepExecutor for WebSocketStepExecutor {
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
        let deadline = started + remaining_budget;
        let elapsed_ms = || started.elapsed().as_millis() as u64;

        if remaining_budget.is_zero() {
            return Dispatch {
                request: snapshot,
                response: ResponseResult::timed_out(start_time, 0),
            };
        }

        let mut sessions = self.sessions.lock().await;
        let mut handshake_headers = HashMap::new();
        if !sessions.contains_key(step_name) {
            let connect =
                Self::connect(&snapshot.url, &snapshot.header);
            match tokio::time::timeout(remaining_budget, connect).await {
                Ok(Ok((stream, headers))) => {
                    handshake_headers = headers;
                    sessions.insert(step_name.to_string(), stream);
                }
                Ok(Err(err)) => {
                    warn!("websocket connect failed: {err}");
                    return Dispatch {
                        request: snapshot,
                        response: ResponseResult::transport_fault(
                            start_time,
                            elapsed_ms(),
                            format!("websocket connect failed: {err}"),
                        ),
                    };
                }
                Err(_) => {
                    return Dispatch {
                        request: snapshot,
                        response: ResponseResult::timed_out(
                            start_time,
                            elapsed_ms(),
                        ),
                    };
                }
            }
        }
        let stream = sessions
            .get_mut(step_name)
            .expect("session inserted above");

        if let Some(body) = &snapshot.body {
            debug!("sending websocket message on '{step_name}'");
            if let Err(err) = stream.send(Message::Text(body.clone())).await
            {
                sessions.remove(step_name);
                return Dispatch {
                    request: snapshot,
                    response: ResponseResult::transport_fault(
                        start_time,
                        elapsed_ms(),
                        format!("websocket send failed: {err}"),
                    ),
                };
            }
        }

        let recv_budget = deadline.saturating_duration_since(Instant::now());
        let response = match tokio::time::timeout(
            recv_budget,
            Self::next_message(stream),
        )
        .await
        {
            Ok(Ok(body)) => ResponseResult {
                status: 200,
                headers: handshake_headers,
                body,
                start_time,
                end_time: Utc::now(),
                duration_ms: elapsed_ms(),
                failure: None,
            },
            Ok(Err(err)) => {
                sessions.remove(step_name);
                ResponseResult::transport_fault(
                    start_time,
                    elapsed_ms(),
                    format!("websocket receive failed: {err}"),
                )
            }
            Err(_) => {
                warn!("websocket receive timed out on '{step_name}'");
                ResponseResult::timed_out(start_time, elapsed_ms())
            }
        };

        Dispatch {
            request: snapshot,
            response,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn http_schemes_map_to_ws_schemes() {
        assert_eq!(normalize_scheme("http://host/ws"), "ws://host/ws");
        assert_eq!(normalize_scheme("https://host/ws"), "wss://host/ws");
        assert_eq!(normalize_scheme("ws://host/ws"), "ws://host/ws");
        assert_eq!(normalize_scheme("wss://host/ws"), "wss://host/ws");
    }

    #[tokio::test]
    async fn close_all_on_empty_pool_is_a_no_op() {
        let executor = WebSocketStepExecutor::new();
        executor.close_all().await;
        assert!(executor.sessions.lock().await.is_empty());
    }
}
