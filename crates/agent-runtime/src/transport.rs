//! Stream Transport
//!
//! Runs one streaming HTTP exchange and feeds the body, block by block, to a
//! [`ProtocolAdapter`]. Every await is raced against the token's
//! `cancelled()` future and a poll tick, so cancellation is honored while
//! connecting, while reading an error body and while the stream is stalled.

use std::time::{Duration, Instant};

use agent_core::{
    cancel::CancellationToken,
    error::AgentError,
    progress::{ProgressEvent, ProgressSink},
    provider::ModelResponse,
    stream::{ProtocolAdapter, StreamDelta, StreamState},
};
use futures::StreamExt;
use reqwest::{Client, RequestBuilder};
use serde_json::Value;
use tokio::time::{interval, MissedTickBehavior};

/// Longest error body excerpt included in an HTTP failure message
const ERROR_EXCERPT_CHARS: usize = 800;

/// Streaming HTTP transport
#[derive(Clone, Debug)]
pub struct StreamTransport {
    http: Client,
    poll_interval: Duration,
}

impl StreamTransport {
    pub fn new(http: Client, poll_interval: Duration) -> Self {
        Self {
            http,
            poll_interval: poll_interval.max(Duration::from_millis(1)),
        }
    }

    /// The underlying client, for building requests
    pub fn client(&self) -> &Client {
        &self.http
    }

    /// Execute one request and decode its streamed body with `adapter`.
    ///
    /// Text deltas are forwarded to `progress` as they are decoded. Never
    /// returns an error: failures and cancellation are reported through
    /// [`ModelResponse::outcome`].
    pub async fn exchange<A: ProtocolAdapter>(
        &self,
        adapter: &A,
        request: RequestBuilder,
        progress: &mut dyn ProgressSink,
        cancel: &CancellationToken,
    ) -> ModelResponse {
        if cancel.is_cancelled() {
            return interrupted(progress);
        }

        let started = Instant::now();
        let mut ticker = interval(self.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick completes immediately.
        ticker.tick().await;

        let send = request.send();
        tokio::pin!(send);
        let response = loop {
            tokio::select! {
                result = &mut send => break result,
                () = cancel.cancelled() => return interrupted(progress),
                _ = ticker.tick() => {
                    if cancel.is_cancelled() {
                        return interrupted(progress);
                    }
                    progress.emit(ProgressEvent::Waiting { elapsed: started.elapsed() });
                }
            }
        };

        let response = match response {
            Ok(response) => response,
            Err(err) => return network_failure(adapter.name(), &err),
        };

        let status = response.status();
        if status.is_client_error() || status.is_server_error() {
            let body = response.bytes();
            tokio::pin!(body);
            let body = loop {
                tokio::select! {
                    result = &mut body => break result,
                    () = cancel.cancelled() => return interrupted(progress),
                    _ = ticker.tick() => {
                        if cancel.is_cancelled() {
                            return interrupted(progress);
                        }
                    }
                }
            };
            let body = body.map(|b| b.to_vec()).unwrap_or_default();
            let message = describe_http_error(status.as_u16(), &body);
            tracing::error!(provider = adapter.name(), status = status.as_u16(), "Provider returned an error");
            return ModelResponse::failed(AgentError::Http {
                status: status.as_u16(),
                message,
            });
        }

        let stream = response.bytes_stream();
        tokio::pin!(stream);
        let mut state = StreamState::new();
        let mut received = false;

        loop {
            tokio::select! {
                next = stream.next() => match next {
                    Some(Ok(chunk)) => {
                        received = true;
                        let deltas = adapter.decode_chunk(&chunk, &mut state);
                        forward_text(&deltas, progress);
                        if cancel.is_cancelled() {
                            return interrupted(progress);
                        }
                    }
                    Some(Err(err)) => return network_failure(adapter.name(), &err),
                    None => break,
                },
                () = cancel.cancelled() => return interrupted(progress),
                _ = ticker.tick() => {
                    if cancel.is_cancelled() {
                        return interrupted(progress);
                    }
                    if !received {
                        progress.emit(ProgressEvent::Waiting { elapsed: started.elapsed() });
                    }
                }
            }
        }

        let deltas = adapter.flush(&mut state);
        forward_text(&deltas, progress);

        let response = adapter.finalize(state);
        tracing::debug!(
            provider = adapter.name(),
            tool_calls = response.tool_calls.len(),
            elapsed_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX),
            "Exchange complete"
        );
        response
    }
}

fn forward_text(deltas: &[StreamDelta], progress: &mut dyn ProgressSink) {
    for delta in deltas {
        if let StreamDelta::Text(text) = delta {
            progress.emit(ProgressEvent::Text(text));
        }
    }
}

fn interrupted(progress: &mut dyn ProgressSink) -> ModelResponse {
    tracing::info!("Exchange cancelled");
    progress.emit(ProgressEvent::Interrupted);
    ModelResponse::cancelled()
}

fn network_failure(provider: &str, err: &reqwest::Error) -> ModelResponse {
    tracing::error!(provider, error = %err, "Network failure");
    ModelResponse::failed(AgentError::Network(err.to_string()))
}

/// `HTTP Status: <code>` plus the API's `error.message` when the body has
/// one, otherwise a raw excerpt.
pub fn describe_http_error(status: u16, body: &[u8]) -> String {
    let mut message = format!("HTTP Status: {}", status);
    let text = String::from_utf8_lossy(body);

    let api_error = serde_json::from_str::<Value>(&text)
        .ok()
        .and_then(|value| api_error_message(&value));

    if let Some(api_error) = api_error {
        message.push_str("\nAPI Error: ");
        message.push_str(&api_error);
    } else if !text.trim().is_empty() {
        message.push_str("\nResponse: ");
        message.extend(text.chars().take(ERROR_EXCERPT_CHARS));
    }
    message
}

/// `error.message`, possibly wrapped in a one-element array (Gemini)
fn api_error_message(value: &Value) -> Option<String> {
    let envelope = match value {
        Value::Array(items) => items.first()?,
        other => other,
    };
    envelope
        .get("error")?
        .get("message")?
        .as_str()
        .map(String::from)
}
