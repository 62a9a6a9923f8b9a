//! Shared HTTP plumbing for provider clients.

use gateway_core::GatewayError;
use futures::StreamExt;
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use reqwest_eventsource::{Event, EventSource};
use serde::Deserialize;
use std::time::Duration;
use tracing::trace;

/// Build a pooled client with a transport timeout
pub(crate) fn build_client(timeout: Duration) -> Result<Client, GatewayError> {
    Client::builder()
        .timeout(timeout)
        .pool_max_idle_per_host(32)
        .build()
        .map_err(|e| GatewayError::internal(format!("Failed to create HTTP client: {e}")))
}

/// Join a base URL and a path without doubling slashes
pub(crate) fn join_url(base: &str, path: &str) -> String {
    format!("{}/{}", base.trim_end_matches('/'), path.trim_start_matches('/'))
}

/// Whether an upstream status is worth trying again later
pub(crate) fn is_retryable_status(status: StatusCode) -> bool {
    status == StatusCode::TOO_MANY_REQUESTS
        || status == StatusCode::REQUEST_TIMEOUT
        || status.is_server_error()
}

/// Map a transport failure
pub(crate) fn transport_error(provider: &str, err: &reqwest::Error) -> GatewayError {
    let message = if err.is_timeout() {
        format!("request timed out: {err}")
    } else if err.is_connect() {
        format!("connection failed: {err}")
    } else {
        format!("request failed: {err}")
    };
    GatewayError::provider(provider, message, err.status().map(|s| s.as_u16()), true)
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ErrorBody {
    Object { message: String },
    Text(String),
}

/// Extract the most useful message from an error body
pub(crate) fn error_message(body: &str) -> String {
    match serde_json::from_str::<ErrorEnvelope>(body) {
        Ok(ErrorEnvelope {
            error: ErrorBody::Object { message } | ErrorBody::Text(message),
        }) => message,
        Err(_) if body.trim().is_empty() => "empty response body".to_string(),
        Err(_) => body.chars().take(512).collect(),
    }
}

/// Map a non-success status and its body
pub(crate) fn status_error(provider: &str, status: StatusCode, body: &str) -> GatewayError {
    GatewayError::provider(
        provider,
        format!("upstream returned {status}: {}", error_message(body)),
        Some(status.as_u16()),
        is_retryable_status(status),
    )
}

/// Turn a response into an error unless it succeeded
pub(crate) async fn check_status(
    provider: &str,
    response: Response,
) -> Result<Response, GatewayError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(status_error(provider, status, &body))
}

/// Start an SSE request and wait until the upstream accepts it.
///
/// Automatic reconnection is disabled: a dropped stream is a failed attempt.
pub(crate) async fn open_event_source(
    provider: &str,
    request: RequestBuilder,
) -> Result<EventSource, GatewayError> {
    let mut source = EventSource::new(request).map_err(|e| {
        GatewayError::internal(format!("Failed to create event source: {e}"))
    })?;
    source.set_retry_policy(Box::new(reqwest_eventsource::retry::Never));

    match source.next().await {
        Some(Ok(Event::Open)) => {
            trace!(provider = %provider, "Event stream opened");
            Ok(source)
        }
        Some(Ok(Event::Message(_))) => Err(GatewayError::provider(
            provider,
            "event stream sent data before opening",
            None,
            true,
        )),
        Some(Err(err)) => {
            source.close();
            Err(event_source_error(provider, err).await)
        }
        None => Err(GatewayError::provider(
            provider,
            "event stream closed before opening",
            None,
            true,
        )),
    }
}

/// A stream that closed without a terminal event
pub(crate) fn stream_ended(provider: &str) -> GatewayError {
    GatewayError::streaming(format!("{provider}: stream ended before completion"))
}

/// Map an event source failure
pub(crate) async fn event_source_error(
    provider: &str,
    err: reqwest_eventsource::Error,
) -> GatewayError {
    use reqwest_eventsource::Error;
    match err {
        Error::InvalidStatusCode(status, response) => {
            let body = response.text().await.unwrap_or_default();
            status_error(provider, status, &body)
        }
        Error::Transport(e) => transport_error(provider, &e),
        Error::StreamEnded => stream_ended(provider),
        other => GatewayError::provider(provider, other.to_string(), None, true),
    }
}
