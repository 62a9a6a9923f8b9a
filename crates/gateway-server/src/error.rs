//! API error responses.

use axum::{
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use gateway_core::{AttemptFailure, ErrorKind, GatewayError};
use serde::Serialize;
use std::time::Duration;

/// Error returned by an HTTP handler
#[derive(Debug, Clone)]
pub struct ApiError {
    /// HTTP status
    pub status: StatusCode,
    /// Machine-readable kind
    pub kind: ErrorKind,
    /// Human-readable message
    pub message: String,
    /// When the caller may retry
    pub retry_after: Option<Duration>,
    /// Providers tried before giving up
    pub attempts: Vec<AttemptFailure>,
}

#[derive(Serialize)]
struct ErrorEnvelope<'a> {
    error: ErrorBody<'a>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ErrorBody<'a> {
    kind: ErrorKind,
    message: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    retry_after_ms: Option<u64>,
    #[serde(skip_serializing_if = "<[_]>::is_empty")]
    attempts: &'a [AttemptFailure],
}

impl ApiError {
    fn new(status: StatusCode, kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            status,
            kind,
            message: message.into(),
            retry_after: None,
            attempts: Vec::new(),
        }
    }

    /// 400 with a validation kind
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, ErrorKind::ValidationError, message)
    }

    /// 401 with an authentication kind
    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new(StatusCode::UNAUTHORIZED, ErrorKind::AuthenticationError, message)
    }

    /// 500 with an internal kind
    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, ErrorKind::InternalError, message)
    }

    /// JSON body, also used for in-stream error events
    pub fn body(&self) -> serde_json::Value {
        serde_json::to_value(self.envelope()).unwrap_or(serde_json::Value::Null)
    }

    fn envelope(&self) -> ErrorEnvelope<'_> {
        ErrorEnvelope {
            error: ErrorBody {
                kind: self.kind,
                message: &self.message,
                retry_after_ms: self.retry_after.map(|d| d.as_millis() as u64),
                attempts: &self.attempts,
            },
        }
    }
}

/// HTTP status for a gateway error kind
pub const fn status_for(kind: ErrorKind) -> StatusCode {
    match kind {
        ErrorKind::RateLimited => StatusCode::TOO_MANY_REQUESTS,
        ErrorKind::CircuitOpen => StatusCode::SERVICE_UNAVAILABLE,
        ErrorKind::Timeout => StatusCode::GATEWAY_TIMEOUT,
        ErrorKind::ProviderError | ErrorKind::AllProvidersFailed | ErrorKind::StreamingError => {
            StatusCode::BAD_GATEWAY
        }
        ErrorKind::ValidationError => StatusCode::BAD_REQUEST,
        ErrorKind::AuthenticationError => StatusCode::UNAUTHORIZED,
        ErrorKind::BudgetExceeded => StatusCode::PAYMENT_REQUIRED,
        ErrorKind::ConfigError | ErrorKind::InternalError => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl From<GatewayError> for ApiError {
    fn from(err: GatewayError) -> Self {
        let kind = err.kind();
        let mut api = Self::new(status_for(kind), kind, err.to_string());
        match err {
            GatewayError::RateLimited { retry_after, .. } => api.retry_after = Some(retry_after),
            GatewayError::AllProvidersFailed { attempts, .. } => api.attempts = attempts,
            _ => {}
        }
        api
    }
}

impl std::fmt::Display for ApiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.kind, self.message)
    }
}

impl std::error::Error for ApiError {}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let mut response = (self.status, Json(self.envelope())).into_response();
        if let Some(retry_after) = self.retry_after {
            let secs = retry_after.as_secs() + u64::from(retry_after.subsec_nanos() > 0);
            if let Ok(value) = HeaderValue::from_str(&secs.max(1).to_string()) {
                response.headers_mut().insert(header::RETRY_AFTER, value);
            }
        }
        response
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        let cases = [
            (GatewayError::rate_limited("ada", Duration::from_secs(1)), 429),
            (GatewayError::circuit_open("openai"), 503),
            (GatewayError::timeout("openai", Duration::from_millis(500)), 504),
            (GatewayError::all_providers_failed(Vec::new(), None), 502),
            (GatewayError::validation("bad", None), 400),
            (GatewayError::authentication("nope"), 401),
            (GatewayError::budget_exceeded("ada", 2.0, 1.0), 402),
            (GatewayError::configuration("broken"), 500),
        ];
        for (err, status) in cases {
            assert_eq!(ApiError::from(err).status.as_u16(), status);
        }
    }

    #[test]
    fn test_rate_limited_sets_retry_after() {
        let api = ApiError::from(GatewayError::rate_limited("ada", Duration::from_millis(1500)));
        let body = api.body();
        assert_eq!(body["error"]["kind"], "rate_limited");
        assert_eq!(body["error"]["retryAfterMs"], 1500);

        let response = api.into_response();
        assert_eq!(response.headers()[header::RETRY_AFTER], "2");
    }

    #[test]
    fn test_attempts_are_listed() {
        let failure = AttemptFailure::from_error(
            "openai",
            "gpt-4o",
            &GatewayError::provider("openai", "overloaded", Some(503), true),
        );
        let api = ApiError::from(GatewayError::all_providers_failed(vec![failure], None));
        let body = api.body();
        assert_eq!(body["error"]["attempts"][0]["provider"], "openai");
        assert_eq!(body["error"]["attempts"][0]["kind"], "provider_error");
    }
}
