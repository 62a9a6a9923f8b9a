//! Error types for the gateway.
//!
//! Every error carries a machine-readable [`ErrorKind`] so callers can drive
//! automated retry logic without parsing messages.

use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

/// Result type alias for gateway operations
pub type GatewayResult<T> = Result<T, GatewayError>;

/// Machine-readable error classification exposed on the wire
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Tenant exceeded its request quota
    RateLimited,
    /// Provider breaker is open
    CircuitOpen,
    /// Upstream returned an error
    ProviderError,
    /// Latency budget exceeded
    Timeout,
    /// Every routing candidate failed
    AllProvidersFailed,
    /// Invalid gateway or tenant configuration
    ConfigError,
    /// Malformed inbound request
    ValidationError,
    /// Tenant credentials rejected
    AuthenticationError,
    /// Tenant spend limit reached
    BudgetExceeded,
    /// Stream failed after it was opened
    StreamingError,
    /// Unexpected internal failure
    InternalError,
}

impl ErrorKind {
    /// Wire name of this kind
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::RateLimited => "rate_limited",
            Self::CircuitOpen => "circuit_open",
            Self::ProviderError => "provider_error",
            Self::Timeout => "timeout",
            Self::AllProvidersFailed => "all_providers_failed",
            Self::ConfigError => "config_error",
            Self::ValidationError => "validation_error",
            Self::AuthenticationError => "authentication_error",
            Self::BudgetExceeded => "budget_exceeded",
            Self::StreamingError => "streaming_error",
            Self::InternalError => "internal_error",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One failed attempt against a routing candidate
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttemptFailure {
    /// Provider that was tried
    pub provider: String,
    /// Model that was requested
    pub model: String,
    /// Why the attempt failed
    pub kind: ErrorKind,
    /// Human-readable detail
    pub message: String,
}

impl AttemptFailure {
    /// Describe a failed attempt from the error it produced
    #[must_use]
    pub fn from_error(
        provider: impl Into<String>,
        model: impl Into<String>,
        error: &GatewayError,
    ) -> Self {
        Self {
            provider: provider.into(),
            model: model.into(),
            kind: error.kind(),
            message: error.to_string(),
        }
    }
}

/// Gateway error taxonomy
#[derive(Debug, Clone, Error)]
pub enum GatewayError {
    /// Tenant exceeded its token bucket
    #[error("Rate limit exceeded for tenant {tenant_id}, retry after {retry_after:?}")]
    RateLimited {
        /// Tenant that was throttled
        tenant_id: String,
        /// Time until enough tokens have refilled
        retry_after: Duration,
    },

    /// Provider rejected by its circuit breaker without an upstream call
    #[error("Circuit breaker open for provider: {provider}")]
    CircuitOpen {
        /// Provider ID
        provider: String,
    },

    /// Upstream provider returned an error or was unreachable
    #[error("Provider {provider} error: {message}")]
    Provider {
        /// Provider ID
        provider: String,
        /// Error message
        message: String,
        /// HTTP status code from upstream, when one was received
        status_code: Option<u16>,
        /// Whether a later retry could succeed
        retryable: bool,
    },

    /// Upstream call did not finish within the latency budget
    #[error("Provider {provider} exceeded latency budget of {budget:?}")]
    Timeout {
        /// Provider ID
        provider: String,
        /// Budget that elapsed
        budget: Duration,
    },

    /// Every routing candidate was exhausted
    #[error("All providers failed after {} attempt(s)", .attempts.len())]
    AllProvidersFailed {
        /// Each attempt in the order it was made
        attempts: Vec<AttemptFailure>,
        /// Last concrete error, for diagnosis
        last_error: Option<Box<GatewayError>>,
    },

    /// Invalid configuration
    #[error("Configuration error: {message}")]
    Configuration {
        /// Error message
        message: String,
    },

    /// Malformed request
    #[error("Validation error: {message}")]
    Validation {
        /// Error message
        message: String,
        /// Offending field
        field: Option<String>,
    },

    /// Tenant credentials missing or wrong
    #[error("Authentication failed: {message}")]
    Authentication {
        /// Error message
        message: String,
    },

    /// Tenant has reached its spend limit
    #[error("Budget exceeded for tenant {tenant_id}: spent ${spent_usd:.4} of ${limit_usd:.2}")]
    BudgetExceeded {
        /// Tenant ID
        tenant_id: String,
        /// Spend in the current window
        spent_usd: f64,
        /// Configured limit
        limit_usd: f64,
    },

    /// Stream broke after it was opened
    #[error("Streaming error: {message}")]
    Streaming {
        /// Error message
        message: String,
    },

    /// Unexpected internal failure
    #[error("Internal error: {message}")]
    Internal {
        /// Error message
        message: String,
    },
}

impl GatewayError {
    /// Create a rate limited error
    #[must_use]
    pub fn rate_limited(tenant_id: impl Into<String>, retry_after: Duration) -> Self {
        Self::RateLimited {
            tenant_id: tenant_id.into(),
            retry_after,
        }
    }

    /// Create a circuit open error
    #[must_use]
    pub fn circuit_open(provider: impl Into<String>) -> Self {
        Self::CircuitOpen {
            provider: provider.into(),
        }
    }

    /// Create a provider error
    #[must_use]
    pub fn provider(
        provider: impl Into<String>,
        message: impl Into<String>,
        status_code: Option<u16>,
        retryable: bool,
    ) -> Self {
        Self::Provider {
            provider: provider.into(),
            message: message.into(),
            status_code,
            retryable,
        }
    }

    /// Create a timeout error
    #[must_use]
    pub fn timeout(provider: impl Into<String>, budget: Duration) -> Self {
        Self::Timeout {
            provider: provider.into(),
            budget,
        }
    }

    /// Create the terminal error for an exhausted candidate list
    #[must_use]
    pub fn all_providers_failed(
        attempts: Vec<AttemptFailure>,
        last_error: Option<GatewayError>,
    ) -> Self {
        Self::AllProvidersFailed {
            attempts,
            last_error: last_error.map(Box::new),
        }
    }

    /// Create a configuration error
    #[must_use]
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Create a validation error
    #[must_use]
    pub fn validation(message: impl Into<String>, field: Option<String>) -> Self {
        Self::Validation {
            message: message.into(),
            field,
        }
    }

    /// Create an authentication error
    #[must_use]
    pub fn authentication(message: impl Into<String>) -> Self {
        Self::Authentication {
            message: message.into(),
        }
    }

    /// Create a budget exceeded error
    #[must_use]
    pub fn budget_exceeded(tenant_id: impl Into<String>, spent_usd: f64, limit_usd: f64) -> Self {
        Self::BudgetExceeded {
            tenant_id: tenant_id.into(),
            spent_usd,
            limit_usd,
        }
    }

    /// Create a streaming error
    #[must_use]
    pub fn streaming(message: impl Into<String>) -> Self {
        Self::Streaming {
            message: message.into(),
        }
    }

    /// Create an internal error
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Machine-readable kind of this error
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::RateLimited { .. } => ErrorKind::RateLimited,
            Self::CircuitOpen { .. } => ErrorKind::CircuitOpen,
            Self::Provider { .. } => ErrorKind::ProviderError,
            Self::Timeout { .. } => ErrorKind::Timeout,
            Self::AllProvidersFailed { .. } => ErrorKind::AllProvidersFailed,
            Self::Configuration { .. } => ErrorKind::ConfigError,
            Self::Validation { .. } => ErrorKind::ValidationError,
            Self::Authentication { .. } => ErrorKind::AuthenticationError,
            Self::BudgetExceeded { .. } => ErrorKind::BudgetExceeded,
            Self::Streaming { .. } => ErrorKind::StreamingError,
            Self::Internal { .. } => ErrorKind::InternalError,
        }
    }

    /// Check if a caller could reasonably retry this request later
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::RateLimited { .. }
            | Self::CircuitOpen { .. }
            | Self::Timeout { .. }
            | Self::Streaming { .. } => true,
            Self::Provider { retryable, .. } => *retryable,
            Self::AllProvidersFailed { attempts, .. } => attempts.iter().any(|a| {
                matches!(
                    a.kind,
                    ErrorKind::CircuitOpen | ErrorKind::Timeout | ErrorKind::ProviderError
                )
            }),
            _ => false,
        }
    }

    /// Suggested wait before retrying, when known
    #[must_use]
    pub const fn retry_after(&self) -> Option<Duration> {
        match self {
            Self::RateLimited { retry_after, .. } => Some(*retry_after),
            _ => None,
        }
    }

    /// Whether this failure should be counted against a provider's breaker
    #[must_use]
    pub const fn is_provider_failure(&self) -> bool {
        matches!(
            self,
            Self::Provider { .. } | Self::Timeout { .. } | Self::Streaming { .. }
        )
    }

    /// Attempts recorded on an `AllProvidersFailed` error
    #[must_use]
    pub fn attempts(&self) -> &[AttemptFailure] {
        match self {
            Self::AllProvidersFailed { attempts, .. } => attempts,
            _ => &[],
        }
    }
}
