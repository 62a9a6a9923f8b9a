//! Response types returned by provider clients.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Token usage reported by a provider
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Usage {
    /// Prompt tokens
    pub prompt_tokens: u32,
    /// Completion tokens
    pub completion_tokens: u32,
    /// Total tokens
    pub total_tokens: u32,
}

impl Usage {
    /// Create usage from prompt and completion counts
    #[must_use]
    pub fn new(prompt_tokens: u32, completion_tokens: u32) -> Self {
        Self {
            prompt_tokens,
            completion_tokens,
            total_tokens: prompt_tokens.saturating_add(completion_tokens),
        }
    }
}

/// Completed, non-streaming provider response
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompletionResponse {
    /// Upstream response ID
    pub id: String,
    /// Provider that served the request
    pub provider: String,
    /// Model that produced the text
    pub model: String,
    /// Generated text
    pub text: String,
    /// Token usage
    pub usage: Usage,
    /// Why generation stopped
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finish_reason: Option<String>,
    /// When the response was produced
    pub created: DateTime<Utc>,
}

impl CompletionResponse {
    /// Create a response stamped with the current time
    #[must_use]
    pub fn new(
        provider: impl Into<String>,
        model: impl Into<String>,
        text: impl Into<String>,
        usage: Usage,
    ) -> Self {
        Self {
            id: format!("cmpl-{}", uuid::Uuid::new_v4()),
            provider: provider.into(),
            model: model.into(),
            text: text.into(),
            usage,
            finish_reason: Some("stop".to_string()),
            created: Utc::now(),
        }
    }

    /// Replace the upstream response ID
    #[must_use]
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    /// Set the finish reason
    #[must_use]
    pub fn with_finish_reason(mut self, reason: Option<String>) -> Self {
        self.finish_reason = reason;
        self
    }
}
