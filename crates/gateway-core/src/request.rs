//! Request types for the gateway.
//!
//! [`GatewayRequest`] is what callers send; [`CompletionRequest`] is what a
//! provider client receives once a route has been chosen.

use crate::error::GatewayError;
use serde::{Deserialize, Serialize};

fn default_task_type() -> String {
    "chat".to_string()
}

/// Inbound request from a calling agent. Immutable once constructed.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GatewayRequest {
    /// Calling tenant
    pub tenant_id: String,

    /// Declared task type, e.g. "chat" or "code"
    #[serde(default = "default_task_type")]
    pub task_type: String,

    /// Conversation payload
    pub messages: Vec<ChatMessage>,

    /// Maximum tokens to generate
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,

    /// Deadline for a single upstream attempt
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub latency_budget_ms: Option<u64>,

    /// Sampling temperature (0.0 - 2.0)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,

    /// Explicit model override
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,

    /// Caller's cacheability hint
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cacheable: Option<bool>,

    /// Streaming response requested
    #[serde(default)]
    pub stream: bool,
}

impl GatewayRequest {
    /// Create a new builder for `GatewayRequest`
    #[must_use]
    pub fn builder() -> GatewayRequestBuilder {
        GatewayRequestBuilder::default()
    }

    /// Validate the request
    ///
    /// # Errors
    /// Returns a validation error naming the offending field
    pub fn validate(&self) -> Result<(), GatewayError> {
        if self.tenant_id.trim().is_empty() {
            return Err(GatewayError::validation(
                "tenantId cannot be empty",
                Some("tenantId".to_string()),
            ));
        }

        if self.messages.is_empty() {
            return Err(GatewayError::validation(
                "messages cannot be empty",
                Some("messages".to_string()),
            ));
        }

        if let Some(temperature) = self.temperature {
            if !(0.0..=2.0).contains(&temperature) {
                return Err(GatewayError::validation(
                    format!("temperature must be between 0.0 and 2.0, got {temperature}"),
                    Some("temperature".to_string()),
                ));
            }
        }

        if self.max_tokens == Some(0) {
            return Err(GatewayError::validation(
                "maxTokens must be greater than 0",
                Some("maxTokens".to_string()),
            ));
        }

        if self.latency_budget_ms == Some(0) {
            return Err(GatewayError::validation(
                "latencyBudgetMs must be greater than 0",
                Some("latencyBudgetMs".to_string()),
            ));
        }

        Ok(())
    }

    /// Total characters across all messages
    #[must_use]
    pub fn total_chars(&self) -> usize {
        self.messages.iter().map(|m| m.content.chars().count()).sum()
    }

    /// Rough input token estimate (four characters per token)
    #[must_use]
    pub fn estimated_tokens(&self) -> u32 {
        let chars = self.total_chars();
        u32::try_from(chars.div_ceil(4)).unwrap_or(u32::MAX)
    }

    /// Concatenated system prompt, if any
    #[must_use]
    pub fn system_prompt(&self) -> Option<String> {
        let parts: Vec<&str> = self
            .messages
            .iter()
            .filter(|m| m.role == MessageRole::System)
            .map(|m| m.content.as_str())
            .collect();
        if parts.is_empty() {
            None
        } else {
            Some(parts.join("\n"))
        }
    }
}

/// Builder for `GatewayRequest`
#[derive(Debug, Default)]
pub struct GatewayRequestBuilder {
    tenant_id: Option<String>,
    task_type: Option<String>,
    messages: Vec<ChatMessage>,
    max_tokens: Option<u32>,
    latency_budget_ms: Option<u64>,
    temperature: Option<f32>,
    model: Option<String>,
    cacheable: Option<bool>,
    stream: bool,
}

impl GatewayRequestBuilder {
    /// Set the tenant
    #[must_use]
    pub fn tenant(mut self, tenant_id: impl Into<String>) -> Self {
        self.tenant_id = Some(tenant_id.into());
        self
    }

    /// Set the task type
    #[must_use]
    pub fn task_type(mut self, task_type: impl Into<String>) -> Self {
        self.task_type = Some(task_type.into());
        self
    }

    /// Set the messages
    #[must_use]
    pub fn messages(mut self, messages: Vec<ChatMessage>) -> Self {
        self.messages = messages;
        self
    }

    /// Add a message
    #[must_use]
    pub fn message(mut self, message: ChatMessage) -> Self {
        self.messages.push(message);
        self
    }

    /// Set max_tokens
    #[must_use]
    pub fn max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }

    /// Set the latency budget in milliseconds
    #[must_use]
    pub fn latency_budget_ms(mut self, budget: u64) -> Self {
        self.latency_budget_ms = Some(budget);
        self
    }

    /// Set the temperature
    #[must_use]
    pub fn temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    /// Pin a model
    #[must_use]
    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    /// Mark the request cacheable or not
    #[must_use]
    pub fn cacheable(mut self, cacheable: bool) -> Self {
        self.cacheable = Some(cacheable);
        self
    }

    /// Enable streaming
    #[must_use]
    pub fn stream(mut self, stream: bool) -> Self {
        self.stream = stream;
        self
    }

    /// Build the request
    ///
    /// # Errors
    /// Returns error if required fields are missing or invalid
    pub fn build(self) -> Result<GatewayRequest, GatewayError> {
        let tenant_id = self.tenant_id.ok_or_else(|| {
            GatewayError::validation("tenantId is required", Some("tenantId".to_string()))
        })?;

        let request = GatewayRequest {
            tenant_id,
            task_type: self.task_type.unwrap_or_else(default_task_type),
            messages: self.messages,
            max_tokens: self.max_tokens,
            latency_budget_ms: self.latency_budget_ms,
            temperature: self.temperature,
            model: self.model,
            cacheable: self.cacheable,
            stream: self.stream,
        };

        request.validate()?;

        Ok(request)
    }
}

/// Chat message with role and content
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ChatMessage {
    /// Role of the message author
    pub role: MessageRole,

    /// Text content
    pub content: String,

    /// Optional name of the author
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

impl ChatMessage {
    fn with_role(role: MessageRole, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            name: None,
        }
    }

    /// Create a system message
    #[must_use]
    pub fn system(content: impl Into<String>) -> Self {
        Self::with_role(MessageRole::System, content)
    }

    /// Create a user message
    #[must_use]
    pub fn user(content: impl Into<String>) -> Self {
        Self::with_role(MessageRole::User, content)
    }

    /// Create an assistant message
    #[must_use]
    pub fn assistant(content: impl Into<String>) -> Self {
        Self::with_role(MessageRole::Assistant, content)
    }
}

/// Message role
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    /// System message
    System,
    /// User message
    User,
    /// Assistant message
    Assistant,
}

impl std::fmt::Display for MessageRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::System => write!(f, "system"),
            Self::User => write!(f, "user"),
            Self::Assistant => write!(f, "assistant"),
        }
    }
}

/// Provider-level request for one routing candidate
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompletionRequest {
    /// Upstream model name
    pub model: String,
    /// Conversation payload
    pub messages: Vec<ChatMessage>,
    /// Maximum tokens to generate
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    /// Sampling temperature
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    /// Streaming requested
    #[serde(default)]
    pub stream: bool,
}

impl CompletionRequest {
    /// Build the upstream request for a chosen model
    #[must_use]
    pub fn for_model(request: &GatewayRequest, model: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            messages: request.messages.clone(),
            max_tokens: request.max_tokens,
            temperature: request.temperature,
            stream: request.stream,
        }
    }
}
