//! Anthropic Messages API client.

use crate::http::{
    build_client, check_status, event_source_error, join_url, open_event_source, stream_ended,
    transport_error,
};
use async_stream::try_stream;
use async_trait::async_trait;
use futures_util::StreamExt;
use gateway_core::{
    ChatChunk, ChunkStream, CompletionRequest, CompletionResponse, GatewayError, LLMProvider,
    Locality, MessageRole, ProviderType, Usage,
};
use reqwest::{Client, RequestBuilder};
use reqwest_eventsource::Event;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, warn};

/// Default Anthropic API base URL
pub const ANTHROPIC_BASE_URL: &str = "https://api.anthropic.com";

/// API version header value
pub const ANTHROPIC_VERSION: &str = "2023-06-01";

/// Anthropic provider configuration
#[derive(Debug, Clone)]
pub struct AnthropicConfig {
    /// Provider instance ID
    pub id: String,
    /// API base URL
    pub base_url: String,
    /// API key
    pub api_key: SecretString,
    /// Transport timeout
    pub timeout: Duration,
    /// `max_tokens` sent when the request sets none; the API requires one
    pub default_max_tokens: u32,
    /// Locality override
    pub locality: Option<Locality>,
}

impl AnthropicConfig {
    /// Create a configuration for api.anthropic.com
    #[must_use]
    pub fn new(id: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            base_url: ANTHROPIC_BASE_URL.to_string(),
            api_key: SecretString::new(api_key.into()),
            timeout: Duration::from_secs(60),
            default_max_tokens: 1024,
            locality: None,
        }
    }

    /// Set the base URL
    #[must_use]
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Set the timeout
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Override locality
    #[must_use]
    pub fn with_locality(mut self, locality: Locality) -> Self {
        self.locality = Some(locality);
        self
    }
}

/// Anthropic provider
pub struct AnthropicProvider {
    config: AnthropicConfig,
    client: Client,
}

impl std::fmt::Debug for AnthropicProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AnthropicProvider")
            .field("id", &self.config.id)
            .field("base_url", &self.config.base_url)
            .finish_non_exhaustive()
    }
}

impl AnthropicProvider {
    /// Create a provider
    ///
    /// # Errors
    /// Returns error if the HTTP client cannot be created
    pub fn new(config: AnthropicConfig) -> Result<Self, GatewayError> {
        let client = build_client(config.timeout)?;
        Ok(Self { config, client })
    }

    fn request(&self, body: &AnthropicRequest<'_>) -> RequestBuilder {
        self.client
            .post(join_url(&self.config.base_url, "v1/messages"))
            .header("x-api-key", self.config.api_key.expose_secret())
            .header("anthropic-version", ANTHROPIC_VERSION)
            .json(body)
    }

    fn transform_request<'a>(
        &self,
        request: &'a CompletionRequest,
        stream: bool,
    ) -> AnthropicRequest<'a> {
        let system: Vec<&str> = request
            .messages
            .iter()
            .filter(|m| m.role == MessageRole::System)
            .map(|m| m.content.as_str())
            .collect();

        let messages = request
            .messages
            .iter()
            .filter(|m| m.role != MessageRole::System)
            .map(|m| AnthropicMessage {
                role: if m.role == MessageRole::Assistant { "assistant" } else { "user" },
                content: &m.content,
            })
            .collect();

        AnthropicRequest {
            model: &request.model,
            messages,
            system: (!system.is_empty()).then(|| system.join("\n\n")),
            max_tokens: request.max_tokens.unwrap_or(self.config.default_max_tokens),
            temperature: request.temperature,
            stream,
        }
    }
}

#[async_trait]
impl LLMProvider for AnthropicProvider {
    fn id(&self) -> &str {
        &self.config.id
    }

    fn provider_type(&self) -> ProviderType {
        ProviderType::Anthropic
    }

    fn locality(&self) -> Locality {
        self.config.locality.unwrap_or(Locality::Cloud)
    }

    async fn complete(
        &self,
        request: &CompletionRequest,
    ) -> Result<CompletionResponse, GatewayError> {
        let body = self.transform_request(request, false);
        debug!(provider = %self.config.id, model = %request.model, "Sending message request");

        let response = self
            .request(&body)
            .send()
            .await
            .map_err(|e| transport_error(&self.config.id, &e))?;
        let response = check_status(&self.config.id, response).await?;

        let parsed: AnthropicResponse = response.json().await.map_err(|e| {
            GatewayError::provider(
                &self.config.id,
                format!("Failed to parse response: {e}"),
                None,
                false,
            )
        })?;

        let text: String = parsed
            .content
            .iter()
            .filter(|block| block.block_type == "text")
            .filter_map(|block| block.text.as_deref())
            .collect();

        Ok(CompletionResponse::new(
            &self.config.id,
            parsed.model.unwrap_or_else(|| request.model.clone()),
            text,
            Usage::new(parsed.usage.input_tokens, parsed.usage.output_tokens),
        )
        .with_id(parsed.id)
        .with_finish_reason(parsed.stop_reason))
    }

    async fn stream(&self, request: &CompletionRequest) -> Result<ChunkStream, GatewayError> {
        let body = self.transform_request(request, true);
        debug!(provider = %self.config.id, model = %request.model, "Opening message stream");

        let mut source = open_event_source(&self.config.id, self.request(&body)).await?;
        let provider = self.config.id.clone();

        let stream = try_stream! {
            let mut prompt_tokens = 0u32;
            let mut completion_tokens = 0u32;
            let mut stop_reason: Option<String> = None;
            let mut done = false;

            while let Some(event) = source.next().await {
                match event {
                    Ok(Event::Open) => {}
                    Ok(Event::Message(message)) => {
                        let parsed = match serde_json::from_str::<StreamEvent>(&message.data) {
                            Ok(parsed) => parsed,
                            Err(e) => {
                                warn!(
                                    provider = %provider,
                                    event = %message.event,
                                    error = %e,
                                    "Skipping unparsable stream event"
                                );
                                continue;
                            }
                        };
                        match parsed {
                            StreamEvent::MessageStart { message } => {
                                prompt_tokens = message.usage.input_tokens;
                                completion_tokens = message.usage.output_tokens;
                            }
                            StreamEvent::ContentBlockDelta { delta } => {
                                if let Some(text) = delta.text.filter(|t| !t.is_empty()) {
                                    yield ChatChunk::delta(text);
                                }
                            }
                            StreamEvent::MessageDelta { delta, usage } => {
                                if delta.stop_reason.is_some() {
                                    stop_reason = delta.stop_reason;
                                }
                                if let Some(usage) = usage {
                                    completion_tokens = usage.output_tokens;
                                }
                            }
                            StreamEvent::MessageStop => {
                                source.close();
                                done = true;
                                break;
                            }
                            StreamEvent::Error { error } => {
                                source.close();
                                Err::<(), _>(GatewayError::provider(
                                    &provider,
                                    error.message,
                                    None,
                                    true,
                                ))?;
                            }
                            StreamEvent::Other => {}
                        }
                    }
                    Err(err) => {
                        source.close();
                        Err::<(), _>(event_source_error(&provider, err).await)?;
                    }
                }
            }

            if !done {
                Err::<(), _>(stream_ended(&provider))?;
            }
            yield ChatChunk::finished(
                stop_reason.unwrap_or_else(|| "end_turn".to_string()),
                Some(Usage::new(prompt_tokens, completion_tokens)),
            );
        };

        Ok(Box::pin(stream))
    }
}

// ============================================================================
// Anthropic API Types
// ============================================================================

#[derive(Debug, Serialize)]
struct AnthropicRequest<'a> {
    model: &'a str,
    messages: Vec<AnthropicMessage<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<String>,
    max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    stream: bool,
}

#[derive(Debug, Serialize)]
struct AnthropicMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct AnthropicResponse {
    #[serde(default)]
    id: String,
    #[serde(default)]
    model: Option<String>,
    #[serde(default)]
    content: Vec<ContentBlock>,
    #[serde(default)]
    stop_reason: Option<String>,
    #[serde(default)]
    usage: AnthropicUsage,
}

#[derive(Debug, Deserialize)]
struct ContentBlock {
    #[serde(rename = "type")]
    block_type: String,
    #[serde(default)]
    text: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct AnthropicUsage {
    #[serde(default)]
    input_tokens: u32,
    #[serde(default)]
    output_tokens: u32,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum StreamEvent {
    MessageStart { message: StreamMessage },
    ContentBlockDelta { delta: TextDelta },
    MessageDelta {
        delta: MessageDeltaBody,
        #[serde(default)]
        usage: Option<AnthropicUsage>,
    },
    MessageStop,
    Error { error: StreamError },
    #[serde(other)]
    Other,
}

#[derive(Debug, Deserialize)]
struct StreamMessage {
    #[serde(default)]
    usage: AnthropicUsage,
}

#[derive(Debug, Deserialize)]
struct TextDelta {
    #[serde(default)]
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct MessageDeltaBody {
    #[serde(default)]
    stop_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct StreamError {
    message: String,
}
