//! OpenAI-compatible chat completions client.
//!
//! Serves both OpenAI and OpenRouter: the wire format is identical, only the
//! base URL and a couple of attribution headers differ.

use crate::http::{
    build_client, check_status, event_source_error, join_url, open_event_source, stream_ended,
    transport_error,
};
use async_stream::try_stream;
use async_trait::async_trait;
use futures_util::StreamExt;
use gateway_core::{
    ChatChunk, ChatMessage, ChunkStream, CompletionRequest, CompletionResponse, GatewayError,
    LLMProvider, Locality, ProviderType, Usage,
};
use reqwest::{Client, RequestBuilder};
use reqwest_eventsource::Event;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, warn};

/// Default OpenAI API base URL
pub const OPENAI_BASE_URL: &str = "https://api.openai.com/v1";

/// Default OpenRouter API base URL
pub const OPENROUTER_BASE_URL: &str = "https://openrouter.ai/api/v1";

/// OpenAI-compatible provider configuration
#[derive(Debug, Clone)]
pub struct OpenAIConfig {
    /// Provider instance ID
    pub id: String,
    /// OpenAI or OpenRouter
    pub provider_type: ProviderType,
    /// API base URL, including the version segment
    pub base_url: String,
    /// Bearer token
    pub api_key: SecretString,
    /// Transport timeout
    pub timeout: Duration,
    /// Locality override
    pub locality: Option<Locality>,
    /// Extra headers sent with every request
    pub headers: Vec<(String, String)>,
}

impl OpenAIConfig {
    /// Configuration for api.openai.com
    #[must_use]
    pub fn openai(id: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            provider_type: ProviderType::OpenAI,
            base_url: OPENAI_BASE_URL.to_string(),
            api_key: SecretString::new(api_key.into()),
            timeout: Duration::from_secs(60),
            locality: None,
            headers: Vec::new(),
        }
    }

    /// Configuration for openrouter.ai
    #[must_use]
    pub fn openrouter(id: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            provider_type: ProviderType::OpenRouter,
            base_url: OPENROUTER_BASE_URL.to_string(),
            headers: vec![
                ("HTTP-Referer".to_string(), "https://github.com/llm-agent-gateway".to_string()),
                ("X-Title".to_string(), "LLM Agent Gateway".to_string()),
            ],
            ..Self::openai(id, api_key)
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

    /// Add a header
    #[must_use]
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }
}

/// OpenAI-compatible provider
pub struct OpenAIProvider {
    config: OpenAIConfig,
    client: Client,
}

impl std::fmt::Debug for OpenAIProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenAIProvider")
            .field("id", &self.config.id)
            .field("base_url", &self.config.base_url)
            .finish_non_exhaustive()
    }
}

impl OpenAIProvider {
    /// Create a provider
    ///
    /// # Errors
    /// Returns error if the HTTP client cannot be created
    pub fn new(config: OpenAIConfig) -> Result<Self, GatewayError> {
        let client = build_client(config.timeout)?;
        Ok(Self { config, client })
    }

    fn request(&self, body: &OpenAIRequest<'_>) -> RequestBuilder {
        let mut builder = self
            .client
            .post(join_url(&self.config.base_url, "chat/completions"))
            .bearer_auth(self.config.api_key.expose_secret())
            .json(body);
        for (name, value) in &self.config.headers {
            builder = builder.header(name, value);
        }
        builder
    }
}

#[async_trait]
impl LLMProvider for OpenAIProvider {
    fn id(&self) -> &str {
        &self.config.id
    }

    fn provider_type(&self) -> ProviderType {
        self.config.provider_type
    }

    fn locality(&self) -> Locality {
        self.config
            .locality
            .unwrap_or_else(|| self.config.provider_type.default_locality())
    }

    async fn complete(
        &self,
        request: &CompletionRequest,
    ) -> Result<CompletionResponse, GatewayError> {
        let body = OpenAIRequest::new(request, false);
        debug!(provider = %self.config.id, model = %request.model, "Sending chat completion");

        let response = self
            .request(&body)
            .send()
            .await
            .map_err(|e| transport_error(&self.config.id, &e))?;
        let response = check_status(&self.config.id, response).await?;

        let parsed: OpenAIResponse = response.json().await.map_err(|e| {
            GatewayError::provider(
                &self.config.id,
                format!("Failed to parse response: {e}"),
                None,
                false,
            )
        })?;

        let choice = parsed.choices.into_iter().next().ok_or_else(|| {
            GatewayError::provider(&self.config.id, "response contained no choices", None, true)
        })?;
        let usage = parsed
            .usage
            .map_or_else(Usage::default, |u| Usage::new(u.prompt_tokens, u.completion_tokens));

        Ok(CompletionResponse::new(
            &self.config.id,
            parsed.model.unwrap_or_else(|| request.model.clone()),
            choice.message.content.unwrap_or_default(),
            usage,
        )
        .with_id(parsed.id)
        .with_finish_reason(choice.finish_reason))
    }

    async fn stream(&self, request: &CompletionRequest) -> Result<ChunkStream, GatewayError> {
        let body = OpenAIRequest::new(request, true);
        debug!(
            provider = %self.config.id,
            model = %request.model,
            "Opening chat completion stream"
        );

        let mut source = open_event_source(&self.config.id, self.request(&body)).await?;
        let provider = self.config.id.clone();

        let stream = try_stream! {
            let mut finish_reason: Option<String> = None;
            let mut usage: Option<Usage> = None;
            let mut done = false;

            while let Some(event) = source.next().await {
                match event {
                    Ok(Event::Open) => {}
                    Ok(Event::Message(message)) => {
                        let data = message.data.trim();
                        if data == "[DONE]" {
                            source.close();
                            done = true;
                            break;
                        }
                        match serde_json::from_str::<OpenAIChunk>(data) {
                            Ok(chunk) => {
                                if let Some(u) = chunk.usage {
                                    usage = Some(Usage::new(u.prompt_tokens, u.completion_tokens));
                                }
                                for choice in chunk.choices {
                                    if let Some(reason) = choice.finish_reason {
                                        finish_reason = Some(reason);
                                    }
                                    let text = choice.delta.content.filter(|t| !t.is_empty());
                                    if let Some(text) = text {
                                        yield ChatChunk::delta(text);
                                    }
                                }
                            }
                            Err(e) => {
                                warn!(
                                    provider = %provider,
                                    error = %e,
                                    "Skipping unparsable stream chunk"
                                );
                            }
                        }
                    }
                    Err(reqwest_eventsource::Error::StreamEnded) if finish_reason.is_some() => {
                        done = true;
                        break;
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
            yield ChatChunk::finished(finish_reason.unwrap_or_else(|| "stop".to_string()), usage);
        };

        Ok(Box::pin(stream))
    }
}

// ============================================================================
// OpenAI API Types
// ============================================================================

#[derive(Debug, Serialize)]
struct OpenAIRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    stream_options: Option<StreamOptions>,
}

impl<'a> OpenAIRequest<'a> {
    fn new(request: &'a CompletionRequest, stream: bool) -> Self {
        Self {
            model: &request.model,
            messages: &request.messages,
            max_tokens: request.max_tokens,
            temperature: request.temperature,
            stream,
            stream_options: stream.then_some(StreamOptions { include_usage: true }),
        }
    }
}

#[derive(Debug, Serialize)]
struct StreamOptions {
    include_usage: bool,
}

#[derive(Debug, Deserialize)]
struct OpenAIResponse {
    #[serde(default)]
    id: String,
    #[serde(default)]
    model: Option<String>,
    choices: Vec<OpenAIChoice>,
    #[serde(default)]
    usage: Option<OpenAIUsage>,
}

#[derive(Debug, Deserialize)]
struct OpenAIChoice {
    message: OpenAIMessage,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OpenAIMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OpenAIUsage {
    #[serde(default)]
    prompt_tokens: u32,
    #[serde(default)]
    completion_tokens: u32,
}

#[derive(Debug, Deserialize)]
struct OpenAIChunk {
    #[serde(default)]
    choices: Vec<OpenAIChunkChoice>,
    #[serde(default)]
    usage: Option<OpenAIUsage>,
}

#[derive(Debug, Deserialize)]
struct OpenAIChunkChoice {
    #[serde(default)]
    delta: OpenAIDelta,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct OpenAIDelta {
    #[serde(default)]
    content: Option<String>,
}
