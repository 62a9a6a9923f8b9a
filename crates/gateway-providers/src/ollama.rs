//! Ollama local inference client.
//!
//! Streaming uses newline-delimited JSON rather than SSE.

use crate::http::{build_client, check_status, join_url, stream_ended, transport_error};
use async_stream::try_stream;
use async_trait::async_trait;
use futures_util::StreamExt;
use gateway_core::{
    ChatChunk, ChatMessage, ChunkStream, CompletionRequest, CompletionResponse, GatewayError,
    LLMProvider, Locality, ProviderType, Usage,
};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, warn};

/// Default Ollama endpoint
pub const OLLAMA_BASE_URL: &str = "http://localhost:11434";

/// Ollama provider configuration
#[derive(Debug, Clone)]
pub struct OllamaConfig {
    /// Provider instance ID
    pub id: String,
    /// Server base URL
    pub base_url: String,
    /// Transport timeout
    pub timeout: Duration,
    /// Locality override, for Ollama servers on remote hosts
    pub locality: Option<Locality>,
}

impl OllamaConfig {
    /// Configuration for a local Ollama server
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            base_url: OLLAMA_BASE_URL.to_string(),
            timeout: Duration::from_secs(120),
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

/// Ollama provider
pub struct OllamaProvider {
    config: OllamaConfig,
    client: Client,
}

impl std::fmt::Debug for OllamaProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OllamaProvider")
            .field("id", &self.config.id)
            .field("base_url", &self.config.base_url)
            .finish_non_exhaustive()
    }
}

impl OllamaProvider {
    /// Create a provider
    ///
    /// # Errors
    /// Returns error if the HTTP client cannot be created
    pub fn new(config: OllamaConfig) -> Result<Self, GatewayError> {
        let client = build_client(config.timeout)?;
        Ok(Self { config, client })
    }

    async fn send(
        &self,
        request: &CompletionRequest,
        stream: bool,
    ) -> Result<reqwest::Response, GatewayError> {
        let body = OllamaRequest {
            model: &request.model,
            messages: &request.messages,
            stream,
            options: OllamaOptions {
                temperature: request.temperature,
                num_predict: request.max_tokens,
            },
        };

        let response = self
            .client
            .post(join_url(&self.config.base_url, "api/chat"))
            .json(&body)
            .send()
            .await
            .map_err(|e| transport_error(&self.config.id, &e))?;
        check_status(&self.config.id, response).await
    }
}

#[async_trait]
impl LLMProvider for OllamaProvider {
    fn id(&self) -> &str {
        &self.config.id
    }

    fn provider_type(&self) -> ProviderType {
        ProviderType::Ollama
    }

    fn locality(&self) -> Locality {
        self.config.locality.unwrap_or(Locality::Local)
    }

    async fn complete(
        &self,
        request: &CompletionRequest,
    ) -> Result<CompletionResponse, GatewayError> {
        debug!(provider = %self.config.id, model = %request.model, "Sending chat request");
        let response = self.send(request, false).await?;

        let parsed: OllamaChunk = response.json().await.map_err(|e| {
            GatewayError::provider(
                &self.config.id,
                format!("Failed to parse response: {e}"),
                None,
                false,
            )
        })?;

        Ok(CompletionResponse::new(
            &self.config.id,
            parsed.model.unwrap_or_else(|| request.model.clone()),
            parsed.message.map(|m| m.content).unwrap_or_default(),
            Usage::new(parsed.prompt_eval_count, parsed.eval_count),
        )
        .with_finish_reason(parsed.done_reason.or_else(|| Some("stop".to_string()))))
    }

    async fn stream(&self, request: &CompletionRequest) -> Result<ChunkStream, GatewayError> {
        debug!(provider = %self.config.id, model = %request.model, "Opening chat stream");
        let response = self.send(request, true).await?;
        let provider = self.config.id.clone();

        let stream = try_stream! {
            let mut bytes = response.bytes_stream();
            let mut buffer: Vec<u8> = Vec::new();
            let mut finished: Option<ChatChunk> = None;

            'read: while let Some(piece) = bytes.next().await {
                let piece = piece.map_err(|e| transport_error(&provider, &e))?;
                buffer.extend_from_slice(&piece);

                while let Some(pos) = buffer.iter().position(|b| *b == b'\n') {
                    let line: Vec<u8> = buffer.drain(..=pos).collect();
                    let Some(chunk) = parse_line(&provider, &line) else {
                        continue;
                    };
                    if let Some(error) = chunk.error {
                        Err::<(), _>(GatewayError::provider(&provider, error, None, true))?;
                    }
                    if let Some(text) = chunk.message.map(|m| m.content).filter(|t| !t.is_empty()) {
                        yield ChatChunk::delta(text);
                    }
                    if chunk.done {
                        finished = Some(ChatChunk::finished(
                            chunk.done_reason.unwrap_or_else(|| "stop".to_string()),
                            Some(Usage::new(chunk.prompt_eval_count, chunk.eval_count)),
                        ));
                        break 'read;
                    }
                }
            }

            match finished {
                Some(last) => {
                    yield last;
                }
                None => {
                    Err::<(), _>(stream_ended(&provider))?;
                }
            }
        };

        Ok(Box::pin(stream))
    }
}

fn parse_line(provider: &str, line: &[u8]) -> Option<OllamaChunk> {
    let line = std::str::from_utf8(line).ok()?.trim();
    if line.is_empty() {
        return None;
    }
    match serde_json::from_str(line) {
        Ok(chunk) => Some(chunk),
        Err(e) => {
            warn!(provider = %provider, error = %e, "Skipping unparsable stream line");
            None
        }
    }
}

// ============================================================================
// Ollama API Types
// ============================================================================

#[derive(Debug, Serialize)]
struct OllamaRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    stream: bool,
    options: OllamaOptions,
}

#[derive(Debug, Serialize)]
struct OllamaOptions {
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    num_predict: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct OllamaChunk {
    #[serde(default)]
    model: Option<String>,
    #[serde(default)]
    message: Option<OllamaMessage>,
    #[serde(default)]
    done: bool,
    #[serde(default)]
    done_reason: Option<String>,
    #[serde(default)]
    prompt_eval_count: u32,
    #[serde(default)]
    eval_count: u32,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OllamaMessage {
    #[serde(default)]
    content: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_line() {
        let chunk = parse_line(
            "ollama",
            br#"{"model":"llama3.2","message":{"role":"assistant","content":"Hi"},"done":false}"#,
        )
        .unwrap();
        assert_eq!(chunk.message.unwrap().content, "Hi");
        assert!(!chunk.done);

        assert!(parse_line("ollama", b"  \n").is_none());
        assert!(parse_line("ollama", b"not json\n").is_none());
    }

    #[test]
    fn test_final_line_carries_usage() {
        let chunk = parse_line(
            "ollama",
            concat!(
                r#"{"model":"llama3.2","message":{"role":"assistant","content":""},"#,
                r#""done":true,"done_reason":"stop","prompt_eval_count":26,"eval_count":12}"#,
            )
            .as_bytes(),
        )
        .unwrap();
        assert!(chunk.done);
        assert_eq!(chunk.prompt_eval_count, 26);
        assert_eq!(chunk.eval_count, 12);
    }
}
