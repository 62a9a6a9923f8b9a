//! Provider abstraction.
//!
//! Every upstream client implements [`LLMProvider`]. The gateway only ever
//! talks to providers through this trait, so tests substitute scripted
//! implementations freely.

use crate::error::GatewayError;
use crate::request::CompletionRequest;
use crate::response::CompletionResponse;
use crate::streaming::ChunkStream;
use crate::types::Locality;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Supported upstream kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderType {
    /// OpenAI chat completions
    OpenAI,
    /// OpenRouter (OpenAI-compatible)
    OpenRouter,
    /// Anthropic messages API
    Anthropic,
    /// Ollama local inference
    Ollama,
    /// In-process scripted provider
    Mock,
}

impl ProviderType {
    /// Where providers of this kind usually run
    #[must_use]
    pub const fn default_locality(&self) -> Locality {
        match self {
            Self::Ollama | Self::Mock => Locality::Local,
            Self::OpenAI | Self::OpenRouter | Self::Anthropic => Locality::Cloud,
        }
    }

    /// Whether an API key is required to reach this kind of provider
    #[must_use]
    pub const fn requires_api_key(&self) -> bool {
        !matches!(self, Self::Ollama | Self::Mock)
    }
}

impl std::fmt::Display for ProviderType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::OpenAI => write!(f, "openai"),
            Self::OpenRouter => write!(f, "openrouter"),
            Self::Anthropic => write!(f, "anthropic"),
            Self::Ollama => write!(f, "ollama"),
            Self::Mock => write!(f, "mock"),
        }
    }
}

/// Uniform contract over an upstream LLM provider
#[async_trait]
pub trait LLMProvider: Send + Sync {
    /// Registry ID of this provider
    fn id(&self) -> &str;

    /// Provider kind
    fn provider_type(&self) -> ProviderType;

    /// Whether this provider counts as local for routing
    fn locality(&self) -> Locality {
        self.provider_type().default_locality()
    }

    /// Run a non-streaming completion.
    ///
    /// Dropping the returned future must abort the upstream call.
    ///
    /// # Errors
    /// Returns `GatewayError::Provider` on upstream or transport failure
    async fn complete(&self, request: &CompletionRequest)
        -> Result<CompletionResponse, GatewayError>;

    /// Open a streaming completion.
    ///
    /// Resolves once the upstream has accepted the request and the stream is
    /// open. Failures after that point arrive as stream items.
    ///
    /// # Errors
    /// Returns `GatewayError::Provider` if the stream could not be opened
    async fn stream(&self, request: &CompletionRequest) -> Result<ChunkStream, GatewayError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_provider_type_locality() {
        assert_eq!(ProviderType::Ollama.default_locality(), Locality::Local);
        assert_eq!(ProviderType::OpenRouter.default_locality(), Locality::Cloud);
        assert!(!ProviderType::Ollama.requires_api_key());
        assert!(ProviderType::Anthropic.requires_api_key());
    }

    #[test]
    fn test_provider_type_serde() {
        let parsed: ProviderType = serde_json::from_str("\"openrouter\"").expect("deserialize");
        assert_eq!(parsed, ProviderType::OpenRouter);
        assert_eq!(ProviderType::OpenAI.to_string(), "openai");
    }
}
