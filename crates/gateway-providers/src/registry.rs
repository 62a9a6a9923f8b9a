//! Provider registry.
//!
//! Built once at startup and read-only afterwards, so lookups need no locks.

use crate::anthropic::{AnthropicConfig, AnthropicProvider};
use crate::mock::MockProvider;
use crate::ollama::{OllamaConfig, OllamaProvider};
use crate::openai::{OpenAIConfig, OpenAIProvider};
use gateway_config::ProviderSettings;
use gateway_core::{GatewayError, LLMProvider, Locality, ProviderType};
use secrecy::ExposeSecret;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::info;

/// Registered providers by ID
#[derive(Default, Clone)]
pub struct ProviderRegistry {
    providers: HashMap<String, Arc<dyn LLMProvider>>,
    order: Vec<String>,
}

impl std::fmt::Debug for ProviderRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderRegistry")
            .field("providers", &self.order)
            .finish()
    }
}

impl ProviderRegistry {
    /// Create an empty registry
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Build clients for every enabled provider entry.
    ///
    /// # Errors
    ///
    /// Returns a configuration error for a provider whose key cannot be
    /// resolved, or if an HTTP client cannot be created.
    pub fn from_settings(settings: &[ProviderSettings]) -> Result<Self, GatewayError> {
        let mut registry = Self::new();
        for entry in settings.iter().filter(|s| s.enabled) {
            let provider = build_provider(entry)?;
            info!(
                provider = %entry.id,
                provider_type = %entry.provider_type,
                locality = ?provider.locality(),
                "Registered provider"
            );
            registry.register(provider);
        }
        Ok(registry)
    }

    /// Add or replace a provider
    pub fn register(&mut self, provider: Arc<dyn LLMProvider>) {
        let id = provider.id().to_string();
        if self.providers.insert(id.clone(), provider).is_none() {
            self.order.push(id);
        }
    }

    /// Add a provider, builder style
    #[must_use]
    pub fn with(mut self, provider: Arc<dyn LLMProvider>) -> Self {
        self.register(provider);
        self
    }

    /// Look up a provider
    #[must_use]
    pub fn get(&self, id: &str) -> Option<Arc<dyn LLMProvider>> {
        self.providers.get(id).cloned()
    }

    /// Provider IDs in registration order
    #[must_use]
    pub fn ids(&self) -> &[String] {
        &self.order
    }

    /// Locality of every provider
    #[must_use]
    pub fn localities(&self) -> HashMap<String, Locality> {
        self.providers
            .iter()
            .map(|(id, p)| (id.clone(), p.locality()))
            .collect()
    }

    /// Number of providers
    #[must_use]
    pub fn len(&self) -> usize {
        self.providers.len()
    }

    /// Whether no provider is registered
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }
}

/// Build one provider client from its settings.
///
/// # Errors
///
/// Returns a configuration error when a required API key is missing.
pub fn build_provider(settings: &ProviderSettings) -> Result<Arc<dyn LLMProvider>, GatewayError> {
    let key = || {
        settings
            .resolve_api_key()
            .map(|k| k.expose_secret().to_string())
            .ok_or_else(|| {
                GatewayError::configuration(format!("provider '{}' has no API key", settings.id))
            })
    };
    let locality = settings.locality();

    let provider: Arc<dyn LLMProvider> = match settings.provider_type {
        ProviderType::OpenAI | ProviderType::OpenRouter => {
            let base = if settings.provider_type == ProviderType::OpenAI {
                OpenAIConfig::openai(&settings.id, key()?)
            } else {
                OpenAIConfig::openrouter(&settings.id, key()?)
            };
            let mut config = base.with_timeout(settings.timeout).with_locality(locality);
            if let Some(endpoint) = &settings.endpoint {
                config = config.with_base_url(endpoint);
            }
            Arc::new(OpenAIProvider::new(config)?)
        }
        ProviderType::Anthropic => {
            let mut config = AnthropicConfig::new(&settings.id, key()?)
                .with_timeout(settings.timeout)
                .with_locality(locality);
            if let Some(endpoint) = &settings.endpoint {
                config = config.with_base_url(endpoint);
            }
            Arc::new(AnthropicProvider::new(config)?)
        }
        ProviderType::Ollama => {
            let mut config = OllamaConfig::new(&settings.id)
                .with_timeout(settings.timeout)
                .with_locality(locality);
            if let Some(endpoint) = &settings.endpoint {
                config = config.with_base_url(endpoint);
            }
            Arc::new(OllamaProvider::new(config)?)
        }
        ProviderType::Mock => Arc::new(MockProvider::new(&settings.id).with_locality(locality)),
    };
    Ok(provider)
}
