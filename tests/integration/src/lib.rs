//! Integration tests for the LLM agent gateway
//!
//! Upstream providers are simulated with wiremock servers speaking the
//! OpenAI, Anthropic and Ollama wire formats. Tests cover:
//! - Provider clients against each wire format
//! - Complexity routing, fallback and circuit breaking over real HTTP
//! - Response caching and per-tenant rate limiting
//! - The HTTP surface end to end

pub mod fixtures;
pub mod helpers;
pub mod mock_providers;

// Re-export commonly used items
pub use fixtures::*;
pub use helpers::*;
pub use mock_providers::*;

#[cfg(test)]
mod cache_tests;
#[cfg(test)]
mod e2e_tests;
#[cfg(test)]
mod provider_tests;
#[cfg(test)]
mod rate_limit_tests;
#[cfg(test)]
mod routing_tests;
