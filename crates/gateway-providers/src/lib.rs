//! # Gateway Providers
//!
//! Upstream LLM clients for the agent gateway.
//!
//! This crate provides implementations for:
//! - OpenAI and OpenRouter (OpenAI-compatible chat completions, SSE streaming)
//! - Anthropic (Messages API, SSE streaming)
//! - Ollama (local inference, NDJSON streaming)
//! - A scripted mock used offline and in tests

#![forbid(unsafe_code)]
#![warn(missing_docs)]

mod http;

pub mod anthropic;
pub mod mock;
pub mod ollama;
pub mod openai;
pub mod registry;

// Re-export main types
pub use anthropic::{AnthropicConfig, AnthropicProvider};
pub use mock::{MockBehavior, MockProvider};
pub use ollama::{OllamaConfig, OllamaProvider};
pub use openai::{OpenAIConfig, OpenAIProvider};
pub use registry::{build_provider, ProviderRegistry};
