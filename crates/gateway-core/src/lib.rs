//! # Gateway Core
//!
//! Core types, traits, and error handling for the adaptive LLM gateway.
//!
//! This crate provides the foundational types used throughout the gateway:
//! - Inbound request and provider-level completion types
//! - Tenant and model-tier configuration types
//! - The provider trait every upstream client implements
//! - The error taxonomy surfaced to callers

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod error;
pub mod provider;
pub mod request;
pub mod response;
pub mod streaming;
pub mod types;

// Re-export commonly used types
pub use error::{AttemptFailure, ErrorKind, GatewayError, GatewayResult};
pub use provider::{LLMProvider, ProviderType};
pub use request::{ChatMessage, CompletionRequest, GatewayRequest, MessageRole};
pub use response::{CompletionResponse, Usage};
pub use streaming::{ChatChunk, ChunkStream};
pub use types::{
    BudgetSettings, Locality, ModelRoute, ModelTier, RateLimitSettings, TaskBucket, TenantConfig,
};
