//! # Gateway Orchestrator
//!
//! The façade that composes the gateway's components per request:
//! tenant resolution, rate limiting, the response cache, budgets, the
//! complexity router and breaker-gated fallback across providers.
//!
//! # Example
//!
//! ```rust,ignore
//! use gateway_orchestrator::Gateway;
//!
//! let gateway = Gateway::from_config(&config)?;
//! let response = gateway.handle(request).await?;
//! println!("{} via {}", response.text, response.provider);
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod gateway;
pub mod response;
pub mod stream;

// Re-export main types
pub use gateway::{Gateway, GatewayBuilder};
pub use response::{
    ChatResponse, CostQuery, CostReport, HealthReport, ProviderHealth, ResponseUsage, TenantCosts,
    TenantView,
};
pub use stream::GatewayStream;
