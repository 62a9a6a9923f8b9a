//! # Gateway Routing
//!
//! Complexity-based model routing and tenant resolution for the LLM agent gateway.
//!
//! - [`ComplexityRouter`] turns a request and its tenant's tier into an
//!   ordered list of (provider, model) candidates
//! - [`TenantRegistry`] holds configured tenants and registers unknown ones
//!   from a default template

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod complexity;
pub mod tenant;

// Re-export main types
pub use complexity::{
    ComplexityRouter, ComplexityScore, ComplexityScorer, RouteCandidate, RoutePlan, RouterConfig,
    RoutingContext,
};
pub use tenant::TenantRegistry;
