//! # Gateway Resilience
//!
//! Shared protection state for the adaptive LLM gateway:
//! - Per-provider circuit breakers with exponential recovery backoff
//! - Per-tenant token bucket rate limiting
//! - Content-addressed response caching
//!
//! Every component here is safe to share across concurrent requests and
//! scopes its locking to a single provider, tenant, or cache shard.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod cache;
pub mod circuit_breaker;
pub mod rate_limiter;

// Re-export main types
pub use cache::{CacheConfig, CacheEntry, CacheStats, Fingerprint, ResponseCache};
pub use circuit_breaker::{
    BreakerPermit, BreakerRegistry, CircuitBreaker, CircuitBreakerConfig, CircuitBreakerStats,
    CircuitState,
};
pub use rate_limiter::{RateLimiter, TokenBucket};
