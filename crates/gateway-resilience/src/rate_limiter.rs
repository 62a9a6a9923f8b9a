//! Per-tenant token bucket rate limiting.
//!
//! Each tenant owns one bucket behind its own mutex. Refill is computed lazily
//! on acquire, so there is no background timer and tenants never contend on a
//! shared lock.

use dashmap::DashMap;
use gateway_core::{GatewayError, RateLimitSettings};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::debug;

/// Token bucket for a single tenant.
///
/// `0 <= tokens <= capacity` holds after every operation.
#[derive(Debug, Clone)]
pub struct TokenBucket {
    capacity: f64,
    refill_per_sec: f64,
    tokens: f64,
    last_refill: Instant,
}

impl TokenBucket {
    /// Create a full bucket
    #[must_use]
    pub fn new(settings: RateLimitSettings, now: Instant) -> Self {
        let capacity = settings.capacity.max(0.0);
        Self {
            capacity,
            refill_per_sec: settings.refill_per_sec.max(0.0),
            tokens: capacity,
            last_refill: now,
        }
    }

    /// Add tokens for the time elapsed since the last refill
    pub fn refill(&mut self, now: Instant) {
        let elapsed = now.saturating_duration_since(self.last_refill).as_secs_f64();
        self.tokens = elapsed
            .mul_add(self.refill_per_sec, self.tokens)
            .min(self.capacity);
        self.last_refill = self.last_refill.max(now);
    }

    /// Take one token.
    ///
    /// # Errors
    /// Returns the time until a token will be available
    pub fn try_take(&mut self, now: Instant) -> Result<(), Duration> {
        self.refill(now);
        if self.tokens >= 1.0 {
            self.tokens -= 1.0;
            Ok(())
        } else {
            Err(self.time_until_token())
        }
    }

    fn time_until_token(&self) -> Duration {
        if self.refill_per_sec <= 0.0 {
            return Duration::MAX;
        }
        let deficit = 1.0 - self.tokens;
        Duration::try_from_secs_f64(deficit / self.refill_per_sec).unwrap_or(Duration::MAX)
    }

    /// Tokens currently available, after refilling to `now`
    #[must_use]
    pub fn available(&self, now: Instant) -> f64 {
        let mut preview = self.clone();
        preview.refill(now);
        preview.tokens
    }

    /// Burst capacity
    #[must_use]
    pub fn capacity(&self) -> f64 {
        self.capacity
    }
}

/// Rate limiter holding one bucket per tenant
#[derive(Debug, Default)]
pub struct RateLimiter {
    buckets: DashMap<String, Arc<Mutex<TokenBucket>>>,
}

impl RateLimiter {
    /// Create an empty limiter
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn bucket(&self, tenant_id: &str, settings: RateLimitSettings) -> Arc<Mutex<TokenBucket>> {
        if let Some(bucket) = self.buckets.get(tenant_id) {
            return Arc::clone(bucket.value());
        }
        Arc::clone(
            self.buckets
                .entry(tenant_id.to_string())
                .or_insert_with(|| Arc::new(Mutex::new(TokenBucket::new(settings, Instant::now()))))
                .value(),
        )
    }

    /// Admit one request for a tenant.
    ///
    /// The bucket is created full on the tenant's first request using
    /// `settings`; later calls reuse it.
    ///
    /// # Errors
    /// Returns `GatewayError::RateLimited` with the time until a token refills
    pub fn try_acquire(
        &self,
        tenant_id: &str,
        settings: RateLimitSettings,
    ) -> Result<(), GatewayError> {
        let bucket = self.bucket(tenant_id, settings);
        let result = bucket.lock().try_take(Instant::now());
        result.map_err(|retry_after| {
            debug!(
                tenant = %tenant_id,
                retry_after_ms = retry_after.as_millis() as u64,
                "Rate limit exceeded"
            );
            GatewayError::rate_limited(tenant_id, retry_after)
        })
    }

    /// Tokens available to a tenant, if it has a bucket
    #[must_use]
    pub fn available(&self, tenant_id: &str) -> Option<f64> {
        let bucket = self.buckets.get(tenant_id).map(|b| Arc::clone(b.value()))?;
        let available = bucket.lock().available(Instant::now());
        Some(available)
    }

    /// Tenants that have a bucket
    #[must_use]
    pub fn tenants(&self) -> Vec<String> {
        let mut tenants: Vec<String> = self.buckets.iter().map(|b| b.key().clone()).collect();
        tenants.sort();
        tenants
    }
}
