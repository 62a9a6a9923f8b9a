//! Prometheus metrics for the gateway.
//!
//! | Name | Type | Labels |
//! |------|------|--------|
//! | `gateway_requests_total` | Counter | `tenant`, `outcome` |
//! | `gateway_request_duration_seconds` | Histogram | `outcome` |
//! | `gateway_cache_lookups_total` | Counter | `result` |
//! | `gateway_provider_attempts_total` | Counter | `provider`, `outcome` |
//! | `gateway_route_decisions_total` | Counter | `tier`, `locality` |
//! | `gateway_cost_usd_total` | Counter | `tenant` |
//! | `gateway_tokens_total` | Counter | `tenant`, `kind` |
//! | `gateway_breaker_state` | Gauge | `provider` |

use prometheus::{
    CounterVec, Encoder, HistogramOpts, HistogramVec, IntCounterVec, IntGaugeVec, Opts, Registry,
    TextEncoder,
};
use std::time::Duration;

/// Metrics construction or encoding error
#[derive(Debug, thiserror::Error)]
pub enum MetricsError {
    /// A collector could not be built or registered
    #[error("metrics registration failed: {0}")]
    Registration(#[from] prometheus::Error),
    /// Exposition output was not UTF-8
    #[error("metrics encoding failed: {0}")]
    Encoding(String),
}

/// Gateway metrics over a private registry
#[derive(Clone)]
pub struct Metrics {
    registry: Registry,
    requests_total: IntCounterVec,
    request_duration: HistogramVec,
    cache_lookups: IntCounterVec,
    provider_attempts: IntCounterVec,
    route_decisions: IntCounterVec,
    cost_usd: CounterVec,
    tokens: IntCounterVec,
    breaker_state: IntGaugeVec,
}

impl std::fmt::Debug for Metrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Metrics").finish_non_exhaustive()
    }
}

fn register<C>(registry: &Registry, collector: C) -> Result<C, MetricsError>
where
    C: prometheus::core::Collector + Clone + 'static,
{
    registry.register(Box::new(collector.clone()))?;
    Ok(collector)
}

impl Metrics {
    /// Build and register all collectors.
    ///
    /// # Errors
    ///
    /// Returns an error if a collector descriptor is invalid.
    pub fn new() -> Result<Self, MetricsError> {
        let registry = Registry::new();

        let requests_total = register(
            &registry,
            IntCounterVec::new(
                Opts::new("gateway_requests_total", "Requests by tenant and outcome"),
                &["tenant", "outcome"],
            )?,
        )?;
        let request_duration = register(
            &registry,
            HistogramVec::new(
                HistogramOpts::new("gateway_request_duration_seconds", "End-to-end request latency")
                    .buckets(vec![0.01, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0]),
                &["outcome"],
            )?,
        )?;
        let cache_lookups = register(
            &registry,
            IntCounterVec::new(
                Opts::new("gateway_cache_lookups_total", "Cache lookups by result"),
                &["result"],
            )?,
        )?;
        let provider_attempts = register(
            &registry,
            IntCounterVec::new(
                Opts::new(
                    "gateway_provider_attempts_total",
                    "Upstream attempts by provider and outcome",
                ),
                &["provider", "outcome"],
            )?,
        )?;
        let route_decisions = register(
            &registry,
            IntCounterVec::new(
                Opts::new("gateway_route_decisions_total", "Primary route locality by tenant tier"),
                &["tier", "locality"],
            )?,
        )?;
        let cost_usd = register(
            &registry,
            CounterVec::new(
                Opts::new("gateway_cost_usd_total", "Accumulated spend in USD"),
                &["tenant"],
            )?,
        )?;
        let tokens = register(
            &registry,
            IntCounterVec::new(
                Opts::new("gateway_tokens_total", "Tokens by tenant and direction"),
                &["tenant", "kind"],
            )?,
        )?;
        let breaker_state = register(
            &registry,
            IntGaugeVec::new(
                Opts::new("gateway_breaker_state", "Breaker state (0 closed, 1 half-open, 2 open)"),
                &["provider"],
            )?,
        )?;

        Ok(Self {
            registry,
            requests_total,
            request_duration,
            cache_lookups,
            provider_attempts,
            route_decisions,
            cost_usd,
            tokens,
            breaker_state,
        })
    }

    /// Record a finished request
    pub fn record_request(&self, tenant: &str, outcome: &str, elapsed: Duration) {
        self.requests_total.with_label_values(&[tenant, outcome]).inc();
        self.request_duration
            .with_label_values(&[outcome])
            .observe(elapsed.as_secs_f64());
    }

    /// Record a cache lookup
    pub fn record_cache_lookup(&self, hit: bool) {
        let result = if hit { "hit" } else { "miss" };
        self.cache_lookups.with_label_values(&[result]).inc();
    }

    /// Record an upstream attempt
    pub fn record_attempt(&self, provider: &str, outcome: &str) {
        self.provider_attempts
            .with_label_values(&[provider, outcome])
            .inc();
    }

    /// Record the locality of the primary candidate
    pub fn record_route(&self, tier: &str, locality: &str) {
        self.route_decisions.with_label_values(&[tier, locality]).inc();
    }

    /// Record spend and token usage
    pub fn record_usage(
        &self,
        tenant: &str,
        prompt_tokens: u32,
        completion_tokens: u32,
        cost_usd: f64,
    ) {
        if cost_usd > 0.0 {
            self.cost_usd.with_label_values(&[tenant]).inc_by(cost_usd);
        }
        self.tokens
            .with_label_values(&[tenant, "prompt"])
            .inc_by(u64::from(prompt_tokens));
        self.tokens
            .with_label_values(&[tenant, "completion"])
            .inc_by(u64::from(completion_tokens));
    }

    /// Publish a breaker state code
    pub fn set_breaker_state(&self, provider: &str, code: u8) {
        self.breaker_state
            .with_label_values(&[provider])
            .set(i64::from(code));
    }

    /// Render the text exposition format.
    ///
    /// # Errors
    ///
    /// Returns an error if encoding fails.
    pub fn render(&self) -> Result<String, MetricsError> {
        let mut buffer = Vec::new();
        TextEncoder::new().encode(&self.registry.gather(), &mut buffer)?;
        String::from_utf8(buffer).map_err(|e| MetricsError::Encoding(e.to_string()))
    }
}
