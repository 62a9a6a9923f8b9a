//! Caller-facing views produced by the gateway.

use gateway_core::{
    AttemptFailure, Locality, ModelRoute, ModelTier, ProviderType, RateLimitSettings, TenantConfig,
};
use gateway_resilience::CircuitState;
use gateway_telemetry::{CostAnalytics, CostSummary, UsageRecord};
use serde::Serialize;

/// Token usage and spend of one response
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResponseUsage {
    /// Input tokens
    pub prompt_tokens: u32,
    /// Output tokens
    pub completion_tokens: u32,
    /// Spend in USD
    pub cost_usd: f64,
}

/// Completed chat response
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatResponse {
    /// Gateway request ID
    pub id: String,
    /// Generated text
    pub text: String,
    /// Usage and spend
    pub usage: ResponseUsage,
    /// Provider that produced the text
    pub provider: String,
    /// Model that produced the text
    pub model: String,
    /// Served from cache
    pub cached: bool,
    /// Why generation stopped
    #[serde(skip_serializing_if = "Option::is_none")]
    pub finish_reason: Option<String>,
    /// Candidates that failed before this one succeeded
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub fallbacks: Vec<AttemptFailure>,
}

/// Breaker view of one provider
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderHealth {
    /// Provider ID
    pub name: String,
    /// Effective breaker state
    pub breaker_state: CircuitState,
    /// Provider kind
    #[serde(rename = "type")]
    pub provider_type: ProviderType,
    /// Routing locality
    pub locality: Locality,
}

/// Aggregate health
#[derive(Debug, Clone, Serialize)]
pub struct HealthReport {
    /// `healthy`, `degraded` (some breakers not closed) or `unhealthy` (all open)
    pub status: &'static str,
    /// Per-provider breaker states
    pub providers: Vec<ProviderHealth>,
}

impl HealthReport {
    pub(crate) fn from_providers(providers: Vec<ProviderHealth>) -> Self {
        let open = providers
            .iter()
            .filter(|p| p.breaker_state == CircuitState::Open)
            .count();
        let closed = providers
            .iter()
            .filter(|p| p.breaker_state == CircuitState::Closed)
            .count();
        let status = if providers.is_empty() || open == providers.len() {
            "unhealthy"
        } else if closed == providers.len() {
            "healthy"
        } else {
            "degraded"
        };
        Self { status, providers }
    }
}

/// Cost query
#[derive(Debug, Clone, Default)]
pub struct CostQuery {
    /// Restrict to one tenant
    pub tenant_id: Option<String>,
    /// Append up to this many of each tenant's newest records
    pub records: Option<usize>,
    /// Append trends, month-end projection and budget alerts
    pub analytics: bool,
}

/// Cost report entry for one tenant
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TenantCosts {
    /// Aggregates
    #[serde(flatten)]
    pub summary: CostSummary,
    /// Newest records, when requested
    #[serde(skip_serializing_if = "Option::is_none")]
    pub records: Option<Vec<UsageRecord>>,
    /// Trends, projection and alerts, when requested
    #[serde(skip_serializing_if = "Option::is_none")]
    pub analytics: Option<CostAnalytics>,
}

/// Cost report
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CostReport {
    /// Per-tenant entries
    pub tenants: Vec<TenantCosts>,
    /// Spend across the returned tenants
    pub total_cost_usd: f64,
}

/// Public view of a tenant's configuration
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TenantView {
    /// Tenant ID
    pub id: String,
    /// Display name
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Provider pool preference
    pub model_tier: ModelTier,
    /// Ordered routes
    pub models: Vec<ModelRoute>,
    /// Bucket parameters
    pub rate_limit: RateLimitSettings,
    /// Tokens currently available
    #[serde(skip_serializing_if = "Option::is_none")]
    pub available_tokens: Option<f64>,
    /// Whether callers must present a tenant key
    pub key_required: bool,
}

impl TenantView {
    pub(crate) fn new(tenant: &TenantConfig, available_tokens: Option<f64>) -> Self {
        Self {
            id: tenant.id.clone(),
            name: tenant.name.clone(),
            model_tier: tenant.model_tier,
            models: tenant.models.clone(),
            rate_limit: tenant.rate_limit,
            available_tokens,
            key_required: tenant.api_key.is_some(),
        }
    }
}
