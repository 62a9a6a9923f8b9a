//! Configuration types.

use crate::error::ConfigError;
use gateway_core::{Locality, ModelRoute, ModelTier, ProviderType, TaskBucket, TenantConfig};
use secrecy::SecretString;
use serde::Deserialize;
use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::time::Duration;
use validator::Validate;

/// Root gateway configuration
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct GatewayConfig {
    /// HTTP server settings
    #[serde(default)]
    #[validate(nested)]
    pub server: ServerSettings,

    /// Upstream providers
    #[serde(default)]
    pub providers: Vec<ProviderSettings>,

    /// Explicitly configured tenants
    #[serde(default)]
    pub tenants: Vec<TenantConfig>,

    /// Directory of per-tenant files
    #[serde(default)]
    pub tenants_dir: Option<PathBuf>,

    /// Template for tenants registered lazily on first request
    #[serde(default = "default_tenant_template")]
    pub default_tenant: TenantConfig,

    /// Circuit breaker settings
    #[serde(default)]
    #[validate(nested)]
    pub breaker: BreakerSettings,

    /// Response cache settings
    #[serde(default)]
    #[validate(nested)]
    pub cache: CacheSettings,

    /// Complexity router settings
    #[serde(default)]
    #[validate(nested)]
    pub routing: RoutingSettings,

    /// Pricing settings
    #[serde(default)]
    pub cost: CostSettings,

    /// Logging settings
    #[serde(default)]
    pub logging: LoggingSettings,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            server: ServerSettings::default(),
            providers: Vec::new(),
            tenants: Vec::new(),
            tenants_dir: None,
            default_tenant: default_tenant_template(),
            breaker: BreakerSettings::default(),
            cache: CacheSettings::default(),
            routing: RoutingSettings::default(),
            cost: CostSettings::default(),
            logging: LoggingSettings::default(),
        }
    }
}

fn default_tenant_template() -> TenantConfig {
    let mut tenant = TenantConfig::new("default");
    tenant.max_tokens = Some(2000);
    tenant.temperature = Some(0.7);
    tenant
}

impl GatewayConfig {
    /// Look up a provider by ID
    #[must_use]
    pub fn provider(&self, id: &str) -> Option<&ProviderSettings> {
        self.providers.iter().find(|p| p.id == id)
    }

    /// Fill in derived values.
    ///
    /// Tenants without explicit routes get one route per enabled provider
    /// that declares a default model, in provider order.
    pub fn normalize(&mut self) {
        if self.default_tenant.id.is_empty() {
            self.default_tenant.id = "default".to_string();
        }

        let fallback_routes: Vec<ModelRoute> = self
            .providers
            .iter()
            .filter(|p| p.enabled)
            .filter_map(|p| {
                p.default_model
                    .as_ref()
                    .map(|model| ModelRoute::new(&p.id, model))
            })
            .collect();

        for tenant in self
            .tenants
            .iter_mut()
            .chain(std::iter::once(&mut self.default_tenant))
        {
            if tenant.models.is_empty() {
                tenant.models.clone_from(&fallback_routes);
            }
        }
    }

    /// Validate field ranges and cross references.
    ///
    /// # Errors
    /// Returns `ConfigError::Invalid` listing every problem found
    pub fn validate_all(&self) -> Result<(), ConfigError> {
        let mut problems = Vec::new();

        if let Err(errors) = Validate::validate(self) {
            problems.push(errors.to_string());
        }

        let mut provider_ids = HashSet::new();
        for provider in &self.providers {
            if !provider_ids.insert(provider.id.as_str()) {
                problems.push(format!("duplicate provider id '{}'", provider.id));
            }
            if provider.id.trim().is_empty() {
                problems.push("provider id cannot be empty".to_string());
            }
            if let Some(endpoint) = &provider.endpoint {
                if url::Url::parse(endpoint).is_err() {
                    problems.push(format!(
                        "provider '{}' has invalid endpoint '{endpoint}'",
                        provider.id
                    ));
                }
            }
            if provider.enabled
                && provider.provider_type.requires_api_key()
                && provider.resolve_api_key().is_none()
            {
                problems.push(format!("provider '{}' has no API key", provider.id));
            }
        }

        let mut tenant_ids = HashSet::new();
        for tenant in &self.tenants {
            if tenant.id.trim().is_empty() {
                problems.push("tenant id cannot be empty".to_string());
            }
            if !tenant_ids.insert(tenant.id.as_str()) {
                problems.push(format!("duplicate tenant id '{}'", tenant.id));
            }
        }

        for tenant in self.tenants.iter().chain(std::iter::once(&self.default_tenant)) {
            self.check_tenant(tenant, &mut problems);
        }

        if problems.is_empty() {
            Ok(())
        } else {
            Err(ConfigError::Invalid { problems })
        }
    }

    fn check_tenant(&self, tenant: &TenantConfig, problems: &mut Vec<String>) {
        let id = &tenant.id;

        if tenant.models.is_empty() {
            problems.push(format!("tenant '{id}' has no model routes"));
        }

        let mut has_cloud = false;
        for route in &tenant.models {
            match self.provider(&route.provider) {
                None => problems.push(format!(
                    "tenant '{id}' routes to unknown provider '{}'",
                    route.provider
                )),
                Some(provider) if !provider.enabled => problems.push(format!(
                    "tenant '{id}' routes to disabled provider '{}'",
                    route.provider
                )),
                Some(provider) => has_cloud |= provider.locality() == Locality::Cloud,
            }
        }

        if tenant.model_tier == ModelTier::CloudLlm && !has_cloud {
            problems.push(format!(
                "tenant '{id}' is cloud_llm but has no cloud model route"
            ));
        }

        let limits = tenant.rate_limit;
        if limits.capacity < 1.0 || !limits.capacity.is_finite() {
            problems.push(format!("tenant '{id}' rate limit capacity must be at least 1"));
        }
        if limits.refill_per_sec <= 0.0 || !limits.refill_per_sec.is_finite() {
            problems.push(format!("tenant '{id}' refill rate must be positive"));
        }

        if let Some(threshold) = tenant.complexity_threshold {
            if !(0.0..=1.0).contains(&threshold) {
                problems.push(format!(
                    "tenant '{id}' complexity threshold {threshold} is outside [0, 1]"
                ));
            }
        }
    }
}

/// HTTP server settings
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct ServerSettings {
    /// Bind address
    #[serde(default = "default_host")]
    pub host: String,

    /// Bind port
    #[serde(default = "default_port")]
    #[validate(range(min = 1))]
    pub port: u16,

    /// Shared bearer token required on API routes
    #[serde(default)]
    pub auth_token: Option<SecretString>,

    /// Whole-request timeout applied by the HTTP layer
    #[serde(default = "default_request_timeout", with = "humantime_serde")]
    pub request_timeout: Duration,

    /// CORS allowed origins; empty allows any origin
    #[serde(default)]
    pub allowed_origins: Vec<String>,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            auth_token: None,
            request_timeout: default_request_timeout(),
            allowed_origins: Vec::new(),
        }
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_request_timeout() -> Duration {
    Duration::from_secs(120)
}

/// One upstream provider
#[derive(Debug, Clone, Deserialize)]
pub struct ProviderSettings {
    /// Registry ID
    pub id: String,

    /// Provider kind
    #[serde(rename = "type")]
    pub provider_type: ProviderType,

    /// Base URL override
    #[serde(default)]
    pub endpoint: Option<String>,

    /// Inline API key
    #[serde(default)]
    pub api_key: Option<SecretString>,

    /// Environment variable holding the API key
    #[serde(default)]
    pub api_key_env: Option<String>,

    /// Whether the provider is registered
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Transport timeout for a single upstream call
    #[serde(default = "default_provider_timeout", with = "humantime_serde")]
    pub timeout: Duration,

    /// Model used by tenants without explicit routes
    #[serde(default)]
    pub default_model: Option<String>,

    /// Locality override for routing
    #[serde(default)]
    pub locality: Option<Locality>,
}

impl ProviderSettings {
    /// Create enabled settings with the kind's default timeout
    #[must_use]
    pub fn new(id: impl Into<String>, provider_type: ProviderType) -> Self {
        Self {
            id: id.into(),
            provider_type,
            endpoint: None,
            api_key: None,
            api_key_env: None,
            enabled: true,
            timeout: default_provider_timeout(),
            default_model: None,
            locality: None,
        }
    }

    /// Set the endpoint
    #[must_use]
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = Some(endpoint.into());
        self
    }

    /// Set an inline API key
    #[must_use]
    pub fn with_api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(SecretString::new(key.into()));
        self
    }

    /// Set the default model
    #[must_use]
    pub fn with_default_model(mut self, model: impl Into<String>) -> Self {
        self.default_model = Some(model.into());
        self
    }

    /// Effective locality for routing
    #[must_use]
    pub fn locality(&self) -> Locality {
        self.locality
            .unwrap_or_else(|| self.provider_type.default_locality())
    }

    /// Inline key, falling back to the named environment variable
    #[must_use]
    pub fn resolve_api_key(&self) -> Option<SecretString> {
        self.api_key.clone().or_else(|| {
            self.api_key_env
                .as_ref()
                .and_then(|var| std::env::var(var).ok())
                .filter(|key| !key.is_empty())
                .map(SecretString::new)
        })
    }
}

fn default_true() -> bool {
    true
}

fn default_provider_timeout() -> Duration {
    Duration::from_secs(60)
}

/// Circuit breaker settings, shared by every provider breaker
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct BreakerSettings {
    /// Consecutive failures that open the breaker
    #[serde(default = "default_failure_threshold")]
    #[validate(range(min = 1))]
    pub failure_threshold: u32,

    /// Initial open period
    #[serde(default = "default_cooldown", with = "humantime_serde")]
    pub cooldown: Duration,

    /// Ceiling for the doubled open period
    #[serde(default = "default_max_cooldown", with = "humantime_serde")]
    pub max_cooldown: Duration,

    /// Concurrent probes admitted while half-open
    #[serde(default = "default_half_open_probes")]
    #[validate(range(min = 1))]
    pub half_open_max_probes: u32,
}

impl Default for BreakerSettings {
    fn default() -> Self {
        Self {
            failure_threshold: default_failure_threshold(),
            cooldown: default_cooldown(),
            max_cooldown: default_max_cooldown(),
            half_open_max_probes: default_half_open_probes(),
        }
    }
}

fn default_failure_threshold() -> u32 {
    5
}

fn default_cooldown() -> Duration {
    Duration::from_secs(30)
}

fn default_max_cooldown() -> Duration {
    Duration::from_secs(300)
}

fn default_half_open_probes() -> u32 {
    1
}

/// Response cache settings
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct CacheSettings {
    /// Whether responses are cached at all
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// TTL when neither tenant nor task bucket overrides it
    #[serde(default = "default_cache_ttl", with = "humantime_serde")]
    pub default_ttl: Duration,

    /// Entry cap; the oldest entries are evicted beyond it
    #[serde(default = "default_max_entries")]
    #[validate(range(min = 1))]
    pub max_entries: usize,

    /// Highest temperature cached without an explicit opt-in
    #[serde(default = "default_max_cacheable_temperature")]
    #[validate(range(min = 0.0, max = 2.0))]
    pub max_cacheable_temperature: f32,

    /// Background expiry sweep period; disabled when absent
    #[serde(default = "default_sweep_interval", with = "humantime_serde")]
    pub sweep_interval: Option<Duration>,

    /// Per task bucket TTL overrides
    #[serde(default)]
    pub task_ttls: HashMap<TaskBucket, humantime_serde::Serde<Duration>>,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            default_ttl: default_cache_ttl(),
            max_entries: default_max_entries(),
            max_cacheable_temperature: default_max_cacheable_temperature(),
            sweep_interval: default_sweep_interval(),
            task_ttls: HashMap::new(),
        }
    }
}

impl CacheSettings {
    /// Task bucket overrides as plain durations
    #[must_use]
    pub fn task_ttl_map(&self) -> HashMap<TaskBucket, Duration> {
        self.task_ttls
            .iter()
            .map(|(bucket, ttl)| (*bucket, **ttl))
            .collect()
    }
}

fn default_cache_ttl() -> Duration {
    Duration::from_secs(300)
}

fn default_max_entries() -> usize {
    10_000
}

fn default_max_cacheable_temperature() -> f32 {
    0.3
}

fn default_sweep_interval() -> Option<Duration> {
    Some(Duration::from_secs(60))
}

/// Complexity router settings
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct RoutingSettings {
    /// Score below which hybrid tenants may go local
    #[serde(default = "default_complexity_threshold")]
    #[validate(range(min = 0.0, max = 1.0))]
    pub complexity_threshold: f64,

    /// Budgets at or below this are tight
    #[serde(default = "default_tight_latency_ms")]
    pub tight_latency_ms: u64,

    /// Budgets at or above this contribute nothing to urgency
    #[serde(default = "default_relaxed_latency_ms")]
    pub relaxed_latency_ms: u64,

    /// Input size that saturates the size factor
    #[serde(default = "default_size_norm_tokens")]
    #[validate(range(min = 1))]
    pub size_norm_tokens: u32,

    /// Per-attempt deadline when neither request nor tenant sets one
    #[serde(default = "default_latency_budget_ms")]
    #[validate(range(min = 1))]
    pub default_latency_budget_ms: u64,
}

impl Default for RoutingSettings {
    fn default() -> Self {
        Self {
            complexity_threshold: default_complexity_threshold(),
            tight_latency_ms: default_tight_latency_ms(),
            relaxed_latency_ms: default_relaxed_latency_ms(),
            size_norm_tokens: default_size_norm_tokens(),
            default_latency_budget_ms: default_latency_budget_ms(),
        }
    }
}

fn default_complexity_threshold() -> f64 {
    0.5
}

fn default_tight_latency_ms() -> u64 {
    2_000
}

fn default_relaxed_latency_ms() -> u64 {
    30_000
}

fn default_size_norm_tokens() -> u32 {
    8_000
}

fn default_latency_budget_ms() -> u64 {
    30_000
}

/// Price of one model, in USD per million tokens
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct PricingEntry {
    /// Restrict the entry to one provider
    #[serde(default)]
    pub provider: Option<String>,
    /// Model name or prefix
    pub model: String,
    /// Input price
    pub input_per_million: f64,
    /// Output price
    pub output_per_million: f64,
}

/// Pricing settings
#[derive(Debug, Clone, Deserialize)]
pub struct CostSettings {
    /// Extra or overriding price entries
    #[serde(default)]
    pub pricing: Vec<PricingEntry>,
    /// Input price for unknown cloud models
    #[serde(default = "default_input_price")]
    pub default_input_per_million: f64,
    /// Output price for unknown cloud models
    #[serde(default = "default_output_price")]
    pub default_output_per_million: f64,
}

impl Default for CostSettings {
    fn default() -> Self {
        Self {
            pricing: Vec::new(),
            default_input_per_million: default_input_price(),
            default_output_per_million: default_output_price(),
        }
    }
}

fn default_input_price() -> f64 {
    1.0
}

fn default_output_price() -> f64 {
    3.0
}

/// Logging settings
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingSettings {
    /// Default filter level
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Emit JSON lines
    #[serde(default)]
    pub json: bool,
    /// Attach an OpenTelemetry tracer layer
    #[serde(default)]
    pub tracing: bool,
    /// Service name reported on spans
    #[serde(default = "default_service_name")]
    pub service_name: String,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
            tracing: false,
            service_name: default_service_name(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_service_name() -> String {
    "llm-agent-gateway".to_string()
}
