//! Tenant and routing configuration types shared across crates.

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Provider pool preference configured per tenant
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelTier {
    /// Prefer a local small model, cloud only as a last resort
    LocalSlm,
    /// Never use local providers
    CloudLlm,
    /// Choose per request from complexity and latency budget
    #[default]
    Hybrid,
}

impl std::fmt::Display for ModelTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::LocalSlm => write!(f, "local_slm"),
            Self::CloudLlm => write!(f, "cloud_llm"),
            Self::Hybrid => write!(f, "hybrid"),
        }
    }
}

/// Where a provider runs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Locality {
    /// Local or low-latency inference endpoint
    Local,
    /// Remote hosted API
    Cloud,
}

/// Coarse classification of a request's declared task type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TaskBucket {
    /// Conversational turn
    Chat,
    /// Embedding or similarity work
    Embedding,
    /// Code generation or review
    Code,
    /// Summarisation of long inputs
    LongContextSummarize,
}

impl TaskBucket {
    /// Classify a free-form task type string.
    ///
    /// Unknown task types fall into [`TaskBucket::Chat`].
    #[must_use]
    pub fn classify(task_type: &str) -> Self {
        let task = task_type.trim().to_ascii_lowercase();
        if task.contains("embed") || task.contains("similarity") {
            Self::Embedding
        } else if task.contains("code")
            || task.contains("program")
            || task.contains("refactor")
            || task.contains("debug")
        {
            Self::Code
        } else if task.contains("summar") || task.contains("long") || task.contains("document") {
            Self::LongContextSummarize
        } else {
            Self::Chat
        }
    }

    /// Stable name used in configuration and metrics
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Chat => "chat",
            Self::Embedding => "embedding",
            Self::Code => "code",
            Self::LongContextSummarize => "long-context-summarize",
        }
    }
}

/// One (provider, model) option configured for a tenant
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelRoute {
    /// Provider ID as registered in the provider registry
    pub provider: String,
    /// Model name passed upstream
    pub model: String,
    /// Task buckets this route is suited for; empty means general purpose
    #[serde(default, alias = "useCases")]
    pub use_cases: Vec<TaskBucket>,
    /// Relative quality rank, higher is better
    #[serde(default)]
    pub quality: u8,
}

impl ModelRoute {
    /// Create a general purpose route
    #[must_use]
    pub fn new(provider: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            provider: provider.into(),
            model: model.into(),
            use_cases: Vec::new(),
            quality: 0,
        }
    }

    /// Set the use-case tags
    #[must_use]
    pub fn with_use_cases(mut self, use_cases: Vec<TaskBucket>) -> Self {
        self.use_cases = use_cases;
        self
    }

    /// Set the quality rank
    #[must_use]
    pub fn with_quality(mut self, quality: u8) -> Self {
        self.quality = quality;
        self
    }
}

/// Token bucket parameters for one tenant
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RateLimitSettings {
    /// Burst allowance
    pub capacity: f64,
    /// Sustained requests per second
    pub refill_per_sec: f64,
}

impl Default for RateLimitSettings {
    fn default() -> Self {
        Self {
            capacity: 10.0,
            refill_per_sec: 5.0,
        }
    }
}

/// Spend limits for one tenant, in USD
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct BudgetSettings {
    /// Limit per UTC day
    #[serde(default)]
    pub daily_usd: Option<f64>,
    /// Limit per UTC month
    #[serde(default)]
    pub monthly_usd: Option<f64>,
}

/// Per-tenant configuration, immutable after startup
#[derive(Debug, Clone, Deserialize)]
pub struct TenantConfig {
    /// Tenant ID
    #[serde(default)]
    pub id: String,
    /// Display name
    #[serde(default)]
    pub name: Option<String>,
    /// Provider pool preference
    #[serde(default)]
    pub model_tier: ModelTier,
    /// Ordered model routes
    #[serde(default)]
    pub models: Vec<ModelRoute>,
    /// Token bucket parameters
    #[serde(default)]
    pub rate_limit: RateLimitSettings,
    /// Complexity threshold below which hybrid tenants go local
    #[serde(default)]
    pub complexity_threshold: Option<f64>,
    /// Cache TTL override
    #[serde(default, with = "humantime_serde")]
    pub cache_ttl: Option<Duration>,
    /// Latency budget applied when a request omits one
    #[serde(default)]
    pub latency_budget_ms: Option<u64>,
    /// Default max tokens applied when a request omits one
    #[serde(default)]
    pub max_tokens: Option<u32>,
    /// Default temperature applied when a request omits one
    #[serde(default)]
    pub temperature: Option<f32>,
    /// Key a caller must present as this tenant
    #[serde(default)]
    pub api_key: Option<SecretString>,
    /// Spend limits
    #[serde(default)]
    pub budget: Option<BudgetSettings>,
}

impl TenantConfig {
    /// Create a hybrid tenant with no routes
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: None,
            model_tier: ModelTier::default(),
            models: Vec::new(),
            rate_limit: RateLimitSettings::default(),
            complexity_threshold: None,
            cache_ttl: None,
            latency_budget_ms: None,
            max_tokens: None,
            temperature: None,
            api_key: None,
            budget: None,
        }
    }

    /// Set the model tier
    #[must_use]
    pub fn with_tier(mut self, tier: ModelTier) -> Self {
        self.model_tier = tier;
        self
    }

    /// Append a model route
    #[must_use]
    pub fn with_route(mut self, route: ModelRoute) -> Self {
        self.models.push(route);
        self
    }

    /// Set rate limit parameters
    #[must_use]
    pub fn with_rate_limit(mut self, capacity: f64, refill_per_sec: f64) -> Self {
        self.rate_limit = RateLimitSettings {
            capacity,
            refill_per_sec,
        };
        self
    }

    /// Set the caller key
    #[must_use]
    pub fn with_api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(SecretString::new(key.into()));
        self
    }

    /// Set spend limits
    #[must_use]
    pub fn with_budget(mut self, budget: BudgetSettings) -> Self {
        self.budget = Some(budget);
        self
    }

    /// Copy this template under a different tenant ID
    #[must_use]
    pub fn instantiate(&self, id: impl Into<String>) -> Self {
        let mut tenant = self.clone();
        tenant.id = id.into();
        tenant.name = None;
        tenant
    }

    /// Check a presented key against the configured one.
    ///
    /// Tenants without a configured key accept any caller.
    #[must_use]
    pub fn accepts_key(&self, presented: Option<&str>) -> bool {
        match (&self.api_key, presented) {
            (None, _) => true,
            (Some(expected), Some(presented)) => {
                constant_time_eq(expected.expose_secret().as_bytes(), presented.as_bytes())
            }
            (Some(_), None) => false,
        }
    }
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}
