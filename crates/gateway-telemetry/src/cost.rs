//! Cost and usage ledger.
//!
//! Every served request appends one [`UsageRecord`]. Records are never
//! mutated; summaries and budget spend are aggregated from the ledger when
//! asked for. Each tenant has its own shard so concurrent appends from
//! different tenants never contend.

use chrono::{DateTime, Datelike, Utc};
use dashmap::DashMap;
use gateway_core::{BudgetSettings, GatewayError, Usage};
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use tracing::{debug, warn};

/// Cost tracking configuration
#[derive(Debug, Clone)]
pub struct CostConfig {
    /// Fallback cost per 1M input tokens (USD)
    pub default_input_per_million: f64,
    /// Fallback cost per 1M output tokens (USD)
    pub default_output_per_million: f64,
    /// Seed the tracker with [`default_pricing`]
    pub use_default_pricing: bool,
}

impl Default for CostConfig {
    fn default() -> Self {
        Self {
            default_input_per_million: 1.0,
            default_output_per_million: 3.0,
            use_default_pricing: true,
        }
    }
}

impl CostConfig {
    /// Set fallback pricing
    #[must_use]
    pub fn with_default_pricing(mut self, input_per_million: f64, output_per_million: f64) -> Self {
        self.default_input_per_million = input_per_million;
        self.default_output_per_million = output_per_million;
        self
    }
}

/// Price of one model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelPricing {
    /// Provider the price applies to; `None` matches any provider
    pub provider: Option<String>,
    /// Model name or name prefix
    pub model: String,
    /// Cost per 1M input tokens (USD)
    pub input_per_million: f64,
    /// Cost per 1M output tokens (USD)
    pub output_per_million: f64,
}

impl ModelPricing {
    /// Create provider-agnostic pricing
    #[must_use]
    pub fn new(model: impl Into<String>, input_per_million: f64, output_per_million: f64) -> Self {
        Self {
            provider: None,
            model: model.into(),
            input_per_million,
            output_per_million,
        }
    }

    /// Restrict to one provider
    #[must_use]
    pub fn for_provider(mut self, provider: impl Into<String>) -> Self {
        self.provider = Some(provider.into());
        self
    }

    /// Cost of the given token counts
    #[must_use]
    pub fn calculate_cost(&self, prompt_tokens: u32, completion_tokens: u32) -> f64 {
        let input = f64::from(prompt_tokens) / 1_000_000.0 * self.input_per_million;
        let output = f64::from(completion_tokens) / 1_000_000.0 * self.output_per_million;
        input + output
    }

    fn applies_to(&self, provider: &str) -> bool {
        self.provider.as_deref().map_or(true, |p| p == provider)
    }
}

/// Built-in prices for common hosted models, per 1M tokens
#[must_use]
pub fn default_pricing() -> Vec<ModelPricing> {
    vec![
        ModelPricing::new("gpt-4o", 2.5, 10.0),
        ModelPricing::new("gpt-4o-mini", 0.15, 0.6),
        ModelPricing::new("gpt-4-turbo", 10.0, 30.0),
        ModelPricing::new("gpt-3.5-turbo", 0.5, 1.5),
        ModelPricing::new("claude-3-5-sonnet", 3.0, 15.0),
        ModelPricing::new("claude-3-5-haiku", 0.8, 4.0),
        ModelPricing::new("claude-3-opus", 15.0, 75.0),
        ModelPricing::new("claude-3-haiku", 0.25, 1.25),
        ModelPricing::new("llama-3-70b", 0.59, 0.79),
        ModelPricing::new("llama-3.1-8b", 0.06, 0.06),
    ]
}

/// One ledger entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UsageRecord {
    /// Tenant ID
    pub tenant_id: String,
    /// Provider that served the request
    pub provider: String,
    /// Model that served the request
    pub model: String,
    /// Input tokens
    pub prompt_tokens: u32,
    /// Output tokens
    pub completion_tokens: u32,
    /// Cost in USD; zero for cache hits and local providers
    pub cost_usd: f64,
    /// When the record was appended
    pub timestamp: DateTime<Utc>,
    /// Served from cache
    pub cached: bool,
}

/// Aggregated usage
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UsageTotals {
    /// Requests served
    pub requests: u64,
    /// Requests served from cache
    pub cached_requests: u64,
    /// Input tokens
    pub prompt_tokens: u64,
    /// Output tokens
    pub completion_tokens: u64,
    /// Spend in USD
    pub cost_usd: f64,
}

impl UsageTotals {
    fn add(&mut self, record: &UsageRecord) {
        self.requests += 1;
        if record.cached {
            self.cached_requests += 1;
        }
        self.prompt_tokens += u64::from(record.prompt_tokens);
        self.completion_tokens += u64::from(record.completion_tokens);
        self.cost_usd += record.cost_usd;
    }
}

/// Per-tenant cost report
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CostSummary {
    /// Tenant ID
    pub tenant_id: String,
    /// Totals over the whole ledger
    #[serde(flatten)]
    pub totals: UsageTotals,
    /// Totals per provider
    pub by_provider: BTreeMap<String, UsageTotals>,
    /// Totals per model
    pub by_model: BTreeMap<String, UsageTotals>,
    /// Oldest record
    #[serde(skip_serializing_if = "Option::is_none")]
    pub first_seen: Option<DateTime<Utc>>,
    /// Newest record
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_seen: Option<DateTime<Utc>>,
}

impl CostSummary {
    fn from_records(tenant_id: &str, records: &[UsageRecord]) -> Self {
        let mut summary = Self {
            tenant_id: tenant_id.to_string(),
            totals: UsageTotals::default(),
            by_provider: BTreeMap::new(),
            by_model: BTreeMap::new(),
            first_seen: None,
            last_seen: None,
        };
        for record in records {
            summary.totals.add(record);
            summary
                .by_provider
                .entry(record.provider.clone())
                .or_default()
                .add(record);
            summary
                .by_model
                .entry(record.model.clone())
                .or_default()
                .add(record);
            summary.first_seen = Some(
                summary
                    .first_seen
                    .map_or(record.timestamp, |t| t.min(record.timestamp)),
            );
            summary.last_seen = Some(
                summary
                    .last_seen
                    .map_or(record.timestamp, |t| t.max(record.timestamp)),
            );
        }
        summary
    }
}

/// Spend in the current UTC day and month
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SpendWindow {
    /// Spend today
    pub daily_usd: f64,
    /// Spend this month
    pub monthly_usd: f64,
}

type Ledger = Arc<Mutex<Vec<UsageRecord>>>;

/// Usage ledger with pricing and budget checks
#[derive(Debug)]
pub struct CostTracker {
    config: CostConfig,
    pricing: RwLock<Vec<ModelPricing>>,
    free_providers: RwLock<HashSet<String>>,
    ledgers: DashMap<String, Ledger>,
}

impl Default for CostTracker {
    fn default() -> Self {
        Self::new(CostConfig::default())
    }
}

impl CostTracker {
    /// Create a tracker
    #[must_use]
    pub fn new(config: CostConfig) -> Self {
        let pricing = if config.use_default_pricing {
            default_pricing()
        } else {
            Vec::new()
        };
        Self {
            config,
            pricing: RwLock::new(pricing),
            free_providers: RwLock::new(HashSet::new()),
            ledgers: DashMap::new(),
        }
    }

    /// Add or replace a price
    pub fn register_pricing(&self, pricing: ModelPricing) {
        let mut table = self.pricing.write();
        if let Some(existing) = table
            .iter_mut()
            .find(|p| p.model == pricing.model && p.provider == pricing.provider)
        {
            *existing = pricing;
        } else {
            table.push(pricing);
        }
    }

    /// Mark a provider as free to run (local inference)
    pub fn register_free_provider(&self, provider: impl Into<String>) {
        self.free_providers.write().insert(provider.into());
    }

    /// Price that applies to a provider/model pair.
    ///
    /// Provider-specific entries beat generic ones, exact names beat prefixes,
    /// and longer prefixes beat shorter ones. Vendor-qualified names such as
    /// `openai/gpt-4o` also match on the part after the last `/`.
    #[must_use]
    pub fn pricing_for(&self, provider: &str, model: &str) -> Option<ModelPricing> {
        let table = self.pricing.read();
        let bare = model.rsplit('/').next().unwrap_or(model);

        for name in [model, bare] {
            let exact = table
                .iter()
                .filter(|p| p.model == name && p.applies_to(provider))
                .max_by_key(|p| p.provider.is_some());
            if let Some(p) = exact {
                return Some(p.clone());
            }
        }

        table
            .iter()
            .filter(|p| {
                p.applies_to(provider)
                    && (bare.starts_with(&p.model) || model.starts_with(&p.model))
            })
            .max_by_key(|p| (p.provider.is_some(), p.model.len()))
            .cloned()
    }

    /// Cost of a completion in USD
    #[must_use]
    pub fn calculate_cost(&self, provider: &str, model: &str, usage: &Usage) -> f64 {
        if self.free_providers.read().contains(provider) {
            return 0.0;
        }
        match self.pricing_for(provider, model) {
            Some(pricing) => pricing.calculate_cost(usage.prompt_tokens, usage.completion_tokens),
            None => {
                debug!(
                    provider = %provider,
                    model = %model,
                    "No pricing entry, using default rates"
                );
                ModelPricing::new(
                    model,
                    self.config.default_input_per_million,
                    self.config.default_output_per_million,
                )
                .calculate_cost(usage.prompt_tokens, usage.completion_tokens)
            }
        }
    }

    /// Append a priced record for an upstream completion
    pub fn record(
        &self,
        tenant_id: &str,
        provider: &str,
        model: &str,
        usage: &Usage,
    ) -> UsageRecord {
        let record = UsageRecord {
            tenant_id: tenant_id.to_string(),
            provider: provider.to_string(),
            model: model.to_string(),
            prompt_tokens: usage.prompt_tokens,
            completion_tokens: usage.completion_tokens,
            cost_usd: self.calculate_cost(provider, model, usage),
            timestamp: Utc::now(),
            cached: false,
        };
        self.append(record.clone());
        record
    }

    /// Append a zero-cost record for a cache hit
    pub fn record_cached(
        &self,
        tenant_id: &str,
        provider: &str,
        model: &str,
        usage: &Usage,
    ) -> UsageRecord {
        let record = UsageRecord {
            tenant_id: tenant_id.to_string(),
            provider: provider.to_string(),
            model: model.to_string(),
            prompt_tokens: usage.prompt_tokens,
            completion_tokens: usage.completion_tokens,
            cost_usd: 0.0,
            timestamp: Utc::now(),
            cached: true,
        };
        self.append(record.clone());
        record
    }

    /// Append a record as-is
    pub fn append(&self, record: UsageRecord) {
        if !record.cost_usd.is_finite() || record.cost_usd < 0.0 {
            warn!(
                tenant = %record.tenant_id,
                cost = record.cost_usd,
                "Dropping usage record with invalid cost"
            );
            return;
        }
        debug!(
            tenant = %record.tenant_id,
            provider = %record.provider,
            model = %record.model,
            cost = record.cost_usd,
            cached = record.cached,
            "Recording usage"
        );
        let ledger = self.ledger(&record.tenant_id);
        ledger.lock().push(record);
    }

    fn ledger(&self, tenant_id: &str) -> Ledger {
        if let Some(ledger) = self.ledgers.get(tenant_id) {
            return Arc::clone(ledger.value());
        }
        Arc::clone(self.ledgers.entry(tenant_id.to_string()).or_default().value())
    }

    pub(crate) fn snapshot(&self, tenant_id: &str) -> Vec<UsageRecord> {
        self.ledgers
            .get(tenant_id)
            .map(|l| Arc::clone(l.value()))
            .map(|l| l.lock().clone())
            .unwrap_or_default()
    }

    /// Summary for one tenant; empty for tenants with no records
    #[must_use]
    pub fn tenant_summary(&self, tenant_id: &str) -> CostSummary {
        CostSummary::from_records(tenant_id, &self.snapshot(tenant_id))
    }

    /// Summaries for every tenant with records, sorted by tenant ID
    #[must_use]
    pub fn all_summaries(&self) -> Vec<CostSummary> {
        let mut tenants: Vec<String> = self.ledgers.iter().map(|e| e.key().clone()).collect();
        tenants.sort();
        tenants.iter().map(|t| self.tenant_summary(t)).collect()
    }

    /// Newest `limit` records for a tenant, oldest first
    #[must_use]
    pub fn recent_records(&self, tenant_id: &str, limit: usize) -> Vec<UsageRecord> {
        let records = self.snapshot(tenant_id);
        let skip = records.len().saturating_sub(limit);
        records.into_iter().skip(skip).collect()
    }

    /// Spend in the UTC day and month containing `now`
    #[must_use]
    pub fn spend_at(&self, tenant_id: &str, now: DateTime<Utc>) -> SpendWindow {
        let Some(ledger) = self.ledgers.get(tenant_id).map(|l| Arc::clone(l.value())) else {
            return SpendWindow::default();
        };
        let today = now.date_naive();
        let records = ledger.lock();
        records
            .iter()
            .filter(|r| r.timestamp.year() == now.year() && r.timestamp.month() == now.month())
            .fold(SpendWindow::default(), |mut window, r| {
                window.monthly_usd += r.cost_usd;
                if r.timestamp.date_naive() == today {
                    window.daily_usd += r.cost_usd;
                }
                window
            })
    }

    /// Reject a tenant that has reached a budget limit.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::BudgetExceeded`] when today's or this month's
    /// spend has reached the configured limit.
    pub fn check_budget(
        &self,
        tenant_id: &str,
        budget: &BudgetSettings,
    ) -> Result<(), GatewayError> {
        self.check_budget_at(tenant_id, budget, Utc::now())
    }

    /// [`check_budget`](Self::check_budget) against an explicit clock.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::BudgetExceeded`] when a limit is reached.
    pub fn check_budget_at(
        &self,
        tenant_id: &str,
        budget: &BudgetSettings,
        now: DateTime<Utc>,
    ) -> Result<(), GatewayError> {
        if budget.daily_usd.is_none() && budget.monthly_usd.is_none() {
            return Ok(());
        }
        let spend = self.spend_at(tenant_id, now);

        if let Some(limit) = budget.daily_usd {
            if spend.daily_usd >= limit {
                return Err(GatewayError::budget_exceeded(tenant_id, spend.daily_usd, limit));
            }
        }
        if let Some(limit) = budget.monthly_usd {
            if spend.monthly_usd >= limit {
                return Err(GatewayError::budget_exceeded(tenant_id, spend.monthly_usd, limit));
            }
        }
        Ok(())
    }

    /// Total spend across all tenants
    #[must_use]
    pub fn total_cost(&self) -> f64 {
        self.ledgers
            .iter()
            .map(|l| Arc::clone(l.value()))
            .collect::<Vec<_>>()
            .iter()
            .map(|l| l.lock().iter().map(|r| r.cost_usd).sum::<f64>())
            .sum()
    }
}
