//! Complexity-based routing policy.
//!
//! [`ComplexityRouter::route`] is a pure function of the request, the tenant's
//! configuration, and a [`RoutingContext`] snapshot of provider localities and
//! breaker states. It performs no I/O and never mutates shared state.

use gateway_core::{GatewayRequest, Locality, ModelRoute, ModelTier, TaskBucket, TenantConfig};
use gateway_resilience::CircuitState;
use serde::Serialize;
use std::cmp::Reverse;
use std::collections::HashMap;

/// Router tuning
#[derive(Debug, Clone)]
pub struct RouterConfig {
    /// Score below which hybrid tenants may go local
    pub complexity_threshold: f64,
    /// Budgets at or below this are tight
    pub tight_latency_ms: u64,
    /// Budgets at or above this are fully relaxed
    pub relaxed_latency_ms: u64,
    /// Input size that saturates the size factor
    pub size_norm_tokens: u32,
    /// Budget assumed when neither request nor tenant sets one
    pub default_latency_budget_ms: u64,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            complexity_threshold: 0.5,
            tight_latency_ms: 2_000,
            relaxed_latency_ms: 30_000,
            size_norm_tokens: 8_000,
            default_latency_budget_ms: 30_000,
        }
    }
}

const REASONING_CUES: [&str; 6] = [
    "analyze",
    "synthesize",
    "evaluate",
    "compare",
    "reasoning",
    "step by step",
];
const CODE_CUES: [&str; 4] = ["code", "implement", "function", "algorithm"];

/// Complexity assessment of one request
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ComplexityScore {
    /// Score in `[0, 1]`
    pub value: f64,
    /// Task bucket the request was classified into
    pub bucket: TaskBucket,
    /// Estimated input tokens
    pub estimated_tokens: u32,
    /// Effective latency budget
    pub latency_budget_ms: u64,
}

/// Scores requests on task bucket, size, output length, and latency budget
#[derive(Debug, Clone, Default)]
pub struct ComplexityScorer {
    config: RouterConfig,
}

impl ComplexityScorer {
    /// Create a scorer
    #[must_use]
    pub fn new(config: RouterConfig) -> Self {
        Self { config }
    }

    /// Latency budget the request will run under
    #[must_use]
    pub fn latency_budget_ms(&self, request: &GatewayRequest, tenant: &TenantConfig) -> u64 {
        request
            .latency_budget_ms
            .or(tenant.latency_budget_ms)
            .unwrap_or(self.config.default_latency_budget_ms)
    }

    /// Score a request
    #[must_use]
    pub fn score(&self, request: &GatewayRequest, tenant: &TenantConfig) -> ComplexityScore {
        let bucket = TaskBucket::classify(&request.task_type);
        let estimated_tokens = request.estimated_tokens();
        let latency_budget_ms = self.latency_budget_ms(request, tenant);

        let task = match bucket {
            TaskBucket::Embedding => 0.0,
            TaskBucket::Chat => 0.1,
            TaskBucket::Code => 0.3,
            TaskBucket::LongContextSummarize => 0.35,
        };

        let size = f64::from(estimated_tokens) / f64::from(self.config.size_norm_tokens.max(1));
        let size = size.min(1.0) * 0.3;

        let turns = match request.messages.len() {
            n if n > 10 => 0.1,
            n if n > 5 => 0.05,
            _ => 0.0,
        };

        let output = match request.max_tokens.or(tenant.max_tokens) {
            Some(n) if n > 4000 => 0.15,
            Some(n) if n > 2000 => 0.1,
            _ => 0.0,
        };

        let cues = request.system_prompt().map_or(0.0, |prompt| {
            let prompt = prompt.to_lowercase();
            let mut cues = 0.0;
            if REASONING_CUES.iter().any(|cue| prompt.contains(cue)) {
                cues += 0.1;
            }
            if CODE_CUES.iter().any(|cue| prompt.contains(cue)) {
                cues += 0.05;
            }
            cues
        });

        // A relaxed deadline leaves room for a heavier model.
        let latency = self.relaxation(latency_budget_ms) * 0.1;

        ComplexityScore {
            value: (task + size + turns + output + cues + latency).clamp(0.0, 1.0),
            bucket,
            estimated_tokens,
            latency_budget_ms,
        }
    }

    fn relaxation(&self, budget_ms: u64) -> f64 {
        let tight = self.config.tight_latency_ms;
        let relaxed = self.config.relaxed_latency_ms;
        if budget_ms <= tight {
            0.0
        } else if budget_ms >= relaxed || relaxed <= tight {
            1.0
        } else {
            (budget_ms - tight) as f64 / (relaxed - tight) as f64
        }
    }
}

/// Snapshot of provider facts the router needs
#[derive(Debug, Clone, Default)]
pub struct RoutingContext {
    providers: HashMap<String, (Locality, CircuitState)>,
}

impl RoutingContext {
    /// Create an empty context
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a provider
    #[must_use]
    pub fn with_provider(
        mut self,
        provider: impl Into<String>,
        locality: Locality,
        state: CircuitState,
    ) -> Self {
        self.insert(provider, locality, state);
        self
    }

    /// Add or replace a provider
    pub fn insert(&mut self, provider: impl Into<String>, locality: Locality, state: CircuitState) {
        self.providers.insert(provider.into(), (locality, state));
    }

    fn lookup(&self, provider: &str) -> Option<(Locality, CircuitState)> {
        self.providers.get(provider).copied()
    }
}

/// One (provider, model) pair to attempt
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RouteCandidate {
    /// Provider ID
    pub provider: String,
    /// Model name
    pub model: String,
    /// Provider locality
    pub locality: Locality,
    /// Breaker state when the route was computed
    pub breaker: CircuitState,
    /// 2 when tagged for the task bucket, 1 when untagged, 0 otherwise
    pub suitability: u8,
    /// Configured quality rank
    pub quality: u8,
}

/// Ordered candidates plus the assessment that produced them
#[derive(Debug, Clone, Serialize)]
pub struct RoutePlan {
    /// Candidates, primary first
    pub candidates: Vec<RouteCandidate>,
    /// Complexity assessment
    pub score: ComplexityScore,
    /// Whether local providers were preferred
    pub prefer_local: bool,
}

/// Tier-aware, health-aware router
#[derive(Debug, Clone, Default)]
pub struct ComplexityRouter {
    config: RouterConfig,
    scorer: ComplexityScorer,
}

impl ComplexityRouter {
    /// Create a router
    #[must_use]
    pub fn new(config: RouterConfig) -> Self {
        Self {
            scorer: ComplexityScorer::new(config.clone()),
            config,
        }
    }

    /// Scorer used by this router
    #[must_use]
    pub fn scorer(&self) -> &ComplexityScorer {
        &self.scorer
    }

    /// Ordered candidates for a request
    #[must_use]
    pub fn route(
        &self,
        request: &GatewayRequest,
        tenant: &TenantConfig,
        context: &RoutingContext,
    ) -> Vec<RouteCandidate> {
        self.plan(request, tenant, context).candidates
    }

    /// Ordered candidates with the assessment behind them.
    ///
    /// Open-breaker candidates always come last and are never dropped.
    #[must_use]
    pub fn plan(
        &self,
        request: &GatewayRequest,
        tenant: &TenantConfig,
        context: &RoutingContext,
    ) -> RoutePlan {
        let score = self.scorer.score(request, tenant);

        let pinned: Vec<&ModelRoute> = match &request.model {
            Some(model) => tenant.models.iter().filter(|r| &r.model == model).collect(),
            None => tenant.models.iter().collect(),
        };

        let mut locals = Vec::new();
        let mut clouds = Vec::new();
        for route in pinned {
            let Some((locality, breaker)) = context.lookup(&route.provider) else {
                continue;
            };
            let candidate = RouteCandidate {
                provider: route.provider.clone(),
                model: route.model.clone(),
                locality,
                breaker,
                suitability: suitability(route, score.bucket),
                quality: route.quality,
            };
            match locality {
                Locality::Local => locals.push(candidate),
                Locality::Cloud => clouds.push(candidate),
            }
        }
        sort_pool(&mut locals);
        sort_pool(&mut clouds);

        let threshold = tenant
            .complexity_threshold
            .unwrap_or(self.config.complexity_threshold);

        let (prefer_local, ordered) = match tenant.model_tier {
            ModelTier::CloudLlm => (false, clouds),
            ModelTier::LocalSlm => {
                let local_available = locals.iter().any(|c| c.breaker != CircuitState::Open);
                if local_available {
                    (true, locals)
                } else {
                    (true, concat(clouds, locals))
                }
            }
            ModelTier::Hybrid => {
                let tight = score.latency_budget_ms <= self.config.tight_latency_ms;
                if score.value < threshold && tight {
                    (true, concat(locals, clouds))
                } else {
                    (false, concat(clouds, locals))
                }
            }
        };

        let (mut candidates, open): (Vec<_>, Vec<_>) = ordered
            .into_iter()
            .partition(|c| c.breaker != CircuitState::Open);
        candidates.extend(open);

        RoutePlan {
            candidates,
            score,
            prefer_local,
        }
    }
}

fn suitability(route: &ModelRoute, bucket: TaskBucket) -> u8 {
    if route.use_cases.is_empty() {
        1
    } else if route.use_cases.contains(&bucket) {
        2
    } else {
        0
    }
}

fn sort_pool(pool: &mut [RouteCandidate]) {
    // Stable, so configuration order breaks remaining ties.
    pool.sort_by_key(|c| (Reverse(c.suitability), c.breaker, Reverse(c.quality)));
}

fn concat(mut first: Vec<RouteCandidate>, second: Vec<RouteCandidate>) -> Vec<RouteCandidate> {
    first.extend(second);
    first
}
