//! The request pipeline.
//!
//! [`Gateway`] owns no request state of its own. Every shared structure lives
//! in the component that guards it, and each call to [`Gateway::handle`] walks
//! the same sequence: admission, routing, cache, budget, then the candidate
//! list under circuit-breaker control. The cache is keyed on the model the
//! plan would call first, and answers are stored under the model that served
//! them.

use crate::response::{
    ChatResponse, CostQuery, CostReport, HealthReport, ProviderHealth, ResponseUsage,
    TenantCosts, TenantView,
};
use crate::stream::{GatewayStream, MeteredStream};
use gateway_config::GatewayConfig;
use gateway_core::{
    AttemptFailure, ChunkStream, CompletionRequest, CompletionResponse, ErrorKind, GatewayError,
    GatewayRequest, LLMProvider, Locality, TenantConfig,
};
use gateway_providers::ProviderRegistry;
use gateway_resilience::{
    BreakerRegistry, CacheConfig, CircuitBreakerConfig, Fingerprint, RateLimiter, ResponseCache,
};
use gateway_routing::{
    ComplexityRouter, RouteCandidate, RoutePlan, RouterConfig, RoutingContext, TenantRegistry,
};
use gateway_telemetry::{CostConfig, CostTracker, Metrics, ModelPricing};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, instrument, warn, Instrument};

/// Adaptive LLM request gateway
pub struct Gateway {
    providers: ProviderRegistry,
    tenants: TenantRegistry,
    limiter: RateLimiter,
    cache: Arc<ResponseCache>,
    breakers: BreakerRegistry,
    router: ComplexityRouter,
    costs: Arc<CostTracker>,
    metrics: Arc<Metrics>,
}

impl std::fmt::Debug for Gateway {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Gateway")
            .field("providers", &self.providers)
            .field("tenants", &self.tenants.len())
            .field("cache_entries", &self.cache.len())
            .finish_non_exhaustive()
    }
}

/// Successful walk of the candidate list
struct Served<T> {
    candidate: RouteCandidate,
    value: T,
    fallbacks: Vec<AttemptFailure>,
}

/// Errors that count against a provider's breaker
fn counts_against_breaker(error: &GatewayError) -> bool {
    matches!(
        error.kind(),
        ErrorKind::ProviderError | ErrorKind::Timeout | ErrorKind::StreamingError
    )
}

fn locality_label(locality: Locality) -> &'static str {
    match locality {
        Locality::Local => "local",
        Locality::Cloud => "cloud",
    }
}

/// Fill request parameters the caller left out from the tenant's defaults
fn apply_tenant_defaults(mut request: GatewayRequest, tenant: &TenantConfig) -> GatewayRequest {
    if request.max_tokens.is_none() {
        request.max_tokens = tenant.max_tokens;
    }
    if request.temperature.is_none() {
        request.temperature = tenant.temperature;
    }
    request
}

impl Gateway {
    /// Create a builder
    #[must_use]
    pub fn builder() -> GatewayBuilder {
        GatewayBuilder::new()
    }

    /// Wire a gateway from loaded configuration.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if a provider client cannot be built, or
    /// an internal error if metrics cannot be registered.
    pub fn from_config(config: &GatewayConfig) -> Result<Self, GatewayError> {
        let providers = ProviderRegistry::from_settings(&config.providers)?;

        let breaker = CircuitBreakerConfig {
            failure_threshold: config.breaker.failure_threshold,
            cooldown: config.breaker.cooldown,
            max_cooldown: config.breaker.max_cooldown,
            half_open_max_probes: config.breaker.half_open_max_probes,
        };
        let cache = CacheConfig {
            enabled: config.cache.enabled,
            default_ttl: config.cache.default_ttl,
            max_entries: config.cache.max_entries,
            max_cacheable_temperature: config.cache.max_cacheable_temperature,
            task_ttls: config.cache.task_ttl_map(),
        };
        let router = RouterConfig {
            complexity_threshold: config.routing.complexity_threshold,
            tight_latency_ms: config.routing.tight_latency_ms,
            relaxed_latency_ms: config.routing.relaxed_latency_ms,
            size_norm_tokens: config.routing.size_norm_tokens,
            default_latency_budget_ms: config.routing.default_latency_budget_ms,
        };
        let cost = CostConfig::default().with_default_pricing(
            config.cost.default_input_per_million,
            config.cost.default_output_per_million,
        );

        let mut builder = Self::builder()
            .with_providers(providers)
            .with_default_tenant(config.default_tenant.clone())
            .with_breaker_config(breaker)
            .with_cache_config(cache)
            .with_router_config(router)
            .with_cost_config(cost);
        for tenant in &config.tenants {
            builder = builder.with_tenant(tenant.clone());
        }
        for entry in &config.cost.pricing {
            let pricing =
                ModelPricing::new(&entry.model, entry.input_per_million, entry.output_per_million);
            builder = builder.with_pricing(match &entry.provider {
                Some(provider) => pricing.for_provider(provider),
                None => pricing,
            });
        }
        builder.build()
    }

    /// Resolve a tenant and check its key.
    ///
    /// # Errors
    ///
    /// Returns an authentication error when the tenant requires a key and the
    /// presented one is missing or wrong.
    pub fn authenticate(
        &self,
        tenant_id: &str,
        presented_key: Option<&str>,
    ) -> Result<Arc<TenantConfig>, GatewayError> {
        self.tenants.authenticate(tenant_id, presented_key)
    }

    /// Serve a non-streaming request.
    ///
    /// # Errors
    ///
    /// Returns the admission error (validation, rate limit, budget) that
    /// stopped the request, or `AllProvidersFailed` once every candidate has
    /// been exhausted.
    #[instrument(skip_all, fields(tenant = %request.tenant_id, task = %request.task_type))]
    pub async fn handle(&self, request: GatewayRequest) -> Result<ChatResponse, GatewayError> {
        let started = Instant::now();
        let tenant_id = request.tenant_id.clone();

        let result = self.serve(request).await;

        let outcome = match &result {
            Ok(response) if response.cached => "cached",
            Ok(_) => "success",
            Err(err) => err.kind().as_str(),
        };
        self.metrics
            .record_request(&tenant_id, outcome, started.elapsed());
        result
    }

    async fn serve(&self, request: GatewayRequest) -> Result<ChatResponse, GatewayError> {
        request.validate()?;
        let tenant = self.tenants.get_or_register(&request.tenant_id);
        let request = apply_tenant_defaults(request, &tenant);
        self.limiter.try_acquire(&tenant.id, tenant.rate_limit)?;

        let cacheable = self.cache.is_cacheable(&request);
        let plan = self.plan(&request, &tenant)?;
        let primary = plan.candidates.first().filter(|_| cacheable);
        if let Some(primary) = primary {
            let fingerprint = Fingerprint::for_model(&request, &primary.provider, &primary.model);
            let hit = self.cache.get(&fingerprint);
            self.metrics.record_cache_lookup(hit.is_some());
            if let Some(entry) = hit {
                let response = &entry.response;
                self.costs.record_cached(
                    &tenant.id,
                    &response.provider,
                    &response.model,
                    &entry.usage,
                );
                debug!(provider = %response.provider, model = %response.model, "Served from cache");
                return Ok(ChatResponse {
                    id: response.id.clone(),
                    text: response.text.clone(),
                    usage: ResponseUsage {
                        prompt_tokens: entry.usage.prompt_tokens,
                        completion_tokens: entry.usage.completion_tokens,
                        cost_usd: 0.0,
                    },
                    provider: response.provider.clone(),
                    model: response.model.clone(),
                    cached: true,
                    finish_reason: response.finish_reason.clone(),
                    fallbacks: Vec::new(),
                });
            }
        }

        if let Some(budget) = &tenant.budget {
            self.costs.check_budget(&tenant.id, budget)?;
        }

        self.record_route(&tenant, &plan);
        let served = self
            .walk(&plan, &request, |provider, upstream| async move {
                provider.complete(&upstream).await
            })
            .await?;

        let response: CompletionResponse = served.value;
        let record = self.costs.record(
            &tenant.id,
            &served.candidate.provider,
            &served.candidate.model,
            &response.usage,
        );
        self.metrics.record_usage(
            &tenant.id,
            response.usage.prompt_tokens,
            response.usage.completion_tokens,
            record.cost_usd,
        );

        if cacheable {
            let fingerprint = Fingerprint::for_model(
                &request,
                &served.candidate.provider,
                &served.candidate.model,
            );
            let ttl = self.cache.ttl_for(&tenant, plan.score.bucket);
            self.cache
                .put(fingerprint, response.clone(), response.usage, ttl);
        }

        Ok(ChatResponse {
            id: response.id,
            text: response.text,
            usage: ResponseUsage {
                prompt_tokens: response.usage.prompt_tokens,
                completion_tokens: response.usage.completion_tokens,
                cost_usd: record.cost_usd,
            },
            provider: served.candidate.provider,
            model: served.candidate.model,
            cached: false,
            finish_reason: response.finish_reason,
            fallbacks: served.fallbacks,
        })
    }

    /// Open a streaming request.
    ///
    /// Streams skip the cache. A provider counts as healthy once its stream is
    /// open; later stream errors reach the caller but never the breaker.
    ///
    /// # Errors
    ///
    /// Same as [`handle`](Self::handle), except that failure is decided at
    /// stream open.
    #[instrument(skip_all, fields(tenant = %request.tenant_id, task = %request.task_type))]
    pub async fn handle_stream(
        &self,
        mut request: GatewayRequest,
    ) -> Result<GatewayStream, GatewayError> {
        let started = Instant::now();
        let tenant_id = request.tenant_id.clone();
        request.stream = true;

        let result = self.open_stream(request).await;

        let outcome = match &result {
            Ok(_) => "streamed",
            Err(err) => err.kind().as_str(),
        };
        self.metrics
            .record_request(&tenant_id, outcome, started.elapsed());
        result
    }

    async fn open_stream(&self, request: GatewayRequest) -> Result<GatewayStream, GatewayError> {
        request.validate()?;
        let tenant = self.tenants.get_or_register(&request.tenant_id);
        let request = apply_tenant_defaults(request, &tenant);
        self.limiter.try_acquire(&tenant.id, tenant.rate_limit)?;
        if let Some(budget) = &tenant.budget {
            self.costs.check_budget(&tenant.id, budget)?;
        }

        let plan = self.plan(&request, &tenant)?;
        self.record_route(&tenant, &plan);
        let served = self
            .walk(&plan, &request, |provider, upstream| async move {
                provider.stream(&upstream).await
            })
            .await?;

        let stream: ChunkStream = served.value;
        let metered = MeteredStream::new(
            stream,
            &tenant.id,
            &served.candidate.provider,
            &served.candidate.model,
            Arc::clone(&self.costs),
            Arc::clone(&self.metrics),
            request.estimated_tokens(),
        );

        Ok(GatewayStream {
            provider: served.candidate.provider,
            model: served.candidate.model,
            fallbacks: served.fallbacks,
            chunks: Box::pin(metered),
        })
    }

    fn plan(
        &self,
        request: &GatewayRequest,
        tenant: &TenantConfig,
    ) -> Result<RoutePlan, GatewayError> {
        let mut context = RoutingContext::new();
        for (provider, locality) in self.providers.localities() {
            let state = self.breakers.effective_state(&provider);
            context.insert(provider, locality, state);
        }

        let plan = self.router.plan(request, tenant, &context);
        let Some(primary) = plan.candidates.first() else {
            return Err(match &request.model {
                Some(model) => GatewayError::validation(
                    format!("model '{model}' is not routable for tenant '{}'", tenant.id),
                    Some("model".to_string()),
                ),
                None => GatewayError::configuration(format!(
                    "tenant '{}' has no routable models",
                    tenant.id
                )),
            });
        };

        debug!(
            score = plan.score.value,
            bucket = plan.score.bucket.as_str(),
            budget_ms = plan.score.latency_budget_ms,
            prefer_local = plan.prefer_local,
            candidates = plan.candidates.len(),
            primary = %primary.provider,
            "Route planned"
        );
        Ok(plan)
    }

    /// Count the tier decision of a plan that goes upstream
    fn record_route(&self, tenant: &TenantConfig, plan: &RoutePlan) {
        if let Some(primary) = plan.candidates.first() {
            self.metrics
                .record_route(&tenant.model_tier.to_string(), locality_label(primary.locality));
        }
    }

    /// Try candidates in order until one succeeds.
    ///
    /// Each attempt is gated by the provider's breaker and bounded by the
    /// request's latency budget. Dropping a timed-out call aborts it upstream.
    async fn walk<T, F, Fut>(
        &self,
        plan: &RoutePlan,
        request: &GatewayRequest,
        mut call: F,
    ) -> Result<Served<T>, GatewayError>
    where
        F: FnMut(Arc<dyn LLMProvider>, CompletionRequest) -> Fut,
        Fut: Future<Output = Result<T, GatewayError>>,
    {
        let budget = Duration::from_millis(plan.score.latency_budget_ms);
        let mut fallbacks = Vec::new();
        let mut last_error = None;

        for candidate in &plan.candidates {
            let Some(provider) = self.providers.get(&candidate.provider) else {
                continue;
            };
            let breaker = self.breakers.get_or_create(&candidate.provider);

            let permit = match breaker.try_acquire() {
                Ok(permit) => permit,
                Err(err) => {
                    debug!(provider = %candidate.provider, "Circuit open, skipping candidate");
                    self.metrics
                        .record_attempt(&candidate.provider, err.kind().as_str());
                    fallbacks.push(AttemptFailure::from_error(
                        &candidate.provider,
                        &candidate.model,
                        &err,
                    ));
                    last_error = Some(err);
                    continue;
                }
            };

            let upstream = CompletionRequest::for_model(request, &candidate.model);
            let started = Instant::now();
            let outcome = tokio::time::timeout(budget, call(provider, upstream))
                .instrument(gateway_telemetry::provider_span!(candidate.provider, candidate.model))
                .await
                .unwrap_or_else(|_| Err(GatewayError::timeout(&candidate.provider, budget)));

            match outcome {
                Ok(value) => {
                    permit.success();
                    self.metrics.record_attempt(&candidate.provider, "success");
                    self.metrics
                        .set_breaker_state(&candidate.provider, breaker.state() as u8);
                    info!(
                        provider = %candidate.provider,
                        model = %candidate.model,
                        duration_ms = started.elapsed().as_millis() as u64,
                        fallbacks = fallbacks.len(),
                        "Provider call succeeded"
                    );
                    return Ok(Served {
                        candidate: candidate.clone(),
                        value,
                        fallbacks,
                    });
                }
                Err(err) => {
                    if counts_against_breaker(&err) {
                        permit.failure();
                    } else {
                        drop(permit);
                    }
                    self.metrics
                        .record_attempt(&candidate.provider, err.kind().as_str());
                    self.metrics
                        .set_breaker_state(&candidate.provider, breaker.state() as u8);
                    warn!(
                        provider = %candidate.provider,
                        model = %candidate.model,
                        duration_ms = started.elapsed().as_millis() as u64,
                        error = %err,
                        "Provider call failed, trying next candidate"
                    );
                    fallbacks.push(AttemptFailure::from_error(
                        &candidate.provider,
                        &candidate.model,
                        &err,
                    ));
                    last_error = Some(err);
                }
            }
        }

        Err(GatewayError::all_providers_failed(fallbacks, last_error))
    }

    /// Breaker state of every registered provider
    #[must_use]
    pub fn provider_health(&self) -> Vec<ProviderHealth> {
        self.providers
            .ids()
            .iter()
            .filter_map(|id| self.providers.get(id))
            .map(|provider| {
                let state = self.breakers.effective_state(provider.id());
                self.metrics.set_breaker_state(provider.id(), state as u8);
                ProviderHealth {
                    name: provider.id().to_string(),
                    breaker_state: state,
                    provider_type: provider.provider_type(),
                    locality: provider.locality(),
                }
            })
            .collect()
    }

    /// Aggregate health
    #[must_use]
    pub fn health(&self) -> HealthReport {
        HealthReport::from_providers(self.provider_health())
    }

    /// Usage aggregates, optionally for one tenant.
    ///
    /// Analytics use the tenant's configured budget for the projection and
    /// alerts.
    #[must_use]
    pub fn costs(&self, query: &CostQuery) -> CostReport {
        let summaries = match &query.tenant_id {
            Some(tenant_id) => vec![self.costs.tenant_summary(tenant_id)],
            None => self.costs.all_summaries(),
        };
        let total_cost_usd = summaries.iter().map(|s| s.totals.cost_usd).sum();
        let tenants = summaries
            .into_iter()
            .map(|summary| {
                let records = query
                    .records
                    .map(|limit| self.costs.recent_records(&summary.tenant_id, limit));
                let analytics = query.analytics.then(|| {
                    let tenant = self.tenants.get(&summary.tenant_id);
                    let budget = tenant.as_ref().and_then(|t| t.budget.as_ref());
                    self.costs.analytics(&summary.tenant_id, budget)
                });
                TenantCosts {
                    summary,
                    records,
                    analytics,
                }
            })
            .collect();
        CostReport {
            tenants,
            total_cost_usd,
        }
    }

    /// Known tenants, without secrets
    #[must_use]
    pub fn tenants(&self) -> Vec<TenantView> {
        self.tenants
            .list()
            .iter()
            .map(|tenant| TenantView::new(tenant, self.limiter.available(&tenant.id)))
            .collect()
    }

    /// Prometheus metrics
    #[must_use]
    pub fn metrics(&self) -> &Arc<Metrics> {
        &self.metrics
    }

    /// Response cache
    #[must_use]
    pub fn cache(&self) -> &Arc<ResponseCache> {
        &self.cache
    }

    /// Usage ledger
    #[must_use]
    pub fn cost_tracker(&self) -> &Arc<CostTracker> {
        &self.costs
    }

    /// Per-provider circuit breakers
    #[must_use]
    pub fn breakers(&self) -> &BreakerRegistry {
        &self.breakers
    }
}

/// Builder for [`Gateway`]
#[derive(Debug, Default)]
pub struct GatewayBuilder {
    providers: ProviderRegistry,
    template: Option<TenantConfig>,
    tenants: Vec<TenantConfig>,
    breaker: CircuitBreakerConfig,
    cache: CacheConfig,
    router: RouterConfig,
    cost: CostConfig,
    pricing: Vec<ModelPricing>,
    metrics: Option<Arc<Metrics>>,
}

impl GatewayBuilder {
    /// Create a builder with default component settings
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a provider
    #[must_use]
    pub fn with_provider(mut self, provider: Arc<dyn LLMProvider>) -> Self {
        self.providers.register(provider);
        self
    }

    /// Replace the provider registry
    #[must_use]
    pub fn with_providers(mut self, providers: ProviderRegistry) -> Self {
        self.providers = providers;
        self
    }

    /// Template for tenants first seen at request time
    #[must_use]
    pub fn with_default_tenant(mut self, template: TenantConfig) -> Self {
        self.template = Some(template);
        self
    }

    /// Register a configured tenant
    #[must_use]
    pub fn with_tenant(mut self, tenant: TenantConfig) -> Self {
        self.tenants.push(tenant);
        self
    }

    /// Breaker settings shared by every provider
    #[must_use]
    pub fn with_breaker_config(mut self, config: CircuitBreakerConfig) -> Self {
        self.breaker = config;
        self
    }

    /// Cache settings
    #[must_use]
    pub fn with_cache_config(mut self, config: CacheConfig) -> Self {
        self.cache = config;
        self
    }

    /// Router settings
    #[must_use]
    pub fn with_router_config(mut self, config: RouterConfig) -> Self {
        self.router = config;
        self
    }

    /// Cost tracker settings
    #[must_use]
    pub fn with_cost_config(mut self, config: CostConfig) -> Self {
        self.cost = config;
        self
    }

    /// Add a model price, overriding built-in pricing for that model
    #[must_use]
    pub fn with_pricing(mut self, pricing: ModelPricing) -> Self {
        self.pricing.push(pricing);
        self
    }

    /// Share a metrics registry
    #[must_use]
    pub fn with_metrics(mut self, metrics: Arc<Metrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Build the gateway.
    ///
    /// Local providers are registered as free in the cost tracker.
    ///
    /// # Errors
    ///
    /// Returns an internal error if metrics cannot be registered.
    pub fn build(self) -> Result<Gateway, GatewayError> {
        let metrics = match self.metrics {
            Some(metrics) => metrics,
            None => Arc::new(Metrics::new().map_err(|e| GatewayError::internal(e.to_string()))?),
        };

        let costs = CostTracker::new(self.cost);
        for pricing in self.pricing {
            costs.register_pricing(pricing);
        }
        for (provider, locality) in self.providers.localities() {
            if locality == Locality::Local {
                costs.register_free_provider(provider);
            }
        }

        let template = self
            .template
            .unwrap_or_else(|| TenantConfig::new("default"));

        info!(
            providers = self.providers.len(),
            tenants = self.tenants.len(),
            "Gateway assembled"
        );

        Ok(Gateway {
            providers: self.providers,
            tenants: TenantRegistry::with_tenants(template, self.tenants),
            limiter: RateLimiter::new(),
            cache: Arc::new(ResponseCache::new(self.cache)),
            breakers: BreakerRegistry::new(self.breaker),
            router: ComplexityRouter::new(self.router),
            costs: Arc::new(costs),
            metrics,
        })
    }
}
