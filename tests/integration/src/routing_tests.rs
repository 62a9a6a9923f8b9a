//! Routing, fallback and circuit breaking over real HTTP upstreams

use crate::fixtures::*;
use crate::helpers::build_gateway;
use gateway_core::{ErrorKind, GatewayError};
use gateway_orchestrator::CostQuery;
use gateway_resilience::CircuitState;
use std::time::Duration;

#[tokio::test]
async fn test_local_tenant_is_served_by_ollama() {
    let upstreams = Upstreams::start().await;
    upstreams.ollama.reply("llama3.2", "local answer").await;
    upstreams.openai.reply("gpt-4o-mini", "cloud answer").await;
    let gateway = build_gateway(&upstreams.config());

    let response = gateway.handle(gateway_request("ada", "hi", 30_000)).await.unwrap();

    assert_eq!(response.provider, "ollama");
    assert_eq!(response.model, "llama3.2");
    assert_eq!(response.text, "local answer");
    assert_eq!(upstreams.openai.calls().await, 0);
    assert_eq!(upstreams.anthropic.calls().await, 0);
}

#[tokio::test]
async fn test_cloud_tenant_falls_back_between_cloud_providers() {
    let upstreams = Upstreams::start().await;
    upstreams.openai.fail(503, "overloaded").await;
    upstreams.anthropic.reply("claude-3-haiku", "from anthropic").await;
    upstreams.ollama.reply("llama3.2", "local answer").await;
    let gateway = build_gateway(&upstreams.config());

    let response = gateway.handle(gateway_request("david", "hi", 30_000)).await.unwrap();

    assert_eq!(response.provider, "anthropic");
    assert_eq!(response.fallbacks.len(), 1);
    assert_eq!(response.fallbacks[0].provider, "openai");
    assert_eq!(response.fallbacks[0].kind, ErrorKind::ProviderError);
    assert_eq!(upstreams.ollama.calls().await, 0);
}

#[tokio::test]
async fn test_hybrid_tenant_routes_by_latency_budget() {
    let upstreams = Upstreams::start().await;
    upstreams.ollama.reply("llama3.2", "local answer").await;
    upstreams.openai.reply("gpt-4o-mini", "cloud answer").await;
    let gateway = build_gateway(&upstreams.config());

    let tight = gateway.handle(gateway_request("mixed", "quick one", 500)).await.unwrap();
    assert_eq!(tight.provider, "ollama");

    let relaxed = gateway
        .handle(gateway_request("mixed", "take your time", 20_000))
        .await
        .unwrap();
    assert_eq!(relaxed.provider, "openai");
}

#[tokio::test]
async fn test_breaker_opens_and_skips_failing_provider() {
    let upstreams = Upstreams::start().await;
    upstreams.openai.fail(500, "boom").await;
    upstreams.anthropic.reply("claude-3-haiku", "steady").await;
    let gateway = build_gateway(&upstreams.config());

    for prompt in ["first", "second"] {
        let response = gateway.handle(gateway_request("david", prompt, 30_000)).await.unwrap();
        assert_eq!(response.provider, "anthropic");
    }
    assert_eq!(upstreams.openai.calls().await, 2);
    assert_eq!(gateway.breakers().effective_state("openai"), CircuitState::Open);

    let response = gateway.handle(gateway_request("david", "third", 30_000)).await.unwrap();
    assert_eq!(response.provider, "anthropic");
    assert_eq!(upstreams.openai.calls().await, 2);

    let health = gateway.health();
    assert_eq!(health.status, "degraded");
}

#[tokio::test]
async fn test_every_candidate_failing_reports_each_attempt() {
    let upstreams = Upstreams::start().await;
    upstreams.openai.fail(502, "bad gateway").await;
    upstreams.anthropic.fail(529, "overloaded").await;
    let gateway = build_gateway(&upstreams.config());

    let err = gateway.handle(gateway_request("david", "hi", 30_000)).await.unwrap_err();

    match err {
        GatewayError::AllProvidersFailed { attempts, .. } => {
            let providers: Vec<_> = attempts.iter().map(|a| a.provider.as_str()).collect();
            assert_eq!(providers, vec!["openai", "anthropic"]);
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[tokio::test]
async fn test_latency_budget_abandons_slow_local_model() {
    let upstreams = Upstreams::start().await;
    upstreams
        .ollama
        .reply_after("llama3.2", "too late", Duration::from_secs(3))
        .await;
    upstreams.openai.reply("gpt-4o-mini", "cloud answer").await;
    let gateway = build_gateway(&upstreams.config());

    let response = gateway.handle(gateway_request("mixed", "quick", 300)).await.unwrap();

    assert_eq!(response.provider, "openai");
    assert_eq!(response.fallbacks[0].provider, "ollama");
    assert_eq!(response.fallbacks[0].kind, ErrorKind::Timeout);
}

#[tokio::test]
async fn test_usage_is_priced_per_provider() {
    let upstreams = Upstreams::start().await;
    upstreams.ollama.reply("llama3.2", "local answer").await;
    upstreams.openai.reply("gpt-4o-mini", "cloud answer").await;
    let gateway = build_gateway(&upstreams.config());

    let local = gateway.handle(gateway_request("ada", "hi", 30_000)).await.unwrap();
    let cloud = gateway.handle(gateway_request("david", "hi", 30_000)).await.unwrap();

    assert!(local.usage.cost_usd.abs() < f64::EPSILON);
    assert!(cloud.usage.cost_usd > 0.0);
    assert_eq!(cloud.usage.prompt_tokens, 12);

    let report = gateway.costs(&CostQuery {
        tenant_id: Some("david".to_string()),
        records: Some(10),
        ..CostQuery::default()
    });
    assert_eq!(report.tenants.len(), 1);
    let records = report.tenants[0].records.as_ref().unwrap();
    assert_eq!(records[0].provider, "openai");
    assert!((report.total_cost_usd - cloud.usage.cost_usd).abs() < 1e-12);
}
