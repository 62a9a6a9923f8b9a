//! Response cache behavior through the gateway

use crate::fixtures::*;
use crate::helpers::build_gateway;
use gateway_core::{ChatMessage, GatewayRequest};

fn with_temperature(
    tenant: &str,
    content: &str,
    temperature: f32,
    cacheable: Option<bool>,
) -> GatewayRequest {
    let mut builder = GatewayRequest::builder()
        .tenant(tenant)
        .message(ChatMessage::user(content))
        .temperature(temperature);
    if let Some(flag) = cacheable {
        builder = builder.cacheable(flag);
    }
    builder.build().unwrap()
}

#[tokio::test]
async fn test_identical_requests_call_upstream_once() {
    let upstreams = Upstreams::start().await;
    upstreams.ollama.reply("llama3.2", "cached answer").await;
    let gateway = build_gateway(&upstreams.config());

    let first = gateway.handle(gateway_request("ada", "same question", 30_000)).await.unwrap();
    let second = gateway.handle(gateway_request("ada", "same question", 30_000)).await.unwrap();

    assert!(!first.cached);
    assert!(second.cached);
    assert_eq!(second.text, "cached answer");
    assert!(second.usage.cost_usd.abs() < f64::EPSILON);
    assert_eq!(upstreams.ollama.calls().await, 1);

    let summary = gateway.cost_tracker().tenant_summary("ada");
    assert_eq!(summary.totals.requests, 2);
    assert_eq!(summary.totals.cached_requests, 1);
}

#[tokio::test]
async fn test_sampling_temperature_controls_caching() {
    let upstreams = Upstreams::start().await;
    upstreams.ollama.reply("llama3.2", "creative").await;
    let gateway = build_gateway(&upstreams.config());

    for _ in 0..2 {
        gateway
            .handle(with_temperature("ada", "write a poem", 0.9, None))
            .await
            .unwrap();
    }
    assert_eq!(upstreams.ollama.calls().await, 2);

    for _ in 0..2 {
        gateway
            .handle(with_temperature("ada", "write a haiku", 0.9, Some(true)))
            .await
            .unwrap();
    }
    assert_eq!(upstreams.ollama.calls().await, 3);
}

#[tokio::test]
async fn test_tenants_with_identical_routing_share_entries() {
    let upstreams = Upstreams::start().await;
    upstreams.ollama.reply("llama3.2", "shared").await;
    let gateway = build_gateway(&upstreams.config());

    gateway.handle(gateway_request("ada", "common prompt", 30_000)).await.unwrap();
    let other = gateway.handle(gateway_request("burst", "common prompt", 30_000)).await.unwrap();

    assert!(other.cached);
    assert_eq!(upstreams.ollama.calls().await, 1);
}

#[tokio::test]
async fn test_different_routing_never_shares_entries() {
    let upstreams = Upstreams::start().await;
    upstreams.ollama.reply("llama3.2", "local").await;
    upstreams.openai.reply("gpt-4o-mini", "cloud").await;
    let gateway = build_gateway(&upstreams.config());

    gateway.handle(gateway_request("ada", "same words", 30_000)).await.unwrap();
    let cloud = gateway.handle(gateway_request("david", "same words", 30_000)).await.unwrap();

    assert!(!cloud.cached);
    assert_eq!(cloud.text, "cloud");
}

#[tokio::test]
async fn test_hybrid_budget_change_never_serves_other_models_answer() {
    let upstreams = Upstreams::start().await;
    upstreams.ollama.reply("llama3.2", "local answer").await;
    upstreams.openai.reply("gpt-4o-mini", "cloud answer").await;
    let gateway = build_gateway(&upstreams.config());

    let tight = gateway.handle(gateway_request("mixed", "same prompt", 500)).await.unwrap();
    assert_eq!(tight.provider, "ollama");

    let relaxed = gateway
        .handle(gateway_request("mixed", "same prompt", 20_000))
        .await
        .unwrap();
    assert_eq!(relaxed.provider, "openai");
    assert!(!relaxed.cached);
    assert_eq!(relaxed.text, "cloud answer");
    assert_eq!(upstreams.openai.calls().await, 1);
}

#[tokio::test]
async fn test_fallback_answer_is_keyed_by_the_model_that_served_it() {
    let upstreams = Upstreams::start().await;
    upstreams.openai.fail(503, "overloaded").await;
    upstreams.anthropic.reply("claude-3-haiku", "from anthropic").await;
    let gateway = build_gateway(&upstreams.config());

    for _ in 0..2 {
        let response = gateway.handle(gateway_request("david", "fallback", 30_000)).await.unwrap();
        assert_eq!(response.provider, "anthropic");
        assert!(!response.cached);
    }
    assert_eq!(upstreams.anthropic.calls().await, 2);

    // openai's breaker is now open, so anthropic leads the plan
    let third = gateway.handle(gateway_request("david", "fallback", 30_000)).await.unwrap();
    assert!(third.cached);
    assert_eq!(third.provider, "anthropic");
    assert_eq!(third.text, "from anthropic");
    assert_eq!(upstreams.openai.calls().await, 2);
    assert_eq!(upstreams.anthropic.calls().await, 2);
}

#[tokio::test]
async fn test_failed_requests_are_not_cached() {
    let upstreams = Upstreams::start().await;
    upstreams.ollama.fail(500, "crashed").await;
    let gateway = build_gateway(&upstreams.config());

    assert!(gateway.handle(gateway_request("ada", "hi", 30_000)).await.is_err());
    assert!(gateway.cache().is_empty());
}
