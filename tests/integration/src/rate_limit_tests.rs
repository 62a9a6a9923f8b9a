//! Per-tenant rate limiting through the gateway

use crate::fixtures::*;
use crate::helpers::build_gateway;
use gateway_core::{ErrorKind, GatewayError};
use std::time::Duration;

#[tokio::test]
async fn test_burst_is_limited_per_tenant() {
    let upstreams = Upstreams::start().await;
    upstreams.ollama.reply("llama3.2", "ok").await;
    let gateway = build_gateway(&upstreams.config());

    for prompt in ["one", "two"] {
        gateway.handle(gateway_request("burst", prompt, 30_000)).await.unwrap();
    }

    let err = gateway.handle(gateway_request("burst", "three", 30_000)).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::RateLimited);
    match err {
        GatewayError::RateLimited { retry_after, .. } => assert!(retry_after > Duration::ZERO),
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(upstreams.ollama.calls().await, 2);

    let other = gateway.handle(gateway_request("ada", "three", 30_000)).await;
    assert!(other.is_ok());
}

#[tokio::test]
async fn test_rate_limit_applies_before_cache() {
    let upstreams = Upstreams::start().await;
    upstreams.ollama.reply("llama3.2", "ok").await;
    let gateway = build_gateway(&upstreams.config());

    for _ in 0..2 {
        gateway.handle(gateway_request("burst", "same", 30_000)).await.unwrap();
    }
    let err = gateway.handle(gateway_request("burst", "same", 30_000)).await.unwrap_err();

    assert_eq!(err.kind(), ErrorKind::RateLimited);
    assert_eq!(upstreams.ollama.calls().await, 1);
}
