//! The HTTP surface end to end, against mock upstreams

use crate::fixtures::*;
use crate::helpers::*;
use secrecy::SecretString;
use serde_json::{json, Value};

#[tokio::test]
async fn test_chat_round_trip() {
    let upstreams = Upstreams::start().await;
    upstreams.ollama.reply("llama3.2", "local answer").await;
    let server = TestServer::start(&upstreams.config()).await;

    let response = server
        .post_json_with_headers(
            "/v1/chat",
            &chat_body("ada", "hello"),
            &[("x-request-id", "req-42")],
        )
        .await;

    assert_status(&response, 200);
    assert_eq!(response.headers()["x-request-id"], "req-42");
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["provider"], "ollama");
    assert_eq!(body["model"], "llama3.2");
    assert_eq!(body["text"], "local answer");
    assert_eq!(body["usage"]["promptTokens"], 10);
    assert_eq!(body["usage"]["completionTokens"], 5);
    assert_eq!(body["cached"], false);
}

#[tokio::test]
async fn test_stream_round_trip_is_metered() {
    let upstreams = Upstreams::start().await;
    upstreams.openai.stream("gpt-4o-mini", &["Hel", "lo"]).await;
    let server = TestServer::start(&upstreams.config()).await;

    let response = server.post_json("/v1/chat/stream", &chat_body("david", "stream please")).await;
    assert_status(&response, 200);
    let text = response.text().await.unwrap();
    let events = parse_sse(&text);

    assert_eq!(events[0].0.as_deref(), Some("route"));
    let route: Value = serde_json::from_str(&events[0].1).unwrap();
    assert_eq!(route["provider"], "openai");

    let deltas: String = events
        .iter()
        .filter(|(event, data)| event.is_none() && data != "[DONE]")
        .filter_map(|(_, data)| serde_json::from_str::<Value>(data).ok())
        .filter_map(|chunk| chunk["delta"].as_str().map(String::from))
        .collect();
    assert_eq!(deltas, "Hello");
    assert_eq!(events.last().unwrap().1, "[DONE]");

    let summary = server.gateway.cost_tracker().tenant_summary("david");
    assert_eq!(summary.totals.requests, 1);
    assert_eq!(summary.totals.prompt_tokens, 9);
    assert_eq!(summary.totals.completion_tokens, 4);
    assert!(server.gateway.cache().is_empty());
}

#[tokio::test]
async fn test_stream_flag_on_chat_route() {
    let upstreams = Upstreams::start().await;
    upstreams.ollama.stream("llama3.2", &["a", "b"]).await;
    let server = TestServer::start(&upstreams.config()).await;

    let mut body = chat_body("ada", "hi");
    body["stream"] = json!(true);
    let response = server.post_json("/v1/chat", &body).await;

    assert_status(&response, 200);
    assert!(response.headers()["content-type"]
        .to_str()
        .unwrap()
        .starts_with("text/event-stream"));
    let text = response.text().await.unwrap();
    assert!(text.contains("data: [DONE]"));
}

#[tokio::test]
async fn test_rate_limited_response_carries_retry_after() {
    let upstreams = Upstreams::start().await;
    upstreams.ollama.reply("llama3.2", "ok").await;
    let server = TestServer::start(&upstreams.config()).await;

    for prompt in ["one", "two"] {
        assert_status(&server.post_json("/v1/chat", &chat_body("burst", prompt)).await, 200);
    }
    let response = server.post_json("/v1/chat", &chat_body("burst", "three")).await;

    assert_status(&response, 429);
    assert!(response.headers().contains_key("retry-after"));
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["error"]["kind"], "rate_limited");
}

#[tokio::test]
async fn test_exhausted_candidates_map_to_bad_gateway() {
    let upstreams = Upstreams::start().await;
    upstreams.openai.fail(500, "boom").await;
    upstreams.anthropic.fail(500, "bang").await;
    let server = TestServer::start(&upstreams.config()).await;

    let response = server.post_json("/v1/chat", &chat_body("david", "hi")).await;

    assert_status(&response, 502);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["error"]["kind"], "all_providers_failed");
    assert_eq!(body["error"]["attempts"].as_array().unwrap().len(), 2);
}

#[tokio::test]
async fn test_bearer_token_from_config() {
    let upstreams = Upstreams::start().await;
    upstreams.ollama.reply("llama3.2", "ok").await;
    let mut config = upstreams.config();
    config.server.auth_token = Some(SecretString::new("gateway-secret".to_string()));
    let server = TestServer::start(&config).await;

    let denied = server.post_json("/v1/chat", &chat_body("ada", "hi")).await;
    assert_status(&denied, 401);

    let allowed = server
        .post_json_with_headers(
            "/v1/chat",
            &chat_body("ada", "hi"),
            &[("authorization", "Bearer gateway-secret")],
        )
        .await;
    assert_status(&allowed, 200);

    assert_status(&server.get("/health").await, 200);
}

#[tokio::test]
async fn test_observability_endpoints() {
    let upstreams = Upstreams::start().await;
    upstreams.ollama.reply("llama3.2", "ok").await;
    upstreams.openai.reply("gpt-4o-mini", "ok").await;
    let server = TestServer::start(&upstreams.config()).await;

    server.post_json("/v1/chat", &chat_body("ada", "hi")).await;
    server.post_json("/v1/chat", &chat_body("ada", "hi")).await;
    server.post_json("/v1/chat", &chat_body_with_budget("david", "hi", 10_000)).await;

    let health: Value = server.get("/health").await.json().await.unwrap();
    assert_eq!(health["status"], "healthy");
    assert_eq!(health["providers"].as_array().unwrap().len(), 3);

    let metrics = server.get("/metrics").await.text().await.unwrap();
    assert!(metrics.contains("gateway_requests_total"));
    assert!(metrics.contains("gateway_cache_lookups_total{result=\"hit\"} 1"));

    let costs: Value = server.get("/costs?includeRecords=true").await.json().await.unwrap();
    let tenants = costs["tenants"].as_array().unwrap();
    assert_eq!(tenants.len(), 2);
    assert!(costs["totalCostUsd"].as_f64().unwrap() > 0.0);

    let listing: Value = server.get("/v1/tenants").await.json().await.unwrap();
    let ids: Vec<&str> = listing["tenants"]
        .as_array()
        .unwrap()
        .iter()
        .filter_map(|t| t["id"].as_str())
        .collect();
    assert_eq!(ids, vec!["ada", "burst", "david", "mixed"]);
}

#[tokio::test]
async fn test_tenant_files_are_served() {
    let upstreams = Upstreams::start().await;
    upstreams.ollama.reply("llama3.2", "from file tenant").await;

    let dir = tempfile::tempdir().unwrap();
    let tenants = dir.path().join("tenants");
    tokio::fs::create_dir(&tenants).await.unwrap();
    tokio::fs::write(
        tenants.join("grace.yaml"),
        concat!(
            "model_tier: local_slm\napi_key: grace-key\n",
            "models:\n  - provider: ollama\n    model: llama3.2\n",
        ),
    )
    .await
    .unwrap();
    let file = dir.path().join("gateway.yaml");
    tokio::fs::write(
        &file,
        format!(
            concat!(
                "providers:\n  - id: ollama\n    type: ollama\n    endpoint: \"{}\"\n",
                "    default_model: llama3.2\ntenants_dir: tenants\n",
            ),
            upstreams.ollama.endpoint()
        ),
    )
    .await
    .unwrap();

    let config = gateway_config::ConfigLoader::new()
        .with_file(&file)
        .with_env_overrides(false)
        .with_env_providers(false)
        .load()
        .await
        .unwrap();
    let server = TestServer::start(&config).await;

    let denied = server.post_json("/v1/chat", &chat_body("grace", "hi")).await;
    assert_status(&denied, 401);

    let response = server
        .post_json_with_headers(
            "/v1/chat",
            &chat_body("grace", "hi"),
            &[("x-tenant-key", "grace-key")],
        )
        .await;
    assert_status(&response, 200);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["text"], "from file tenant");
}
