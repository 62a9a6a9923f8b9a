//! Route definitions for the gateway API.

use axum::{
    routing::{get, post},
    Router,
};
use tower_http::timeout::TimeoutLayer;

use crate::{handlers, middleware, state::AppState};

/// Create the main API router.
///
/// `/health` and `/metrics` are always open; the chat, tenant and cost routes
/// require the shared bearer token when one is configured.
pub fn create_router(state: AppState) -> Router {
    let protected = Router::new()
        .route("/v1/chat", post(handlers::chat))
        .route("/v1/chat/stream", post(handlers::chat_stream))
        .route("/v1/tenants", get(handlers::list_tenants))
        .route("/costs", get(handlers::costs))
        .route_layer(axum::middleware::from_fn_with_state(
            state.clone(),
            middleware::require_bearer,
        ));

    Router::new()
        .route("/health", get(handlers::health))
        .route("/metrics", get(handlers::metrics_endpoint))
        .merge(protected)
        .layer(TimeoutLayer::new(state.request_timeout))
        .layer(axum::middleware::from_fn(middleware::logging_middleware))
        .layer(axum::middleware::from_fn(middleware::request_id_middleware))
        .layer(middleware::cors_layer(&state.allowed_origins))
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{
        body::Body,
        http::{header, Request, StatusCode},
    };
    use gateway_core::{Locality, ModelRoute, ModelTier, TenantConfig};
    use gateway_orchestrator::Gateway;
    use gateway_providers::{MockBehavior, MockProvider};
    use secrecy::SecretString;
    use std::sync::Arc;
    use tower::ServiceExt;

    fn create_test_state() -> AppState {
        let gateway = Gateway::builder()
            .with_provider(Arc::new(MockProvider::new("ollama")))
            .with_provider(Arc::new(
                MockProvider::new("openai")
                    .with_locality(Locality::Cloud)
                    .with_default(MockBehavior::fail(503, "overloaded")),
            ))
            .with_tenant(
                TenantConfig::new("ada")
                    .with_tier(ModelTier::LocalSlm)
                    .with_route(ModelRoute::new("ollama", "llama3.2")),
            )
            .with_tenant(
                TenantConfig::new("david")
                    .with_tier(ModelTier::CloudLlm)
                    .with_route(ModelRoute::new("openai", "gpt-4o")),
            )
            .with_tenant(
                TenantConfig::new("locked")
                    .with_api_key("tenant-key")
                    .with_route(ModelRoute::new("ollama", "llama3.2")),
            )
            .build()
            .unwrap();
        AppState::new(Arc::new(gateway))
    }

    fn chat(body: &str) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri("/v1/chat")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    async fn json_body(response: axum::response::Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_health_endpoint() {
        let app = create_router(create_test_state());

        let response = app
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = json_body(response).await;
        assert_eq!(body["status"], "healthy");
        assert_eq!(body["providers"][0]["name"], "ollama");
        assert_eq!(body["providers"][0]["breakerState"], "closed");
    }

    #[tokio::test]
    async fn test_metrics_endpoint() {
        let app = create_router(create_test_state());

        let response = app
            .oneshot(Request::builder().uri("/metrics").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers()[header::CONTENT_TYPE],
            "text/plain; version=0.0.4"
        );
    }

    #[tokio::test]
    async fn test_chat_endpoint() {
        let app = create_router(create_test_state());

        let response = app
            .oneshot(chat(
                r#"{"tenantId":"ada","taskType":"chat","latencyBudgetMs":500,
                    "messages":[{"role":"user","content":"hi"}]}"#,
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert!(response.headers().contains_key("x-request-id"));
        let body = json_body(response).await;
        assert_eq!(body["provider"], "ollama");
        assert_eq!(body["text"], "Echo: hi");
        assert_eq!(body["cached"], false);
        assert!(body["usage"]["promptTokens"].as_u64().unwrap() > 0);
    }

    #[tokio::test]
    async fn test_chat_rejects_invalid_body() {
        let app = create_router(create_test_state());

        let response = app
            .oneshot(chat(r#"{"tenantId":"ada","messages":[]}"#))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = json_body(response).await;
        assert_eq!(body["error"]["kind"], "validation_error");
    }

    #[tokio::test]
    async fn test_all_providers_failed_is_bad_gateway() {
        let app = create_router(create_test_state());

        let response = app
            .oneshot(chat(
                r#"{"tenantId":"david","messages":[{"role":"user","content":"hi"}]}"#,
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
        let body = json_body(response).await;
        assert_eq!(body["error"]["kind"], "all_providers_failed");
        assert_eq!(body["error"]["attempts"][0]["provider"], "openai");
    }

    #[tokio::test]
    async fn test_tenant_key_is_checked() {
        let app = create_router(create_test_state());
        let body = r#"{"tenantId":"locked","messages":[{"role":"user","content":"hi"}]}"#;

        let response = app.clone().oneshot(chat(body)).await.unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

        let mut request = chat(body);
        request
            .headers_mut()
            .insert("x-tenant-key", "tenant-key".parse().unwrap());
        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_bearer_token_guards_protected_routes() {
        let state = create_test_state().with_auth_token(SecretString::new("s3cret".to_string()));
        let app = create_router(state);

        let response = app
            .clone()
            .oneshot(Request::builder().uri("/costs").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

        let response = app
            .clone()
            .oneshot(
                Request::builder()
                    .uri("/costs")
                    .header(header::AUTHORIZATION, "Bearer s3cret")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let response = app
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_costs_and_tenants_endpoints() {
        let app = create_router(create_test_state());

        let response = app
            .clone()
            .oneshot(chat(
                r#"{"tenantId":"ada","messages":[{"role":"user","content":"hi"}]}"#,
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let response = app
            .clone()
            .oneshot(
                Request::builder()
                    .uri("/costs?tenantId=ada&includeRecords=true&limit=5")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = json_body(response).await;
        assert_eq!(body["tenants"][0]["tenantId"], "ada");
        assert_eq!(body["tenants"][0]["requests"], 1);
        assert_eq!(body["tenants"][0]["records"][0]["provider"], "ollama");
        assert!(body["tenants"][0].get("analytics").is_none());

        let response = app
            .clone()
            .oneshot(
                Request::builder()
                    .uri("/costs?tenantId=ada&includeForecast=true")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        let body = json_body(response).await;
        let analytics = &body["tenants"][0]["analytics"];
        assert_eq!(analytics["trends"]["lastHour"]["requests"], 1);
        assert!(analytics["forecast"]["projectedMonthUsd"].is_number());
        assert_eq!(analytics["alerts"].as_array().unwrap().len(), 0);

        let response = app
            .oneshot(Request::builder().uri("/v1/tenants").body(Body::empty()).unwrap())
            .await
            .unwrap();
        let body = json_body(response).await;
        let tenants = body["tenants"].as_array().unwrap();
        assert_eq!(tenants.len(), 3);
        assert!(!body.to_string().contains("tenant-key"));
    }

    #[tokio::test]
    async fn test_stream_endpoint_emits_sse() {
        let app = create_router(create_test_state());

        let response = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/v1/chat/stream")
                    .header(header::CONTENT_TYPE, "application/json")
                    .body(Body::from(
                        r#"{"tenantId":"ada",
                            "messages":[{"role":"user","content":"hello world"}]}"#,
                    ))
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert!(response.headers()[header::CONTENT_TYPE]
            .to_str()
            .unwrap()
            .starts_with("text/event-stream"));
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let text = String::from_utf8(bytes.to_vec()).unwrap();
        assert!(text.contains("event: route"));
        assert!(text.contains("Echo: "));
        assert!(text.contains("data: [DONE]"));
    }
}
