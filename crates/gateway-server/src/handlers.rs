//! HTTP request handlers for the gateway API.

use axum::{
    extract::{Query, State},
    http::{header, StatusCode},
    response::{
        sse::{Event, KeepAlive, Sse},
        IntoResponse, Response,
    },
    Json,
};
use futures::stream::{self, StreamExt};
use gateway_core::GatewayRequest;
use gateway_orchestrator::{CostQuery, CostReport, GatewayStream, HealthReport, TenantView};
use gateway_telemetry::gateway_request_span;
use serde::{Deserialize, Serialize};
use std::convert::Infallible;
use tracing::{debug, Instrument};

use crate::{
    error::ApiError,
    extractors::{JsonBody, RequestId, TenantKey},
    state::AppState,
};

/// Records returned when `includeRecords` is set without a `limit`
const DEFAULT_RECORD_LIMIT: usize = 50;

/// Validate the body and check the caller's tenant key
fn admit(state: &AppState, request: &GatewayRequest, key: Option<&str>) -> Result<(), ApiError> {
    request.validate()?;
    state.gateway.authenticate(&request.tenant_id, key)?;
    Ok(())
}

/// Chat endpoint; answers with SSE when the body sets `stream`
pub async fn chat(
    State(state): State<AppState>,
    RequestId(request_id): RequestId,
    TenantKey(key): TenantKey,
    JsonBody(request): JsonBody<GatewayRequest>,
) -> Result<Response, ApiError> {
    admit(&state, &request, key.as_deref())?;
    let span = gateway_request_span!(request_id, request.tenant_id);

    if request.stream {
        let stream = state.gateway.handle_stream(request).instrument(span).await?;
        return Ok(sse_response(&request_id, stream));
    }

    let response = state.gateway.handle(request).instrument(span).await?;
    debug!(
        request_id = %request_id,
        provider = %response.provider,
        cached = response.cached,
        "Chat served"
    );
    Ok(Json(response).into_response())
}

/// Streaming chat endpoint
pub async fn chat_stream(
    State(state): State<AppState>,
    RequestId(request_id): RequestId,
    TenantKey(key): TenantKey,
    JsonBody(request): JsonBody<GatewayRequest>,
) -> Result<Response, ApiError> {
    admit(&state, &request, key.as_deref())?;
    let span = gateway_request_span!(request_id, request.tenant_id);
    let stream = state.gateway.handle_stream(request).instrument(span).await?;
    Ok(sse_response(&request_id, stream))
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct RouteEvent<'a> {
    request_id: &'a str,
    provider: &'a str,
    model: &'a str,
    fallbacks: usize,
}

/// `route` event, one data event per chunk, `error` on failure, then `[DONE]`
fn sse_response(request_id: &str, opened: GatewayStream) -> Response {
    let route = serde_json::to_string(&RouteEvent {
        request_id,
        provider: &opened.provider,
        model: &opened.model,
        fallbacks: opened.fallbacks.len(),
    })
    .unwrap_or_default();
    let head = stream::once(async move {
        Ok::<_, Infallible>(Event::default().event("route").data(route))
    });

    let body = opened.chunks.map(|item| {
        let event = match item {
            Ok(chunk) => Event::default().data(serde_json::to_string(&chunk).unwrap_or_default()),
            Err(err) => Event::default()
                .event("error")
                .data(ApiError::from(err).body().to_string()),
        };
        Ok::<_, Infallible>(event)
    });

    let done = stream::once(async { Ok::<_, Infallible>(Event::default().data("[DONE]")) });

    Sse::new(head.chain(body).chain(done))
        .keep_alive(KeepAlive::default())
        .into_response()
}

/// Health endpoint; 503 when every provider's breaker is open
pub async fn health(State(state): State<AppState>) -> (StatusCode, Json<HealthReport>) {
    let report = state.gateway.health();
    let status = if report.status == "unhealthy" {
        StatusCode::SERVICE_UNAVAILABLE
    } else {
        StatusCode::OK
    };
    (status, Json(report))
}

/// Query string of `GET /costs`
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CostParams {
    /// Restrict to one tenant
    pub tenant_id: Option<String>,
    /// Append raw records
    #[serde(default)]
    pub include_records: bool,
    /// Records per tenant
    pub limit: Option<usize>,
    /// Append trends, month-end projection and budget alerts
    #[serde(default)]
    pub include_forecast: bool,
}

/// Cost query endpoint
pub async fn costs(
    State(state): State<AppState>,
    Query(params): Query<CostParams>,
) -> Json<CostReport> {
    let query = CostQuery {
        tenant_id: params.tenant_id,
        records: params
            .include_records
            .then(|| params.limit.unwrap_or(DEFAULT_RECORD_LIMIT)),
        analytics: params.include_forecast,
    };
    Json(state.gateway.costs(&query))
}

/// Body of `GET /v1/tenants`
#[derive(Debug, Serialize)]
pub struct TenantsResponse {
    /// Known tenants
    pub tenants: Vec<TenantView>,
}

/// Tenant catalogue endpoint
pub async fn list_tenants(State(state): State<AppState>) -> Json<TenantsResponse> {
    Json(TenantsResponse {
        tenants: state.gateway.tenants(),
    })
}

/// Metrics endpoint (Prometheus format)
pub async fn metrics_endpoint(State(state): State<AppState>) -> Result<Response, ApiError> {
    let body = state
        .gateway
        .metrics()
        .render()
        .map_err(|e| ApiError::internal(e.to_string()))?;
    Ok(([(header::CONTENT_TYPE, "text/plain; version=0.0.4")], body).into_response())
}
