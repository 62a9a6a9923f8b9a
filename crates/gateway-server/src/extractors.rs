//! Custom Axum extractors for the gateway.

use axum::{
    async_trait,
    extract::{FromRequest, FromRequestParts, Request},
    http::request::Parts,
};
use serde::de::DeserializeOwned;
use tracing::debug;

use crate::error::ApiError;

/// Header carrying a tenant's own key
pub const TENANT_KEY_HEADER: &str = "x-tenant-key";

/// Header carrying the request ID
pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// Request ID assigned by the request ID middleware, or read from the header
#[derive(Debug, Clone)]
pub struct RequestId(pub String);

#[async_trait]
impl<S> FromRequestParts<S> for RequestId
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        if let Some(id) = parts.extensions.get::<Self>() {
            return Ok(id.clone());
        }
        let id = parts
            .headers
            .get(REQUEST_ID_HEADER)
            .and_then(|v| v.to_str().ok())
            .filter(|v| !v.is_empty())
            .map_or_else(|| uuid::Uuid::new_v4().to_string(), String::from);
        Ok(Self(id))
    }
}

/// Key presented for the tenant named in the request body
#[derive(Debug, Clone)]
pub struct TenantKey(pub Option<String>);

#[async_trait]
impl<S> FromRequestParts<S> for TenantKey
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let key = parts
            .headers
            .get(TENANT_KEY_HEADER)
            .map(|v| {
                v.to_str()
                    .map(str::to_string)
                    .map_err(|_| ApiError::unauthorized("Invalid X-Tenant-Key header"))
            })
            .transpose()?;
        Ok(Self(key))
    }
}

/// JSON body extractor with better error handling
#[derive(Debug)]
pub struct JsonBody<T>(pub T);

#[async_trait]
impl<S, T> FromRequest<S> for JsonBody<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let bytes = axum::body::Bytes::from_request(req, state)
            .await
            .map_err(|e| ApiError::bad_request(format!("Failed to read request body: {e}")))?;

        let value: T = serde_json::from_slice(&bytes).map_err(|e| {
            debug!(error = %e, "JSON parse error");
            ApiError::bad_request(format!("Invalid JSON: {e}"))
        })?;

        Ok(Self(value))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::Request;

    #[tokio::test]
    async fn test_request_id_from_header() {
        let req = Request::builder()
            .uri("/v1/chat")
            .header(REQUEST_ID_HEADER, "abc-123")
            .body(())
            .unwrap();
        let (mut parts, _body) = req.into_parts();

        let RequestId(id) = RequestId::from_request_parts(&mut parts, &()).await.unwrap();
        assert_eq!(id, "abc-123");
    }

    #[tokio::test]
    async fn test_request_id_generated_when_missing() {
        let req = Request::builder().uri("/v1/chat").body(()).unwrap();
        let (mut parts, _body) = req.into_parts();

        let RequestId(id) = RequestId::from_request_parts(&mut parts, &()).await.unwrap();
        assert!(uuid::Uuid::parse_str(&id).is_ok());
    }

    #[tokio::test]
    async fn test_tenant_key_optional() {
        let req = Request::builder().uri("/v1/chat").body(()).unwrap();
        let (mut parts, _body) = req.into_parts();
        let TenantKey(key) = TenantKey::from_request_parts(&mut parts, &()).await.unwrap();
        assert!(key.is_none());

        let req = Request::builder()
            .uri("/v1/chat")
            .header(TENANT_KEY_HEADER, "s3cret")
            .body(())
            .unwrap();
        let (mut parts, _body) = req.into_parts();
        let TenantKey(key) = TenantKey::from_request_parts(&mut parts, &()).await.unwrap();
        assert_eq!(key.as_deref(), Some("s3cret"));
    }
}
