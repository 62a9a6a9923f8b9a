//! Test helper utilities for integration tests

use gateway_config::GatewayConfig;
use gateway_orchestrator::Gateway;
use gateway_server::{create_router, AppState};
use reqwest::{Client, Response};
use serde_json::Value;
use std::net::SocketAddr;
use std::sync::{Arc, Once};
use std::time::Duration;
use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;

static TRACING: Once = Once::new();

/// Install a test subscriber when `TEST_LOG` is set
pub fn init_tracing() {
    TRACING.call_once(|| {
        if std::env::var("TEST_LOG").is_ok() {
            let _ = tracing_subscriber::fmt()
                .with_env_filter(EnvFilter::from_default_env())
                .with_test_writer()
                .try_init();
        }
    });
}

/// Build a gateway from configuration
pub fn build_gateway(config: &GatewayConfig) -> Arc<Gateway> {
    init_tracing();
    Arc::new(Gateway::from_config(config).expect("gateway builds from config"))
}

/// The gateway HTTP server on an ephemeral port
pub struct TestServer {
    /// Bound address
    pub addr: SocketAddr,
    /// HTTP client for making requests
    pub client: Client,
    /// Gateway behind the server
    pub gateway: Arc<Gateway>,
    shutdown_tx: Option<tokio::sync::oneshot::Sender<()>>,
}

impl TestServer {
    /// Serve the gateway built from `config`
    pub async fn start(config: &GatewayConfig) -> Self {
        let state = AppState::from_config(config).expect("state builds from config");
        Self::with_state(state).await
    }

    /// Serve an already assembled state
    pub async fn with_state(state: AppState) -> Self {
        init_tracing();
        let gateway = Arc::clone(&state.gateway);
        let listener = TcpListener::bind(SocketAddr::from(([127, 0, 0, 1], 0)))
            .await
            .expect("Failed to bind");
        let addr = listener.local_addr().expect("Failed to get local addr");

        let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel::<()>();
        let router = create_router(state);
        tokio::spawn(async move {
            axum::serve(listener, router)
                .with_graceful_shutdown(async {
                    let _ = shutdown_rx.await;
                })
                .await
                .expect("Server error");
        });

        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .expect("Failed to create client");

        Self {
            addr,
            client,
            gateway,
            shutdown_tx: Some(shutdown_tx),
        }
    }

    /// Full URL for a path
    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    /// GET a path
    pub async fn get(&self, path: &str) -> Response {
        self.client
            .get(self.url(path))
            .send()
            .await
            .expect("Request failed")
    }

    /// POST a JSON body
    pub async fn post_json(&self, path: &str, body: &Value) -> Response {
        self.post_json_with_headers(path, body, &[]).await
    }

    /// POST a JSON body with extra headers
    pub async fn post_json_with_headers(
        &self,
        path: &str,
        body: &Value,
        headers: &[(&str, &str)],
    ) -> Response {
        let mut builder = self.client.post(self.url(path)).json(body);
        for (key, value) in headers {
            builder = builder.header(*key, *value);
        }
        builder.send().await.expect("Request failed")
    }

    /// Shut the server down
    pub fn shutdown(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Split an SSE body into `(event, data)` pairs
pub fn parse_sse(body: &str) -> Vec<(Option<String>, String)> {
    body.split("\n\n")
        .filter(|block| !block.trim().is_empty())
        .filter_map(|block| {
            let mut event = None;
            let mut data = Vec::new();
            for line in block.lines() {
                if let Some(value) = line.strip_prefix("event:") {
                    event = Some(value.trim().to_string());
                } else if let Some(value) = line.strip_prefix("data:") {
                    data.push(value.trim_start().to_string());
                }
            }
            (!data.is_empty()).then(|| (event, data.join("\n")))
        })
        .collect()
}

/// Assert that a response has the expected status code
pub fn assert_status(response: &Response, expected: u16) {
    assert_eq!(
        response.status().as_u16(),
        expected,
        "Expected status {}, got {}",
        expected,
        response.status()
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_sse() {
        let events = parse_sse(concat!(
            "event: route\ndata: {\"a\":1}\n\n",
            "data: x\n\n",
            ": keep-alive\n\n",
            "data: [DONE]\n\n",
        ));
        assert_eq!(events.len(), 3);
        assert_eq!(events[0].0.as_deref(), Some("route"));
        assert_eq!(events[1], (None, "x".to_string()));
        assert_eq!(events[2].1, "[DONE]");
    }
}
