//! Shared handler state.

use gateway_config::GatewayConfig;
use gateway_core::GatewayError;
use gateway_orchestrator::Gateway;
use secrecy::SecretString;
use std::sync::Arc;
use std::time::Duration;

/// State cloned into every handler
#[derive(Clone)]
pub struct AppState {
    /// Request pipeline
    pub gateway: Arc<Gateway>,
    /// Shared bearer token required on protected routes
    pub auth_token: Option<Arc<SecretString>>,
    /// CORS allowed origins; empty allows any
    pub allowed_origins: Arc<[String]>,
    /// Time allowed to produce response headers
    pub request_timeout: Duration,
}

impl std::fmt::Debug for AppState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppState")
            .field("gateway", &self.gateway)
            .field("auth", &self.auth_token.is_some())
            .field("allowed_origins", &self.allowed_origins)
            .finish_non_exhaustive()
    }
}

impl AppState {
    /// Wrap a gateway with open access and default limits
    pub fn new(gateway: Arc<Gateway>) -> Self {
        Self {
            gateway,
            auth_token: None,
            allowed_origins: Arc::from(Vec::new()),
            request_timeout: Duration::from_secs(120),
        }
    }

    /// Build the gateway and server settings from configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the gateway cannot be assembled.
    pub fn from_config(config: &GatewayConfig) -> Result<Self, GatewayError> {
        let gateway = Arc::new(Gateway::from_config(config)?);
        let mut state = Self::new(gateway)
            .with_allowed_origins(config.server.allowed_origins.clone())
            .with_request_timeout(config.server.request_timeout);
        if let Some(token) = &config.server.auth_token {
            state = state.with_auth_token(token.clone());
        }
        Ok(state)
    }

    /// Require `Authorization: Bearer <token>` on protected routes
    #[must_use]
    pub fn with_auth_token(mut self, token: SecretString) -> Self {
        self.auth_token = Some(Arc::new(token));
        self
    }

    /// Set CORS allowed origins
    #[must_use]
    pub fn with_allowed_origins(mut self, origins: Vec<String>) -> Self {
        self.allowed_origins = Arc::from(origins);
        self
    }

    /// Set the header timeout
    #[must_use]
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }
}
