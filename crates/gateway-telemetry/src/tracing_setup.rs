//! Subscriber setup with an optional OpenTelemetry tracer layer.
//!
//! Spans are sampled and carry OpenTelemetry trace/span IDs when enabled.
//! No exporter is installed here; the provider is returned so the caller can
//! flush it on shutdown.

use crate::logging::{LoggingConfig, LoggingError};
use opentelemetry::trace::TracerProvider as _;
use opentelemetry_sdk::{
    trace::{Config, RandomIdGenerator, Sampler, TracerProvider},
    Resource,
};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, Layer};

/// Tracing configuration
#[derive(Debug, Clone)]
pub struct TracingConfig {
    /// Attach the OpenTelemetry layer
    pub enabled: bool,
    /// Service name
    pub service_name: String,
    /// Service version
    pub service_version: String,
    /// Sampling rate (0.0 - 1.0)
    pub sampling_rate: f64,
    /// Log output settings
    pub logging: LoggingConfig,
}

impl Default for TracingConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            service_name: "llm-agent-gateway".to_string(),
            service_version: env!("CARGO_PKG_VERSION").to_string(),
            sampling_rate: 1.0,
            logging: LoggingConfig::default(),
        }
    }
}

impl TracingConfig {
    /// Create a new tracing configuration
    #[must_use]
    pub fn new(service_name: impl Into<String>) -> Self {
        Self {
            service_name: service_name.into(),
            ..Default::default()
        }
    }

    /// Enable or disable the OpenTelemetry layer
    #[must_use]
    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    /// Set the sampling rate
    #[must_use]
    pub fn with_sampling_rate(mut self, rate: f64) -> Self {
        self.sampling_rate = rate.clamp(0.0, 1.0);
        self
    }

    /// Set log output settings
    #[must_use]
    pub fn with_logging(mut self, logging: LoggingConfig) -> Self {
        self.logging = logging;
        self
    }

    fn sampler(&self) -> Sampler {
        if self.sampling_rate >= 1.0 {
            Sampler::AlwaysOn
        } else if self.sampling_rate <= 0.0 {
            Sampler::AlwaysOff
        } else {
            Sampler::TraceIdRatioBased(self.sampling_rate)
        }
    }
}

/// Install the global subscriber.
///
/// Falls back to plain logging when the OpenTelemetry layer is disabled.
///
/// # Errors
///
/// Returns an error if a global subscriber is already installed.
pub fn init_tracing(config: &TracingConfig) -> Result<Option<TracerProvider>, LoggingError> {
    if !config.enabled {
        crate::logging::init_logging(&config.logging)?;
        return Ok(None);
    }

    let resource = Resource::new(vec![
        opentelemetry::KeyValue::new("service.name", config.service_name.clone()),
        opentelemetry::KeyValue::new("service.version", config.service_version.clone()),
    ]);

    let provider = TracerProvider::builder()
        .with_config(
            Config::default()
                .with_sampler(config.sampler())
                .with_id_generator(RandomIdGenerator::default())
                .with_resource(resource),
        )
        .build();

    let tracer = provider.tracer(config.service_name.clone());

    tracing_subscriber::registry()
        .with(tracing_opentelemetry::layer().with_tracer(tracer))
        .with(
            config
                .logging
                .fmt_layer()
                .with_filter(config.logging.env_filter()),
        )
        .try_init()
        .map_err(|e| LoggingError::Init(e.to_string()))?;

    info!(
        service = %config.service_name,
        sampling_rate = config.sampling_rate,
        "Tracing initialized"
    );

    Ok(Some(provider))
}

/// Flush and drop the tracer provider
pub fn shutdown_tracing(provider: Option<TracerProvider>) {
    if let Some(provider) = provider {
        for result in provider.force_flush() {
            if let Err(e) = result {
                tracing::warn!(error = %e, "Span flush failed");
            }
        }
        drop(provider);
        info!("Tracing shutdown complete");
    }
}

/// Span for one inbound gateway request
#[macro_export]
macro_rules! gateway_request_span {
    ($request_id:expr, $tenant:expr) => {
        tracing::info_span!(
            "gateway_request",
            request_id = %$request_id,
            tenant = %$tenant,
            otel.kind = "server"
        )
    };
}

/// Span for one upstream provider attempt
#[macro_export]
macro_rules! provider_span {
    ($provider:expr, $model:expr) => {
        tracing::info_span!(
            "provider_call",
            provider = %$provider,
            model = %$model,
            otel.kind = "client"
        )
    };
}
