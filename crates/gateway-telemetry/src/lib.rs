//! # Gateway Telemetry
//!
//! Observability and cost accounting for the LLM agent gateway.
//!
//! This crate provides:
//! - The per-tenant usage ledger with pricing and budget checks
//! - Spend trends, month-end projections and budget alerts
//! - Prometheus metrics for monitoring
//! - Structured logging with an optional OpenTelemetry layer

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod analytics;
pub mod cost;
pub mod logging;
pub mod metrics;
pub mod tracing_setup;

// Re-export main types
pub use analytics::{
    AlertLevel, AlertWindow, BudgetAlert, CostAnalytics, CostForecast, SpendTrend, SpendTrends,
};
pub use cost::{
    default_pricing, CostConfig, CostSummary, CostTracker, ModelPricing, SpendWindow, UsageRecord,
    UsageTotals,
};
pub use logging::{init_logging, LoggingConfig, LoggingError};
pub use metrics::{Metrics, MetricsError};
pub use tracing_setup::{init_tracing, shutdown_tracing, TracingConfig};
