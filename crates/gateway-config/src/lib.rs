//! # Gateway Config
//!
//! Configuration for the adaptive LLM gateway.
//!
//! Configuration is loaded once at startup from an optional YAML, TOML, or
//! JSON file, an optional directory of per-tenant files, and a small set of
//! environment overrides. Invalid configuration is fatal: [`ConfigLoader::load`]
//! validates everything it returns.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod config;
pub mod error;
pub mod loader;

pub use config::{
    BreakerSettings, CacheSettings, CostSettings, GatewayConfig, LoggingSettings, PricingEntry,
    ProviderSettings, RoutingSettings, ServerSettings,
};
pub use error::ConfigError;
pub use loader::{load_config, parse_str, ConfigFormat, ConfigLoader};
