//! # LLM Agent Gateway
//!
//! Adaptive gateway that routes agent prompts between local small models and
//! hosted large models.
//!
//! ## Usage
//!
//! ```bash
//! # Start with defaults plus providers discovered from the environment
//! llm-agent-gateway
//!
//! # Start with a configuration file
//! llm-agent-gateway --config gateway.yaml
//!
//! # Override the listen address
//! llm-agent-gateway --host 0.0.0.0 --port 9000
//! ```

use anyhow::{Context, Result};
use clap::Parser;
use gateway_config::{ConfigLoader, LoggingSettings};
use gateway_server::{AppState, Server};
use gateway_telemetry::{init_tracing, shutdown_tracing, LoggingConfig, TracingConfig};
use std::path::PathBuf;
use tracing::{error, info};

/// Adaptive LLM request gateway
#[derive(Parser, Debug)]
#[command(name = "llm-agent-gateway")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Configuration file (YAML, TOML or JSON)
    #[arg(short, long, env = "GATEWAY_CONFIG")]
    config: Option<PathBuf>,

    /// Listen host, overriding the configuration
    #[arg(long)]
    host: Option<String>,

    /// Listen port, overriding the configuration
    #[arg(short, long)]
    port: Option<u16>,
}

/// Application entry point
#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    if let Err(e) = run(cli).await {
        error!(error = %e, "Gateway failed");
        eprintln!("Error: {e:#}");
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<()> {
    let mut loader = ConfigLoader::new();
    if let Some(path) = &cli.config {
        loader = loader.with_file(path);
    }
    let mut config = loader.load().await.context("loading configuration")?;
    if let Some(host) = cli.host {
        config.server.host = host;
    }
    if let Some(port) = cli.port {
        config.server.port = port;
    }

    let tracer = init_tracing(&tracing_config(&config.logging)).context("initializing logging")?;

    info!(
        version = env!("CARGO_PKG_VERSION"),
        providers = config.providers.len(),
        tenants = config.tenants.len(),
        "Starting LLM agent gateway"
    );

    let state = AppState::from_config(&config).context("building gateway")?;

    let sweeper = config
        .cache
        .sweep_interval
        .map(|interval| state.gateway.cache().spawn_sweeper(interval));

    let result = Server::new(&config.server.host, config.server.port, state)
        .context("configuring server")?
        .run()
        .await
        .context("serving requests");

    if let Some(handle) = sweeper {
        handle.abort();
    }
    shutdown_tracing(tracer);
    result
}

fn tracing_config(settings: &LoggingSettings) -> TracingConfig {
    TracingConfig::new(settings.service_name.clone())
        .with_enabled(settings.tracing)
        .with_logging(LoggingConfig {
            level: settings.level.clone(),
            json: settings.json,
        })
}
