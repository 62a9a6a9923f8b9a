//! Configuration loading.

use crate::config::{GatewayConfig, ProviderSettings};
use crate::error::ConfigError;
use gateway_core::{ProviderType, TenantConfig};
use secrecy::SecretString;
use serde::de::DeserializeOwned;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Supported file formats
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigFormat {
    /// YAML (`.yaml`, `.yml`)
    Yaml,
    /// TOML (`.toml`)
    Toml,
    /// JSON (`.json`)
    Json,
}

impl ConfigFormat {
    /// Pick a format from a file extension
    ///
    /// # Errors
    /// Returns `ConfigError::UnsupportedFormat` for other extensions
    pub fn from_path(path: &Path) -> Result<Self, ConfigError> {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_ascii_lowercase)
            .unwrap_or_default();
        match ext.as_str() {
            "yaml" | "yml" => Ok(Self::Yaml),
            "toml" => Ok(Self::Toml),
            "json" => Ok(Self::Json),
            _ => Err(ConfigError::UnsupportedFormat(path.display().to_string())),
        }
    }

    fn parse<T: DeserializeOwned>(self, content: &str) -> Result<T, String> {
        match self {
            Self::Yaml => serde_yaml::from_str(content).map_err(|e| e.to_string()),
            Self::Toml => toml::from_str(content).map_err(|e| e.to_string()),
            Self::Json => serde_json::from_str(content).map_err(|e| e.to_string()),
        }
    }
}

/// Builder-style configuration loader
#[derive(Debug, Clone)]
pub struct ConfigLoader {
    file: Option<PathBuf>,
    env_overrides: bool,
    env_providers: bool,
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfigLoader {
    /// Create a loader that reads defaults plus environment
    #[must_use]
    pub fn new() -> Self {
        Self {
            file: None,
            env_overrides: true,
            env_providers: true,
        }
    }

    /// Read the given configuration file
    #[must_use]
    pub fn with_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.file = Some(path.into());
        self
    }

    /// Apply `GATEWAY_*` and `CIRCUIT_*` environment overrides
    #[must_use]
    pub fn with_env_overrides(mut self, enabled: bool) -> Self {
        self.env_overrides = enabled;
        self
    }

    /// Discover providers from API key variables when none are configured
    #[must_use]
    pub fn with_env_providers(mut self, enabled: bool) -> Self {
        self.env_providers = enabled;
        self
    }

    /// Load, normalize, and validate the configuration
    ///
    /// # Errors
    /// Returns `ConfigError` on unreadable, unparsable, or invalid configuration
    pub async fn load(&self) -> Result<GatewayConfig, ConfigError> {
        let mut config = match &self.file {
            Some(path) => read_file::<GatewayConfig>(path).await?,
            None => GatewayConfig::default(),
        };

        if let Some(dir) = config.tenants_dir.clone() {
            let dir = match (&self.file, dir.is_relative()) {
                (Some(file), true) => file.parent().map_or(dir.clone(), |parent| parent.join(&dir)),
                _ => dir,
            };
            let tenants = load_tenants_dir(&dir).await?;
            config.tenants.extend(tenants);
        }

        let lookup = |key: &str| std::env::var(key).ok();

        if self.env_overrides {
            apply_env_overrides(&mut config, lookup);
        }

        if config.providers.is_empty() && self.env_providers {
            config.providers = providers_from_env(lookup);
            debug!(
                providers = config.providers.len(),
                "Discovered providers from environment"
            );
        }

        config.normalize();
        config.validate_all()?;

        info!(
            providers = config.providers.len(),
            tenants = config.tenants.len(),
            "Configuration loaded"
        );

        Ok(config)
    }
}

/// Load configuration from `GATEWAY_CONFIG` if set, otherwise defaults plus environment
///
/// # Errors
/// Returns `ConfigError` if the configuration is unreadable or invalid
pub async fn load_config() -> Result<GatewayConfig, ConfigError> {
    let mut loader = ConfigLoader::new();
    if let Ok(path) = std::env::var("GATEWAY_CONFIG") {
        loader = loader.with_file(path);
    }
    loader.load().await
}

/// Parse configuration text in the given format
///
/// # Errors
/// Returns `ConfigError::Parse` on malformed input
pub fn parse_str(content: &str, format: ConfigFormat) -> Result<GatewayConfig, ConfigError> {
    format.parse(content).map_err(|message| ConfigError::Parse {
        path: PathBuf::from("<inline>"),
        message,
    })
}

async fn read_file<T: DeserializeOwned>(path: &Path) -> Result<T, ConfigError> {
    let format = ConfigFormat::from_path(path)?;
    let content = tokio::fs::read_to_string(path)
        .await
        .map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
    format.parse(&content).map_err(|message| ConfigError::Parse {
        path: path.to_path_buf(),
        message,
    })
}

/// Load one tenant per file from a directory.
///
/// Files with unsupported extensions are skipped. A tenant without an `id`
/// takes the file stem.
///
/// # Errors
/// Returns `ConfigError` if the directory or a tenant file cannot be read
pub async fn load_tenants_dir(dir: &Path) -> Result<Vec<TenantConfig>, ConfigError> {
    let mut entries = tokio::fs::read_dir(dir)
        .await
        .map_err(|source| ConfigError::Io {
            path: dir.to_path_buf(),
            source,
        })?;

    let mut paths = Vec::new();
    while let Some(entry) = entries.next_entry().await.map_err(|source| ConfigError::Io {
        path: dir.to_path_buf(),
        source,
    })? {
        let path = entry.path();
        if ConfigFormat::from_path(&path).is_ok() {
            paths.push(path);
        }
    }
    paths.sort();

    let mut tenants = Vec::with_capacity(paths.len());
    for path in paths {
        let mut tenant: TenantConfig = read_file(&path).await?;
        if tenant.id.is_empty() {
            tenant.id = path
                .file_stem()
                .and_then(|s| s.to_str())
                .unwrap_or_default()
                .to_string();
        }
        debug!(tenant = %tenant.id, path = %path.display(), "Loaded tenant file");
        tenants.push(tenant);
    }

    Ok(tenants)
}

fn parse_env<T: std::str::FromStr>(key: &str, value: &str) -> Option<T> {
    let parsed = value.trim().parse().ok();
    if parsed.is_none() {
        warn!(key = key, value = value, "Ignoring unparsable environment override");
    }
    parsed
}

/// Apply environment overrides using the given variable lookup
pub fn apply_env_overrides(config: &mut GatewayConfig, lookup: impl Fn(&str) -> Option<String>) {
    if let Some(host) = lookup("GATEWAY_HOST") {
        config.server.host = host;
    }
    if let Some(port) = lookup("GATEWAY_PORT").and_then(|v| parse_env("GATEWAY_PORT", &v)) {
        config.server.port = port;
    }
    if let Some(token) = lookup("GATEWAY_AUTH_TOKEN").filter(|t| !t.is_empty()) {
        config.server.auth_token = Some(SecretString::new(token));
    }
    if let Some(level) = lookup("GATEWAY_LOG_LEVEL") {
        config.logging.level = level;
    }
    if let Some(rps) = lookup("GATEWAY_RATE_RPS").and_then(|v| parse_env("GATEWAY_RATE_RPS", &v))
    {
        config.default_tenant.rate_limit.refill_per_sec = rps;
    }
    if let Some(burst) =
        lookup("GATEWAY_RATE_BURST").and_then(|v| parse_env("GATEWAY_RATE_BURST", &v))
    {
        config.default_tenant.rate_limit.capacity = burst;
    }
    if let Some(threshold) = lookup("CIRCUIT_FAILURE_THRESHOLD")
        .and_then(|v| parse_env("CIRCUIT_FAILURE_THRESHOLD", &v))
    {
        config.breaker.failure_threshold = threshold;
    }
    if let Some(ms) =
        lookup("CIRCUIT_RESET_TIME_MS").and_then(|v| parse_env::<u64>("CIRCUIT_RESET_TIME_MS", &v))
    {
        config.breaker.cooldown = Duration::from_millis(ms);
    }
}

/// Build provider settings from well-known environment variables.
///
/// The local Ollama endpoint is always included; cloud providers are added
/// for each API key that is present.
pub fn providers_from_env(lookup: impl Fn(&str) -> Option<String>) -> Vec<ProviderSettings> {
    let mut providers = vec![ProviderSettings::new("ollama", ProviderType::Ollama)
        .with_endpoint(
            lookup("OLLAMA_BASE_URL").unwrap_or_else(|| "http://localhost:11434".to_string()),
        )
        .with_default_model(lookup("OLLAMA_MODEL").unwrap_or_else(|| "llama3.2".to_string()))];

    let cloud = [
        ("OPENAI_API_KEY", "openai", ProviderType::OpenAI, "gpt-4o-mini"),
        (
            "ANTHROPIC_API_KEY",
            "anthropic",
            ProviderType::Anthropic,
            "claude-3-haiku-20240307",
        ),
        (
            "OPENROUTER_API_KEY",
            "openrouter",
            ProviderType::OpenRouter,
            "openai/gpt-4o-mini",
        ),
    ];

    for (var, id, provider_type, model) in cloud {
        if let Some(key) = lookup(var).filter(|k| !k.is_empty()) {
            info!(provider = id, "Registering provider from environment");
            providers.push(
                ProviderSettings::new(id, provider_type)
                    .with_api_key(key)
                    .with_default_model(model),
            );
        }
    }

    providers
}
