// dbt2datadog-config - Runtime configuration for the webhook relay
//
// Supports configuration from multiple sources:
// 1. Environment variables (highest priority)
// 2. Config file path from DBT2DATADOG_CONFIG env var
// 3. Config file contents from DBT2DATADOG_CONFIG_CONTENT env var
// 4. Default config file locations (./config.toml, ./.dbt2datadog.toml)
// 5. Built-in defaults (lowest priority)
//
// Secrets (webhook secret, service token, API key) have no defaults; a config
// without them fails validation at startup.

use anyhow::{Context, Result};
use dbt2datadog_core::{LogTemplate, PipelineOptions, ResourceKind, MAX_BATCH_SIZE};
use serde::{Deserialize, Serialize};
use std::time::Duration;

mod env_overrides;
mod sources;
mod validation;

pub use env_overrides::{EnvSource, ENV_PREFIX};

/// Main runtime configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RuntimeConfig {
    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub request: RequestConfig,

    #[serde(default)]
    pub webhook: WebhookConfig,

    #[serde(default)]
    pub metadata: MetadataConfig,

    #[serde(default)]
    pub datadog: DatadogConfig,
}

/// Server-specific configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub listen_addr: String,
    pub log_level: String,
    pub log_format: LogFormat,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: "0.0.0.0:8080".to_string(),
            log_level: "info".to_string(),
            log_format: LogFormat::Text,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Text,
    Json,
}

/// Request handling configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RequestConfig {
    pub max_payload_bytes: usize,
}

impl Default for RequestConfig {
    fn default() -> Self {
        Self {
            max_payload_bytes: 1024 * 1024,
        }
    }
}

/// Inbound webhook authentication
#[derive(Clone, Default, Serialize, Deserialize)]
pub struct WebhookConfig {
    /// Shared secret dbt Cloud signs deliveries with.
    #[serde(default)]
    pub secret: String,
}

impl std::fmt::Debug for WebhookConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WebhookConfig")
            .field("secret", &redact(&self.secret))
            .finish()
    }
}

/// dbt Cloud Metadata API client
#[derive(Clone, Serialize, Deserialize)]
pub struct MetadataConfig {
    #[serde(default = "default_metadata_endpoint")]
    pub endpoint: String,

    #[serde(default)]
    pub service_token: String,

    /// Resource kinds this Metadata API deployment can be queried for.
    #[serde(default = "default_resources")]
    pub resources: Vec<ResourceKind>,

    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_metadata_endpoint() -> String {
    "https://metadata.cloud.getdbt.com/graphql".to_string()
}

fn default_resources() -> Vec<ResourceKind> {
    ResourceKind::ALL.to_vec()
}

fn default_timeout_secs() -> u64 {
    30
}

impl MetadataConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl Default for MetadataConfig {
    fn default() -> Self {
        Self {
            endpoint: default_metadata_endpoint(),
            service_token: String::new(),
            resources: default_resources(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl std::fmt::Debug for MetadataConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MetadataConfig")
            .field("endpoint", &self.endpoint)
            .field("service_token", &redact(&self.service_token))
            .field("resources", &self.resources)
            .field("timeout_secs", &self.timeout_secs)
            .finish()
    }
}

/// Datadog logs intake client
#[derive(Clone, Serialize, Deserialize)]
pub struct DatadogConfig {
    /// Datadog site, e.g. `datadoghq.com` or `datadoghq.eu`.
    #[serde(default = "default_site")]
    pub site: String,

    /// Full intake base URL; overrides the one derived from `site`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub intake_url: Option<String>,

    #[serde(default)]
    pub api_key: String,

    #[serde(default = "default_source")]
    pub source: String,

    #[serde(default = "default_hostname")]
    pub hostname: String,

    #[serde(default = "default_service")]
    pub service: String,

    #[serde(default = "default_max_batch_size")]
    pub max_batch_size: usize,

    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_site() -> String {
    "datadoghq.com".to_string()
}

fn default_source() -> String {
    LogTemplate::default().source
}

fn default_hostname() -> String {
    LogTemplate::default().hostname
}

fn default_service() -> String {
    LogTemplate::default().service
}

fn default_max_batch_size() -> usize {
    MAX_BATCH_SIZE
}

impl DatadogConfig {
    /// Base URL the logs intake is reached at.
    pub fn intake_base_url(&self) -> String {
        match &self.intake_url {
            Some(url) => url.trim_end_matches('/').to_string(),
            None => format!("https://http-intake.logs.{}", self.site.trim_matches('/')),
        }
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn log_template(&self) -> LogTemplate {
        LogTemplate {
            source: self.source.clone(),
            hostname: self.hostname.clone(),
            service: self.service.clone(),
        }
    }
}

impl Default for DatadogConfig {
    fn default() -> Self {
        Self {
            site: default_site(),
            intake_url: None,
            api_key: String::new(),
            source: default_source(),
            hostname: default_hostname(),
            service: default_service(),
            max_batch_size: default_max_batch_size(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl std::fmt::Debug for DatadogConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DatadogConfig")
            .field("site", &self.site)
            .field("intake_url", &self.intake_url)
            .field("api_key", &redact(&self.api_key))
            .field("source", &self.source)
            .field("hostname", &self.hostname)
            .field("service", &self.service)
            .field("max_batch_size", &self.max_batch_size)
            .field("timeout_secs", &self.timeout_secs)
            .finish()
    }
}

fn redact(secret: &str) -> &'static str {
    if secret.is_empty() {
        "<unset>"
    } else {
        "<redacted>"
    }
}

impl RuntimeConfig {
    /// Load configuration from all sources with priority
    pub fn load() -> Result<Self> {
        sources::load_config()
    }

    /// Load configuration from a specific file path (for CLI usage).
    pub fn load_from_path(path: impl AsRef<std::path::Path>) -> Result<Self> {
        sources::load_from_file_path(path)
    }

    /// Merge another config into this one (used for TOML layering).
    pub fn merge(&mut self, other: RuntimeConfig) {
        self.server = other.server;
        self.request = other.request;
        self.metadata = other.metadata;
        self.datadog = other.datadog;
        self.webhook = other.webhook;
    }

    /// Apply environment overrides from a custom source.
    pub fn apply_env_overrides_from<E: EnvSource>(&mut self, env: &E) -> Result<()> {
        env_overrides::apply_env_overrides(self, env)
    }

    /// Build a configuration from optional inline TOML plus overrides supplied
    /// by an `EnvSource`, then validate it.
    pub fn load_with_env<E: EnvSource>(inline_config: Option<&str>, env: &E) -> Result<Self> {
        let mut config = RuntimeConfig::default();

        if let Some(inline) = inline_config {
            let file_config: RuntimeConfig =
                toml::from_str(inline).context("Failed to parse inline config content")?;
            config.merge(file_config);
        }

        config.apply_env_overrides_from(env)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        validation::validate_config(self)
    }

    /// Pipeline settings derived from the Datadog section.
    pub fn pipeline_options(&self) -> PipelineOptions {
        PipelineOptions {
            template: self.datadog.log_template(),
            max_batch_size: self.datadog.max_batch_size,
        }
    }
}
