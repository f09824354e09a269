use super::{LogFormat, RuntimeConfig};
use anyhow::{anyhow, Context, Result};
use dbt2datadog_core::ResourceKind;

pub const ENV_PREFIX: &str = "DBT2DATADOG_";

/// Abstraction over environment-variable lookups so tests and embedders can
/// supply their own source of overrides.
pub trait EnvSource {
    fn get(&self, key: &str) -> Option<String>;

    /// Get an environment variable WITHOUT the DBT2DATADOG_ prefix
    /// Used for the dbt Cloud and Datadog standard variables (DD_API_KEY, etc.)
    fn get_raw(&self, key: &str) -> Option<String>;
}

/// Apply environment-variable overrides (highest priority) to the runtime config.
pub fn apply_env_overrides<E: EnvSource>(config: &mut RuntimeConfig, env: &E) -> Result<()> {
    // Server configuration (listen addr, log level/format)
    if let Some(addr) = get_env_string(env, "LISTEN_ADDR")? {
        config.server.listen_addr = addr;
    }
    if let Some(level) = get_env_string(env, "LOG_LEVEL")? {
        config.server.log_level = level;
    }
    if let Some(format) = get_env_string(env, "LOG_FORMAT")? {
        config.server.log_format = match format.to_lowercase().as_str() {
            "json" => LogFormat::Json,
            _ => LogFormat::Text,
        };
    }

    // Request configuration
    if let Some(val) = get_env_usize(env, "MAX_PAYLOAD_BYTES")? {
        config.request.max_payload_bytes = val;
    }

    // Webhook secret (same variable name dbt Cloud's docs use)
    if let Some(secret) = get_raw_env_string(env, "DBT_CLOUD_AUTH_TOKEN")? {
        config.webhook.secret = secret;
    }

    // Metadata API
    if let Some(token) = get_raw_env_string(env, "DBT_CLOUD_SERVICE_TOKEN")? {
        config.metadata.service_token = token;
    }
    if let Some(endpoint) = get_env_string(env, "METADATA_ENDPOINT")? {
        config.metadata.endpoint = endpoint;
    }
    if let Some(resources) = get_env_string(env, "METADATA_RESOURCES")? {
        config.metadata.resources = parse_resources(&resources)?;
    }
    if let Some(val) = get_env_u64(env, "METADATA_TIMEOUT_SECS")? {
        config.metadata.timeout_secs = val;
    }

    // Datadog intake (DD_* names match the Datadog client libraries)
    if let Some(api_key) = get_raw_env_string(env, "DD_API_KEY")? {
        config.datadog.api_key = api_key;
    }
    if let Some(site) = get_raw_env_string(env, "DD_SITE")? {
        config.datadog.site = site;
    }
    if let Some(url) = get_env_string(env, "DATADOG_INTAKE_URL")? {
        config.datadog.intake_url = Some(url);
    }
    if let Some(source) = get_env_string(env, "DATADOG_SOURCE")? {
        config.datadog.source = source;
    }
    if let Some(hostname) = get_env_string(env, "DATADOG_HOSTNAME")? {
        config.datadog.hostname = hostname;
    }
    if let Some(service) = get_env_string(env, "DATADOG_SERVICE")? {
        config.datadog.service = service;
    }
    if let Some(val) = get_env_usize(env, "DATADOG_MAX_BATCH_SIZE")? {
        config.datadog.max_batch_size = val;
    }
    if let Some(val) = get_env_u64(env, "DATADOG_TIMEOUT_SECS")? {
        config.datadog.timeout_secs = val;
    }

    Ok(())
}

fn parse_resources(value: &str) -> Result<Vec<ResourceKind>> {
    value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| {
            s.parse::<ResourceKind>()
                .with_context(|| format!("Invalid {}METADATA_RESOURCES value", ENV_PREFIX))
        })
        .collect()
}

fn get_env_string<E: EnvSource>(env: &E, key: &str) -> Result<Option<String>> {
    Ok(env.get(key))
}

/// Get a raw environment variable without the DBT2DATADOG_ prefix
fn get_raw_env_string<E: EnvSource>(env: &E, key: &str) -> Result<Option<String>> {
    Ok(env.get_raw(key))
}

fn get_env_usize<E: EnvSource>(env: &E, key: &str) -> Result<Option<usize>> {
    match get_env_string(env, key)? {
        Some(val) => {
            let parsed = val
                .parse::<usize>()
                .map_err(|e| anyhow!("Failed to parse {}{}: {}", ENV_PREFIX, key, e))?;
            Ok(Some(parsed))
        }
        None => Ok(None),
    }
}

fn get_env_u64<E: EnvSource>(env: &E, key: &str) -> Result<Option<u64>> {
    match get_env_string(env, key)? {
        Some(val) => {
            let parsed = val
                .parse::<u64>()
                .map_err(|e| anyhow!("Failed to parse {}{}: {}", ENV_PREFIX, key, e))?;
            Ok(Some(parsed))
        }
        None => Ok(None),
    }
}
