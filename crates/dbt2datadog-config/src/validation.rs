// Configuration validation
//
// Validates that required secrets are present and values are sensible

use crate::*;
use anyhow::{bail, Result};
use dbt2datadog_core::MAX_BATCH_SIZE;
use tracing::warn;

pub fn validate_config(config: &RuntimeConfig) -> Result<()> {
    validate_server_config(&config.server)?;
    validate_request_config(&config.request)?;
    validate_webhook_config(&config.webhook)?;
    validate_metadata_config(&config.metadata)?;
    validate_datadog_config(&config.datadog)?;
    Ok(())
}

fn validate_server_config(config: &ServerConfig) -> Result<()> {
    if config.listen_addr.is_empty() {
        bail!("server.listen_addr must not be empty");
    }

    // Basic validation that it looks like an address
    if !config.listen_addr.contains(':') {
        bail!("server.listen_addr must be in format 'host:port'");
    }

    Ok(())
}

fn validate_request_config(config: &RequestConfig) -> Result<()> {
    if config.max_payload_bytes == 0 {
        bail!("request.max_payload_bytes must be greater than 0");
    }

    if config.max_payload_bytes > 100 * 1024 * 1024 {
        warn!(
            max_payload_bytes = config.max_payload_bytes,
            "request.max_payload_bytes is very large; webhook bodies are normally a few KB"
        );
    }

    Ok(())
}

fn validate_webhook_config(config: &WebhookConfig) -> Result<()> {
    if config.secret.is_empty() {
        bail!("webhook secret is required (set DBT_CLOUD_AUTH_TOKEN or webhook.secret)");
    }
    Ok(())
}

fn validate_metadata_config(config: &MetadataConfig) -> Result<()> {
    if config.service_token.is_empty() {
        bail!(
            "metadata service token is required (set DBT_CLOUD_SERVICE_TOKEN or metadata.service_token)"
        );
    }

    if !config.endpoint.starts_with("http://") && !config.endpoint.starts_with("https://") {
        bail!("metadata.endpoint must be an http(s) URL");
    }

    if config.timeout_secs == 0 {
        bail!("metadata.timeout_secs must be greater than 0");
    }

    if config.resources.is_empty() {
        warn!("metadata.resources is empty; finished runs will produce no logs");
    }

    Ok(())
}

fn validate_datadog_config(config: &DatadogConfig) -> Result<()> {
    if config.api_key.is_empty() {
        bail!("Datadog API key is required (set DD_API_KEY or datadog.api_key)");
    }

    if config.max_batch_size == 0 {
        bail!("datadog.max_batch_size must be greater than 0");
    }

    if config.max_batch_size > MAX_BATCH_SIZE {
        bail!(
            "datadog.max_batch_size must be at most {} (Datadog intake limit)",
            MAX_BATCH_SIZE
        );
    }

    if config.timeout_secs == 0 {
        bail!("datadog.timeout_secs must be greater than 0");
    }

    if config.intake_url.is_none() && config.site.is_empty() {
        bail!("datadog.site must not be empty");
    }

    Ok(())
}
