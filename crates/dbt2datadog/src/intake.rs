// Datadog logs intake client
//
// Submits batches of log records to `POST /api/v2/logs` as a gzip-compressed
// JSON array, authenticated with the DD-API-KEY header.

use anyhow::{Context, Result};
use async_trait::async_trait;
use dbt2datadog_config::DatadogConfig;
use dbt2datadog_core::{LogRecord, LogSink};
use flate2::{write::GzEncoder, Compression};
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, CONTENT_ENCODING, CONTENT_TYPE};
use std::io::Write;
use tracing::debug;

const LOGS_PATH: &str = "/api/v2/logs";
const API_KEY_HEADER: &str = "dd-api-key";

/// Sender for the Datadog HTTP logs intake
#[derive(Clone)]
pub struct DatadogIntake {
    client: reqwest::Client,
    url: String,
    headers: HeaderMap,
}

impl DatadogIntake {
    pub fn new(config: &DatadogConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout())
            .build()
            .context("Failed to build Datadog HTTP client")?;

        Ok(Self {
            client,
            url: format!("{}{}", config.intake_base_url(), LOGS_PATH),
            headers: intake_headers(&config.api_key)?,
        })
    }

    /// Full URL batches are posted to.
    pub fn url(&self) -> &str {
        &self.url
    }
}

fn intake_headers(api_key: &str) -> Result<HeaderMap> {
    let mut api_key = HeaderValue::from_str(api_key)
        .map_err(|e| anyhow::anyhow!("Invalid Datadog API key header value: {}", e))?;
    api_key.set_sensitive(true);

    let mut headers = HeaderMap::new();
    headers.insert(HeaderName::from_static(API_KEY_HEADER), api_key);
    headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    headers.insert(CONTENT_ENCODING, HeaderValue::from_static("gzip"));
    Ok(headers)
}

/// Serialize a batch to JSON and gzip it.
fn encode_batch(batch: &[LogRecord]) -> Result<Vec<u8>> {
    let json = serde_json::to_vec(batch).context("Failed to serialize log batch")?;
    let mut encoder = GzEncoder::new(Vec::with_capacity(json.len() / 4), Compression::default());
    encoder
        .write_all(&json)
        .context("Failed to compress log batch")?;
    encoder.finish().context("Failed to compress log batch")
}

#[async_trait]
impl LogSink for DatadogIntake {
    async fn submit(&self, batch: &[LogRecord]) -> Result<()> {
        let body = encode_batch(batch)?;
        let compressed = body.len();

        let response = self
            .client
            .post(&self.url)
            .headers(self.headers.clone())
            .body(body)
            .send()
            .await
            .context("Datadog intake request failed")?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            anyhow::bail!("Datadog intake returned {}: {}", status, text);
        }

        debug!(
            records = batch.len(),
            bytes = compressed,
            status = %status,
            "Submitted log batch"
        );
        Ok(())
    }
}
