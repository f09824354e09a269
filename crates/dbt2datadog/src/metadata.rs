// dbt Cloud Metadata API client
//
// One GraphQL query per resource kind, parameterised by job and run id.
// Kinds without an entry in the query table are reported as unsupported.

use anyhow::{Context, Result};
use async_trait::async_trait;
use dbt2datadog_config::MetadataConfig;
use dbt2datadog_core::{MetadataItem, MetadataSource, ResourceKind};
use serde::Deserialize;
use serde_json::{json, Value};
use std::collections::HashMap;
use tracing::debug;

const MODEL_FIELDS: &str = "uniqueId name description resourceType accountId projectId \
    environmentId jobId runId status error skip threadId executionTime executeStartedAt \
    executeCompletedAt compileStartedAt compileCompletedAt runGeneratedAt runElapsedTime \
    database schema alias materializedType packageName tags";

// Test nodes carry no runGeneratedAt; every returned test executed in the run.
const TEST_FIELDS: &str = "uniqueId name description resourceType accountId projectId \
    environmentId jobId runId status state error fail warn skip columnName executionTime \
    executeStartedAt executeCompletedAt compileStartedAt compileCompletedAt dependsOn tags";

const SEED_FIELDS: &str = "uniqueId name description resourceType accountId projectId \
    environmentId jobId runId status error skip threadId executionTime executeStartedAt \
    executeCompletedAt compileStartedAt compileCompletedAt runGeneratedAt runElapsedTime \
    database schema alias packageName tags";

const SNAPSHOT_FIELDS: &str = "uniqueId name description resourceType accountId projectId \
    environmentId jobId runId status error skip threadId executionTime executeStartedAt \
    executeCompletedAt compileStartedAt compileCompletedAt runGeneratedAt runElapsedTime \
    database schema alias packageName tags";

fn field_selection(kind: ResourceKind) -> &'static str {
    match kind {
        ResourceKind::Models => MODEL_FIELDS,
        ResourceKind::Tests => TEST_FIELDS,
        ResourceKind::Seeds => SEED_FIELDS,
        ResourceKind::Snapshots => SNAPSHOT_FIELDS,
    }
}

fn build_query(kind: ResourceKind) -> String {
    format!(
        "query ($jobId: Int!, $runId: Int) {{ {}(jobId: $jobId, runId: $runId) {{ {} }} }}",
        kind.as_str(),
        field_selection(kind)
    )
}

#[derive(Debug, Deserialize)]
struct GraphQlResponse {
    #[serde(default)]
    data: Option<Value>,
    #[serde(default)]
    errors: Vec<GraphQlError>,
}

#[derive(Debug, Deserialize)]
struct GraphQlError {
    message: String,
}

/// Items listed under `data.<resource>`; a missing or null list is empty.
fn extract_items(response: GraphQlResponse, kind: ResourceKind) -> Result<Vec<MetadataItem>> {
    if !response.errors.is_empty() {
        let messages: Vec<&str> = response.errors.iter().map(|e| e.message.as_str()).collect();
        anyhow::bail!("Metadata API returned errors: {}", messages.join("; "));
    }

    let items = response
        .data
        .as_ref()
        .and_then(|data| data.get(kind.as_str()))
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default();
    Ok(items)
}

/// GraphQL client for the dbt Cloud Metadata API.
#[derive(Clone)]
pub struct MetadataClient {
    client: reqwest::Client,
    endpoint: String,
    service_token: String,
    queries: HashMap<ResourceKind, String>,
}

impl MetadataClient {
    /// Create a client that can query the kinds listed in `config.resources`.
    pub fn new(config: &MetadataConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout())
            .build()
            .context("Failed to build Metadata API HTTP client")?;

        let queries = config
            .resources
            .iter()
            .map(|kind| (*kind, build_query(*kind)))
            .collect();

        Ok(Self {
            client,
            endpoint: config.endpoint.clone(),
            service_token: config.service_token.clone(),
            queries,
        })
    }

    /// Query used for `kind`, if this client supports it.
    pub fn query_for(&self, kind: ResourceKind) -> Option<&str> {
        self.queries.get(&kind).map(String::as_str)
    }
}

#[async_trait]
impl MetadataSource for MetadataClient {
    async fn fetch(
        &self,
        kind: ResourceKind,
        job_id: u64,
        run_id: u64,
    ) -> Result<Option<Vec<MetadataItem>>> {
        let Some(query) = self.query_for(kind) else {
            return Ok(None);
        };

        let body = json!({
            "query": query,
            "variables": { "jobId": job_id, "runId": run_id },
        });

        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.service_token)
            .json(&body)
            .send()
            .await
            .with_context(|| format!("Metadata API request for {} failed", kind))?
            .error_for_status()
            .with_context(|| format!("Metadata API rejected {} query", kind))?;

        let parsed: GraphQlResponse = response
            .json()
            .await
            .with_context(|| format!("Metadata API returned an invalid {} response", kind))?;

        let items = extract_items(parsed, kind)?;
        debug!(resource = %kind, job_id, run_id, items = items.len(), "Metadata API response");
        Ok(Some(items))
    }
}
