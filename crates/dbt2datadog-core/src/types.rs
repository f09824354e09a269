// Domain types for dbt Cloud webhooks and the Datadog log records built from them

use serde::{Deserialize, Deserializer, Serialize};

/// `runStatus` value sent while a job is still executing.
pub const RUNNING_STATUS: &str = "Running";

/// A single metadata record as returned by the Metadata API.
///
/// Kept as raw JSON so every field is forwarded to Datadog untouched.
pub type MetadataItem = serde_json::Value;

/// Inbound webhook body.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WebhookEvent {
    pub webhook_name: String,
    pub data: RunData,
}

/// The `data` object of a job-run webhook.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunData {
    #[serde(default)]
    pub run_status: Option<String>,
    #[serde(deserialize_with = "integer_or_string")]
    pub job_id: u64,
    #[serde(deserialize_with = "integer_or_string")]
    pub run_id: u64,
    pub project_name: String,
    pub environment_name: String,
    pub job_name: String,
    pub run_reason: String,
}

// dbt Cloud encodes ids as strings ("jobId": "123"); plain integers are accepted too.
fn integer_or_string<'de, D>(deserializer: D) -> Result<u64, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Int(u64),
        Str(String),
    }

    match Raw::deserialize(deserializer)? {
        Raw::Int(value) => Ok(value),
        Raw::Str(value) => value
            .trim()
            .parse::<u64>()
            .map_err(|e| serde::de::Error::custom(format!("invalid id '{}': {}", value, e))),
    }
}

/// Metadata API resource queried for every finished run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResourceKind {
    Models,
    Tests,
    Seeds,
    Snapshots,
}

impl ResourceKind {
    /// Every kind, in the order they are fetched and forwarded.
    pub const ALL: [ResourceKind; 4] = [
        ResourceKind::Models,
        ResourceKind::Tests,
        ResourceKind::Seeds,
        ResourceKind::Snapshots,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceKind::Models => "models",
            ResourceKind::Tests => "tests",
            ResourceKind::Seeds => "seeds",
            ResourceKind::Snapshots => "snapshots",
        }
    }
}

impl std::fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ResourceKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> anyhow::Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "models" | "model" => Ok(ResourceKind::Models),
            "tests" | "test" => Ok(ResourceKind::Tests),
            "seeds" | "seed" => Ok(ResourceKind::Seeds),
            "snapshots" | "snapshot" => Ok(ResourceKind::Snapshots),
            _ => anyhow::bail!(
                "Unsupported resource kind: {}. Supported: models, tests, seeds, snapshots",
                s
            ),
        }
    }
}

/// One entry of a Datadog `POST /api/v2/logs` body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogRecord {
    #[serde(rename = "ddsource")]
    pub source: String,
    #[serde(rename = "ddtags")]
    pub tags: String,
    #[serde(rename = "hostname")]
    pub host: String,
    pub message: String,
    pub service: String,
}
