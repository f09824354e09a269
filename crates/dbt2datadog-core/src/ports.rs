// Port traits implemented by the HTTP adapters in the server crate

use async_trait::async_trait;

use crate::types::{LogRecord, MetadataItem, ResourceKind};

/// Source of per-run metadata (the dbt Cloud Metadata API).
#[async_trait]
pub trait MetadataSource: Send + Sync {
    /// Items of `kind` produced by run `run_id` of job `job_id`, in API order.
    ///
    /// `Ok(None)` means this source has no query for `kind`; callers treat it as
    /// zero items. `Err` is a failed call for a supported kind.
    async fn fetch(
        &self,
        kind: ResourceKind,
        job_id: u64,
        run_id: u64,
    ) -> anyhow::Result<Option<Vec<MetadataItem>>>;
}

/// Destination for log records (the Datadog logs intake).
#[async_trait]
pub trait LogSink: Send + Sync {
    /// Submit one batch. Callers never pass more than [`crate::MAX_BATCH_SIZE`] records.
    async fn submit(&self, batch: &[LogRecord]) -> anyhow::Result<()>;
}
