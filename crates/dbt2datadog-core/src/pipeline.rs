//! Fetch → transform → submit for one finished run.
//!
//! Resource kinds and batches are handled one after another. A failed fetch or
//! a failed submission is logged, recorded in the [`PipelineReport`] and
//! skipped; the remaining kinds and batches still go out.

use tracing::{debug, info, warn};

use crate::batch::{chunk_records, MAX_BATCH_SIZE};
use crate::error::PipelineFailure;
use crate::ports::{LogSink, MetadataSource};
use crate::tags::TagContext;
use crate::transform::{to_log_records, LogTemplate};
use crate::types::{ResourceKind, WebhookEvent};

#[derive(Debug, Clone)]
pub struct PipelineOptions {
    pub template: LogTemplate,
    pub max_batch_size: usize,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self {
            template: LogTemplate::default(),
            max_batch_size: MAX_BATCH_SIZE,
        }
    }
}

/// What happened while relaying one event.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PipelineReport {
    pub items_fetched: usize,
    pub records_built: usize,
    pub records_submitted: usize,
    pub batches_submitted: usize,
    pub unsupported: Vec<ResourceKind>,
    pub failures: Vec<PipelineFailure>,
}

impl PipelineReport {
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }

    pub fn fetch_failures(&self) -> usize {
        self.failures
            .iter()
            .filter(|f| matches!(f, PipelineFailure::Fetch { .. }))
            .count()
    }

    pub fn batch_failures(&self) -> usize {
        self.failures
            .iter()
            .filter(|f| matches!(f, PipelineFailure::Submit { .. }))
            .count()
    }
}

/// Relay a finished run: fetch every resource kind, build records, submit batches.
///
/// Callers skip events that are still running before getting here.
pub async fn relay_event(
    event: &WebhookEvent,
    source: &dyn MetadataSource,
    sink: &dyn LogSink,
    options: &PipelineOptions,
) -> PipelineReport {
    let job_id = event.data.job_id;
    let run_id = event.data.run_id;
    let mut report = PipelineReport::default();
    let mut tags = TagContext::from_event(event);
    let mut records = Vec::new();

    for kind in ResourceKind::ALL {
        tags.set_resource(kind);

        match source.fetch(kind, job_id, run_id).await {
            Ok(Some(items)) => {
                let built = to_log_records(&items, &tags, &options.template);
                debug!(
                    job_id,
                    run_id,
                    resource = %kind,
                    items = items.len(),
                    records = built.len(),
                    "fetched"
                );
                report.items_fetched += items.len();
                records.extend(built);
            }
            Ok(None) => {
                debug!(job_id, run_id, resource = %kind, "resource not supported by metadata source");
                report.unsupported.push(kind);
            }
            Err(e) => {
                let message = format!("{:#}", e);
                warn!(
                    job_id,
                    run_id,
                    resource = %kind,
                    error = %message,
                    "Failed to fetch run metadata"
                );
                report.failures.push(PipelineFailure::Fetch {
                    resource: kind,
                    message,
                });
            }
        }
    }

    report.records_built = records.len();

    for (index, batch) in chunk_records(&records, options.max_batch_size).enumerate() {
        match sink.submit(batch).await {
            Ok(()) => {
                debug!(job_id, run_id, batch = index, records = batch.len(), "submitted");
                report.batches_submitted += 1;
                report.records_submitted += batch.len();
            }
            Err(e) => {
                let message = format!("{:#}", e);
                warn!(
                    job_id,
                    run_id,
                    batch = index,
                    records = batch.len(),
                    error = %message,
                    "Failed to submit log batch"
                );
                report.failures.push(PipelineFailure::Submit {
                    index,
                    records: batch.len(),
                    message,
                });
            }
        }
    }

    info!(
        job_id,
        run_id,
        items = report.items_fetched,
        records = report.records_built,
        batches = report.batches_submitted,
        failures = report.failures.len(),
        "Relayed run metadata"
    );

    report
}
