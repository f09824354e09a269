//! dbt2datadog-core - webhook relay logic with no network I/O
//!
//! Turns an authenticated dbt Cloud job-run webhook into Datadog log records:
//!
//! 1. [`signature`] checks the `authorization` header (hex HMAC-SHA256 of the body)
//! 2. [`payload`] decodes the body and decides whether the run is worth reporting
//! 3. [`pipeline`] fetches run metadata per [`ResourceKind`] through a
//!    [`MetadataSource`], builds [`LogRecord`]s ([`transform`]) and hands them to a
//!    [`LogSink`] in chunks of at most [`MAX_BATCH_SIZE`] ([`batch`])
//!
//! The HTTP clients that implement the ports live in the `dbt2datadog` crate.

pub mod batch;
pub mod error;
pub mod payload;
pub mod pipeline;
pub mod ports;
pub mod signature;
pub mod tags;
pub mod transform;
pub mod types;

pub use batch::{chunk_records, MAX_BATCH_SIZE};
pub use error::{PayloadError, PipelineFailure};
pub use payload::WebhookPayload;
pub use pipeline::{relay_event, PipelineOptions, PipelineReport};
pub use ports::{LogSink, MetadataSource};
pub use signature::WebhookVerifier;
pub use tags::TagContext;
pub use transform::{to_log_records, LogTemplate};
pub use types::{LogRecord, MetadataItem, ResourceKind, RunData, WebhookEvent, RUNNING_STATUS};
