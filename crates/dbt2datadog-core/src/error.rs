// Error types for payload decoding and pipeline steps

use crate::types::ResourceKind;

/// An authenticated body that cannot be processed.
#[derive(Debug, thiserror::Error)]
pub enum PayloadError {
    #[error("request body is not valid JSON: {0}")]
    InvalidJson(#[source] serde_json::Error),

    #[error("webhook payload has no 'data' object")]
    MissingData,

    #[error("webhook payload is missing or has invalid fields: {0}")]
    InvalidEvent(#[source] serde_json::Error),

    #[error("{field} must be a positive integer")]
    InvalidId { field: &'static str },
}

/// A failure isolated to one resource kind or one batch.
///
/// The pipeline records it and keeps going.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PipelineFailure {
    #[error("fetching {resource} failed: {message}")]
    Fetch {
        resource: ResourceKind,
        message: String,
    },

    #[error("submitting batch {index} ({records} records) failed: {message}")]
    Submit {
        index: usize,
        records: usize,
        message: String,
    },
}
