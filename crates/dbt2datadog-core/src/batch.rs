//! Chunking of log records into intake-sized batches.
//!
//! Datadog's logs intake accepts at most 1000 entries per request. Records are
//! cut into contiguous windows starting at offset 0; only the last window may be
//! shorter. Nothing is reordered, merged or dropped.

use crate::types::LogRecord;

/// Maximum number of records accepted by one intake call.
pub const MAX_BATCH_SIZE: usize = 1000;

/// Split `records` into ordered slices of at most `batch_size` entries.
///
/// `batch_size` is clamped to `1..=MAX_BATCH_SIZE`.
pub fn chunk_records(records: &[LogRecord], batch_size: usize) -> std::slice::Chunks<'_, LogRecord> {
    records.chunks(batch_size.clamp(1, MAX_BATCH_SIZE))
}
