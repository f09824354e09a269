// Metadata items -> Datadog log records

use serde::Serialize;
use serde_json::ser::Formatter;
use std::io;

use crate::tags::TagContext;
use crate::types::{LogRecord, MetadataItem};

/// Field the Metadata API sets when a node was actually executed in the run.
pub const GENERATED_AT_FIELD: &str = "runGeneratedAt";

/// Constant fields stamped on every record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogTemplate {
    pub source: String,
    pub hostname: String,
    pub service: String,
}

impl Default for LogTemplate {
    fn default() -> Self {
        Self {
            source: "flask_webhook".to_string(),
            hostname: "cloud.getdbt.com".to_string(),
            service: "dbt_cloud_webhooks".to_string(),
        }
    }
}

/// Whether an item describes something that ran.
///
/// Only an explicit `runGeneratedAt: null` excludes an item. Kinds that do not
/// expose the field at all (test definitions) are always kept.
pub fn should_include(item: &MetadataItem) -> bool {
    !matches!(item.get(GENERATED_AT_FIELD), Some(serde_json::Value::Null))
}

/// JSON text layout of Python's `json.dumps` defaults: `", "` and `": "`
/// separators, characters outside printable ASCII escaped as `\uXXXX`.
struct DumpsFormatter;

impl Formatter for DumpsFormatter {
    fn begin_array_value<W: ?Sized + io::Write>(
        &mut self,
        writer: &mut W,
        first: bool,
    ) -> io::Result<()> {
        if first {
            Ok(())
        } else {
            writer.write_all(b", ")
        }
    }

    fn begin_object_key<W: ?Sized + io::Write>(
        &mut self,
        writer: &mut W,
        first: bool,
    ) -> io::Result<()> {
        if first {
            Ok(())
        } else {
            writer.write_all(b", ")
        }
    }

    fn begin_object_value<W: ?Sized + io::Write>(&mut self, writer: &mut W) -> io::Result<()> {
        writer.write_all(b": ")
    }

    fn write_string_fragment<W: ?Sized + io::Write>(
        &mut self,
        writer: &mut W,
        fragment: &str,
    ) -> io::Result<()> {
        let mut start = 0;
        for (index, ch) in fragment.char_indices() {
            if ch.is_ascii() && ch != '\x7f' {
                continue;
            }
            writer.write_all(fragment[start..index].as_bytes())?;
            let mut units = [0u16; 2];
            for unit in ch.encode_utf16(&mut units) {
                write!(writer, "\\u{:04x}", unit)?;
            }
            start = index + ch.len_utf8();
        }
        writer.write_all(fragment[start..].as_bytes())
    }
}

/// Text of a record's `message` field, laid out by `DumpsFormatter`.
fn render_message(item: &MetadataItem) -> String {
    let mut buf = Vec::new();
    let mut serializer = serde_json::Serializer::with_formatter(&mut buf, DumpsFormatter);
    if item.serialize(&mut serializer).is_err() {
        return item.to_string();
    }
    // Output is pure ASCII.
    String::from_utf8(buf).unwrap_or_else(|_| item.to_string())
}

/// Build one record per qualifying item, preserving input order.
pub fn to_log_records(
    items: &[MetadataItem],
    tags: &TagContext,
    template: &LogTemplate,
) -> Vec<LogRecord> {
    let rendered_tags = tags.render();

    items
        .iter()
        .filter(|item| should_include(item))
        .map(|item| LogRecord {
            source: template.source.clone(),
            tags: rendered_tags.clone(),
            host: template.hostname.clone(),
            message: render_message(item),
            service: template.service.clone(),
        })
        .collect()
}
