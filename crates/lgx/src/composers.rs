//! 🎼 The bulk composer — turning a batch of records into one `_bulk` body.
//!
//! Rule 1: Two lines per document. Action metadata, then document source. Always.
//! Rule 2: Newline-delimited. Not comma-separated. Not XML. NEWLINES.
//! Rule 3: Every document line ends in `\n`, including the last one. The trailing
//!         newline on the whole body matters. It MATTERS.
//!
//! ```text
//! {"index":{"_index":"syslog","_type":"log"}}
//! {"logId":null,"logClass":"app","logLevel":20000,...}
//! {"index":{"_index":"syslog","_type":"log"}}
//! {"logId":null,"logClass":"app","logLevel":40000,...}
//! ```
//!
//! No blank line between pairs. The bulk API is watching. Always watching. 🦆

use anyhow::{Context, Result};
use serde_json::json;

use crate::backends::Destination;
use crate::common::LogRecord;

/// 📡 Newline-delimited bulk body builder.
///
/// The action line is identical for every record in a batch (same index, same type),
/// so it's serialized once and reused.
#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct NdjsonBulkComposer;

impl NdjsonBulkComposer {
    /// 🏷️ `{"index":{"_index":"...","_type":"..."}}`. `_type` is omitted when unset,
    /// because newer clusters throw a tantrum about it.
    pub(crate) fn action_line(destination: &Destination) -> Result<String> {
        let mut the_action_metadata = serde_json::Map::new();
        the_action_metadata.insert(
            "_index".to_string(),
            serde_json::Value::String(destination.index.clone()),
        );
        if let Some(ref doc_type) = destination.doc_type {
            the_action_metadata.insert(
                "_type".to_string(),
                serde_json::Value::String(doc_type.clone()),
            );
        }
        serde_json::to_string(&json!({ "index": the_action_metadata })).context(
            "💀 Failed to serialize bulk action metadata. \
             The JSON that describes JSON has failed to become JSON.",
        )
    }

    /// 🎼 Compose the whole body. Empty batch, empty string.
    pub(crate) fn compose(destination: &Destination, batch: &[LogRecord]) -> Result<String> {
        if batch.is_empty() {
            return Ok(String::new());
        }
        let action = Self::action_line(destination)?;

        // 🧮 vibes-based pre-allocation: action line + a generous guess per document
        let mut payload = String::with_capacity(batch.len() * (action.len() + 256));
        for record in batch {
            let document = serde_json::to_string(record)
                .context("💀 A log record refused to become JSON. It had one job.")?;
            payload.push_str(&action);
            payload.push('\n');
            payload.push_str(&document);
            payload.push('\n');
        }
        Ok(payload)
    }
}
