//! 🔌 Backends — where the real I/O happens.
//!
//! 🚰 The consumer worker pours batches in; a backend gets them out of the process.
//! Elasticsearch for real life, an in-memory vault for tests and dry runs, and a
//! `Custom` door for anyone who brings their own.
//!
//! ⚠️ A backend being down is not news. It's Tuesday. The contract below reflects
//! that: "couldn't connect" is an `Ok` outcome, not an error. 🦆

use anyhow::Result;
use async_trait::async_trait;

use crate::common::LogRecord;

pub(crate) mod elasticsearch;
pub(crate) mod in_mem;

pub use elasticsearch::{ElasticsearchSink, ElasticsearchSinkConfig};
pub use in_mem::InMemorySink;

/// 📍 Where a batch lands: an index and, for older clusters, a document type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Destination {
    pub index: String,
    pub doc_type: Option<String>,
}

/// 📬 How a bulk write went, when it didn't outright fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BulkOutcome {
    /// ✅ The backend took the request. `rejected` counts per-document refusals it
    /// reported back; they are diagnostics only and nothing is retried.
    Indexed { documents: usize, rejected: usize },
    /// 🕳️ Nothing to send. No request was made.
    Empty,
    /// 🔌 Couldn't even connect. Expected, transient, counted, not logged.
    BackendUnavailable,
}

/// 🕳️ A sink that takes a whole batch in one bulk write.
///
/// # Contract 📜
/// - One call, one network write (or none, for an empty batch).
/// - Connection-level failure is `Ok(BulkOutcome::BackendUnavailable)`.
/// - Anything else that goes wrong is `Err`; the caller abandons the batch.
/// - The caller owns the batch and clears it afterwards no matter what.
///
/// Ancient proverb: "He who retries inside the sink, stalls the queue in production."
#[async_trait]
pub trait Sink: std::fmt::Debug + Send {
    async fn bulk_insert(
        &mut self,
        destination: &Destination,
        batch: &[LogRecord],
    ) -> Result<BulkOutcome>;
}

/// 🎭 The many faces of a Sink — enum dispatch for the built-ins, a box for the rest.
#[derive(Debug)]
pub enum SinkBackend {
    InMemory(InMemorySink),
    Elasticsearch(ElasticsearchSink),
    Custom(Box<dyn Sink>),
}

#[async_trait]
impl Sink for SinkBackend {
    async fn bulk_insert(
        &mut self,
        destination: &Destination,
        batch: &[LogRecord],
    ) -> Result<BulkOutcome> {
        match self {
            SinkBackend::InMemory(sink) => sink.bulk_insert(destination, batch).await,
            SinkBackend::Elasticsearch(sink) => sink.bulk_insert(destination, batch).await,
            SinkBackend::Custom(sink) => sink.bulk_insert(destination, batch).await,
        }
    }
}
