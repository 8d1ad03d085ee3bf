//! 🚢 lgx: ships your application's log events to Elasticsearch, best-effort.
//!
//! 🎬 *[an application logs. it does not wait. it does not care where the log goes.]*
//! *[somewhere behind it, a queue, a bouncer, and a very patient worker thread.]*
//!
//! The pieces, front to back:
//! - [`ShippingLayer`] turns `tracing` events into [`LogRecord`]s
//! - the admission controller enqueues them, sheds chatter under pressure, and evicts
//!   the oldest when the queue is full
//! - one worker thread drains the queue into batches of up to 128, or whatever piled
//!   up in the last second, and bulk-writes them
//! - [`Shipper`] starts and stops the lot
//!
//! Nothing here ever fails the caller. Records get dropped instead, and counted.

pub mod app_config;
pub mod backends;
mod admission;
mod common;
mod composers;
mod layer;
mod queue;
mod stats;
mod supervisors;

use std::sync::Arc;

pub use admission::{Admission, DropReason};
pub use app_config::{AppConfig, RuntimeConfig, load_config};
pub use common::{LogRecord, Severity, render_content, resolve_host_name};
pub use layer::ShippingLayer;
pub use stats::StatsSnapshot;

use backends::SinkBackend;
use supervisors::Supervisor;

/// 🚢 The handle to one shipping pipeline. Cheap to clone; every clone steers the same
/// pipeline. The pipeline stops when the last clone goes away.
#[derive(Debug, Clone)]
pub struct Shipper {
    inner: Arc<Supervisor>,
}

impl Shipper {
    /// Stopped, with the Elasticsearch sink built from `app_config` on first [`start`](Self::start).
    pub fn new(app_config: AppConfig, host_name: impl Into<String>) -> Self {
        Self {
            inner: Arc::new(Supervisor::new(app_config, host_name.into(), None)),
        }
    }

    /// Stopped, with a sink of your choosing. The Elasticsearch settings are still
    /// validated on `start`, so `enabled`, `host` and `port` still matter.
    pub fn with_sink(app_config: AppConfig, host_name: impl Into<String>, sink: SinkBackend) -> Self {
        Self {
            inner: Arc::new(Supervisor::new(app_config, host_name.into(), Some(sink))),
        }
    }

    /// 🚀 True if the pipeline is running when this returns.
    pub fn start(&self) -> bool {
        self.inner.start()
    }

    /// 🛑 Blocks until the worker has finished its current flush. Queued records are discarded.
    pub fn stop(&self) {
        self.inner.stop()
    }

    pub fn is_started(&self) -> bool {
        self.inner.is_started()
    }

    /// 🚪 Offer one record. May block a producer for a bounded time when the queue is full.
    pub fn admit(&self, record: LogRecord) -> Admission {
        self.inner.admit(record)
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.inner.stats()
    }

    pub fn queue_len(&self) -> usize {
        self.inner.queue_len()
    }

    pub fn host_name(&self) -> &str {
        self.inner.host_name()
    }

    /// 🪝 A `tracing_subscriber` layer that feeds this pipeline.
    pub fn layer(&self) -> ShippingLayer {
        ShippingLayer::new(self.clone())
    }
}
