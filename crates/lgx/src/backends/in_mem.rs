use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use anyhow::Result;
use async_trait::async_trait;
use parking_lot::Mutex;

use crate::backends::{BulkOutcome, Destination, Sink};
use crate::common::LogRecord;

/// 📦 A sink that never forgets. Unlike my dad, who forgot my soccer game in 1998.
///
/// `InMemorySink` hoards every batch it's handed, in order, in a shared Vec.
/// Clone it before handing it to the pipeline and keep the clone: the `Arc` means
/// everyone shares the same vault, so tests can peek inside afterwards.
///
/// It can also be told to misbehave. `fail_next(n)` makes the next `n` writes return
/// an error; `go_dark_next(n)` makes them report the backend as unreachable. Both
/// are for tests that want to watch the pipeline shrug off a bad day.
#[derive(Debug, Default, Clone)]
pub struct InMemorySink {
    received: Arc<Mutex<Vec<Vec<LogRecord>>>>,
    failures_pending: Arc<AtomicUsize>,
    outages_pending: Arc<AtomicUsize>,
}

impl InMemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// 📋 Every delivered batch, in delivery order.
    pub fn batches(&self) -> Vec<Vec<LogRecord>> {
        self.received.lock().clone()
    }

    pub fn batch_sizes(&self) -> Vec<usize> {
        self.received.lock().iter().map(Vec::len).collect()
    }

    /// 📋 Every delivered record, flattened, in delivery order.
    pub fn records(&self) -> Vec<LogRecord> {
        self.received.lock().iter().flatten().cloned().collect()
    }

    pub fn fail_next(&self, writes: usize) {
        self.failures_pending.store(writes, Ordering::SeqCst);
    }

    pub fn go_dark_next(&self, writes: usize) {
        self.outages_pending.store(writes, Ordering::SeqCst);
    }
}

// -- decrement if positive; true when a pending mishap was consumed
fn take_one(counter: &AtomicUsize) -> bool {
    counter
        .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
        .is_ok()
}

#[async_trait]
impl Sink for InMemorySink {
    async fn bulk_insert(
        &mut self,
        _destination: &Destination,
        batch: &[LogRecord],
    ) -> Result<BulkOutcome> {
        if batch.is_empty() {
            return Ok(BulkOutcome::Empty);
        }
        if take_one(&self.outages_pending) {
            return Ok(BulkOutcome::BackendUnavailable);
        }
        if take_one(&self.failures_pending) {
            anyhow::bail!("💀 InMemorySink was told to fail this write, and it is nothing if not obedient");
        }
        // 🔒 The Mutex is load-bearing. Do not remove. I know it looks optional. It isn't.
        self.received.lock().push(batch.to_vec());
        Ok(BulkOutcome::Indexed {
            documents: batch.len(),
            rejected: 0,
        })
    }
}
