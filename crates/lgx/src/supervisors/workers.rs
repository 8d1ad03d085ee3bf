//! 🧵 Workers: the ones who actually do the work while the Supervisor takes all the
//! credit in the sprint retro.
//!
//! Exactly one worker exists per started lifecycle: the [`SinkWorker`], which drains
//! the queue into batches and batches into the sink. It gets its own OS thread,
//! because producers block on a condvar and so may it.

use std::thread::JoinHandle;
use std::time::Duration;

use anyhow::Result;

mod sink_worker;
pub(crate) use sink_worker::SinkWorker;

/// 🏗️ A background worker, that does work. duh.
///
/// `start` consumes the worker and hands back the thread's handle. Whatever the worker
/// returns when it's done comes back through `join`.
pub(crate) trait Worker {
    type Output: Send + 'static;

    fn start(self) -> Result<JoinHandle<Self::Output>>;
}

/// ⏱️ When does a batch go out? Non-empty, and either big enough or old enough.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct FlushPolicy {
    pub(crate) max_batch_size: usize,
    pub(crate) flush_interval: Duration,
}

impl FlushPolicy {
    pub(crate) fn should_flush(&self, batch_len: usize, since_last_flush: Duration) -> bool {
        batch_len > 0
            && (batch_len >= self.max_batch_size || since_last_flush >= self.flush_interval)
    }
}
