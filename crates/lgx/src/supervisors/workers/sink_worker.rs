//! 🎬 *[a queue fills with records. somewhere, a sink waits.]*
//! *[the clock on the wall reads 2:47am.]*
//! *[nobody asked for these debug logs. and yet, here they are.]*
//!
//! 🗑️ The SinkWorker — patient, tireless, and deeply unbothered by the chaos happening
//! upstream. It pulls records, it builds batches, it flushes batches. When a flush
//! fails it does not cry and it does not retry. It clears the batch and keeps going.
//!
//! 🔁 Per iteration:
//! 1. `poll()` — the cheap path, almost always hits under load
//! 2. `poll_timeout(200ms)` — the nap, when the queue is empty
//! 3. append whatever turned up
//! 4. flush if non-empty and (≥ 128 records or ≥ 1s since the last flush)
//!
//! 🛑 It runs while the gate says Started. On the way out, whatever's still in the
//! current batch is dropped and counted with the rest of the stop-time discards.

use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use tracing::{debug, error, trace};

use super::{FlushPolicy, Worker};
use crate::app_config::RuntimeConfig;
use crate::backends::{BulkOutcome, Destination, Sink, SinkBackend};
use crate::common::LogRecord;
use crate::queue::EventQueue;
use crate::stats::{ShipperStats, bump};
use crate::supervisors::LifecycleGate;

const WORKER_THREAD_NAME: &str = "lgx-sink-worker";

/// 🗑️ The SinkWorker: takes records from the queue, throws batches at a backend.
#[derive(Debug)]
pub(crate) struct SinkWorker {
    queue: Arc<EventQueue>,
    gate: Arc<LifecycleGate>,
    stats: Arc<ShipperStats>,
    sink: SinkBackend,
    destination: Destination,
    policy: FlushPolicy,
    poll_timeout: Duration,
}

impl SinkWorker {
    pub(crate) fn new(
        queue: Arc<EventQueue>,
        gate: Arc<LifecycleGate>,
        stats: Arc<ShipperStats>,
        sink: SinkBackend,
        destination: Destination,
        runtime: &RuntimeConfig,
    ) -> Self {
        Self {
            queue,
            gate,
            stats,
            sink,
            destination,
            policy: FlushPolicy {
                max_batch_size: runtime.max_batch_size.max(1),
                flush_interval: runtime.flush_interval(),
            },
            poll_timeout: runtime.poll_timeout(),
        }
    }

    /// 🔁 The loop. Returns the sink so the supervisor can reuse it on a later start.
    fn run(mut self) -> SinkBackend {
        // -- 🧵 a private single-threaded runtime, just for the sink's HTTP calls
        let runtime = match tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
        {
            Ok(runtime) => runtime,
            Err(err) => {
                error!("💀 SinkWorker couldn't build its runtime, log shipping is closing: {err}");
                self.gate.close();
                self.queue.interrupt_waiters();
                return self.sink;
            }
        };

        debug!("📥 SinkWorker started draining the queue");
        let mut batch: Vec<LogRecord> = Vec::with_capacity(self.policy.max_batch_size);
        let mut last_flush = Instant::now();

        while self.gate.is_started() {
            let next = match self.queue.poll() {
                Some(record) => Some(record),
                None => self.queue.poll_timeout(self.poll_timeout),
            };
            if let Some(record) = next {
                batch.push(record);
            }

            if self.policy.should_flush(batch.len(), last_flush.elapsed()) {
                last_flush = Instant::now();
                self.flush(&runtime, &mut batch);
            }
        }

        if !batch.is_empty() {
            debug!("🏁 SinkWorker stopping with {} unflushed records; they go down with the ship", batch.len());
            bump(&self.stats.discarded_on_stop, batch.len() as u64);
        }
        debug!("🏁 SinkWorker: gate closed. Shutting down.");
        self.sink
    }

    /// 📡 Hand the batch to the sink, count the outcome, clear the batch. Always clear.
    fn flush(&mut self, runtime: &tokio::runtime::Runtime, batch: &mut Vec<LogRecord>) {
        let size = batch.len() as u64;
        let outcome = runtime.block_on(self.sink.bulk_insert(&self.destination, batch));
        match outcome {
            Ok(BulkOutcome::Indexed { documents, rejected }) => {
                bump(&self.stats.flushes, 1);
                bump(&self.stats.shipped, documents as u64);
                bump(&self.stats.rejected_documents, rejected as u64);
                trace!("🪣 SinkWorker flushed {} records", documents);
            }
            Ok(BulkOutcome::Empty) => {}
            Ok(BulkOutcome::BackendUnavailable) => {
                // -- 🔌 counted, not logged. the next flush is the retry.
                bump(&self.stats.backend_unavailable, 1);
                bump(&self.stats.abandoned, size);
            }
            Err(err) => {
                bump(&self.stats.failed_flushes, 1);
                bump(&self.stats.abandoned, size);
                error!("💀 Bulk write failed, {} records abandoned: {:#}", size, err);
            }
        }
        batch.clear();
    }
}

impl Worker for SinkWorker {
    type Output = SinkBackend;

    fn start(self) -> Result<JoinHandle<SinkBackend>> {
        std::thread::Builder::new()
            .name(WORKER_THREAD_NAME.to_string())
            .spawn(move || self.run())
            .context("💀 The OS declined to give the SinkWorker a thread. Rude, but within its rights.")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::InMemorySink;
    use crate::common::Severity;
    use crate::queue::tests::record;

    struct Rig {
        queue: Arc<EventQueue>,
        gate: Arc<LifecycleGate>,
        stats: Arc<ShipperStats>,
        sink: InMemorySink,
    }

    fn rig(capacity: usize) -> Rig {
        let gate = Arc::new(LifecycleGate::default());
        gate.open();
        Rig {
            queue: Arc::new(EventQueue::new(capacity)),
            gate,
            stats: Arc::new(ShipperStats::default()),
            sink: InMemorySink::new(),
        }
    }

    fn destination() -> Destination {
        Destination {
            index: "syslog".into(),
            doc_type: None,
        }
    }

    fn spawn(rig: &Rig, runtime: &RuntimeConfig) -> JoinHandle<SinkBackend> {
        SinkWorker::new(
            Arc::clone(&rig.queue),
            Arc::clone(&rig.gate),
            Arc::clone(&rig.stats),
            SinkBackend::InMemory(rig.sink.clone()),
            destination(),
            runtime,
        )
        .start()
        .expect("💀 worker should spawn")
    }

    fn wait_for(mut done: impl FnMut() -> bool, limit: Duration) -> bool {
        let started = Instant::now();
        while started.elapsed() < limit {
            if done() {
                return true;
            }
            std::thread::sleep(Duration::from_millis(10));
        }
        done()
    }

    fn shut_down(rig: &Rig, handle: JoinHandle<SinkBackend>) {
        rig.gate.close();
        rig.queue.interrupt_waiters();
        handle.join().expect("💀 worker panicked");
    }

    #[test]
    fn the_one_where_two_hundred_records_ship_as_128_then_72_in_order() {
        let rig = rig(256);
        for i in 0..200 {
            assert!(rig.queue.try_offer(record(&i.to_string(), Severity::INFO)).is_ok());
        }
        let handle = spawn(&rig, &RuntimeConfig::default());

        let sink = rig.sink.clone();
        assert!(
            wait_for(|| sink.batch_sizes().len() >= 2, Duration::from_secs(5)),
            "expected two flushes, saw {:?}",
            sink.batch_sizes()
        );
        shut_down(&rig, handle);

        assert_eq!(rig.sink.batch_sizes(), vec![128, 72]);
        let shipped: Vec<String> = rig.sink.records().iter().map(|r| r.content().to_string()).collect();
        let expected: Vec<String> = (0..200).map(|i| i.to_string()).collect();
        assert_eq!(shipped, expected, "order survives across batch boundaries");

        let snapshot = rig.stats.snapshot();
        assert_eq!(snapshot.flushes, 2);
        assert_eq!(snapshot.shipped, 200);
    }

    #[test]
    fn the_one_where_a_lonely_record_waits_for_the_timer() {
        let rig = rig(16);
        let runtime = RuntimeConfig {
            flush_interval_ms: 300,
            poll_timeout_ms: 20,
            ..RuntimeConfig::default()
        };
        let handle = spawn(&rig, &runtime);
        // -- let the first interval lapse with nothing in hand
        std::thread::sleep(Duration::from_millis(350));
        let enqueued_at = Instant::now();
        assert!(rig.queue.try_offer(record("solo", Severity::WARN)).is_ok());

        let sink = rig.sink.clone();
        assert!(wait_for(|| !sink.batch_sizes().is_empty(), Duration::from_secs(3)));
        // -- the timer had already run out, so the solo record goes on the next turn
        assert!(enqueued_at.elapsed() < Duration::from_millis(300));
        shut_down(&rig, handle);
        assert_eq!(rig.sink.batch_sizes(), vec![1]);
    }

    #[test]
    fn the_one_where_a_failed_flush_is_abandoned_and_the_loop_lives_on() {
        let rig = rig(16);
        rig.sink.fail_next(1);
        let runtime = RuntimeConfig {
            max_batch_size: 2,
            ..RuntimeConfig::default()
        };
        let handle = spawn(&rig, &runtime);

        for c in ["doomed-1", "doomed-2"] {
            assert!(rig.queue.try_offer(record(c, Severity::ERROR)).is_ok());
        }
        let stats = Arc::clone(&rig.stats);
        assert!(wait_for(|| stats.snapshot().failed_flushes == 1, Duration::from_secs(3)));

        for c in ["fine-1", "fine-2"] {
            assert!(rig.queue.try_offer(record(c, Severity::ERROR)).is_ok());
        }
        let sink = rig.sink.clone();
        assert!(wait_for(|| sink.batch_sizes() == vec![2], Duration::from_secs(3)));
        shut_down(&rig, handle);

        let shipped: Vec<String> = rig.sink.records().iter().map(|r| r.content().to_string()).collect();
        assert_eq!(shipped, vec!["fine-1", "fine-2"], "the failed batch is never re-sent");
        let snapshot = rig.stats.snapshot();
        assert_eq!(snapshot.abandoned, 2);
        assert_eq!(snapshot.shipped, 2);
    }

    #[test]
    fn the_one_where_the_backend_goes_dark_and_nobody_panics() {
        let rig = rig(16);
        rig.sink.go_dark_next(1);
        let runtime = RuntimeConfig {
            max_batch_size: 1,
            ..RuntimeConfig::default()
        };
        let handle = spawn(&rig, &runtime);

        assert!(rig.queue.try_offer(record("into the void", Severity::ERROR)).is_ok());
        let stats = Arc::clone(&rig.stats);
        assert!(wait_for(|| stats.snapshot().backend_unavailable == 1, Duration::from_secs(3)));

        assert!(rig.queue.try_offer(record("back online", Severity::ERROR)).is_ok());
        let sink = rig.sink.clone();
        assert!(wait_for(|| sink.records().len() == 1, Duration::from_secs(3)));
        shut_down(&rig, handle);

        assert_eq!(rig.sink.records()[0].content(), "back online");
        let snapshot = rig.stats.snapshot();
        assert_eq!(snapshot.failed_flushes, 0, "an outage is not a failure");
        assert_eq!(snapshot.flushes, 1);
    }

    #[test]
    fn the_one_where_closing_the_gate_ends_the_loop_promptly() {
        let rig = rig(16);
        let runtime = RuntimeConfig {
            poll_timeout_ms: 10_000,
            ..RuntimeConfig::default()
        };
        let handle = spawn(&rig, &runtime);
        std::thread::sleep(Duration::from_millis(30));

        let started = Instant::now();
        shut_down(&rig, handle);
        assert!(started.elapsed() < Duration::from_secs(5), "interrupt should cut the nap short");
    }
}
