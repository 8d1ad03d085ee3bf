//! 🎬 *[camera pans across a dimly lit server room]*
//! 🎬 "In a world where log lines pile up faster than anyone can read them..."
//! 🎬 "One supervisor decides when the shipping starts, and when it stops."
//! 🎬 *[record scratch]* 🦆
//!
//! 📦 The Supervisor module: owns the lifecycle of the whole pipeline.
//!
//! Stopped ──start() (config valid)──▶ Started ──stop()──▶ Stopped. Again, if you like.
//!
//! ⚠️ The workers stay private. The world gets `start`, `stop`, and `admit`, and that's it.

mod workers;

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::JoinHandle;

use parking_lot::Mutex;
use tracing::{error, info, warn};

use crate::admission::{Admission, AdmissionController};
use crate::app_config::AppConfig;
use crate::backends::{ElasticsearchSink, SinkBackend};
use crate::common::LogRecord;
use crate::queue::EventQueue;
use crate::stats::{ShipperStats, StatsSnapshot, bump};
use workers::{SinkWorker, Worker};

/// 🚦 Started or Stopped. Read on every `admit` and every consumer iteration,
/// flipped only by the Supervisor.
#[derive(Debug, Default)]
pub(crate) struct LifecycleGate {
    started: AtomicBool,
}

impl LifecycleGate {
    /// True when this call did the Stopped → Started flip.
    pub(crate) fn open(&self) -> bool {
        self.started
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    /// True when this call did the Started → Stopped flip.
    pub(crate) fn close(&self) -> bool {
        self.started
            .compare_exchange(true, false, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    pub(crate) fn is_started(&self) -> bool {
        self.started.load(Ordering::Acquire)
    }
}

// -- whoever holds the sink right now: the supervisor (idle) or the worker thread (running)
#[derive(Debug)]
enum WorkerSlot {
    Idle(Option<SinkBackend>),
    Running(JoinHandle<SinkBackend>),
}

/// 📦 The Supervisor: part middle manager, part bouncer's boss.
///
/// The slot mutex serializes `start` and `stop` against each other. `admit` never
/// touches it, so producers don't queue up behind a slow shutdown.
#[derive(Debug)]
pub(crate) struct Supervisor {
    app_config: AppConfig,
    host_name: String,
    queue: Arc<EventQueue>,
    gate: Arc<LifecycleGate>,
    stats: Arc<ShipperStats>,
    admission: AdmissionController,
    slot: Mutex<WorkerSlot>,
}

impl Supervisor {
    /// 🚀 Birth of a Supervisor. Stopped, with a queue and nothing to put in it yet.
    /// Pass a sink to skip building the Elasticsearch client on first start.
    pub(crate) fn new(app_config: AppConfig, host_name: String, sink: Option<SinkBackend>) -> Self {
        let queue = Arc::new(EventQueue::new(app_config.runtime.queue_capacity));
        let gate = Arc::new(LifecycleGate::default());
        let stats = Arc::new(ShipperStats::default());
        let admission = AdmissionController::new(
            Arc::clone(&queue),
            Arc::clone(&gate),
            Arc::clone(&stats),
            &app_config.runtime,
        );
        Self {
            app_config,
            host_name,
            queue,
            gate,
            stats,
            admission,
            slot: Mutex::new(WorkerSlot::Idle(sink)),
        }
    }

    /// 🚀 Stopped → Started, if the config allows it. Returns whether the pipeline is
    /// running afterwards. Calling it while already running is a no-op that says `true`.
    pub(crate) fn start(&self) -> bool {
        let mut slot = self.slot.lock();
        if matches!(*slot, WorkerSlot::Running(_)) {
            return true;
        }

        let es_config = &self.app_config.elasticsearch;
        let address = match es_config.validate() {
            Ok(address) => address,
            Err(err) => {
                warn!("💤 Log shipping stays stopped: {err:#}");
                return false;
            }
        };

        let parked = match &mut *slot {
            WorkerSlot::Idle(sink) => sink.take(),
            WorkerSlot::Running(_) => None,
        };
        let sink = match parked {
            Some(sink) => sink,
            None => match ElasticsearchSink::new(es_config.clone()) {
                Ok(sink) => SinkBackend::Elasticsearch(sink),
                Err(err) => {
                    warn!("💤 Log shipping stays stopped: {err:#}");
                    return false;
                }
            },
        };

        self.gate.open();
        let worker = SinkWorker::new(
            Arc::clone(&self.queue),
            Arc::clone(&self.gate),
            Arc::clone(&self.stats),
            sink,
            es_config.destination(),
            &self.app_config.runtime,
        );
        match worker.start() {
            Ok(handle) => {
                *slot = WorkerSlot::Running(handle);
                info!(
                    "🚀 Log shipping started: {} → index '{}', queue capacity {}, shedding INFO and below at {}",
                    address,
                    es_config.index,
                    self.queue.capacity(),
                    self.admission.threshold()
                );
                true
            }
            Err(err) => {
                // -- the sink went down with the closure. next start builds a fresh client.
                self.gate.close();
                warn!("💤 Log shipping stays stopped: {err:#}");
                false
            }
        }
    }

    /// 🛑 Started → Stopped. Wakes every blocked producer, waits for the worker to
    /// finish its current flush, then throws away whatever is still queued.
    pub(crate) fn stop(&self) {
        let mut slot = self.slot.lock();
        let was_started = self.gate.close();
        self.queue.interrupt_waiters();

        if let WorkerSlot::Running(handle) = std::mem::replace(&mut *slot, WorkerSlot::Idle(None)) {
            match handle.join() {
                Ok(sink) => *slot = WorkerSlot::Idle(Some(sink)),
                Err(_) => error!("💀 The sink worker panicked on its way out. Its sink is gone with it."),
            }
        }

        let discarded = self.queue.clear();
        bump(&self.stats.discarded_on_stop, discarded as u64);
        if was_started {
            info!("🛑 Log shipping stopped, {} queued records discarded", discarded);
        }
    }

    pub(crate) fn is_started(&self) -> bool {
        self.gate.is_started()
    }

    pub(crate) fn admit(&self, record: LogRecord) -> Admission {
        self.admission.admit(record)
    }

    pub(crate) fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }

    pub(crate) fn queue_len(&self) -> usize {
        self.queue.len()
    }

    pub(crate) fn host_name(&self) -> &str {
        &self.host_name
    }
}

impl Drop for Supervisor {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::admission::DropReason;
    use crate::backends::InMemorySink;
    use crate::common::Severity;
    use crate::queue::tests::record;

    fn enabled_config() -> AppConfig {
        let mut config = AppConfig::default();
        config.elasticsearch.enabled = true;
        config.elasticsearch.host = "127.0.0.1".into();
        config.elasticsearch.port = "9200".into();
        config
    }

    #[test]
    fn the_one_where_the_gate_only_flips_once_each_way() {
        let gate = LifecycleGate::default();
        assert!(!gate.is_started());
        assert!(gate.open());
        assert!(!gate.open(), "already open");
        assert!(gate.is_started());
        assert!(gate.close());
        assert!(!gate.close(), "already closed");
        assert!(!gate.is_started());
    }

    #[test]
    fn the_one_where_disabled_means_disabled() {
        let supervisor = Supervisor::new(AppConfig::default(), "box".into(), Some(SinkBackend::InMemory(InMemorySink::new())));
        assert!(!supervisor.start());
        assert!(!supervisor.is_started());
        assert_eq!(
            supervisor.admit(record("nope", Severity::FATAL)),
            Admission::Dropped(DropReason::Stopped)
        );
    }

    #[test]
    fn the_one_where_a_bad_port_keeps_everything_stopped() {
        let mut config = enabled_config();
        config.elasticsearch.port = "ninety-two hundred".into();
        let supervisor = Supervisor::new(config, "box".into(), None);
        assert!(!supervisor.start());
        assert!(!supervisor.is_started());
    }

    #[test]
    fn the_one_where_start_twice_is_still_one_worker() {
        let sink = InMemorySink::new();
        let supervisor = Supervisor::new(enabled_config(), "box".into(), Some(SinkBackend::InMemory(sink)));
        assert!(supervisor.start());
        assert!(supervisor.start());
        assert!(matches!(*supervisor.slot.lock(), WorkerSlot::Running(_)));
        supervisor.stop();
        assert!(!supervisor.is_started());
    }

    #[test]
    fn the_one_where_stop_throws_out_the_leftovers() {
        let sink = InMemorySink::new();
        let supervisor = Supervisor::new(enabled_config(), "box".into(), Some(SinkBackend::InMemory(sink.clone())));
        // -- park records without a running worker so nothing ships before stop
        supervisor.gate.open();
        for i in 0..5 {
            assert_eq!(supervisor.admit(record(&i.to_string(), Severity::WARN)), Admission::Enqueued);
        }
        supervisor.stop();

        assert_eq!(supervisor.queue_len(), 0);
        assert_eq!(supervisor.stats().discarded_on_stop, 5);
        assert!(sink.records().is_empty());
    }

    #[test]
    fn the_one_where_the_sink_survives_a_restart() {
        let sink = InMemorySink::new();
        let supervisor = Supervisor::new(enabled_config(), "box".into(), Some(SinkBackend::InMemory(sink)));
        assert!(supervisor.start());
        supervisor.stop();
        assert!(matches!(
            *supervisor.slot.lock(),
            WorkerSlot::Idle(Some(SinkBackend::InMemory(_)))
        ));
        assert!(supervisor.start());
        supervisor.stop();
    }
}
