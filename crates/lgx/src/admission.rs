//! 🚪 Admission control — the bouncer between application threads and the queue.
//!
//! 🎬 *[the queue is 82% full. an INFO log walks up to the door.]*
//! *["not tonight," says the bouncer. an ERROR log walks up. "right this way."]*
//!
//! Every call returns an [`Admission`] and never an error. Whatever goes wrong in
//! here stays in here; the thread that logged moves on with its life.
//!
//! ```text
//!   admit(record)
//!     │ stopped? ───────────────────────────────▶ Dropped(Stopped)
//!     │ occupancy ≥ T and severity ≤ INFO? ─────▶ Dropped(Pressure)
//!     ▼
//!   offer (wait ≤ offer_timeout) ──ok──▶ Enqueued
//!     │ interrupted → one try_offer ──ok──▶ Enqueued
//!     │ timed out / still full
//!     ▼
//!   evict min(chunk, occupancy) oldest, go again
//!     │ … up to max_eviction_rounds …
//!     ▼
//!   Dropped(RetriesExhausted)
//! ```

use std::sync::Arc;
use std::time::Duration;

use crate::app_config::RuntimeConfig;
use crate::common::{LogRecord, Severity};
use crate::queue::{EventQueue, Offer};
use crate::stats::{ShipperStats, bump};
use crate::supervisors::LifecycleGate;

/// 📬 The verdict for one record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    Enqueued,
    Dropped(DropReason),
}

/// 🗑️ Why a record didn't make it in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DropReason {
    /// 💤 The pipeline isn't running. Every record is a silent discard.
    Stopped,
    /// 🌡️ The queue is past the threshold and this record is INFO or quieter.
    Pressure,
    /// 🔁 Waited, evicted, waited again, and still no room after the last round.
    RetriesExhausted,
}

/// 🚪 Decides enqueue-or-drop for every incoming record.
#[derive(Debug)]
pub(crate) struct AdmissionController {
    queue: Arc<EventQueue>,
    gate: Arc<LifecycleGate>,
    stats: Arc<ShipperStats>,
    threshold: usize,
    offer_timeout: Duration,
    eviction_chunk: usize,
    max_eviction_rounds: usize,
}

impl AdmissionController {
    pub(crate) fn new(
        queue: Arc<EventQueue>,
        gate: Arc<LifecycleGate>,
        stats: Arc<ShipperStats>,
        runtime: &RuntimeConfig,
    ) -> Self {
        Self {
            queue,
            gate,
            stats,
            threshold: runtime.pressure_threshold(),
            offer_timeout: runtime.offer_timeout(),
            eviction_chunk: runtime.eviction_chunk.max(1),
            max_eviction_rounds: runtime.max_eviction_rounds,
        }
    }

    pub(crate) fn threshold(&self) -> usize {
        self.threshold
    }

    /// 🚪 Enqueue or drop. Blocks at most `offer_timeout` per round, never panics,
    /// never returns an error.
    pub(crate) fn admit(&self, record: LogRecord) -> Admission {
        if !self.gate.is_started() {
            bump(&self.stats.dropped_stopped, 1);
            return Admission::Dropped(DropReason::Stopped);
        }
        // -- 🌡️ shed the chatter first. WARN and up always get a shot at the door.
        if self.queue.len() >= self.threshold && record.severity() <= Severity::INFO {
            bump(&self.stats.dropped_low_severity, 1);
            return Admission::Dropped(DropReason::Pressure);
        }
        self.offer_or_evict(record)
    }

    fn offer_or_evict(&self, mut record: LogRecord) -> Admission {
        let mut round = 0;
        loop {
            match self.queue.offer_timeout(record, self.offer_timeout) {
                Offer::Accepted(occupancy) => return self.accepted(occupancy),
                Offer::TimedOut(bounced) => record = bounced,
                Offer::Interrupted(bounced) => {
                    bump(&self.stats.interrupted_waits, 1);
                    // -- one immediate non-blocking retry before falling back to eviction
                    match self.queue.try_offer(bounced) {
                        Ok(occupancy) => return self.accepted(occupancy),
                        Err(bounced) => record = bounced,
                    }
                }
            }

            if !self.gate.is_started() {
                bump(&self.stats.dropped_stopped, 1);
                return Admission::Dropped(DropReason::Stopped);
            }
            if round >= self.max_eviction_rounds {
                bump(&self.stats.dropped_retries_exhausted, 1);
                return Admission::Dropped(DropReason::RetriesExhausted);
            }
            round += 1;

            // 🗑️ the consumer isn't keeping up. the oldest records pay for it, whatever their level.
            let evicted = self.queue.evict_oldest(self.eviction_chunk);
            bump(&self.stats.evicted, evicted as u64);
        }
    }

    fn accepted(&self, occupancy: usize) -> Admission {
        self.stats.observe_occupancy(occupancy);
        bump(&self.stats.enqueued, 1);
        Admission::Enqueued
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queue::tests::record;
    use std::thread;
    use std::time::Instant;

    struct Rig {
        queue: Arc<EventQueue>,
        gate: Arc<LifecycleGate>,
        stats: Arc<ShipperStats>,
        controller: AdmissionController,
    }

    fn rig(runtime: RuntimeConfig) -> Rig {
        let queue = Arc::new(EventQueue::new(runtime.queue_capacity));
        let gate = Arc::new(LifecycleGate::default());
        gate.open();
        let stats = Arc::new(ShipperStats::default());
        let controller =
            AdmissionController::new(Arc::clone(&queue), Arc::clone(&gate), Arc::clone(&stats), &runtime);
        Rig { queue, gate, stats, controller }
    }

    fn fill(queue: &EventQueue, n: usize, severity: Severity) {
        for i in 0..n {
            assert!(queue.try_offer(record(&format!("pre-{i}"), severity)).is_ok());
        }
    }

    #[test]
    fn the_one_where_a_stopped_pipeline_discards_everything() {
        let rig = rig(RuntimeConfig::default());
        rig.gate.close();
        let verdict = rig.controller.admit(record("hello", Severity::FATAL));
        assert_eq!(verdict, Admission::Dropped(DropReason::Stopped));
        assert!(rig.queue.is_empty());
        assert_eq!(rig.stats.snapshot().dropped_stopped, 1);
    }

    #[test]
    fn the_one_where_a_calm_queue_lets_everyone_in() {
        let rig = rig(RuntimeConfig::default());
        for severity in [Severity::TRACE, Severity::DEBUG, Severity::INFO, Severity::WARN] {
            assert_eq!(rig.controller.admit(record("calm", severity)), Admission::Enqueued);
        }
        assert_eq!(rig.queue.len(), 4);
        let snapshot = rig.stats.snapshot();
        assert_eq!(snapshot.enqueued, 4);
        assert_eq!(snapshot.peak_occupancy, 4);
    }

    #[test]
    fn the_one_where_pressure_sheds_ten_infos_but_not_the_error() {
        let rig = rig(RuntimeConfig::default());
        assert_eq!(rig.controller.threshold(), 204);
        fill(&rig.queue, 210, Severity::DEBUG);

        let infos: Vec<_> = (0..10)
            .map(|i| rig.controller.admit(record(&format!("info-{i}"), Severity::INFO)))
            .collect();
        assert!(infos.iter().all(|v| *v == Admission::Dropped(DropReason::Pressure)));
        assert_eq!(rig.queue.len(), 210, "dropped records never touch occupancy");

        let verdict = rig.controller.admit(record("the error", Severity::ERROR));
        assert_eq!(verdict, Admission::Enqueued);
        assert_eq!(rig.queue.len(), 211);

        let snapshot = rig.stats.snapshot();
        assert_eq!(snapshot.dropped_low_severity, 10);
        assert_eq!(snapshot.enqueued, 1);
        assert_eq!(snapshot.peak_occupancy, 211);
    }

    #[test]
    fn the_one_where_a_full_queue_evicts_exactly_sixteen_of_the_oldest() {
        let rig = rig(RuntimeConfig {
            offer_timeout_ms: 10,
            ..RuntimeConfig::default()
        });
        fill(&rig.queue, 256, Severity::FATAL);

        let verdict = rig.controller.admit(record("late error", Severity::ERROR));
        assert_eq!(verdict, Admission::Enqueued);

        let contents = rig.queue.snapshot_contents();
        assert_eq!(contents.len(), 256 - 16 + 1);
        assert_eq!(contents.first().map(String::as_str), Some("pre-16"));
        assert_eq!(contents.last().map(String::as_str), Some("late error"));
        assert!(!contents.iter().any(|c| c == "pre-0" || c == "pre-15"));
        assert_eq!(rig.stats.snapshot().evicted, 16);
    }

    #[test]
    fn the_one_where_retries_run_out_and_the_record_is_dropped() {
        // -- zero eviction rounds: one timed-out wait and the record is out
        let rig = rig(RuntimeConfig {
            queue_capacity: 1,
            offer_timeout_ms: 5,
            max_eviction_rounds: 0,
            ..RuntimeConfig::default()
        });
        fill(&rig.queue, 1, Severity::FATAL);

        let started = Instant::now();
        let verdict = rig.controller.admit(record("unlucky", Severity::FATAL));
        assert_eq!(verdict, Admission::Dropped(DropReason::RetriesExhausted));
        assert!(started.elapsed() < Duration::from_secs(1));
        assert_eq!(rig.stats.snapshot().dropped_retries_exhausted, 1);
        assert_eq!(rig.queue.snapshot_contents(), vec!["pre-0"]);
    }

    #[test]
    fn the_one_where_stopping_mid_wait_turns_into_a_drop() {
        let rig = rig(RuntimeConfig {
            queue_capacity: 1,
            offer_timeout_ms: 5_000,
            ..RuntimeConfig::default()
        });
        fill(&rig.queue, 1, Severity::FATAL);

        let gate = Arc::clone(&rig.gate);
        let queue = Arc::clone(&rig.queue);
        let stopper = thread::spawn(move || {
            thread::sleep(Duration::from_millis(30));
            gate.close();
            queue.interrupt_waiters();
        });

        let started = Instant::now();
        let verdict = rig.controller.admit(record("caught mid-wait", Severity::ERROR));
        stopper.join().expect("💀 stopper panicked");

        assert_eq!(verdict, Admission::Dropped(DropReason::Stopped));
        assert!(started.elapsed() < Duration::from_secs(5), "interrupt must cut the wait short");
        let snapshot = rig.stats.snapshot();
        assert_eq!(snapshot.interrupted_waits, 1);
        assert_eq!(snapshot.dropped_stopped, 1);
    }

    #[test]
    fn the_one_where_a_hammering_crowd_never_overfills_the_queue() {
        let rig = Arc::new(rig(RuntimeConfig {
            queue_capacity: 32,
            offer_timeout_ms: 1,
            ..RuntimeConfig::default()
        }));
        let producers: Vec<_> = (0..6)
            .map(|p| {
                let rig = Arc::clone(&rig);
                thread::spawn(move || {
                    for i in 0..200 {
                        let severity = if i % 2 == 0 { Severity::INFO } else { Severity::ERROR };
                        let _ = rig.controller.admit(record(&format!("{p}-{i}"), severity));
                        assert!(rig.queue.len() <= rig.queue.capacity());
                    }
                })
            })
            .collect();
        for p in producers {
            p.join().expect("💀 producer panicked");
        }
        assert!(rig.queue.len() <= 32);
        assert!(rig.stats.snapshot().peak_occupancy <= 32);
    }
}
