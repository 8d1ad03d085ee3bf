//! 📊 stats.rs — "how many did we lose?" — every best-effort pipeline, eventually.
//!
//! Counters only. None of these feed back into control flow; they exist so a human
//! can look at a table and decide whether to be worried. All atomics, all `Relaxed`,
//! because nobody orders their diagnostics against anything else. 🦆

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

use comfy_table::{Cell, CellAlignment, ContentArrangement, Table, presets::NOTHING};
use serde::Serialize;

/// 📊 Live counters shared by producers, the consumer worker and the supervisor.
#[derive(Debug, Default)]
pub struct ShipperStats {
    pub(crate) enqueued: AtomicU64,
    pub(crate) dropped_low_severity: AtomicU64,
    pub(crate) dropped_stopped: AtomicU64,
    pub(crate) dropped_retries_exhausted: AtomicU64,
    pub(crate) evicted: AtomicU64,
    pub(crate) interrupted_waits: AtomicU64,
    pub(crate) peak_occupancy: AtomicUsize,
    pub(crate) flushes: AtomicU64,
    pub(crate) shipped: AtomicU64,
    pub(crate) failed_flushes: AtomicU64,
    pub(crate) abandoned: AtomicU64,
    pub(crate) backend_unavailable: AtomicU64,
    pub(crate) rejected_documents: AtomicU64,
    pub(crate) discarded_on_stop: AtomicU64,
}

#[inline]
pub(crate) fn bump(counter: &AtomicU64, by: u64) {
    counter.fetch_add(by, Ordering::Relaxed);
}

impl ShipperStats {
    /// 🏔️ Remember the highest occupancy anyone has seen. Many producers race here;
    /// `fetch_max` settles it without a lock.
    pub(crate) fn observe_occupancy(&self, occupancy: usize) {
        self.peak_occupancy.fetch_max(occupancy, Ordering::Relaxed);
    }

    /// 📸 A point-in-time copy. Counters keep moving while you read it; that's fine.
    pub fn snapshot(&self) -> StatsSnapshot {
        let load = |c: &AtomicU64| c.load(Ordering::Relaxed);
        StatsSnapshot {
            enqueued: load(&self.enqueued),
            dropped_low_severity: load(&self.dropped_low_severity),
            dropped_stopped: load(&self.dropped_stopped),
            dropped_retries_exhausted: load(&self.dropped_retries_exhausted),
            evicted: load(&self.evicted),
            interrupted_waits: load(&self.interrupted_waits),
            peak_occupancy: self.peak_occupancy.load(Ordering::Relaxed),
            flushes: load(&self.flushes),
            shipped: load(&self.shipped),
            failed_flushes: load(&self.failed_flushes),
            abandoned: load(&self.abandoned),
            backend_unavailable: load(&self.backend_unavailable),
            rejected_documents: load(&self.rejected_documents),
            discarded_on_stop: load(&self.discarded_on_stop),
        }
    }
}

/// 📸 Plain-number copy of [`ShipperStats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StatsSnapshot {
    pub enqueued: u64,
    pub dropped_low_severity: u64,
    pub dropped_stopped: u64,
    pub dropped_retries_exhausted: u64,
    pub evicted: u64,
    pub interrupted_waits: u64,
    pub peak_occupancy: usize,
    pub flushes: u64,
    pub shipped: u64,
    pub failed_flushes: u64,
    pub abandoned: u64,
    pub backend_unavailable: u64,
    pub rejected_documents: u64,
    pub discarded_on_stop: u64,
}

impl StatsSnapshot {
    /// 🗑️ Everything that entered the pipeline's care and didn't make it out.
    pub fn total_lost(&self) -> u64 {
        self.dropped_low_severity
            + self.dropped_stopped
            + self.dropped_retries_exhausted
            + self.evicted
            + self.abandoned
            + self.discarded_on_stop
    }

    /// 🍽️ Render as a two-column table. Comfy. Lumbar support included.
    pub fn to_table(&self) -> Table {
        let rows: [(&str, String); 15] = [
            ("enqueued", self.enqueued.to_string()),
            ("dropped (low severity)", self.dropped_low_severity.to_string()),
            ("dropped (stopped)", self.dropped_stopped.to_string()),
            ("dropped (retries exhausted)", self.dropped_retries_exhausted.to_string()),
            ("evicted", self.evicted.to_string()),
            ("interrupted waits", self.interrupted_waits.to_string()),
            ("peak occupancy", self.peak_occupancy.to_string()),
            ("flushes", self.flushes.to_string()),
            ("shipped", self.shipped.to_string()),
            ("failed flushes", self.failed_flushes.to_string()),
            ("abandoned", self.abandoned.to_string()),
            ("backend unavailable", self.backend_unavailable.to_string()),
            ("rejected documents", self.rejected_documents.to_string()),
            ("discarded on stop", self.discarded_on_stop.to_string()),
            ("total lost", self.total_lost().to_string()),
        ];

        let mut table = Table::new();
        table
            .load_preset(NOTHING)
            .set_content_arrangement(ContentArrangement::Dynamic);
        for (label, value) in rows {
            table.add_row(vec![
                Cell::new(label),
                Cell::new(value).set_alignment(CellAlignment::Right),
            ]);
        }
        table
    }
}
