//! 🪣 The bounded event queue — a fixed-size waiting room for log records.
//!
//! 🎬 *[a queue of 256 seats. 257 people show up. someone has to stand outside.]*
//!
//! Many producers push, exactly one consumer pops, and nobody outside this file
//! ever holds the lock. A `parking_lot::Mutex<VecDeque>` plus two condvars: one for
//! "there's room now" and one for "there's something to eat now".
//!
//! 🧠 Knowledge graph:
//! - `offer_timeout` is the producer's bounded wait. It can time out, or be
//!   interrupted when the supervisor calls [`EventQueue::interrupt_waiters`] on stop.
//! - `poll` / `poll_timeout` are the consumer's fast and slow paths.
//! - `evict_oldest` is the admission controller's pressure valve: drop from the
//!   front, regardless of severity, under the same lock as everything else.
//! - `0 <= len <= capacity` always. Every insert checks it under the lock. 🔒

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};

use crate::common::LogRecord;

/// 📬 What happened to a bounded-wait offer.
///
/// The record comes back on failure. Ownership never leaks: either the queue has it
/// or the caller does.
#[derive(Debug)]
pub enum Offer {
    /// ✅ In the queue. Carries the occupancy right after the insert.
    Accepted(usize),
    /// ⏰ Waited the whole window, still full.
    TimedOut(LogRecord),
    /// 🛑 Woken early by `interrupt_waiters`, record not inserted.
    Interrupted(LogRecord),
}

#[derive(Debug)]
struct Slots {
    records: VecDeque<LogRecord>,
    // -- bumped by interrupt_waiters; a waiter that sees it change gives up
    interrupt_epoch: u64,
}

/// 🪣 Fixed-capacity MPSC-ish buffer with bounded waits on both ends.
#[derive(Debug)]
pub struct EventQueue {
    slots: Mutex<Slots>,
    not_full: Condvar,
    not_empty: Condvar,
    capacity: usize,
}

impl EventQueue {
    /// 🏗️ A zero-capacity queue would reject everything forever, so capacity is at least 1.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            slots: Mutex::new(Slots {
                records: VecDeque::with_capacity(capacity),
                interrupt_epoch: 0,
            }),
            not_full: Condvar::new(),
            not_empty: Condvar::new(),
            capacity,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.slots.lock().records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.lock().records.is_empty()
    }

    /// ⚡ Non-blocking insert. Hands the record back if there's no room.
    pub fn try_offer(&self, record: LogRecord) -> Result<usize, LogRecord> {
        let mut slots = self.slots.lock();
        if slots.records.len() >= self.capacity {
            return Err(record);
        }
        slots.records.push_back(record);
        let occupancy = slots.records.len();
        drop(slots);
        self.not_empty.notify_one();
        Ok(occupancy)
    }

    /// ⏳ Insert, waiting up to `wait` for a free slot.
    pub fn offer_timeout(&self, record: LogRecord, wait: Duration) -> Offer {
        let deadline = Instant::now() + wait;
        let mut slots = self.slots.lock();
        let epoch = slots.interrupt_epoch;
        while slots.records.len() >= self.capacity {
            if slots.interrupt_epoch != epoch {
                return Offer::Interrupted(record);
            }
            if self.not_full.wait_until(&mut slots, deadline).timed_out() {
                // -- one last look: the consumer may have freed a slot right at the buzzer
                if slots.records.len() >= self.capacity {
                    return Offer::TimedOut(record);
                }
                break;
            }
        }
        slots.records.push_back(record);
        let occupancy = slots.records.len();
        drop(slots);
        self.not_empty.notify_one();
        Offer::Accepted(occupancy)
    }

    /// ⚡ Non-blocking take from the front.
    pub fn poll(&self) -> Option<LogRecord> {
        let mut slots = self.slots.lock();
        let record = slots.records.pop_front();
        drop(slots);
        if record.is_some() {
            self.not_full.notify_one();
        }
        record
    }

    /// ⏳ Take from the front, waiting up to `wait`. Returns `None` on timeout or when
    /// interrupted, so a stopping consumer doesn't sit out its full window.
    pub fn poll_timeout(&self, wait: Duration) -> Option<LogRecord> {
        let deadline = Instant::now() + wait;
        let mut slots = self.slots.lock();
        let epoch = slots.interrupt_epoch;
        while slots.records.is_empty() {
            if slots.interrupt_epoch != epoch {
                return None;
            }
            if self.not_empty.wait_until(&mut slots, deadline).timed_out() {
                break;
            }
        }
        let record = slots.records.pop_front();
        drop(slots);
        if record.is_some() {
            self.not_full.notify_one();
        }
        record
    }

    /// 🗑️ Drop up to `max` of the oldest records. Returns how many actually left.
    ///
    /// Severity is not consulted. Age is the only criterion. Harsh, but fair-ish.
    pub fn evict_oldest(&self, max: usize) -> usize {
        let mut slots = self.slots.lock();
        let evicted = max.min(slots.records.len());
        slots.records.drain(..evicted);
        drop(slots);
        if evicted > 0 {
            self.not_full.notify_all();
        }
        evicted
    }

    /// 🧹 Empty the queue. Returns how many records went down with it.
    pub fn clear(&self) -> usize {
        let mut slots = self.slots.lock();
        let cleared = slots.records.len();
        slots.records.clear();
        drop(slots);
        self.not_full.notify_all();
        cleared
    }

    /// 🛑 Wake every waiter on both sides and tell them to give up their current wait.
    pub fn interrupt_waiters(&self) {
        let mut slots = self.slots.lock();
        slots.interrupt_epoch = slots.interrupt_epoch.wrapping_add(1);
        drop(slots);
        self.not_full.notify_all();
        self.not_empty.notify_all();
    }

    #[cfg(test)]
    pub(crate) fn snapshot_contents(&self) -> Vec<String> {
        self.slots
            .lock()
            .records
            .iter()
            .map(|r| r.content().to_string())
            .collect()
    }
}
