//! Timers and clocks
//!
//! Every wait in the trainer is a scheduled task rather than a sleep. A
//! [`Scheduler`] holds pending tasks ordered by deadline; owners pop the due
//! ones and validate each against the live state before acting, since the
//! world may have moved on between scheduling and firing.
//!
//! Time is read through a [`Clock`] so tests can drive it by hand.

use std::sync::atomic::{AtomicI64, Ordering};

/// Source of wall-clock time in epoch milliseconds
pub trait Clock: Send + Sync {
    fn now_ms(&self) -> i64;
}

/// Real time via chrono
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_ms(&self) -> i64 {
        chrono::Utc::now().timestamp_millis()
    }
}

/// Hand-driven clock for tests and replays
#[derive(Debug, Default)]
pub struct ManualClock {
    now: AtomicI64,
}

impl ManualClock {
    pub fn new(start_ms: i64) -> Self {
        Self {
            now: AtomicI64::new(start_ms),
        }
    }

    pub fn set(&self, ms: i64) {
        self.now.store(ms, Ordering::SeqCst);
    }

    pub fn advance(&self, ms: i64) {
        self.now.fetch_add(ms, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now_ms(&self) -> i64 {
        self.now.load(Ordering::SeqCst)
    }
}

/// Handle for cancelling a scheduled task
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TimerId(u64);

#[derive(Debug)]
struct Entry<T> {
    id: TimerId,
    due_ms: i64,
    task: T,
}

/// Deadline-ordered queue of cancelable tasks
///
/// Tasks with equal deadlines fire in scheduling order.
#[derive(Debug)]
pub struct Scheduler<T> {
    next_id: u64,
    entries: Vec<Entry<T>>,
}

impl<T> Default for Scheduler<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Scheduler<T> {
    pub fn new() -> Self {
        Self {
            next_id: 0,
            entries: Vec::new(),
        }
    }

    /// Schedule `task` to fire `delay_ms` after `now_ms`
    pub fn schedule(&mut self, now_ms: i64, delay_ms: u64, task: T) -> TimerId {
        let id = TimerId(self.next_id);
        self.next_id += 1;

        let due_ms = now_ms.saturating_add(i64::try_from(delay_ms).unwrap_or(i64::MAX));
        // Keep entries sorted by (due, id); ids grow monotonically so insertion
        // after every entry with due <= ours preserves FIFO for ties.
        let position = self.entries.partition_point(|e| e.due_ms <= due_ms);
        self.entries.insert(position, Entry { id, due_ms, task });
        id
    }

    /// Cancel a pending task; returns false if it already fired or was cancelled
    pub fn cancel(&mut self, id: TimerId) -> bool {
        match self.entries.iter().position(|e| e.id == id) {
            Some(index) => {
                self.entries.remove(index);
                true
            }
            None => false,
        }
    }

    /// Remove and return the earliest task due at or before `now_ms`
    pub fn pop_due(&mut self, now_ms: i64) -> Option<(TimerId, T)> {
        match self.entries.first() {
            Some(entry) if entry.due_ms <= now_ms => {
                let entry = self.entries.remove(0);
                Some((entry.id, entry.task))
            }
            _ => None,
        }
    }

    /// Deadline of the earliest pending task
    pub fn next_deadline(&self) -> Option<i64> {
        self.entries.first().map(|e| e.due_ms)
    }
}
