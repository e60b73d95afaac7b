// src/sinks.rs
//
// Shared state written by the ingestion loop and read by the display side.
//
// - MotionHistory: bounded ring of recent motion readings (FIFO eviction)
// - LogHistory: bounded, append-only log lines
// - StatusSnapshot: last successfully decoded transmitter PerformanceStatus
//
// Writers are crate-private: only the ingestion worker mutates these.
// Readers take a snapshot under a read lock, so a reader never sees a
// half-applied push/evict.

use std::collections::VecDeque;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::io::PerformanceStatus;

fn read_lock<T>(lock: &RwLock<T>) -> RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(|e| e.into_inner())
}

fn write_lock<T>(lock: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(|e| e.into_inner())
}

// ============================================================================
// Bounded History
// ============================================================================

#[derive(Debug)]
struct Ring<T> {
    items: VecDeque<T>,
    /// Values ever pushed; not reset by clear
    pushed: u64,
}

/// Thread-safe ring buffer. Pushing past capacity evicts the oldest entry.
#[derive(Debug)]
pub struct BoundedHistory<T> {
    capacity: usize,
    entries: RwLock<Ring<T>>,
}

impl<T: Clone> BoundedHistory<T> {
    /// Capacity is clamped to at least one entry
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        BoundedHistory {
            capacity,
            entries: RwLock::new(Ring {
                items: VecDeque::with_capacity(capacity),
                pushed: 0,
            }),
        }
    }

    pub(crate) fn push(&self, value: T) {
        let mut ring = write_lock(&self.entries);
        while ring.items.len() >= self.capacity {
            ring.items.pop_front();
        }
        ring.items.push_back(value);
        ring.pushed += 1;
    }

    pub(crate) fn clear(&self) {
        write_lock(&self.entries).items.clear();
    }

    /// Copy of the current contents, oldest first
    pub fn snapshot(&self) -> Vec<T> {
        read_lock(&self.entries).items.iter().cloned().collect()
    }

    /// Contents plus the running push count, taken under one lock.
    /// Comparing counts between snapshots tells how many entries are new,
    /// even when they repeat earlier values.
    pub fn snapshot_with_total(&self) -> (Vec<T>, u64) {
        let ring = read_lock(&self.entries);
        (ring.items.iter().cloned().collect(), ring.pushed)
    }

    pub fn latest(&self) -> Option<T> {
        read_lock(&self.entries).items.back().cloned()
    }

    pub fn len(&self) -> usize {
        read_lock(&self.entries).items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

/// Recent motion readings
pub type MotionHistory = BoundedHistory<i64>;

/// Recent log lines (remote LOGS payloads and link diagnostics)
pub type LogHistory = BoundedHistory<String>;

// ============================================================================
// Status Snapshot
// ============================================================================

/// Last transmitter status; None until the first status frame arrives
#[derive(Debug, Default)]
pub struct StatusSnapshot {
    status: RwLock<Option<PerformanceStatus>>,
}

impl StatusSnapshot {
    pub(crate) fn replace(&self, status: PerformanceStatus) {
        *write_lock(&self.status) = Some(status);
    }

    pub(crate) fn clear(&self) {
        *write_lock(&self.status) = None;
    }

    pub fn get(&self) -> Option<PerformanceStatus> {
        read_lock(&self.status).clone()
    }
}

// ============================================================================
// Sink Bundle
// ============================================================================

/// The three sinks fed by one link session
#[derive(Debug)]
pub struct LinkSinks {
    motion: MotionHistory,
    logs: LogHistory,
    status: StatusSnapshot,
}

impl LinkSinks {
    pub fn new(motion_capacity: usize, log_capacity: usize) -> Self {
        LinkSinks {
            motion: MotionHistory::new(motion_capacity),
            logs: LogHistory::new(log_capacity),
            status: StatusSnapshot::default(),
        }
    }

    pub fn motion(&self) -> &MotionHistory {
        &self.motion
    }

    pub fn logs(&self) -> &LogHistory {
        &self.logs
    }

    pub fn status(&self) -> &StatusSnapshot {
        &self.status
    }

    pub(crate) fn push_motion(&self, value: i64) {
        self.motion.push(value);
    }

    pub(crate) fn push_log(&self, line: impl Into<String>) {
        self.logs.push(line.into());
    }

    pub(crate) fn set_status(&self, status: PerformanceStatus) {
        self.status.replace(status);
    }

    /// Empty all sinks (system powered on again)
    pub(crate) fn reset(&self) {
        self.motion.clear();
        self.logs.clear();
        self.status.clear();
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;

    #[test]
    fn test_capacity_keeps_last_values_in_order() {
        let history = MotionHistory::new(5);
        let k = 7;

        for v in 0..(5 + k) {
            history.push(v as i64);
        }

        assert_eq!(history.len(), 5);
        assert_eq!(history.snapshot(), vec![7, 8, 9, 10, 11]);
        assert_eq!(history.latest(), Some(11));
    }

    #[test]
    fn test_zero_capacity_clamped() {
        let history = LogHistory::new(0);
        history.push("a".to_string());
        history.push("b".to_string());
        assert_eq!(history.capacity(), 1);
        assert_eq!(history.snapshot(), vec!["b".to_string()]);
    }

    #[test]
    fn test_push_total_counts_repeats_and_survives_clear() {
        let history = LogHistory::new(2);
        for _ in 0..3 {
            history.push("Link error".to_string());
        }

        let (items, total) = history.snapshot_with_total();
        assert_eq!(items, vec!["Link error".to_string(); 2]);
        assert_eq!(total, 3);

        history.clear();
        history.push("Link error".to_string());
        assert_eq!(history.snapshot_with_total().1, 4);
    }

    #[test]
    fn test_status_overwritten_wholesale() {
        let sinks = LinkSinks::new(50, 10);
        assert!(sinks.status().get().is_none());

        let ts = chrono::NaiveDate::from_ymd_opt(2025, 1, 1)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap();
        let first = PerformanceStatus {
            cpu: 1.0,
            ram: 2.0,
            disk: 3.0,
            net_up_kbps: 4.0,
            net_down_kbps: 5.0,
            version: "v1".to_string(),
            timestamp: ts,
        };
        let second = PerformanceStatus {
            cpu: 9.0,
            version: "v2".to_string(),
            ..first.clone()
        };

        sinks.set_status(first);
        sinks.set_status(second.clone());
        assert_eq!(sinks.status().get(), Some(second));
    }

    #[test]
    fn test_reset_empties_everything() {
        let sinks = LinkSinks::new(3, 3);
        sinks.push_motion(1);
        sinks.push_log("Transmitter online");

        sinks.reset();

        assert!(sinks.motion().is_empty());
        assert!(sinks.logs().is_empty());
        assert!(sinks.status().get().is_none());
    }

    #[test]
    fn test_concurrent_readers_see_consistent_snapshots() {
        let capacity = 16;
        let sinks = Arc::new(LinkSinks::new(capacity, 4));
        let done = Arc::new(AtomicBool::new(false));

        let readers: Vec<_> = (0..4)
            .map(|_| {
                let sinks = sinks.clone();
                let done = done.clone();
                std::thread::spawn(move || {
                    let mut checked = 0usize;
                    while !done.load(Ordering::SeqCst) || checked == 0 {
                        let snap = sinks.motion().snapshot();
                        assert!(snap.len() <= capacity);
                        // Writer pushes 0,1,2,... so any snapshot is a run of
                        // consecutive values with no gaps or duplicates.
                        for pair in snap.windows(2) {
                            assert_eq!(pair[1], pair[0] + 1);
                        }
                        checked += 1;
                    }
                    checked
                })
            })
            .collect();

        for v in 0..20_000i64 {
            sinks.push_motion(v);
        }
        done.store(true, Ordering::SeqCst);

        for reader in readers {
            assert!(reader.join().unwrap() > 0);
        }
        assert_eq!(sinks.motion().latest(), Some(19_999));
        assert_eq!(sinks.motion().len(), capacity);
    }
}
