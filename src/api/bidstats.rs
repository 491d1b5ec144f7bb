//! Sliding-window statistics over recently submitted payload sizes.
//!
//! The window keeps the last `entries_for_tally` observations in insertion
//! order and publishes the average over them after every insertion. The
//! published average is what bid submissions are compared against.

use std::{
    collections::VecDeque,
    sync::{Arc, RwLock},
};

use arc_swap::ArcSwap;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BidStatsEntry {
    pub slot: u64,
    pub payload_size: u64,
}

/// Average and insert count published by the latest insertion
#[derive(Debug, Default, Clone, Copy, PartialEq)]
struct Tally {
    payload_size_avg: f64,
    payload_count: u64,
}

pub struct BidStats {
    entries: RwLock<VecDeque<BidStatsEntry>>,
    entries_for_tally: u64,
    tally: ArcSwap<Tally>,
}

impl BidStats {
    /// A window of zero entries is allowed; it retains nothing and never
    /// reports a deviation.
    pub fn new(entries_for_tally: u64) -> Self {
        Self {
            entries: RwLock::new(VecDeque::new()),
            entries_for_tally,
            tally: ArcSwap::from_pointee(Tally::default()),
        }
    }

    pub fn add_entry(&self, slot: u64, payload_size: u64) {
        // Recovering from poisoning is fine: the deque is never left mid-update.
        let mut entries = self.entries.write().unwrap_or_else(|e| e.into_inner());

        entries.push_back(BidStatsEntry { slot, payload_size });
        if entries.len() as u64 > self.entries_for_tally {
            entries.pop_front();
        }

        let (_, _, payload_size_avg) = Self::window_stats(&entries, self.entries_for_tally);
        let payload_count = self.tally.load().payload_count + 1;

        // Published while still holding the write lock so tallies are ordered.
        self.tally.store(Arc::new(Tally {
            payload_size_avg,
            payload_count,
        }));
    }

    /// Total, count and average over the newest `max_entries` observations
    pub fn payload_size_stats(&self, max_entries: u64) -> (u64, u64, f64) {
        let entries = self.entries.read().unwrap_or_else(|e| e.into_inner());
        Self::window_stats(&entries, max_entries)
    }

    fn window_stats(entries: &VecDeque<BidStatsEntry>, max_entries: u64) -> (u64, u64, f64) {
        let take = entries.len().min(usize::try_from(max_entries).unwrap_or(usize::MAX));
        if take == 0 {
            return (0, 0, 0.0);
        }

        let total: u64 = entries
            .iter()
            .skip(entries.len() - take)
            .map(|e| e.payload_size)
            .sum();
        let count = take as u64;

        (total, count, total as f64 / count as f64)
    }

    /// Fractional deviation of `payload_size` from the published average.
    ///
    /// 50% below average is -0.5; values above 1.0 are possible and not
    /// clamped. Returns 0 until the window has been filled once.
    pub fn payload_size_deviation(&self, payload_size: u64) -> f64 {
        let tally = self.tally.load();
        if tally.payload_size_avg == 0.0 || tally.payload_count < self.entries_for_tally {
            return 0.0;
        }
        (payload_size as f64 - tally.payload_size_avg) / tally.payload_size_avg
    }

    pub fn capacity(&self) -> u64 {
        self.entries_for_tally
    }

    /// Number of insertions since creation, including evicted ones
    pub fn total_inserted(&self) -> u64 {
        self.tally.load().payload_count
    }

    /// Average published by the latest insertion
    pub fn running_average(&self) -> f64 {
        self.tally.load().payload_size_avg
    }

    pub fn len(&self) -> usize {
        self.entries.read().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Snapshot of the retained window, oldest first
    pub fn entries(&self) -> Vec<BidStatsEntry> {
        self.entries
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .copied()
            .collect()
    }
}
