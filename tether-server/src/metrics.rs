use std::time::{Duration, Instant};
use tether_core::CommitSummary;
use tracing::info;

/// Counters for the periodic synchronization summary
///
/// Everything resets after each emit.
#[derive(Debug)]
pub struct SyncMetrics {
    interval: Duration,
    last_emit: Instant,
    transactions: u64,
    failures: u64,
    polls: u64,
    full_refreshes: u64,
    updates: u64,
    async_pushes: u64,
    windows_closed: u64,
    total_txn_ns: u128,
    max_txn_us: u64,
    session_high_water: usize,
}

impl SyncMetrics {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            last_emit: Instant::now(),
            transactions: 0,
            failures: 0,
            polls: 0,
            full_refreshes: 0,
            updates: 0,
            async_pushes: 0,
            windows_closed: 0,
            total_txn_ns: 0,
            max_txn_us: 0,
            session_high_water: 0,
        }
    }

    pub fn record_commit(&mut self, summary: &CommitSummary) {
        self.transactions += 1;
        self.updates += summary.update_count as u64;
        self.async_pushes += summary.async_pushes as u64;
        if summary.full_refresh {
            self.full_refreshes += 1;
        }
        if summary.window_closed {
            self.windows_closed += 1;
        }
        self.total_txn_ns += summary.elapsed.as_nanos();
        let micros = summary.elapsed.as_micros() as u64;
        if micros > self.max_txn_us {
            self.max_txn_us = micros;
        }
    }

    pub fn record_failure(&mut self) {
        self.failures += 1;
    }

    pub fn record_poll(&mut self) {
        self.polls += 1;
    }

    pub fn observe_sessions(&mut self, sessions: usize) {
        if sessions > self.session_high_water {
            self.session_high_water = sessions;
        }
    }

    pub fn transactions(&self) -> u64 {
        self.transactions
    }

    pub fn failures(&self) -> u64 {
        self.failures
    }

    pub fn polls(&self) -> u64 {
        self.polls
    }

    pub fn async_pushes(&self) -> u64 {
        self.async_pushes
    }

    /// Log and reset once the interval has passed; returns whether it did
    pub fn maybe_emit(&mut self) -> bool {
        if self.last_emit.elapsed() < self.interval {
            return false;
        }

        let avg_txn_us = if self.transactions > 0 {
            (self.total_txn_ns / self.transactions as u128) as u64 / 1000
        } else {
            0
        };

        info!(
            target = "tether::sync",
            transactions = self.transactions,
            failures = self.failures,
            polls = self.polls,
            full_refreshes = self.full_refreshes,
            updates = self.updates,
            async_pushes = self.async_pushes,
            windows_closed = self.windows_closed,
            txn_avg_us = avg_txn_us,
            txn_max_us = self.max_txn_us,
            session_high_water = self.session_high_water,
            "sync-metrics"
        );

        *self = Self::new(self.interval);
        true
    }
}
