//! Gate counters, readable from other tasks while the loop runs.

use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Debug, Default)]
pub struct GateStats {
    pub cycles: AtomicU64,
    pub decided: AtomicU64,
    pub executed: AtomicU64,
    pub throttled: AtomicU64,
    pub skipped_hardware: AtomicU64,
    pub skipped_market: AtomicU64,
    pub actuation_failures: AtomicU64,
}

impl GateStats {
    pub fn snapshot(&self) -> GateStatsSnapshot {
        GateStatsSnapshot {
            cycles: self.cycles.load(Ordering::Relaxed),
            decided: self.decided.load(Ordering::Relaxed),
            executed: self.executed.load(Ordering::Relaxed),
            throttled: self.throttled.load(Ordering::Relaxed),
            skipped_hardware: self.skipped_hardware.load(Ordering::Relaxed),
            skipped_market: self.skipped_market.load(Ordering::Relaxed),
            actuation_failures: self.actuation_failures.load(Ordering::Relaxed),
        }
    }

    pub(crate) fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct GateStatsSnapshot {
    pub cycles: u64,
    pub decided: u64,
    pub executed: u64,
    pub throttled: u64,
    pub skipped_hardware: u64,
    pub skipped_market: u64,
    pub actuation_failures: u64,
}

impl GateStatsSnapshot {
    pub fn skipped(&self) -> u64 {
        self.skipped_hardware + self.skipped_market
    }
}
