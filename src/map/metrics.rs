//! Dispatch Metrics Collection
//!
//! Counters describing what an observable map emitted and delivered.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

use crate::domain::events::ChangeAction;

/// Dispatch metrics collector
#[derive(Debug, Default)]
pub struct DispatchMetrics {
    adds: AtomicU64,
    replaces: AtomicU64,
    removes: AtomicU64,
    resets: AtomicU64,

    // Mutations that left observable state unchanged
    suppressed: AtomicU64,

    deliveries: AtomicU64,
    delivery_failures: AtomicU64,
}

impl DispatchMetrics {
    /// Create a new metrics collector
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_event(&self, action: ChangeAction) {
        let counter = match action {
            ChangeAction::Add => &self.adds,
            ChangeAction::Replace => &self.replaces,
            ChangeAction::Remove => &self.removes,
            ChangeAction::Reset => &self.resets,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_suppressed(&self) {
        self.suppressed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_deliveries(&self, attempted: usize, failed: usize) {
        self.deliveries.fetch_add(attempted as u64, Ordering::Relaxed);
        self.delivery_failures
            .fetch_add(failed as u64, Ordering::Relaxed);
    }

    /// Get a snapshot of all counters
    pub fn snapshot(&self) -> DispatchStats {
        DispatchStats {
            adds: self.adds.load(Ordering::Relaxed),
            replaces: self.replaces.load(Ordering::Relaxed),
            removes: self.removes.load(Ordering::Relaxed),
            resets: self.resets.load(Ordering::Relaxed),
            suppressed: self.suppressed.load(Ordering::Relaxed),
            deliveries: self.deliveries.load(Ordering::Relaxed),
            delivery_failures: self.delivery_failures.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time copy of [`DispatchMetrics`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DispatchStats {
    pub adds: u64,
    pub replaces: u64,
    pub removes: u64,
    pub resets: u64,
    pub suppressed: u64,
    pub deliveries: u64,
    pub delivery_failures: u64,
}

impl DispatchStats {
    /// Total number of events emitted
    pub fn events(&self) -> u64 {
        self.adds + self.replaces + self.removes + self.resets
    }

    /// Fraction of deliveries that failed
    pub fn failure_ratio(&self) -> f64 {
        if self.deliveries == 0 {
            0.0
        } else {
            self.delivery_failures as f64 / self.deliveries as f64
        }
    }
}
