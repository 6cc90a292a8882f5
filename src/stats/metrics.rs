//! Statistics and metrics for the accelerator and the remoting pipeline
//!
//! Counters are updated with relaxed atomics on the hot path; callers read a
//! plain snapshot struct.

use std::sync::atomic::{AtomicU64, Ordering};

/// Accelerator cache statistics
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AcceleratorStats {
    /// Lookups answered by a published entry
    pub hits: u64,
    /// Lookups that found no entry and went through the build lock
    pub misses: u64,
    /// Compiled types built from a resolved descriptor
    pub builds: u64,
    /// Identifiers that degraded to a named dynamic bag
    pub dynamic_bags: u64,
}

impl AcceleratorStats {
    /// Share of lookups answered without building
    pub fn hit_ratio(&self) -> f64 {
        let total = self.hits + self.misses;
        if total > 0 {
            self.hits as f64 / total as f64
        } else {
            0.0
        }
    }
}

#[derive(Debug, Default)]
pub(crate) struct AcceleratorCounters {
    hits: AtomicU64,
    misses: AtomicU64,
    builds: AtomicU64,
    dynamic_bags: AtomicU64,
}

impl AcceleratorCounters {
    pub(crate) fn hit(&self) {
        self.hits.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn miss(&self) {
        self.misses.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn build(&self) {
        self.builds.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn dynamic_bag(&self) {
        self.dynamic_bags.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn snapshot(&self) -> AcceleratorStats {
        AcceleratorStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            builds: self.builds.load(Ordering::Relaxed),
            dynamic_bags: self.dynamic_bags.load(Ordering::Relaxed),
        }
    }
}

/// Remoting adapter statistics
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RemotingStats {
    /// Calls received
    pub calls: u64,
    /// Calls answered from the result cache
    pub cache_hits: u64,
    /// Calls that ended in a fault
    pub faults: u64,
    /// Calls rejected by the role check
    pub unauthorized: u64,
}

#[derive(Debug, Default)]
pub(crate) struct RemotingCounters {
    calls: AtomicU64,
    cache_hits: AtomicU64,
    faults: AtomicU64,
    unauthorized: AtomicU64,
}

impl RemotingCounters {
    pub(crate) fn call(&self) {
        self.calls.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn cache_hit(&self) {
        self.cache_hits.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn fault(&self) {
        self.faults.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn unauthorized(&self) {
        self.unauthorized.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn snapshot(&self) -> RemotingStats {
        RemotingStats {
            calls: self.calls.load(Ordering::Relaxed),
            cache_hits: self.cache_hits.load(Ordering::Relaxed),
            faults: self.faults.load(Ordering::Relaxed),
            unauthorized: self.unauthorized.load(Ordering::Relaxed),
        }
    }
}
