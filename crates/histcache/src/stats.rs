//! Histogram cache counters

use std::sync::atomic::{AtomicU64, Ordering};

/// Lock-free counters shared by all readers of one [`HistCache`](crate::HistCache)
#[derive(Debug, Default)]
pub struct CacheStats {
    hits: AtomicU64,
    misses: AtomicU64,
    failures: AtomicU64,
    evictions: AtomicU64,
    decoded_bins: AtomicU64,
}

/// Point-in-time copy of [`CacheStats`]
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct StatsSnapshot {
    /// Lookups served from memory
    pub hits: u64,
    /// Lookups that went to the container
    pub misses: u64,
    /// Misses whose decode failed (never cached)
    pub failures: u64,
    /// Histograms dropped to make room
    pub evictions: u64,
    /// Bins decoded across all successful misses
    pub decoded_bins: u64,
    /// hits / (hits + misses), 0.0 when idle
    pub hit_ratio: f64,
}

impl StatsSnapshot {
    /// Histograms decoded and inserted
    pub fn inserts(&self) -> u64 {
        self.misses.saturating_sub(self.failures)
    }
}

fn bump(counter: &AtomicU64, by: u64) {
    counter.fetch_add(by, Ordering::Relaxed);
}

impl CacheStats {
    /// All counters at zero
    pub fn new() -> Self {
        Self::default()
    }

    /// A lookup served from memory
    pub fn record_hit(&self) {
        bump(&self.hits, 1);
    }

    /// A lookup that had to read the container
    pub fn record_miss(&self) {
        bump(&self.misses, 1);
    }

    /// A miss whose histogram could not be read
    pub fn record_failure(&self) {
        bump(&self.failures, 1);
    }

    /// A freshly decoded histogram of `bins` bins entered the cache
    pub fn record_decode(&self, bins: usize) {
        bump(&self.decoded_bins, bins as u64);
    }

    /// A cached histogram was dropped
    pub fn record_eviction(&self) {
        bump(&self.evictions, 1);
    }

    /// Total hits
    pub fn hits(&self) -> u64 {
        self.hits.load(Ordering::Relaxed)
    }

    /// Total misses, failed ones included
    pub fn misses(&self) -> u64 {
        self.misses.load(Ordering::Relaxed)
    }

    /// Total evictions
    pub fn evictions(&self) -> u64 {
        self.evictions.load(Ordering::Relaxed)
    }

    /// Fraction of lookups served without decoding
    pub fn hit_ratio(&self) -> f64 {
        self.snapshot().hit_ratio
    }

    /// Copy every counter
    pub fn snapshot(&self) -> StatsSnapshot {
        let hits = self.hits();
        let misses = self.misses();
        let lookups = hits + misses;

        StatsSnapshot {
            hits,
            misses,
            failures: self.failures.load(Ordering::Relaxed),
            evictions: self.evictions(),
            decoded_bins: self.decoded_bins.load(Ordering::Relaxed),
            hit_ratio: if lookups == 0 {
                0.0
            } else {
                hits as f64 / lookups as f64
            },
        }
    }

    /// Zero every counter
    pub fn reset(&self) {
        for counter in [
            &self.hits,
            &self.misses,
            &self.failures,
            &self.evictions,
            &self.decoded_bins,
        ] {
            counter.store(0, Ordering::Relaxed);
        }
    }
}
