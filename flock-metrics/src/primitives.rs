use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};

use crate::stats::ratio;

#[derive(Debug, Default)]
pub struct Counter(AtomicU64);

impl Counter {
    #[inline]
    pub fn increment(&self, value: u64) {
        self.0.fetch_add(value, Ordering::Relaxed);
    }

    #[inline]
    pub fn get(&self) -> u64 {
        self.0.load(Ordering::Relaxed)
    }
}

/// Gauge that also remembers the highest value it has held.
#[derive(Debug, Default)]
pub struct PeakGauge {
    current: AtomicI64,
    peak: AtomicI64,
}

impl PeakGauge {
    /// Increments the gauge and returns the new value.
    pub fn increment(&self) -> i64 {
        let new_value = self.current.fetch_add(1, Ordering::Relaxed).saturating_add(1);

        // CAS loop to keep the max without races.
        let mut cur = self.peak.load(Ordering::Relaxed);
        while new_value > cur {
            match self.peak.compare_exchange_weak(
                cur,
                new_value,
                Ordering::Relaxed,
                Ordering::Relaxed,
            ) {
                Ok(_) => break,
                Err(observed) => cur = observed,
            }
        }

        new_value
    }

    pub fn decrement(&self) {
        self.current.fetch_sub(1, Ordering::Relaxed);
    }

    pub fn get(&self) -> i64 {
        self.current.load(Ordering::Relaxed)
    }

    pub fn peak(&self) -> i64 {
        self.peak.load(Ordering::Relaxed)
    }
}

/// Hit ratio accumulator (e.g. passed checks over evaluated checks).
#[derive(Debug, Default)]
pub struct Rate {
    total: AtomicU64,
    hits: AtomicU64,
}

impl Rate {
    #[inline]
    pub fn add(&self, hit: bool) {
        self.total.fetch_add(1, Ordering::Relaxed);
        if hit {
            self.hits.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Returns `(total, hits)`.
    pub fn get(&self) -> (u64, u64) {
        (
            self.total.load(Ordering::Relaxed),
            self.hits.load(Ordering::Relaxed),
        )
    }

    pub fn rate(&self) -> Option<f64> {
        let (total, hits) = self.get();
        ratio(hits, total)
    }
}
