use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use hdrhistogram::Histogram;
use parking_lot::Mutex;
use smallvec::SmallVec;

use crate::histogram::{
    HISTOGRAM_HIGH_US, HistogramSummary, new_default_histogram, summarize_histogram,
};
use crate::stats::ratio;

/// One observation fed into a [`ShardedSeries`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Sample {
    pub latency: Duration,
    /// Response status, if a response was received.
    pub status: Option<u16>,
    /// Transport error label, if the call failed before a response.
    pub error: Option<&'static str>,
    pub failed: bool,
    pub bytes_sent: u64,
    pub bytes_received: u64,
}

impl Sample {
    /// A sample that only carries a duration (e.g. an iteration).
    pub fn timing(latency: Duration, failed: bool) -> Self {
        Self {
            latency,
            status: None,
            error: None,
            failed,
            bytes_sent: 0,
            bytes_received: 0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, strum::Display)]
pub enum StatusClass {
    #[strum(serialize = "1xx")]
    Informational,
    #[strum(serialize = "2xx")]
    Success,
    #[strum(serialize = "3xx")]
    Redirection,
    #[strum(serialize = "4xx")]
    ClientError,
    #[strum(serialize = "5xx")]
    ServerError,
}

impl StatusClass {
    pub fn of(status: u16) -> Option<Self> {
        match status {
            100..=199 => Some(Self::Informational),
            200..=299 => Some(Self::Success),
            300..=399 => Some(Self::Redirection),
            400..=499 => Some(Self::ClientError),
            500..=599 => Some(Self::ServerError),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct SeriesSnapshot {
    pub count: u64,
    pub failed: u64,
    pub bytes_sent: u64,
    pub bytes_received: u64,
    pub statuses: BTreeMap<u16, u64>,
    pub errors: BTreeMap<&'static str, u64>,
    /// Latency distribution in microseconds.
    pub latency_us: HistogramSummary,
}

impl SeriesSnapshot {
    pub fn failure_rate(&self) -> Option<f64> {
        ratio(self.failed, self.count)
    }

    pub fn status_classes(&self) -> BTreeMap<StatusClass, u64> {
        let mut out = BTreeMap::new();
        for (&status, &n) in &self.statuses {
            if let Some(class) = StatusClass::of(status) {
                *out.entry(class).or_insert(0) += n;
            }
        }
        out
    }
}

#[derive(Debug, Clone)]
struct Shard {
    count: u64,
    failed: u64,
    bytes_sent: u64,
    bytes_received: u64,
    statuses: SmallVec<[(u16, u64); 4]>,
    errors: SmallVec<[(&'static str, u64); 4]>,
    latency_us: Histogram<u64>,
}

impl Shard {
    fn new() -> Self {
        Self {
            count: 0,
            failed: 0,
            bytes_sent: 0,
            bytes_received: 0,
            statuses: SmallVec::new(),
            errors: SmallVec::new(),
            latency_us: new_default_histogram(),
        }
    }
}

fn bump<K: PartialEq>(list: &mut SmallVec<[(K, u64); 4]>, key: K) {
    match list.iter_mut().find(|(k, _)| *k == key) {
        Some((_, n)) => *n = n.saturating_add(1),
        None => list.push((key, 1)),
    }
}

static NEXT_SHARD_HINT: AtomicUsize = AtomicUsize::new(0);

thread_local! {
    static SHARD_HINT: usize = NEXT_SHARD_HINT.fetch_add(1, Ordering::Relaxed);
}

fn default_shard_count() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(4)
        .next_power_of_two()
        .max(4)
}

/// Request/latency series split into per-thread shards.
///
/// Writers lock only the shard assigned to their OS thread, so concurrent workers rarely
/// contend. Readers copy each shard in turn and merge the copies, which keeps every critical
/// section short. All merges are sums, so the result does not depend on write interleaving.
#[derive(Debug)]
pub struct ShardedSeries {
    shards: Box<[Mutex<Shard>]>,
    mask: usize,
}

impl Default for ShardedSeries {
    fn default() -> Self {
        Self::with_shards(default_shard_count())
    }
}

impl ShardedSeries {
    /// `shards` is rounded up to a power of two.
    pub fn with_shards(shards: usize) -> Self {
        let n = shards.max(1).next_power_of_two();
        Self {
            shards: (0..n).map(|_| Mutex::new(Shard::new())).collect(),
            mask: n - 1,
        }
    }

    pub fn shard_count(&self) -> usize {
        self.shards.len()
    }

    /// Records a sample. Returns `false` (and records nothing) when the latency is outside the
    /// histogram's trackable range.
    pub fn record(&self, sample: Sample) -> bool {
        let micros = u64::try_from(sample.latency.as_micros()).unwrap_or(u64::MAX);
        if micros > HISTOGRAM_HIGH_US {
            return false;
        }

        let idx = SHARD_HINT.with(|h| *h) & self.mask;
        let mut shard = self.shards[idx].lock();

        // Sub-microsecond samples are clamped to the lowest bucket.
        if shard.latency_us.record(micros.max(1)).is_err() {
            return false;
        }

        shard.count = shard.count.saturating_add(1);
        if sample.failed {
            shard.failed = shard.failed.saturating_add(1);
        }
        shard.bytes_sent = shard.bytes_sent.saturating_add(sample.bytes_sent);
        shard.bytes_received = shard.bytes_received.saturating_add(sample.bytes_received);
        if let Some(status) = sample.status {
            bump(&mut shard.statuses, status);
        }
        if let Some(error) = sample.error {
            bump(&mut shard.errors, error);
        }
        true
    }

    pub fn snapshot(&self) -> SeriesSnapshot {
        let mut out = SeriesSnapshot::default();
        let mut merged = new_default_histogram();

        for shard in self.shards.iter() {
            let copy = shard.lock().clone();

            out.count = out.count.saturating_add(copy.count);
            out.failed = out.failed.saturating_add(copy.failed);
            out.bytes_sent = out.bytes_sent.saturating_add(copy.bytes_sent);
            out.bytes_received = out.bytes_received.saturating_add(copy.bytes_received);
            for (status, n) in copy.statuses {
                *out.statuses.entry(status).or_insert(0) += n;
            }
            for (error, n) in copy.errors {
                *out.errors.entry(error).or_insert(0) += n;
            }
            let _ = merged.add(&copy.latency_us);
        }

        out.latency_us = summarize_histogram(&merged);
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn ok(ms: u64) -> Sample {
        Sample {
            latency: Duration::from_millis(ms),
            status: Some(200),
            error: None,
            failed: false,
            bytes_sent: 10,
            bytes_received: 20,
        }
    }

    #[test]
    fn shard_count_is_power_of_two() {
        assert_eq!(ShardedSeries::with_shards(3).shard_count(), 4);
        assert_eq!(ShardedSeries::with_shards(0).shard_count(), 1);
        assert!(ShardedSeries::default().shard_count() >= 4);
    }

    #[test]
    fn record_and_snapshot_accumulate() {
        let s = ShardedSeries::with_shards(4);
        assert!(s.record(ok(10)));
        assert!(s.record(Sample {
            status: Some(503),
            failed: true,
            ..ok(30)
        }));
        assert!(s.record(Sample {
            status: None,
            error: Some("timeout"),
            failed: true,
            bytes_received: 0,
            ..ok(100)
        }));

        let snap = s.snapshot();
        assert_eq!(snap.count, 3);
        assert_eq!(snap.failed, 2);
        assert_eq!(snap.bytes_sent, 30);
        assert_eq!(snap.bytes_received, 40);
        assert_eq!(snap.statuses.get(&200), Some(&1));
        assert_eq!(snap.statuses.get(&503), Some(&1));
        assert_eq!(snap.errors.get("timeout"), Some(&1));
        assert_eq!(snap.latency_us.count, 3);
        assert_eq!(snap.failure_rate(), Some(2.0 / 3.0));

        let classes = snap.status_classes();
        assert_eq!(classes.get(&StatusClass::Success), Some(&1));
        assert_eq!(classes.get(&StatusClass::ServerError), Some(&1));
    }

    #[test]
    fn out_of_range_latency_is_rejected_without_counting() {
        let s = ShardedSeries::with_shards(1);
        assert!(!s.record(Sample::timing(Duration::from_secs(2 * 3600), false)));
        assert_eq!(s.snapshot().count, 0);
    }

    #[test]
    fn sub_microsecond_latency_is_clamped() {
        let s = ShardedSeries::with_shards(1);
        assert!(s.record(Sample::timing(Duration::from_nanos(10), false)));
        assert_eq!(s.snapshot().latency_us.min, Some(1.0));
    }

    #[test]
    fn concurrent_writers_are_all_counted() {
        let s = Arc::new(ShardedSeries::with_shards(8));
        let threads: Vec<_> = (0..8)
            .map(|_| {
                let s = s.clone();
                std::thread::spawn(move || {
                    for i in 0..2_000u64 {
                        s.record(ok(1 + i % 50));
                    }
                })
            })
            .collect();
        for t in threads {
            t.join().unwrap_or_else(|_| panic!("writer panicked"));
        }

        let snap = s.snapshot();
        assert_eq!(snap.count, 16_000);
        assert_eq!(snap.latency_us.count, 16_000);
        assert_eq!(snap.statuses.get(&200), Some(&16_000));
        assert_eq!(snap, s.snapshot());
    }

    #[test]
    fn status_class_display() {
        assert_eq!(StatusClass::Success.to_string(), "2xx");
        assert_eq!(StatusClass::of(99), None);
        assert_eq!(StatusClass::of(600), None);
    }
}
