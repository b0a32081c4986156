use std::time::{Duration, Instant};

use flock_metrics::{CounterSnapshot, RunningStats, ratio};

use crate::aggregator::MetricSnapshot;
use crate::schedule::StageSnapshot;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct LiveMetrics {
    /// Requests/sec observed during the last progress interval.
    pub rps_now: f64,
    /// Failed requests / requests during the last progress interval (0..=1).
    pub error_rate_now: f64,

    pub requests_total: u64,
    pub failed_requests_total: u64,
    pub bytes_sent_total: u64,
    pub bytes_received_total: u64,
    pub iterations_total: u64,
    pub checks_failed_total: u64,
    pub invalid_total: u64,

    /// Requests/sec statistics across progress intervals.
    pub rps_avg: f64,
    pub rps_stdev: f64,
    pub rps_max: f64,

    /// Whole-run latency so far, in milliseconds.
    pub latency_mean_ms: Option<f64>,
    pub latency_p50_ms: Option<f64>,
    pub latency_p95_ms: Option<f64>,
    pub latency_p99_ms: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageProgress {
    /// 1-based stage index.
    pub stage: usize,
    pub stages: usize,
    pub stage_elapsed: Duration,
    pub stage_remaining: Duration,
    pub start_target: u64,
    pub end_target: u64,
}

impl From<StageSnapshot> for StageProgress {
    fn from(s: StageSnapshot) -> Self {
        Self {
            stage: s.index + 1,
            stages: s.count,
            stage_elapsed: s.stage_elapsed,
            stage_remaining: s.stage_remaining,
            start_target: s.start_target,
            end_target: s.end_target,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ProgressUpdate {
    /// Monotonic emission counter, starting at 1.
    pub tick: u64,
    pub elapsed: Duration,
    pub total_duration: Duration,
    pub target_vus: u64,
    /// Workers running after this tick's reconciliation.
    pub active_vus: u64,
    /// Effective VU ceiling (lowered after scheduler degradation).
    pub max_vus: u64,
    pub stage: Option<StageProgress>,
    pub metrics: LiveMetrics,
}

pub type ProgressFn = std::sync::Arc<dyn Fn(ProgressUpdate) + Send + Sync + 'static>;

/// Turns successive snapshots into per-interval rates.
#[derive(Debug, Default)]
pub struct ProgressTracker {
    last: Option<(Instant, CounterSnapshot, CounterSnapshot)>,
    rps: RunningStats,
}

impl ProgressTracker {
    pub fn update(&mut self, snap: &MetricSnapshot, now: Instant) -> LiveMetrics {
        let requests = CounterSnapshot::new(snap.request_count());
        let failed = CounterSnapshot::new(snap.error_count());

        let (rps_now, error_rate_now) = match self.last {
            Some((at, prev_requests, prev_failed)) => {
                let dt = now.saturating_duration_since(at).as_secs_f64();
                let delta_requests = requests.delta_since(Some(prev_requests));
                let delta_failed = failed.delta_since(Some(prev_failed));
                (
                    requests.per_sec_since(Some(prev_requests), dt),
                    ratio(delta_failed, delta_requests).unwrap_or(0.0),
                )
            }
            None => (0.0, snap.error_rate().unwrap_or(0.0)),
        };
        if self.last.is_some() {
            self.rps.push(rps_now);
        }
        self.last = Some((now, requests, failed));

        let latency = snap.requests.latency_us.micros_to_millis();
        let (checks_total, checks_passed) = snap.checks_totals();

        LiveMetrics {
            rps_now,
            error_rate_now,
            requests_total: requests.total,
            failed_requests_total: failed.total,
            bytes_sent_total: snap.requests.bytes_sent,
            bytes_received_total: snap.requests.bytes_received,
            iterations_total: snap.iterations.completed,
            checks_failed_total: checks_total.saturating_sub(checks_passed),
            invalid_total: snap.invalid_total,
            rps_avg: self.rps.mean(),
            rps_stdev: self.rps.stdev(),
            rps_max: self.rps.max(),
            latency_mean_ms: latency.mean,
            latency_p50_ms: latency.p50,
            latency_p95_ms: latency.p95,
            latency_p99_ms: latency.p99,
        }
    }
}
