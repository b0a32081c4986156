use std::sync::Arc;
use std::time::Duration;

use flock_metrics::{
    Counter, Family, HistogramSummary, PeakGauge, Rate, Sample, SeriesSnapshot, ShardedSeries,
    per_sec, ratio,
};
use tracing::debug;

use crate::outcome::RequestOutcome;
use crate::scenario::Scenario;

/// Streaming request statistics for a whole run.
///
/// Nothing here retains individual outcomes: every series is a set of sharded counters plus an
/// HDR histogram, so memory stays flat however long the run is.
#[derive(Debug, Default)]
pub struct Aggregator {
    requests: ShardedSeries,
    steps: Family<ShardedSeries>,
    checks: Family<Rate>,
    iterations: ShardedSeries,
    invalid: Counter,
    vus: PeakGauge,
}

impl Aggregator {
    /// Pre-registers every step and check so reports list them in scenario order, even those
    /// that never ran.
    pub fn for_scenario(scenario: &Scenario) -> Self {
        let agg = Self::default();
        for step in scenario.request_steps() {
            agg.steps.get_or_register(&step.name);
            for check in &step.checks {
                agg.checks.get_or_register(&check.name);
            }
        }
        agg
    }

    pub fn record(&self, outcome: &RequestOutcome) {
        let Some(latency) = outcome.latency() else {
            self.reject(outcome, "finished before it started");
            return;
        };
        if let Some(status) = outcome.status()
            && !(100..=599).contains(&status)
        {
            self.reject(outcome, "status out of range");
            return;
        }

        let sample = Sample {
            latency,
            status: outcome.status(),
            error: outcome.transport_error().map(Into::into),
            failed: outcome.is_error(),
            bytes_sent: outcome.bytes_sent,
            bytes_received: outcome.bytes_received,
        };

        if !self.requests.record(sample) {
            self.reject(outcome, "latency out of range");
            return;
        }
        self.steps.get_or_register(&outcome.step).record(sample);

        for check in &outcome.checks {
            self.checks.get_or_register(&check.name).add(check.passed);
        }
    }

    fn reject(&self, outcome: &RequestOutcome, reason: &'static str) {
        self.invalid.increment(1);
        debug!(step = %outcome.step, reason, "discarding invalid outcome");
    }

    /// `completed` is false for iterations cut short by a stop or the run deadline.
    pub fn record_iteration(&self, duration: Duration, completed: bool) {
        if !self.iterations.record(Sample::timing(duration, !completed)) {
            self.invalid.increment(1);
        }
    }

    /// Marks a VU active until the guard is dropped.
    pub fn enter_vu(self: &Arc<Self>) -> ActiveVuGuard {
        self.vus.increment();
        ActiveVuGuard { agg: self.clone() }
    }

    pub fn snapshot(&self) -> MetricSnapshot {
        let iterations = self.iterations.snapshot();

        MetricSnapshot {
            requests: self.requests.snapshot(),
            steps: self
                .steps
                .ordered()
                .into_iter()
                .map(|(name, series)| StepSnapshot {
                    name,
                    requests: series.snapshot(),
                })
                .collect(),
            checks: self
                .checks
                .ordered()
                .into_iter()
                .map(|(name, rate)| {
                    let (total, passed) = rate.get();
                    CheckSnapshot {
                        name,
                        total,
                        passed,
                    }
                })
                .collect(),
            iterations: IterationSnapshot {
                completed: iterations.count.saturating_sub(iterations.failed),
                interrupted: iterations.failed,
                duration_us: iterations.latency_us,
            },
            invalid_total: self.invalid.get(),
            vus_active: u64::try_from(self.vus.get()).unwrap_or(0),
            vus_peak: u64::try_from(self.vus.peak()).unwrap_or(0),
            elapsed: None,
        }
    }
}

#[derive(Debug)]
pub struct ActiveVuGuard {
    agg: Arc<Aggregator>,
}

impl Drop for ActiveVuGuard {
    fn drop(&mut self) {
        self.agg.vus.decrement();
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct StepSnapshot {
    pub name: Arc<str>,
    pub requests: SeriesSnapshot,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckSnapshot {
    pub name: Arc<str>,
    pub total: u64,
    pub passed: u64,
}

impl CheckSnapshot {
    pub fn failed(&self) -> u64 {
        self.total.saturating_sub(self.passed)
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct IterationSnapshot {
    pub completed: u64,
    pub interrupted: u64,
    /// Durations of every recorded iteration, in microseconds.
    pub duration_us: HistogramSummary,
}

/// Point-in-time copy of an [`Aggregator`]. Latencies are in microseconds.
#[derive(Debug, Clone, PartialEq)]
pub struct MetricSnapshot {
    pub requests: SeriesSnapshot,
    pub steps: Vec<StepSnapshot>,
    pub checks: Vec<CheckSnapshot>,
    pub iterations: IterationSnapshot,
    pub invalid_total: u64,
    pub vus_active: u64,
    pub vus_peak: u64,
    /// Wall-clock time the snapshot covers; needed for rates.
    pub elapsed: Option<Duration>,
}

impl MetricSnapshot {
    #[must_use]
    pub fn with_elapsed(mut self, elapsed: Duration) -> Self {
        self.elapsed = Some(elapsed);
        self
    }

    pub fn request_count(&self) -> u64 {
        self.requests.count
    }

    pub fn error_count(&self) -> u64 {
        self.requests.failed
    }

    pub fn error_rate(&self) -> Option<f64> {
        self.requests.failure_rate()
    }

    /// Requests per second over [`MetricSnapshot::elapsed`].
    pub fn rps(&self) -> Option<f64> {
        let elapsed = self.elapsed?.as_secs_f64();
        (elapsed > 0.0).then(|| per_sec(self.requests.count, elapsed))
    }

    pub fn step(&self, name: &str) -> Option<&StepSnapshot> {
        self.steps.iter().find(|s| s.name.as_ref() == name)
    }

    /// `(total, passed)` across all checks.
    pub fn checks_totals(&self) -> (u64, u64) {
        self.checks.iter().fold((0, 0), |(t, p), c| {
            (t.saturating_add(c.total), p.saturating_add(c.passed))
        })
    }

    pub fn checks_rate(&self) -> Option<f64> {
        let (total, passed) = self.checks_totals();
        ratio(passed, total)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::outcome::{CheckResult, OutcomeKind};
    use flock_http::HttpTransportErrorKind;
    use std::time::Instant;

    fn outcome(step: &str, kind: OutcomeKind, ms: u64) -> RequestOutcome {
        let started_at = Instant::now();
        RequestOutcome {
            step: Arc::from(step),
            kind,
            started_at,
            finished_at: started_at + Duration::from_millis(ms),
            bytes_sent: 100,
            bytes_received: 200,
            checks: vec![CheckResult {
                name: Arc::from("is 200"),
                passed: kind == OutcomeKind::Status(200),
            }],
        }
    }

    #[test]
    fn records_requests_steps_and_checks() {
        let agg = Aggregator::default();
        agg.record(&outcome("a", OutcomeKind::Status(200), 10));
        agg.record(&outcome("a", OutcomeKind::Status(503), 20));
        agg.record(&outcome(
            "b",
            OutcomeKind::Transport(HttpTransportErrorKind::Timeout),
            30,
        ));

        let snap = agg.snapshot();
        assert_eq!(snap.request_count(), 3);
        assert_eq!(snap.error_count(), 2);
        assert_eq!(snap.requests.errors.get("timeout"), Some(&1));
        assert_eq!(snap.requests.bytes_sent, 300);
        assert_eq!(snap.invalid_total, 0);

        let names: Vec<&str> = snap.steps.iter().map(|s| s.name.as_ref()).collect();
        assert_eq!(names, vec!["a", "b"]);
        assert_eq!(snap.step("a").map(|s| s.requests.count), Some(2));
        assert_eq!(snap.step("b").map(|s| s.requests.failed), Some(1));

        assert_eq!(snap.checks_totals(), (3, 1));
        assert_eq!(snap.checks[0].failed(), 2);

        assert_eq!(agg.snapshot(), snap);
    }

    #[test]
    fn invalid_outcomes_are_counted_separately() {
        let agg = Aggregator::default();

        let mut backwards = outcome("a", OutcomeKind::Status(200), 10);
        std::mem::swap(&mut backwards.started_at, &mut backwards.finished_at);
        agg.record(&backwards);
        agg.record(&outcome("a", OutcomeKind::Status(42), 10));
        agg.record(&outcome("a", OutcomeKind::Status(200), 2 * 3600 * 1000));
        agg.record(&outcome("a", OutcomeKind::Status(200), 10));

        let snap = agg.snapshot();
        assert_eq!(snap.invalid_total, 3);
        assert_eq!(snap.request_count(), 1);
        assert_eq!(snap.requests.latency_us.count, 1);
        assert_eq!(snap.step("a").map(|s| s.requests.count), Some(1));
    }

    #[test]
    fn vu_guard_tracks_active_and_peak() {
        let agg = Arc::new(Aggregator::default());
        let a = agg.enter_vu();
        let b = agg.enter_vu();
        assert_eq!(agg.snapshot().vus_active, 2);
        drop(a);
        drop(b);
        let snap = agg.snapshot();
        assert_eq!(snap.vus_active, 0);
        assert_eq!(snap.vus_peak, 2);
    }

    #[test]
    fn iterations_split_completed_and_interrupted() {
        let agg = Aggregator::default();
        agg.record_iteration(Duration::from_millis(100), true);
        agg.record_iteration(Duration::from_millis(100), true);
        agg.record_iteration(Duration::from_millis(40), false);
        let it = agg.snapshot().iterations;
        assert_eq!((it.completed, it.interrupted), (2, 1));
        assert_eq!(it.duration_us.count, 3);
    }

    #[test]
    fn rates_need_elapsed_time_and_samples() {
        let agg = Aggregator::default();
        let snap = agg.snapshot();
        assert_eq!(snap.error_rate(), None);
        assert_eq!(snap.checks_rate(), None);
        assert_eq!(snap.rps(), None);

        for _ in 0..10 {
            agg.record(&outcome("a", OutcomeKind::Status(200), 1));
        }
        let snap = agg.snapshot().with_elapsed(Duration::from_secs(2));
        assert_eq!(snap.rps(), Some(5.0));
        assert_eq!(snap.error_rate(), Some(0.0));
        assert_eq!(snap.checks_rate(), Some(1.0));
    }
}
