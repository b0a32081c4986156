use flock_metrics::{HistogramSummary, SeriesSnapshot, per_sec};

use crate::aggregator::MetricSnapshot;
use crate::thresholds::{Threshold, ThresholdMetric, ThresholdViolation, Verdict};

/// Checks every threshold against `snapshot`. A threshold whose metric cannot be observed
/// (no samples, unknown step, no elapsed time for `rps`) fails.
pub fn evaluate(snapshot: &MetricSnapshot, thresholds: &[Threshold]) -> Verdict {
    let violations: Vec<ThresholdViolation> = thresholds
        .iter()
        .filter_map(|t| {
            let observed = observed_value(snapshot, t);
            let passed = observed.is_some_and(|v| t.comparator.holds(v, t.bound));
            (!passed).then(|| ThresholdViolation {
                name: t.to_string(),
                bound: t.bound,
                observed,
                threshold: t.clone(),
            })
        })
        .collect();

    if violations.is_empty() {
        Verdict::Pass
    } else {
        Verdict::Fail(violations)
    }
}

fn observed_value(snapshot: &MetricSnapshot, t: &Threshold) -> Option<f64> {
    match t.metric {
        ThresholdMetric::ChecksRate => return snapshot.checks_rate(),
        ThresholdMetric::IterationCount => return Some(snapshot.iterations.completed as f64),
        _ => {}
    }

    let series: &SeriesSnapshot = match &t.step {
        None => &snapshot.requests,
        Some(step) => &snapshot.step(step)?.requests,
    };
    let latency_ms: HistogramSummary = series.latency_us.micros_to_millis();

    match t.metric {
        ThresholdMetric::P50Latency => latency_ms.p50,
        ThresholdMetric::P90Latency => latency_ms.p90,
        ThresholdMetric::P95Latency => latency_ms.p95,
        ThresholdMetric::P99Latency => latency_ms.p99,
        ThresholdMetric::AvgLatency => latency_ms.mean,
        ThresholdMetric::MaxLatency => latency_ms.max,
        ThresholdMetric::ErrorRate => series.failure_rate(),
        ThresholdMetric::RequestCount => Some(series.count as f64),
        ThresholdMetric::Rps => {
            let elapsed = snapshot.elapsed?.as_secs_f64();
            (elapsed > 0.0).then(|| per_sec(series.count, elapsed))
        }
        ThresholdMetric::ChecksRate | ThresholdMetric::IterationCount => None,
    }
}
