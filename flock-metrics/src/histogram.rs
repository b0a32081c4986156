use hdrhistogram::Histogram;

/// Lowest trackable value (1µs).
pub const HISTOGRAM_LOW_US: u64 = 1;

/// Highest trackable value: 1 hour in microseconds.
pub const HISTOGRAM_HIGH_US: u64 = 3_600_000_000;

const SIGNIFICANT_DIGITS: u8 = 3;

/// Percentile/moment summary of a histogram. Values are in the histogram's unit (microseconds
/// for everything recorded by this crate).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct HistogramSummary {
    pub p50: Option<f64>,
    pub p75: Option<f64>,
    pub p90: Option<f64>,
    pub p95: Option<f64>,
    pub p99: Option<f64>,
    pub min: Option<f64>,
    pub max: Option<f64>,
    pub mean: Option<f64>,
    pub stdev: Option<f64>,
    pub count: u64,
}

impl HistogramSummary {
    /// Same summary with every value divided by 1000 (µs -> ms).
    #[must_use]
    pub fn micros_to_millis(&self) -> Self {
        let ms = |v: Option<f64>| v.map(|v| v / 1000.0);
        Self {
            p50: ms(self.p50),
            p75: ms(self.p75),
            p90: ms(self.p90),
            p95: ms(self.p95),
            p99: ms(self.p99),
            min: ms(self.min),
            max: ms(self.max),
            mean: ms(self.mean),
            stdev: ms(self.stdev),
            count: self.count,
        }
    }
}

pub fn new_default_histogram() -> Histogram<u64> {
    match Histogram::<u64>::new_with_bounds(HISTOGRAM_LOW_US, HISTOGRAM_HIGH_US, SIGNIFICANT_DIGITS) {
        Ok(h) => h,
        Err(err) => panic!("failed to create histogram: {err}"),
    }
}

pub fn summarize_histogram(h: &Histogram<u64>) -> HistogramSummary {
    let count = h.len();
    let at = |q: f64| (count > 0).then(|| h.value_at_quantile(q) as f64);

    HistogramSummary {
        p50: at(0.50),
        p75: at(0.75),
        p90: at(0.90),
        p95: at(0.95),
        p99: at(0.99),
        min: (count > 0).then(|| h.min() as f64),
        max: (count > 0).then(|| h.max() as f64),
        mean: (count > 0).then(|| h.mean()),
        stdev: (count > 0).then(|| h.stdev()),
        count,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn summarize_histogram_empty_has_no_stats() {
        let s = summarize_histogram(&new_default_histogram());
        assert_eq!(s.count, 0);
        assert!(s.p50.is_none());
        assert!(s.min.is_none());
        assert!(s.max.is_none());
        assert!(s.mean.is_none());
        assert!(s.stdev.is_none());
    }

    #[test]
    fn summarize_histogram_orders_percentiles() {
        let mut h = new_default_histogram();
        for v in 1..=1000u64 {
            let _ = h.record(v * 100);
        }

        let s = summarize_histogram(&h);
        assert_eq!(s.count, 1000);
        assert_eq!(s.min, Some(100.0));
        let (Some(p50), Some(p95), Some(p99), Some(max)) = (s.p50, s.p95, s.p99, s.max) else {
            panic!("expected percentiles: {s:?}");
        };
        assert!(p50 <= p95 && p95 <= p99 && p99 <= max);
        // 3 significant digits.
        assert!((p50 - 50_000.0).abs() <= 50.0, "p50={p50}");
    }

    #[test]
    fn micros_to_millis_scales_values_but_not_count() {
        let mut h = new_default_histogram();
        let _ = h.record(2_000);
        let s = summarize_histogram(&h).micros_to_millis();
        assert_eq!(s.count, 1);
        assert_eq!(s.max, Some(2.0));
    }
}
