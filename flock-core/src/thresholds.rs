use std::fmt;
use std::sync::Arc;

use crate::error::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display, strum::EnumString)]
#[strum(serialize_all = "snake_case")]
pub enum ThresholdMetric {
    P50Latency,
    P90Latency,
    P95Latency,
    P99Latency,
    AvgLatency,
    MaxLatency,
    ErrorRate,
    RequestCount,
    Rps,
    ChecksRate,
    IterationCount,
}

impl ThresholdMetric {
    /// Metrics that can be scoped to a single step.
    pub fn supports_step(self) -> bool {
        !matches!(self, Self::ChecksRate | Self::IterationCount)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display, strum::EnumString)]
pub enum Comparator {
    #[strum(serialize = "<")]
    Lt,
    #[strum(serialize = "<=")]
    Lte,
    #[strum(serialize = ">")]
    Gt,
    #[strum(serialize = ">=")]
    Gte,
}

impl Comparator {
    pub fn holds(self, observed: f64, bound: f64) -> bool {
        match self {
            Self::Lt => observed < bound,
            Self::Lte => observed <= bound,
            Self::Gt => observed > bound,
            Self::Gte => observed >= bound,
        }
    }
}

/// Pass/fail rule over one aggregated metric. Latency bounds are in milliseconds.
#[derive(Debug, Clone, PartialEq)]
pub struct Threshold {
    pub metric: ThresholdMetric,
    pub comparator: Comparator,
    pub bound: f64,
    /// Restricts the metric to one request step.
    pub step: Option<Arc<str>>,
}

impl Threshold {
    pub fn new(metric: ThresholdMetric, comparator: Comparator, bound: f64) -> Self {
        Self {
            metric,
            comparator,
            bound,
            step: None,
        }
    }

    #[must_use]
    pub fn for_step(mut self, step: impl Into<Arc<str>>) -> Self {
        self.step = Some(step.into());
        self
    }

    pub fn validate(&self) -> Result<()> {
        let invalid = |reason: &str| Error::InvalidThreshold {
            expr: self.to_string(),
            reason: reason.to_string(),
        };
        if !self.bound.is_finite() {
            return Err(invalid("bound must be a finite number"));
        }
        if self.step.is_some() && !self.metric.supports_step() {
            return Err(invalid("metric cannot be scoped to a step"));
        }
        Ok(())
    }
}

impl fmt::Display for Threshold {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.metric)?;
        if let Some(step) = &self.step {
            write!(f, "{{step={step}}}")?;
        }
        write!(f, " {} {}", self.comparator, self.bound)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ThresholdViolation {
    /// Rendered threshold, e.g. `p95_latency{step=create} < 200`.
    pub name: String,
    pub bound: f64,
    /// `None` when the metric had no samples or the step is unknown.
    pub observed: Option<f64>,
    pub threshold: Threshold,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Verdict {
    Pass,
    Fail(Vec<ThresholdViolation>),
}

impl Verdict {
    pub fn is_pass(&self) -> bool {
        matches!(self, Self::Pass)
    }

    pub fn violations(&self) -> &[ThresholdViolation] {
        match self {
            Self::Pass => &[],
            Self::Fail(v) => v,
        }
    }
}

/// Parses `metric[{step=name}] <op> <number>`, e.g. `p95_latency{step=create_tweet} < 200`.
pub fn parse_threshold_expr(raw: &str) -> Result<Threshold> {
    let invalid = |reason: String| Error::InvalidThreshold {
        expr: raw.to_string(),
        reason,
    };

    let s = raw.trim();
    if s.is_empty() {
        return Err(invalid("empty threshold".to_string()));
    }

    let op_pos = s
        .find(['<', '>'])
        .ok_or_else(|| invalid("missing comparator".to_string()))?;
    let op_len = if s[op_pos + 1..].starts_with('=') { 2 } else { 1 };

    let left = s[..op_pos].trim();
    let comparator: Comparator = s[op_pos..op_pos + op_len]
        .parse()
        .map_err(|_| invalid("invalid comparator".to_string()))?;
    let right = s[op_pos + op_len..].trim();

    if left.is_empty() || right.is_empty() {
        return Err(invalid("expected `metric <op> value`".to_string()));
    }

    let (metric_raw, step) = match left.split_once('{') {
        None => (left, None),
        Some((metric, scope)) => {
            let scope = scope
                .strip_suffix('}')
                .ok_or_else(|| invalid("unterminated `{`".to_string()))?;
            let step = scope
                .trim()
                .strip_prefix("step")
                .map(str::trim_start)
                .and_then(|v| v.strip_prefix('='))
                .map(str::trim)
                .filter(|v| !v.is_empty())
                .ok_or_else(|| invalid("expected `{step=<name>}`".to_string()))?;
            (metric.trim(), Some(Arc::<str>::from(step)))
        }
    };

    let metric: ThresholdMetric = metric_raw
        .parse()
        .map_err(|_| invalid(format!("unknown metric `{metric_raw}`")))?;
    let bound: f64 = right
        .parse()
        .map_err(|_| invalid(format!("invalid number `{right}`")))?;

    let threshold = Threshold {
        metric,
        comparator,
        bound,
        step,
    };
    threshold.validate().map_err(|e| match e {
        Error::InvalidThreshold { reason, .. } => invalid(reason),
        other => other,
    })?;
    Ok(threshold)
}
