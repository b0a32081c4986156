//! Bounded-memory metric primitives for load generation.

mod family;
mod histogram;
mod primitives;
mod series;
mod stats;

pub use family::Family;
pub use histogram::{HistogramSummary, new_default_histogram, summarize_histogram};
pub use primitives::{Counter, PeakGauge, Rate};
pub use series::{Sample, SeriesSnapshot, ShardedSeries, StatusClass};
pub use stats::{CounterSnapshot, RunningStats, per_sec, ratio};
