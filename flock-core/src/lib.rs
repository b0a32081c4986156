//! Scenario execution engine: compiles scenarios, drives virtual users against a load
//! profile, aggregates request outcomes and evaluates thresholds.

mod aggregator;
mod context;
mod error;
mod executor;
mod outcome;
mod profile;
mod progress;
mod run;
mod scenario;
mod schedule;
mod scheduler;
mod signal;
mod template;
mod thresholds;
mod thresholds_eval;
mod worker;

pub use aggregator::{
    ActiveVuGuard, Aggregator, CheckSnapshot, IterationSnapshot, MetricSnapshot, StepSnapshot,
};
pub use context::{EnvVars, IterationContext, env_from_pairs, env_lookup, process_env_snapshot};
pub use error::{Error, Result, SchedulerError};
pub use executor::{Executor, HttpTransport, Transport};
pub use outcome::{CheckResult, OutcomeKind, RequestOutcome};
pub use profile::{LoadProfile, Stage};
pub use progress::{LiveMetrics, ProgressFn, ProgressTracker, ProgressUpdate, StageProgress};
pub use run::{
    AbortHandle, DEFAULT_GRACEFUL_STOP, DEFAULT_REQUEST_TIMEOUT, RunOptions, RunPlan, RunReport,
    run,
};
pub use scenario::{
    Check, CheckRule, CheckSpec, RequestStep, RequestStepSpec, Scenario, ScenarioSpec, Step,
    StepSpec,
};
pub use schedule::{RampingU64Schedule, StageSnapshot};
pub use scheduler::{
    DEFAULT_PROGRESS_INTERVAL, DEFAULT_SPAWN_RETRY_LIMIT, DEFAULT_TICK, Scheduler,
    SchedulerConfig, SchedulerOutcome, SchedulerWarning,
};
pub use signal::StopSignal;
pub use template::Template;
pub use thresholds::{
    Comparator, Threshold, ThresholdMetric, ThresholdViolation, Verdict, parse_threshold_expr,
};
pub use thresholds_eval::evaluate;
pub use worker::{VuWorker, WorkerHandle, WorkerShared, WorkerState};

pub use flock_metrics::{HistogramSummary, SeriesSnapshot, StatusClass};
