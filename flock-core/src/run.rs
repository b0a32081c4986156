use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{info, warn};

use crate::aggregator::{Aggregator, MetricSnapshot};
use crate::context::EnvVars;
use crate::error::{Error, Result};
use crate::executor::{Executor, Transport};
use crate::profile::LoadProfile;
use crate::progress::ProgressFn;
use crate::scenario::{Scenario, ScenarioSpec};
use crate::scheduler::{
    DEFAULT_PROGRESS_INTERVAL, DEFAULT_SPAWN_RETRY_LIMIT, DEFAULT_TICK, Scheduler,
    SchedulerConfig, SchedulerWarning,
};
use crate::signal::StopSignal;
use crate::thresholds::{Threshold, Verdict};
use crate::thresholds_eval::evaluate;
use crate::worker::WorkerShared;

pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
pub const DEFAULT_GRACEFUL_STOP: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunOptions {
    /// Applies to request steps without their own timeout.
    pub request_timeout: Duration,
    pub graceful_stop: Duration,
    pub tick: Duration,
    pub progress_interval: Duration,
    /// Defaults to the profile's peak.
    pub max_vus: Option<u64>,
    pub spawn_retry_limit: u32,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            graceful_stop: DEFAULT_GRACEFUL_STOP,
            tick: DEFAULT_TICK,
            progress_interval: DEFAULT_PROGRESS_INTERVAL,
            max_vus: None,
            spawn_retry_limit: DEFAULT_SPAWN_RETRY_LIMIT,
        }
    }
}

impl RunOptions {
    pub fn validate(&self) -> Result<()> {
        let positive = |name: &'static str, d: Duration| {
            if d.is_zero() {
                Err(Error::InvalidOption {
                    name,
                    reason: "must be a positive duration".to_string(),
                })
            } else {
                Ok(())
            }
        };
        positive("timeout", self.request_timeout)?;
        positive("tick", self.tick)?;
        positive("progress_interval", self.progress_interval)?;

        if self.max_vus == Some(0) {
            return Err(Error::InvalidMaxVus);
        }
        if self.spawn_retry_limit == 0 {
            return Err(Error::InvalidOption {
                name: "spawn_retry_limit",
                reason: "must be a positive integer".to_string(),
            });
        }
        Ok(())
    }
}

/// A fully validated run. Building one is the only place configuration errors surface.
#[derive(Debug, Clone)]
pub struct RunPlan {
    scenario: Scenario,
    profile: LoadProfile,
    thresholds: Vec<Threshold>,
    options: RunOptions,
}

impl RunPlan {
    pub fn new(
        spec: ScenarioSpec,
        profile: LoadProfile,
        thresholds: Vec<Threshold>,
        options: RunOptions,
        env: &EnvVars,
    ) -> Result<Self> {
        profile.validate()?;
        options.validate()?;
        let scenario = Scenario::compile(spec, env)?;

        for t in &thresholds {
            t.validate()?;
            if let Some(step) = &t.step
                && !scenario.request_steps().any(|s| s.name == *step)
            {
                warn!(threshold = %t, "threshold refers to an unknown step and will fail");
            }
        }

        Ok(Self {
            scenario,
            profile,
            thresholds,
            options,
        })
    }

    pub fn scenario(&self) -> &Scenario {
        &self.scenario
    }

    pub fn profile(&self) -> &LoadProfile {
        &self.profile
    }

    pub fn thresholds(&self) -> &[Threshold] {
        &self.thresholds
    }

    pub fn options(&self) -> &RunOptions {
        &self.options
    }
}

/// Stops a run from outside (e.g. on Ctrl-C). Workers stop at their next step boundary.
#[derive(Debug, Clone, Default)]
pub struct AbortHandle(Arc<StopSignal>);

impl AbortHandle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn abort(&self) {
        self.0.stop();
    }

    pub fn is_aborted(&self) -> bool {
        self.0.is_stopped()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RunReport {
    pub scenario: String,
    pub snapshot: MetricSnapshot,
    /// Every threshold that was evaluated, in declaration order.
    pub thresholds: Vec<Threshold>,
    pub verdict: Verdict,
    pub elapsed: Duration,
    pub requests_total: u64,
    pub peak_vus: u64,
    pub warnings: Vec<SchedulerWarning>,
    pub aborted: bool,
}

pub async fn run<T: Transport>(
    plan: RunPlan,
    transport: Arc<T>,
    progress: Option<ProgressFn>,
    abort: AbortHandle,
) -> Result<RunReport> {
    let RunPlan {
        scenario,
        profile,
        thresholds,
        options,
    } = plan;

    let aggregator = Arc::new(Aggregator::for_scenario(&scenario));
    let schedule = profile.schedule();
    let total = schedule.total_duration();
    let scenario_name = scenario.name().to_string();

    info!(
        scenario = %scenario_name,
        peak_vus = profile.peak_vus(),
        duration = ?total,
        "run starting"
    );

    let started = Instant::now();
    let shared = Arc::new(WorkerShared {
        scenario,
        executor: Executor::new(transport, options.request_timeout),
        aggregator: aggregator.clone(),
        abort: abort.0.clone(),
        deadline: started + total,
        graceful_stop: options.graceful_stop,
    });

    let config = SchedulerConfig {
        tick: options.tick,
        progress_interval: options.progress_interval,
        max_vus: options.max_vus,
        spawn_retry_limit: options.spawn_retry_limit,
    };
    let outcome = Scheduler::new(schedule, config, shared, started)
        .run(progress)
        .await?;

    let elapsed = started.elapsed();
    let snapshot = aggregator.snapshot().with_elapsed(elapsed);
    let verdict = evaluate(&snapshot, &thresholds);

    info!(
        requests = snapshot.request_count(),
        errors = snapshot.error_count(),
        elapsed = ?elapsed,
        passed = verdict.is_pass(),
        "run finished"
    );

    Ok(RunReport {
        scenario: scenario_name,
        requests_total: snapshot.request_count(),
        peak_vus: snapshot.vus_peak,
        snapshot,
        thresholds,
        verdict,
        elapsed,
        warnings: outcome.warnings,
        aborted: abort.is_aborted(),
    })
}
