use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, warn};

use crate::error::{Result, SchedulerError};
use crate::executor::Transport;
use crate::progress::{ProgressFn, ProgressTracker, ProgressUpdate};
use crate::schedule::RampingU64Schedule;
use crate::worker::{VuWorker, WorkerHandle, WorkerShared};

pub const DEFAULT_TICK: Duration = Duration::from_millis(50);
pub const DEFAULT_PROGRESS_INTERVAL: Duration = Duration::from_secs(1);
pub const DEFAULT_SPAWN_RETRY_LIMIT: u32 = 3;

#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    pub tick: Duration,
    pub progress_interval: Duration,
    /// VU budget. Defaults to the schedule's peak.
    pub max_vus: Option<u64>,
    /// Consecutive failed ticks before the ceiling is lowered.
    pub spawn_retry_limit: u32,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            tick: DEFAULT_TICK,
            progress_interval: DEFAULT_PROGRESS_INTERVAL,
            max_vus: None,
            spawn_retry_limit: DEFAULT_SPAWN_RETRY_LIMIT,
        }
    }
}

/// Recorded when the scheduler lowers its VU ceiling.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchedulerWarning {
    pub elapsed: Duration,
    pub target: u64,
    pub ceiling: u64,
    pub error: SchedulerError,
}

impl std::fmt::Display for SchedulerWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} at {:.1}s; vu ceiling lowered to {} (target {})",
            self.error,
            self.elapsed.as_secs_f64(),
            self.ceiling,
            self.target
        )
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SchedulerOutcome {
    pub warnings: Vec<SchedulerWarning>,
    /// Highest number of workers active after any tick.
    pub peak_active: u64,
}

#[derive(Debug)]
struct ActiveWorker {
    handle: Arc<WorkerHandle>,
    task: JoinHandle<()>,
    /// Budget slot. Released when the worker leaves the active set, not when its task ends.
    permit: OwnedSemaphorePermit,
}

/// Realises a schedule by starting and stopping workers on a fixed tick.
pub struct Scheduler<T> {
    schedule: RampingU64Schedule,
    config: SchedulerConfig,
    shared: Arc<WorkerShared<T>>,
    started: Instant,

    budget: Arc<Semaphore>,
    max_vus: u64,
    /// Spawning stops here. Starts at the schedule peak and is lowered once the budget
    /// keeps refusing spawns.
    ceiling: u64,
    consecutive_failures: u32,
    next_id: u64,

    /// Most recently started last.
    active: Vec<ActiveWorker>,
    draining: Vec<JoinHandle<()>>,
    outcome: SchedulerOutcome,
}

impl<T: Transport> Scheduler<T> {
    pub fn new(
        schedule: RampingU64Schedule,
        config: SchedulerConfig,
        shared: Arc<WorkerShared<T>>,
        started: Instant,
    ) -> Self {
        let schedule_peak = schedule.peak();
        let max_vus = config.max_vus.unwrap_or(schedule_peak).max(1);
        let permits = usize::try_from(max_vus).unwrap_or(Semaphore::MAX_PERMITS);

        Self {
            schedule,
            config,
            shared,
            started,
            budget: Arc::new(Semaphore::new(permits.min(Semaphore::MAX_PERMITS))),
            max_vus,
            ceiling: schedule_peak.max(max_vus),
            consecutive_failures: 0,
            next_id: 0,
            active: Vec::new(),
            draining: Vec::new(),
            outcome: SchedulerOutcome::default(),
        }
    }

    pub fn active(&self) -> u64 {
        self.active.len() as u64
    }

    /// Drives the control loop until the schedule ends or the run is aborted, then stops and
    /// joins every worker.
    pub async fn run(mut self, progress: Option<ProgressFn>) -> Result<SchedulerOutcome> {
        let total = self.schedule.total_duration();
        let abort = self.shared.abort.clone();

        let mut ticker = tokio::time::interval(self.config.tick);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let mut tracker = ProgressTracker::default();
        let mut progress_tick: u64 = 0;
        let mut next_progress = self.config.progress_interval;

        loop {
            tokio::select! {
                _ = ticker.tick() => {}
                _ = abort.wait() => {
                    debug!("scheduler aborted");
                    break;
                }
            }

            let elapsed = self.started.elapsed();
            if elapsed >= total {
                break;
            }

            self.reap_drained().await?;

            let target = self.schedule.target_at(elapsed);
            self.reconcile(target, elapsed);

            if let Some(progress) = &progress
                && elapsed >= next_progress
            {
                progress_tick = progress_tick.saturating_add(1);
                next_progress = elapsed.saturating_add(self.config.progress_interval);

                let snap = self.shared.aggregator.snapshot();
                (progress)(ProgressUpdate {
                    tick: progress_tick,
                    elapsed,
                    total_duration: total,
                    target_vus: target,
                    active_vus: self.active(),
                    max_vus: self.ceiling.min(self.max_vus),
                    stage: self.schedule.stage_snapshot_at(elapsed).map(Into::into),
                    metrics: tracker.update(&snap, Instant::now()),
                });
            }
        }

        self.shutdown().await
    }

    /// Brings the active worker count to `target`, capped by the current ceiling.
    fn reconcile(&mut self, target: u64, elapsed: Duration) {
        let want = target.min(self.ceiling);

        while self.active() < want {
            match self.try_spawn() {
                Ok(()) => self.consecutive_failures = 0,
                Err(err) => {
                    self.on_spawn_failure(err, target, elapsed);
                    break;
                }
            }
        }

        while self.active() > want {
            // LIFO: the newest worker goes first.
            let Some(worker) = self.active.pop() else {
                break;
            };
            debug!(vu = worker.handle.id(), "stopping vu");
            worker.handle.stop();
            drop(worker.permit);
            self.draining.push(worker.task);
        }

        self.outcome.peak_active = self.outcome.peak_active.max(self.active());
    }

    fn try_spawn(&mut self) -> std::result::Result<(), SchedulerError> {
        let permit = self
            .budget
            .clone()
            .try_acquire_owned()
            .map_err(|_| SchedulerError::BudgetExhausted {
                max_vus: self.max_vus,
            })?;

        self.next_id = self.next_id.saturating_add(1);
        let handle = Arc::new(WorkerHandle::new(self.next_id));
        let worker = VuWorker::new(handle.clone(), self.shared.clone());
        debug!(vu = handle.id(), "starting vu");

        let task = tokio::spawn(worker.run());

        self.active.push(ActiveWorker {
            handle,
            task,
            permit,
        });
        Ok(())
    }

    fn on_spawn_failure(&mut self, err: SchedulerError, target: u64, elapsed: Duration) {
        self.consecutive_failures = self.consecutive_failures.saturating_add(1);
        if self.consecutive_failures < self.config.spawn_retry_limit {
            debug!(error = %err, failures = self.consecutive_failures, "vu spawn failed");
            return;
        }

        self.consecutive_failures = 0;
        self.ceiling = self.active();
        let warning = SchedulerWarning {
            elapsed,
            target,
            ceiling: self.ceiling,
            error: err,
        };
        warn!("{warning}");
        self.outcome.warnings.push(warning);
    }

    /// Joins stopped workers that have already finished, surfacing their panics.
    async fn reap_drained(&mut self) -> Result<()> {
        let (done, pending): (Vec<_>, Vec<_>) = std::mem::take(&mut self.draining)
            .into_iter()
            .partition(JoinHandle::is_finished);
        self.draining = pending;
        for task in done {
            task.await?;
        }
        Ok(())
    }

    async fn shutdown(mut self) -> Result<SchedulerOutcome> {
        for worker in &self.active {
            worker.handle.stop();
        }

        let tasks: Vec<JoinHandle<()>> = self
            .active
            .drain(..)
            .map(|w| w.task)
            .chain(self.draining.drain(..))
            .collect();
        debug!(workers = tasks.len(), "joining vus");
        for task in tasks {
            task.await?;
        }

        Ok(self.outcome)
    }
}
