use std::sync::Arc;
use std::sync::atomic::{AtomicU8, Ordering};
use std::time::{Duration, Instant};

use tracing::{debug, warn};

use crate::aggregator::Aggregator;
use crate::context::IterationContext;
use crate::executor::{Executor, Transport};
use crate::scenario::{Scenario, Step};
use crate::signal::StopSignal;

#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
#[strum(serialize_all = "snake_case")]
#[repr(u8)]
pub enum WorkerState {
    Idle = 0,
    Running = 1,
    /// Stop requested while a request was in flight; waiting out the grace period.
    Stopping = 2,
    Stopped = 3,
}

impl WorkerState {
    fn from_u8(v: u8) -> Self {
        match v {
            0 => Self::Idle,
            1 => Self::Running,
            2 => Self::Stopping,
            _ => Self::Stopped,
        }
    }
}

/// Shared view of one worker, held by the scheduler.
#[derive(Debug)]
pub struct WorkerHandle {
    id: u64,
    state: AtomicU8,
    stop: StopSignal,
}

impl WorkerHandle {
    pub fn new(id: u64) -> Self {
        Self {
            id,
            state: AtomicU8::new(WorkerState::Idle as u8),
            stop: StopSignal::new(),
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn state(&self) -> WorkerState {
        WorkerState::from_u8(self.state.load(Ordering::Acquire))
    }

    fn set_state(&self, state: WorkerState) {
        self.state.store(state as u8, Ordering::Release);
    }

    /// Asks the worker to stop at its next step boundary.
    pub fn stop(&self) {
        self.stop.stop();
    }

    pub fn is_stop_requested(&self) -> bool {
        self.stop.is_stopped()
    }
}

/// Everything workers of one run share.
#[derive(Debug)]
pub struct WorkerShared<T> {
    pub scenario: Scenario,
    pub executor: Executor<T>,
    pub aggregator: Arc<Aggregator>,
    /// Run-wide stop (user abort).
    pub abort: Arc<StopSignal>,
    /// Workers stop on their own once this passes.
    pub deadline: Instant,
    /// How long an in-flight request may keep running after a stop.
    pub graceful_stop: Duration,
}

/// One virtual user: runs the scenario in a loop until stopped.
#[derive(Debug)]
pub struct VuWorker<T> {
    handle: Arc<WorkerHandle>,
    shared: Arc<WorkerShared<T>>,
}

impl<T: Transport> VuWorker<T> {
    pub fn new(handle: Arc<WorkerHandle>, shared: Arc<WorkerShared<T>>) -> Self {
        Self { handle, shared }
    }

    fn should_stop(&self) -> bool {
        self.handle.is_stop_requested()
            || self.shared.abort.is_stopped()
            || Instant::now() >= self.shared.deadline
    }

    /// Resolves when any stop condition holds.
    async fn stopped(&self) {
        let deadline = tokio::time::Instant::from_std(self.shared.deadline);
        tokio::select! {
            _ = self.handle.stop.wait() => {}
            _ = self.shared.abort.wait() => {}
            _ = tokio::time::sleep_until(deadline) => {}
        }
    }

    pub async fn run(self) {
        let _active = self.shared.aggregator.enter_vu();
        let id = self.handle.id();
        self.handle.set_state(WorkerState::Running);
        debug!(vu = id, "vu started");

        let mut iteration: u64 = 0;
        while !self.should_stop() {
            let ctx = IterationContext::new(id, iteration);
            let started = Instant::now();
            let completed = self.run_iteration(&ctx).await;
            self.shared
                .aggregator
                .record_iteration(started.elapsed(), completed);
            iteration = iteration.saturating_add(1);
            if !completed {
                break;
            }
        }

        self.handle.set_state(WorkerState::Stopping);
        debug!(vu = id, iterations = iteration, "vu stopped");
        self.handle.set_state(WorkerState::Stopped);
    }

    /// Returns `false` when the iteration was cut short.
    async fn run_iteration(&self, ctx: &IterationContext) -> bool {
        for step in self.shared.scenario.steps() {
            if self.should_stop() {
                return false;
            }

            match step {
                Step::Sleep(d) => {
                    tokio::select! {
                        _ = tokio::time::sleep(*d) => {}
                        _ = self.stopped() => return false,
                    }
                }
                Step::Request(req) => {
                    let exec = self.shared.executor.execute(req, ctx);
                    tokio::pin!(exec);

                    let outcome = tokio::select! {
                        biased;
                        outcome = &mut exec => outcome,
                        _ = self.stopped() => {
                            self.handle.set_state(WorkerState::Stopping);
                            match tokio::time::timeout(self.shared.graceful_stop, &mut exec).await {
                                Ok(outcome) => outcome,
                                Err(_) => {
                                    warn!(
                                        vu = ctx.vu_id,
                                        step = %req.name,
                                        "abandoning in-flight request after graceful stop"
                                    );
                                    return false;
                                }
                            }
                        }
                    };

                    self.shared.aggregator.record(&outcome);
                }
            }
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::env_from_pairs;
    use crate::executor::stub::StubTransport;
    use crate::scenario::{RequestStepSpec, ScenarioSpec, StepSpec};

    fn shared(
        transport: StubTransport,
        steps: Vec<StepSpec>,
        run_for: Duration,
        graceful_stop: Duration,
    ) -> Arc<WorkerShared<StubTransport>> {
        let scenario = Scenario::compile(
            ScenarioSpec {
                name: "w".to_string(),
                steps,
            },
            &env_from_pairs::<&str, &str>([]),
        )
        .unwrap_or_else(|e| panic!("{e}"));

        Arc::new(WorkerShared {
            aggregator: Arc::new(Aggregator::for_scenario(&scenario)),
            scenario,
            executor: Executor::new(Arc::new(transport), Duration::from_secs(5)),
            abort: Arc::new(StopSignal::new()),
            deadline: Instant::now() + run_for,
            graceful_stop,
        })
    }

    fn get() -> StepSpec {
        StepSpec::Request(RequestStepSpec::get("http://localhost/"))
    }

    #[tokio::test]
    async fn runs_until_deadline_and_counts_whole_iterations() {
        let shared = shared(
            StubTransport::ok(Duration::from_millis(10)),
            vec![get(), get()],
            Duration::from_millis(200),
            Duration::from_secs(1),
        );
        let handle = Arc::new(WorkerHandle::new(1));
        assert_eq!(handle.state(), WorkerState::Idle);

        VuWorker::new(handle.clone(), shared.clone()).run().await;
        assert_eq!(handle.state(), WorkerState::Stopped);

        let snap = shared.aggregator.snapshot();
        let it = snap.iterations;
        assert!(it.completed > 0);
        assert!(it.interrupted <= 1);
        // Requests of interrupted iterations are still recorded.
        assert!(snap.requests.count >= it.completed * 2);
        assert!(snap.requests.count <= it.completed * 2 + 1);
        assert_eq!(snap.vus_active, 0);
        assert_eq!(snap.vus_peak, 1);
    }

    #[tokio::test]
    async fn stop_during_sleep_ends_immediately() {
        let shared = shared(
            StubTransport::ok(Duration::ZERO),
            vec![get(), StepSpec::Sleep(Duration::from_secs(30))],
            Duration::from_secs(60),
            Duration::from_secs(1),
        );
        let handle = Arc::new(WorkerHandle::new(1));
        let task = tokio::spawn(VuWorker::new(handle.clone(), shared.clone()).run());

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(handle.state(), WorkerState::Running);
        handle.stop();

        tokio::time::timeout(Duration::from_millis(500), task)
            .await
            .unwrap_or_else(|_| panic!("worker did not stop"))
            .unwrap_or_else(|e| panic!("worker panicked: {e}"));
        assert_eq!(handle.state(), WorkerState::Stopped);

        let snap = shared.aggregator.snapshot();
        assert_eq!(snap.requests.count, 1);
        assert_eq!(snap.iterations.interrupted, 1);
        assert_eq!(snap.iterations.completed, 0);
    }

    #[tokio::test]
    async fn in_flight_request_finishes_within_grace() {
        let shared = shared(
            StubTransport::ok(Duration::from_millis(100)),
            vec![get()],
            Duration::from_secs(60),
            Duration::from_secs(1),
        );
        let handle = Arc::new(WorkerHandle::new(1));
        let task = tokio::spawn(VuWorker::new(handle.clone(), shared.clone()).run());

        tokio::time::sleep(Duration::from_millis(30)).await;
        handle.stop();
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(handle.state(), WorkerState::Stopping);

        task.await.unwrap_or_else(|e| panic!("worker panicked: {e}"));
        let snap = shared.aggregator.snapshot();
        assert_eq!(snap.requests.count, 1);
        assert_eq!(snap.iterations.completed, 1);
    }

    #[tokio::test]
    async fn in_flight_request_is_abandoned_after_grace() {
        let shared = shared(
            StubTransport::ok(Duration::from_secs(10)),
            vec![get()],
            Duration::from_secs(60),
            Duration::from_millis(50),
        );
        let handle = Arc::new(WorkerHandle::new(1));
        let task = tokio::spawn(VuWorker::new(handle.clone(), shared.clone()).run());

        tokio::time::sleep(Duration::from_millis(20)).await;
        let stopped_at = Instant::now();
        handle.stop();

        task.await.unwrap_or_else(|e| panic!("worker panicked: {e}"));
        assert!(stopped_at.elapsed() < Duration::from_secs(1));

        let snap = shared.aggregator.snapshot();
        assert_eq!(snap.requests.count, 0);
        assert_eq!(snap.iterations.interrupted, 1);
    }

    #[tokio::test]
    async fn abort_stops_workers() {
        let shared = shared(
            StubTransport::ok(Duration::from_millis(5)),
            vec![get()],
            Duration::from_secs(60),
            Duration::from_secs(1),
        );
        let handle = Arc::new(WorkerHandle::new(1));
        let task = tokio::spawn(VuWorker::new(handle.clone(), shared.clone()).run());

        tokio::time::sleep(Duration::from_millis(30)).await;
        shared.abort.stop();
        tokio::time::timeout(Duration::from_millis(500), task)
            .await
            .unwrap_or_else(|_| panic!("worker did not stop"))
            .unwrap_or_else(|e| panic!("worker panicked: {e}"));
        assert_eq!(handle.state(), WorkerState::Stopped);
        assert!(!handle.is_stop_requested());
    }
}
