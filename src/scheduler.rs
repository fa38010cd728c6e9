//! The run driver.
//!
//! [`Scheduler::run`] wires the pieces together: it seeds the candidate
//! queue, starts the evaluation workers and the coordinator, waits for the
//! shutdown signal, then joins everything that can be joined.

use core::time::Duration;
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crate::config::{DuplicatePolicy, SchedulerConfig};
use crate::coordinator::{Control, Coordinator};
use crate::log::{self, MemoryLog, Observation, RunLog};
use crate::model::DecisionModel;
use crate::objective::Objective;
use crate::queue::WorkQueue;
use crate::signal::StopReason;
use crate::worker::Worker;
use crate::workspace::WorkspaceConfig;

/// Asynchronous, budget-bounded evaluation scheduler.
///
/// # Examples
///
/// ```
/// use calibrate::model::RandomSearch;
/// use calibrate::{Candidate, EvalContext, Scheduler, SearchSpace, StopReason};
///
/// let space = SearchSpace::builder()
///     .param("car_acc", 0.2, 4.0)
///     .param("car_sigma", 0.0, 1.0)
///     .build()
///     .unwrap();
///
/// let report = Scheduler::builder(|c: &Candidate, _: &EvalContext| {
///     let acc = c.get("car_acc").ok_or_else(|| "missing car_acc".to_owned())?;
///     let sigma = c.get("car_sigma").ok_or_else(|| "missing car_sigma".to_owned())?;
///     Ok::<_, String>(vec![(acc - 2.6).abs(), (sigma - 0.5).abs()])
/// })
/// .model(RandomSearch::with_seed(space, 7))
/// .workers(2)
/// .budget(20)
/// .build()
/// .unwrap()
/// .run()
/// .unwrap();
///
/// assert_eq!(report.issued, 20);
/// assert_eq!(report.stop_reason, StopReason::BudgetExhausted);
/// assert!(report.best().is_some());
/// ```
pub struct Scheduler<O> {
    config: SchedulerConfig,
    model: Box<dyn DecisionModel>,
    objective: Arc<O>,
    log: Arc<dyn RunLog>,
    control: Arc<Control>,
}

impl<O: Objective> Scheduler<O> {
    /// Start building a scheduler around `objective`.
    #[must_use]
    pub fn builder(objective: O) -> SchedulerBuilder<O> {
        SchedulerBuilder::new(objective)
    }

    /// The run configuration.
    #[must_use]
    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    /// A handle for cancelling or watching the run from another thread.
    #[must_use]
    pub fn handle(&self) -> RunHandle {
        RunHandle {
            control: Arc::clone(&self.control),
        }
    }
}

impl<O: Objective + 'static> Scheduler<O> {
    /// Run the calibration to completion on the calling thread.
    ///
    /// Returns once the budget is exhausted, the run is cancelled, or the
    /// model stops producing novel candidates, and every in-flight
    /// evaluation has reported back (or the drain timeout elapsed).
    ///
    /// # Errors
    ///
    /// Returns [`Error::Spawn`](crate::Error::Spawn) if a thread cannot be
    /// started and [`Error::Internal`](crate::Error::Internal) if the
    /// coordinator thread panicked (for example inside the decision
    /// model). Observations registered before the failure remain in the
    /// run log.
    pub fn run(self) -> crate::Result<RunReport> {
        #[cfg(feature = "tracing")]
        let _span = tracing::info_span!(
            "calibrate_run",
            workers = self.config.workers,
            budget = self.config.budget
        )
        .entered();

        let Self {
            config,
            model,
            objective,
            log,
            control,
        } = self;

        let results = WorkQueue::new();
        let mut coordinator =
            Coordinator::new(model, log, Arc::clone(&control), results.clone(), &config);
        coordinator.seed();
        trace_info!(issued = coordinator.issued(), "candidate queue seeded");

        let run_tag = fastrand::u32(..);
        let mut workers = Vec::with_capacity(config.workers);
        for index in 0..config.workers {
            let worker = Worker {
                index,
                objective: Arc::clone(&objective),
                candidates: control.candidates().clone(),
                results: results.clone(),
                workspace: config.workspace.clone(),
                run_tag,
            };
            let spawned = thread::Builder::new()
                .name(format!("calibrate-worker-{index}"))
                .spawn(move || worker.run());
            match spawned {
                Ok(handle) => workers.push(handle),
                Err(e) => {
                    control.shutdown(StopReason::Aborted);
                    join_workers(workers);
                    return Err(crate::Error::Spawn(e.to_string()));
                }
            }
        }

        let guard = AbortOnPanic(Arc::clone(&control));
        let spawned = thread::Builder::new()
            .name("calibrate-coordinator".into())
            .spawn(move || {
                let _guard = guard;
                coordinator.run()
            });
        let coordinator = match spawned {
            Ok(handle) => handle,
            Err(e) => {
                control.shutdown(StopReason::Aborted);
                join_workers(workers);
                return Err(crate::Error::Spawn(e.to_string()));
            }
        };

        let stop_reason = wait_for_shutdown(&control, &coordinator, config.poll_interval);
        trace_info!(?stop_reason, "draining in-flight evaluations");

        let Ok(summary) = coordinator.join() else {
            return Err(crate::Error::Internal("coordinator thread panicked"));
        };

        let detached_workers = if summary.timed_out {
            let (finished, running): (Vec<_>, Vec<_>) =
                workers.into_iter().partition(JoinHandle::is_finished);
            join_workers(finished);
            if !running.is_empty() {
                trace_warn!(
                    workers = running.len(),
                    "detaching workers still busy after the drain timeout"
                );
            }
            running.len()
        } else {
            join_workers(workers);
            0
        };

        let report = RunReport {
            observations: summary.observations,
            issued: summary.issued,
            evaluated: summary.evaluated,
            failed: summary.failed,
            duplicates: summary.duplicates,
            abandoned: control.abandoned(),
            unpersisted: summary.unpersisted,
            detached_workers,
            stop_reason,
        };
        trace_info!(
            issued = report.issued,
            registered = report.observations.len(),
            failed = report.failed,
            "calibration run finished"
        );
        Ok(report)
    }

    /// Run on tokio's blocking thread pool.
    ///
    /// # Errors
    ///
    /// Same as [`run`](Self::run), plus `Error::TaskError` if the blocking
    /// task cannot be joined.
    #[cfg(feature = "async")]
    pub async fn run_async(self) -> crate::Result<RunReport> {
        tokio::task::spawn_blocking(move || self.run())
            .await
            .map_err(|e| crate::Error::TaskError(e.to_string()))?
    }

    /// Like [`run_async`](Self::run_async), but an operator interrupt
    /// (Ctrl-C) cancels the run. In-flight evaluations still finish and
    /// their observations are kept.
    ///
    /// # Errors
    ///
    /// Same as [`run_async`](Self::run_async).
    #[cfg(feature = "async")]
    pub async fn run_until_ctrl_c(self) -> crate::Result<RunReport> {
        let handle = self.handle();
        let mut run = tokio::task::spawn_blocking(move || self.run());

        tokio::select! {
            joined = &mut run => {
                return joined.map_err(|e| crate::Error::TaskError(e.to_string()))?;
            }
            interrupted = tokio::signal::ctrl_c() => {
                if interrupted.is_ok() {
                    trace_info!("interrupt received; cancelling run");
                    handle.cancel();
                }
            }
        }

        run.await
            .map_err(|e| crate::Error::TaskError(e.to_string()))?
    }
}

/// Block until the shutdown signal is raised. A coordinator that died
/// without raising it aborts the run.
fn wait_for_shutdown(
    control: &Control,
    coordinator: &JoinHandle<crate::coordinator::Summary>,
    poll_interval: Duration,
) -> StopReason {
    loop {
        if let Some(reason) = control.signal().wait_timeout(poll_interval) {
            return reason;
        }
        if coordinator.is_finished() {
            control.shutdown(StopReason::Aborted);
            return control.signal().reason().unwrap_or(StopReason::Aborted);
        }
        trace_debug!(issued = control.issued(), "calibration in progress");
    }
}

/// Raises [`StopReason::Aborted`] if the coordinator thread unwinds, so
/// the driver and the workers stop waiting on it.
struct AbortOnPanic(Arc<Control>);

impl Drop for AbortOnPanic {
    fn drop(&mut self) {
        if thread::panicking() {
            self.0.shutdown(StopReason::Aborted);
        }
    }
}

fn join_workers(workers: Vec<JoinHandle<usize>>) {
    for worker in workers {
        if worker.join().is_err() {
            trace_warn!("worker thread panicked");
        }
    }
}

/// Cancels or observes a run from another thread.
///
/// Obtained from [`Scheduler::handle`] before calling
/// [`run`](Scheduler::run).
#[derive(Clone)]
pub struct RunHandle {
    control: Arc<Control>,
}

impl RunHandle {
    /// Stop issuing work. Queued candidates are dropped; evaluations
    /// already running finish and are registered.
    ///
    /// Returns `false` if the run was already shutting down.
    pub fn cancel(&self) -> bool {
        self.control.shutdown(StopReason::Cancelled)
    }

    /// Number of candidates issued so far.
    #[must_use]
    pub fn issued(&self) -> u64 {
        self.control.issued()
    }

    /// Returns `true` once the shutdown signal was raised.
    #[must_use]
    pub fn is_shut_down(&self) -> bool {
        self.control.signal().is_raised()
    }

    /// Why the run stopped issuing work, if it did.
    #[must_use]
    pub fn stop_reason(&self) -> Option<StopReason> {
        self.control.signal().reason()
    }
}

/// Outcome of a finished run.
#[derive(Clone, Debug, PartialEq)]
pub struct RunReport {
    /// Registered observations, in registration order.
    pub observations: Vec<Observation>,
    /// Candidates placed on the candidate queue, seeds included.
    pub issued: u64,
    /// Evaluation results received, failures included.
    pub evaluated: u64,
    /// Failed evaluations (never registered).
    pub failed: u64,
    /// Suggestions discarded because their fingerprint was already issued.
    pub duplicates: u64,
    /// Issued candidates dropped from the queue by cancellation.
    pub abandoned: usize,
    /// Observations the run log failed to persist (still listed above).
    pub unpersisted: u64,
    /// Workers still inside an evaluation when the drain timeout elapsed.
    pub detached_workers: usize,
    /// Why the run stopped issuing work.
    pub stop_reason: StopReason,
}

impl RunReport {
    /// The observation with the highest fitness.
    #[must_use]
    pub fn best(&self) -> Option<&Observation> {
        log::best(&self.observations)
    }
}

/// A builder for [`Scheduler`] with a fluent API.
///
/// Created via [`Scheduler::builder`]. A decision model is required; the
/// run log defaults to [`MemoryLog`] and every other setting to
/// [`SchedulerConfig::default`].
pub struct SchedulerBuilder<O> {
    objective: O,
    config: SchedulerConfig,
    model: Option<Box<dyn DecisionModel>>,
    log: Option<Arc<dyn RunLog>>,
}

impl<O: Objective> SchedulerBuilder<O> {
    fn new(objective: O) -> Self {
        Self {
            objective,
            config: SchedulerConfig::default(),
            model: None,
            log: None,
        }
    }

    /// Replace the whole configuration.
    #[must_use]
    pub fn config(mut self, config: SchedulerConfig) -> Self {
        self.config = config;
        self
    }

    /// Set the decision model that proposes candidates.
    #[must_use]
    pub fn model(mut self, model: impl DecisionModel + 'static) -> Self {
        self.model = Some(Box::new(model));
        self
    }

    /// Set the run log observations are appended to.
    ///
    /// Defaults to [`MemoryLog`] if not specified.
    #[must_use]
    pub fn log(mut self, log: impl RunLog + 'static) -> Self {
        self.log = Some(Arc::new(log));
        self
    }

    /// Number of parallel evaluation workers.
    #[must_use]
    pub fn workers(mut self, workers: usize) -> Self {
        self.config.workers = workers;
        self
    }

    /// Maximum number of candidates to issue.
    #[must_use]
    pub fn budget(mut self, budget: u64) -> Self {
        self.config.budget = budget;
        self
    }

    /// Decimal places candidates are rounded to.
    #[must_use]
    pub fn precision(mut self, precision: u32) -> Self {
        self.config.precision = precision;
        self
    }

    /// Extra suggestions requested after a duplicate before giving up.
    #[must_use]
    pub fn max_duplicate_retries(mut self, retries: usize) -> Self {
        self.config.max_duplicate_retries = retries;
        self
    }

    /// Fallback applied to duplicate suggestions.
    #[must_use]
    pub fn duplicate_policy(mut self, policy: DuplicatePolicy) -> Self {
        self.config.duplicate_policy = policy;
        self
    }

    /// Interval of the driver's progress check and bounded waits.
    #[must_use]
    pub fn poll_interval(mut self, interval: Duration) -> Self {
        self.config.poll_interval = interval;
        self
    }

    /// Stop waiting for in-flight evaluations this long after shutdown.
    #[must_use]
    pub fn drain_timeout(mut self, timeout: Duration) -> Self {
        self.config.drain_timeout = Some(timeout);
        self
    }

    /// Give every evaluation its own scratch directory.
    #[must_use]
    pub fn workspace(mut self, workspace: WorkspaceConfig) -> Self {
        self.config.workspace = Some(workspace);
        self
    }

    /// Validate the configuration and build the scheduler.
    ///
    /// # Errors
    ///
    /// Returns [`Error::MissingComponent`](crate::Error::MissingComponent)
    /// without a decision model, or
    /// [`Error::InvalidConfig`](crate::Error::InvalidConfig) if the
    /// configuration is unusable.
    pub fn build(self) -> crate::Result<Scheduler<O>> {
        self.config.validate()?;
        let model = self
            .model
            .ok_or(crate::Error::MissingComponent("decision model"))?;
        let log = self.log.unwrap_or_else(|| Arc::new(MemoryLog::new()));

        Ok(Scheduler {
            control: Arc::new(Control::new(self.config.workers)),
            config: self.config,
            model,
            objective: Arc::new(self.objective),
            log,
        })
    }
}
