//! The optimizer coordinator.
//!
//! A single thread owns the decision model, the fingerprint store and the
//! issued count. It consumes evaluation results in arrival order, and for
//! each one registers the fitness, asks the model for the next point,
//! deduplicates it and issues at most one new candidate. Because nothing
//! else can touch that state, registration-then-suggestion is atomic per
//! result without any lock around the model.

use core::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use core::time::Duration;
use std::sync::Arc;
use std::time::Instant;

use crate::candidate::{Candidate, FingerprintStore, round_to};
use crate::config::{DuplicatePolicy, SchedulerConfig};
use crate::log::{Observation, RunLog};
use crate::model::DecisionModel;
use crate::queue::{Message, WorkQueue};
use crate::rng_util;
use crate::signal::{ShutdownSignal, StopReason};
use crate::space::SearchSpace;
use crate::worker::{EvaluationResult, Outcome, Task};

/// Shared stop machinery: the shutdown signal plus the candidate queue it
/// closes.
pub(crate) struct Control {
    signal: ShutdownSignal,
    candidates: WorkQueue<Task>,
    workers: usize,
    issued: AtomicU64,
    abandoned: AtomicUsize,
}

impl Control {
    pub(crate) fn new(workers: usize) -> Self {
        Self {
            signal: ShutdownSignal::new(),
            candidates: WorkQueue::new(),
            workers,
            issued: AtomicU64::new(0),
            abandoned: AtomicUsize::new(0),
        }
    }

    /// Raise the shutdown signal.
    ///
    /// The candidate queue is closed and one poison pill per worker is
    /// queued before the flag becomes visible, so no candidate can be
    /// pushed once the signal is observed set. Budget exhaustion keeps
    /// already-issued candidates queued; every other reason drops them.
    ///
    /// Returns `false` if the signal was already raised.
    pub(crate) fn shutdown(&self, reason: StopReason) -> bool {
        let discard = !matches!(reason, StopReason::BudgetExhausted);
        let raised = self.signal.raise_with(reason, || {
            if let Some(dropped) = self.candidates.close(self.workers, discard) {
                self.abandoned.fetch_add(dropped, Ordering::SeqCst);
            }
        });
        if raised {
            trace_info!(?reason, "shutdown signal raised");
        }
        raised
    }

    pub(crate) fn signal(&self) -> &ShutdownSignal {
        &self.signal
    }

    pub(crate) fn candidates(&self) -> &WorkQueue<Task> {
        &self.candidates
    }

    pub(crate) fn issued(&self) -> u64 {
        self.issued.load(Ordering::SeqCst)
    }

    pub(crate) fn abandoned(&self) -> usize {
        self.abandoned.load(Ordering::SeqCst)
    }
}

/// Counters reported once the coordinator stops.
#[derive(Clone, Debug, Default, PartialEq)]
pub(crate) struct Summary {
    pub(crate) observations: Vec<Observation>,
    pub(crate) issued: u64,
    pub(crate) evaluated: u64,
    pub(crate) failed: u64,
    pub(crate) duplicates: u64,
    pub(crate) unpersisted: u64,
    pub(crate) timed_out: bool,
}

pub(crate) struct Coordinator {
    model: Box<dyn DecisionModel>,
    store: FingerprintStore,
    log: Arc<dyn RunLog>,
    control: Arc<Control>,
    results: WorkQueue<EvaluationResult>,
    rng: fastrand::Rng,
    budget: u64,
    precision: u32,
    max_duplicate_retries: usize,
    duplicate_policy: DuplicatePolicy,
    poll_interval: Duration,
    drain_timeout: Option<Duration>,
    workers: usize,
    summary: Summary,
}

impl Coordinator {
    pub(crate) fn new(
        model: Box<dyn DecisionModel>,
        log: Arc<dyn RunLog>,
        control: Arc<Control>,
        results: WorkQueue<EvaluationResult>,
        config: &SchedulerConfig,
    ) -> Self {
        Self {
            model,
            store: FingerprintStore::new(),
            log,
            control,
            results,
            rng: fastrand::Rng::new(),
            budget: config.budget,
            precision: config.precision,
            max_duplicate_retries: config.max_duplicate_retries,
            duplicate_policy: config.duplicate_policy.clone(),
            poll_interval: config.poll_interval,
            drain_timeout: config.drain_timeout,
            workers: config.workers,
            summary: Summary::default(),
        }
    }

    pub(crate) fn issued(&self) -> u64 {
        self.summary.issued
    }

    fn in_flight(&self) -> u64 {
        self.summary.issued - self.summary.evaluated
    }

    /// Fill the candidate queue with one candidate per worker, or fewer if
    /// the budget is smaller or the model runs out of novel points.
    pub(crate) fn seed(&mut self) {
        for _ in 0..self.workers {
            if self.summary.issued >= self.budget {
                break;
            }
            let Some(candidate) = self.next_novel() else {
                break;
            };
            if !self.issue(candidate) {
                break;
            }
        }
        if self.summary.issued >= self.budget {
            self.control.shutdown(StopReason::BudgetExhausted);
        } else if self.summary.issued == 0 {
            self.control.shutdown(StopReason::Stalled);
        }
    }

    /// Process one evaluation result.
    pub(crate) fn handle(&mut self, result: EvaluationResult) {
        self.summary.evaluated += 1;

        match result.outcome {
            Outcome::Fitness(fitness) => {
                self.register(result.ticket, result.worker, result.candidate, fitness);
            }
            Outcome::Failed(_reason) => {
                self.summary.failed += 1;
                trace_warn!(
                    ticket = result.ticket,
                    worker = result.worker,
                    reason = %_reason,
                    "discarding failed evaluation"
                );
            }
        }

        // Results that arrive after shutdown are still registered, but
        // nothing new is issued.
        if self.control.signal().is_raised() {
            return;
        }
        self.replenish();
    }

    fn register(&mut self, ticket: u64, worker: usize, candidate: Candidate, fitness: f64) {
        self.model.register(&candidate, fitness);
        trace_debug!(ticket, fitness, "observation registered");

        let observation = Observation {
            id: ticket,
            worker,
            candidate,
            fitness,
        };
        if let Err(_e) = self.log.append(observation.clone()) {
            self.summary.unpersisted += 1;
            trace_warn!(ticket, error = %_e, "failed to persist observation");
        }
        self.summary.observations.push(observation);
    }

    /// Issue at most one candidate, or stop the run if nothing more can be
    /// issued.
    fn replenish(&mut self) {
        if self.summary.issued >= self.budget {
            self.control.shutdown(StopReason::BudgetExhausted);
            return;
        }
        match self.next_novel() {
            Some(candidate) => {
                self.issue(candidate);
            }
            None if self.in_flight() == 0 => {
                trace_warn!("no novel suggestion and nothing in flight");
                self.control.shutdown(StopReason::Stalled);
            }
            None => {
                trace_warn!(
                    retries = self.max_duplicate_retries,
                    "no novel suggestion found; skipping this slot"
                );
            }
        }
    }

    /// Ask the model for a rounded point that was never issued.
    fn next_novel(&mut self) -> Option<Candidate> {
        for attempt in 0..=self.max_duplicate_retries {
            let suggestion = self.model.suggest().rounded(self.precision);
            if !self.store.contains(&suggestion.fingerprint()) {
                return Some(suggestion);
            }
            self.summary.duplicates += 1;
            trace_debug!(attempt, "duplicate suggestion discarded");

            if let DuplicatePolicy::Perturb(space) = &self.duplicate_policy {
                let nudged = perturb(&mut self.rng, &suggestion, space, self.precision, attempt + 1)
                    .filter(|n| !self.store.contains(&n.fingerprint()));
                if nudged.is_some() {
                    return nudged;
                }
            }
        }
        None
    }

    /// Push `candidate` onto the candidate queue. Returns `false` if the
    /// queue was already closed by a shutdown.
    fn issue(&mut self, candidate: Candidate) -> bool {
        let fingerprint = candidate.fingerprint();
        let ticket = self.summary.issued;
        if self.control.candidates().push(Task { ticket, candidate }).is_err() {
            return false;
        }
        self.store.insert(fingerprint);
        self.summary.issued += 1;
        self.control.issued.store(self.summary.issued, Ordering::SeqCst);
        trace_debug!(ticket, "candidate issued");

        if self.summary.issued >= self.budget {
            self.control.shutdown(StopReason::BudgetExhausted);
        }
        true
    }

    /// Consume results until every worker has exited, or until the drain
    /// timeout elapses after shutdown.
    pub(crate) fn run(mut self) -> Summary {
        let mut exited = 0;
        let mut draining = false;
        let mut drain_deadline: Option<Instant> = None;

        while exited < self.workers {
            if !draining && self.control.signal().is_raised() {
                draining = true;
                // A timeout past the end of the clock never elapses.
                drain_deadline = self
                    .drain_timeout
                    .and_then(|t| Instant::now().checked_add(t));
            }
            let wait = match drain_deadline {
                Some(deadline) => {
                    let now = Instant::now();
                    if now >= deadline {
                        self.summary.timed_out = true;
                        trace_warn!(
                            in_flight = self.in_flight(),
                            "drain timeout elapsed; leaving remaining evaluations behind"
                        );
                        break;
                    }
                    (deadline - now).min(self.poll_interval)
                }
                None => self.poll_interval,
            };

            match self.results.pop_timeout(wait) {
                Some(Message::Work(result)) => self.handle(result),
                Some(Message::Stop) => exited += 1,
                None => {}
            }
        }

        self.summary
    }
}

/// Shift one random parameter by `steps` precision units in a random
/// direction, rounded and then clamped to the grid points inside its
/// bounds. `None` if the parameter's bounds hold no grid point.
fn perturb(
    rng: &mut fastrand::Rng,
    candidate: &Candidate,
    space: &SearchSpace,
    precision: u32,
    steps: usize,
) -> Option<Candidate> {
    let names: Vec<&str> = candidate.iter().map(|(name, _)| name).collect();
    let &name = rng_util::choose(rng, &names)?;
    let value = candidate.get(name)?;

    #[allow(clippy::cast_possible_wrap, clippy::cast_precision_loss)]
    let delta = steps as f64 * 10f64.powi(-(precision as i32));
    let shifted = round_to(if rng.bool() { value + delta } else { value - delta }, precision);
    let shifted = match space.bounds(name) {
        Some(bounds) => bounds.on_grid(precision)?.clamp(shifted),
        None => shifted,
    };

    Some(candidate.with_value(name, shifted))
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::thread;

    use parking_lot::Mutex;

    use super::*;
    use crate::log::MemoryLog;
    use crate::model::RandomSearch;

    /// Replays a fixed list of suggestions (cycling the last one) and
    /// records every registration.
    struct Scripted {
        script: VecDeque<f64>,
        last: f64,
        registered: Arc<Mutex<Vec<(Candidate, f64)>>>,
    }

    impl Scripted {
        fn new(script: &[f64]) -> (Self, Arc<Mutex<Vec<(Candidate, f64)>>>) {
            let registered = Arc::new(Mutex::new(Vec::new()));
            let model = Self {
                script: script.iter().copied().collect(),
                last: script.last().copied().unwrap_or_default(),
                registered: Arc::clone(&registered),
            };
            (model, registered)
        }
    }

    impl DecisionModel for Scripted {
        fn suggest(&mut self) -> Candidate {
            let x = self.script.pop_front().unwrap_or(self.last);
            Candidate::from_iter([("x", x)])
        }

        fn register(&mut self, candidate: &Candidate, fitness: f64) {
            self.registered.lock().push((candidate.clone(), fitness));
        }
    }

    fn config(workers: usize, budget: u64) -> SchedulerConfig {
        SchedulerConfig {
            workers,
            budget,
            max_duplicate_retries: 3,
            poll_interval: Duration::from_millis(10),
            ..SchedulerConfig::default()
        }
    }

    fn coordinator(model: impl DecisionModel + 'static, config: &SchedulerConfig) -> Coordinator {
        Coordinator::new(
            Box::new(model),
            Arc::new(MemoryLog::new()),
            Arc::new(Control::new(config.workers)),
            WorkQueue::new(),
            config,
        )
    }

    fn drain_tasks(c: &Coordinator) -> Vec<Task> {
        let mut tasks = Vec::new();
        while let Some(Message::Work(task)) = c.control.candidates().pop_timeout(Duration::ZERO) {
            tasks.push(task);
        }
        tasks
    }

    fn success(task: Task, fitness: f64) -> EvaluationResult {
        EvaluationResult {
            ticket: task.ticket,
            worker: 0,
            candidate: task.candidate,
            outcome: Outcome::Fitness(fitness),
        }
    }

    #[test]
    fn seeding_issues_one_candidate_per_worker() {
        let (model, _) = Scripted::new(&[0.1, 0.2, 0.3, 0.4]);
        let mut c = coordinator(model, &config(3, 10));
        c.seed();
        assert_eq!(c.issued(), 3);
        assert_eq!(c.control.issued(), 3);
        assert!(!c.control.signal().is_raised());
        let tickets: Vec<u64> = drain_tasks(&c).iter().map(|t| t.ticket).collect();
        assert_eq!(tickets, vec![0, 1, 2]);
    }

    #[test]
    fn seeding_respects_a_small_budget() {
        let (model, _) = Scripted::new(&[0.1, 0.2, 0.3, 0.4]);
        let mut c = coordinator(model, &config(4, 2));
        c.seed();
        assert_eq!(c.issued(), 2);
        assert_eq!(c.control.signal().reason(), Some(StopReason::BudgetExhausted));
        // Budget exhaustion keeps issued work queued ahead of the pills.
        assert_eq!(drain_tasks(&c).len(), 2);
    }

    #[test]
    fn zero_budget_stops_before_issuing() {
        let (model, _) = Scripted::new(&[0.1]);
        let mut c = coordinator(model, &config(2, 0));
        c.seed();
        assert_eq!(c.issued(), 0);
        assert_eq!(c.control.signal().reason(), Some(StopReason::BudgetExhausted));
    }

    #[test]
    fn budget_five_with_two_workers() {
        let script: Vec<f64> = (0..10).map(|i| f64::from(i) / 10.0).collect();
        let (model, registered) = Scripted::new(&script);
        let mut c = coordinator(model, &config(2, 5));
        c.seed();

        let mut processed = 0;
        while processed < 5 {
            let tasks = drain_tasks(&c);
            assert!(!tasks.is_empty(), "pipeline ran dry after {processed} results");
            for task in tasks {
                c.handle(success(task, -0.5));
                processed += 1;
                assert!(c.issued() <= 5);
            }
        }

        assert_eq!(c.issued(), 5);
        assert_eq!(registered.lock().len(), 5);
        assert_eq!(c.control.signal().reason(), Some(StopReason::BudgetExhausted));
        assert!(c.control.candidates().push(Task { ticket: 99, candidate: Candidate::default() }).is_err());
    }

    #[test]
    fn failures_are_not_registered_but_replaced() {
        let (model, registered) = Scripted::new(&[0.1, 0.2, 0.3]);
        let mut c = coordinator(model, &config(1, 10));
        c.seed();
        let task = drain_tasks(&c).remove(0);

        c.handle(EvaluationResult {
            ticket: task.ticket,
            worker: 0,
            candidate: task.candidate,
            outcome: Outcome::Failed("simulator crashed".into()),
        });

        assert!(registered.lock().is_empty());
        assert_eq!(c.summary.failed, 1);
        assert!(c.summary.observations.is_empty());
        assert_eq!(c.issued(), 2, "a replacement keeps the worker busy");
        assert_eq!(c.log.len(), 0);
    }

    #[test]
    fn repeated_suggestion_is_issued_once() {
        // The model proposes 0.5 three times in a row, then stays there.
        let (model, _) = Scripted::new(&[0.5, 0.5, 0.5]);
        let mut c = coordinator(model, &config(2, 10));
        c.seed();

        let tasks = drain_tasks(&c);
        assert_eq!(tasks.len(), 1, "the second seed would be a duplicate");
        assert_eq!(c.summary.duplicates, 4, "one retry loop of 1 + 3 attempts");

        // Only evaluation in flight finishes and nothing novel exists: stall.
        c.handle(success(tasks[0].clone(), -0.1));
        assert_eq!(c.issued(), 1);
        assert_eq!(c.control.signal().reason(), Some(StopReason::Stalled));
    }

    #[test]
    fn rounding_makes_near_points_duplicates() {
        let (model, _) = Scripted::new(&[0.123_41, 0.123_44, 0.9]);
        let mut c = coordinator(model, &config(2, 10));
        c.seed();
        let xs: Vec<f64> = drain_tasks(&c)
            .iter()
            .map(|t| t.candidate.get("x").unwrap())
            .collect();
        assert_eq!(xs, vec![0.1234, 0.9]);
        assert_eq!(c.summary.duplicates, 1);
    }

    #[test]
    fn skip_without_stall_while_work_is_in_flight() {
        let (model, _) = Scripted::new(&[0.1, 0.2, 0.2]);
        let mut c = coordinator(model, &config(2, 10));
        c.seed();
        let tasks = drain_tasks(&c);
        assert_eq!(tasks.len(), 2);

        c.handle(success(tasks[0].clone(), -0.3));
        assert_eq!(c.issued(), 2);
        assert!(!c.control.signal().is_raised(), "ticket 1 is still in flight");
    }

    #[test]
    fn perturbation_finds_a_neighbour() {
        let space = SearchSpace::builder().param("x", 0.0, 1.0).build().unwrap();
        let (model, _) = Scripted::new(&[0.5]);
        let cfg = SchedulerConfig {
            duplicate_policy: DuplicatePolicy::Perturb(space.clone()),
            ..config(3, 10)
        };
        let mut c = coordinator(model, &cfg);
        c.seed();

        let tasks = drain_tasks(&c);
        assert_eq!(tasks.len(), 3);
        let mut fingerprints: Vec<_> = tasks.iter().map(|t| t.candidate.fingerprint()).collect();
        fingerprints.dedup();
        assert_eq!(fingerprints.len(), 3);
        for t in &tasks {
            let x = t.candidate.get("x").unwrap();
            assert!((0.49..=0.51).contains(&x), "{x}");
            assert!(space.contains(&t.candidate));
        }
    }

    #[test]
    fn perturb_clamps_to_bounds() {
        let space = SearchSpace::builder().param("x", 0.0, 1.0).build().unwrap();
        let mut rng = fastrand::Rng::with_seed(1);
        let c = Candidate::from_iter([("x", 1.0)]);
        for steps in 1..20 {
            let p = perturb(&mut rng, &c, &space, 2, steps).unwrap();
            assert!(space.contains(&p));
        }
    }

    #[test]
    fn perturb_stays_inside_a_bound_between_grid_points() {
        let space = SearchSpace::builder()
            .param("x", 0.0, 0.123_46)
            .build()
            .unwrap();
        let mut rng = fastrand::Rng::with_seed(4);
        let c = Candidate::from_iter([("x", 0.1234)]);
        for steps in 1..40 {
            let p = perturb(&mut rng, &c, &space, 4, steps).unwrap();
            let x = p.get("x").unwrap();
            assert!(x <= 0.1234, "x = {x}");
            assert_eq!(x, round_to(x, 4));
            assert!(space.contains(&p));
        }
    }

    #[test]
    fn perturb_gives_up_when_no_grid_point_fits() {
        let space = SearchSpace::builder()
            .param("x", 0.000_04, 0.000_06)
            .build()
            .unwrap();
        let mut rng = fastrand::Rng::with_seed(5);
        let c = Candidate::from_iter([("x", 0.0)]);
        assert!(perturb(&mut rng, &c, &space, 4, 1).is_none());
    }

    #[test]
    fn no_push_after_shutdown() {
        let (model, _) = Scripted::new(&[0.1, 0.2, 0.3, 0.4]);
        let mut c = coordinator(model, &config(1, 10));
        c.seed();
        let task = drain_tasks(&c).remove(0);

        assert!(c.control.shutdown(StopReason::Cancelled));
        c.handle(success(task, -0.2));

        assert_eq!(c.issued(), 1);
        assert_eq!(c.summary.observations.len(), 1, "late results are still registered");
        assert_eq!(c.control.candidates().pop(), Message::Stop);
    }

    #[test]
    fn cancellation_drops_queued_candidates() {
        let (model, _) = Scripted::new(&[0.1, 0.2, 0.3]);
        let mut c = coordinator(model, &config(3, 10));
        c.seed();
        c.control.shutdown(StopReason::Cancelled);
        assert_eq!(c.control.abandoned(), 3);
        for _ in 0..3 {
            assert_eq!(c.control.candidates().pop(), Message::Stop);
        }
    }

    #[test]
    fn issued_candidates_are_unique() {
        let space = SearchSpace::builder().param("x", 0.0, 0.01).build().unwrap();
        let cfg = SchedulerConfig {
            precision: 3,
            ..config(2, 50)
        };
        let mut c = coordinator(RandomSearch::with_seed(space, 9), &cfg);
        c.seed();

        let mut seen = FingerprintStore::new();
        loop {
            let tasks = drain_tasks(&c);
            if tasks.is_empty() {
                break;
            }
            for task in tasks {
                assert!(seen.insert(task.candidate.fingerprint()), "duplicate issued");
                c.handle(success(task, 0.0));
            }
        }
        // Only 11 distinct points exist at 3 decimals in [0, 0.01].
        assert!(c.issued() <= 11);
        assert!(c.control.signal().is_raised());
    }

    #[test]
    fn run_exits_after_every_worker_stopped() {
        let (model, registered) = Scripted::new(&[0.1, 0.2]);
        let cfg = config(2, 2);
        let mut c = coordinator(model, &cfg);
        c.seed();
        let results = c.results.clone();
        for task in drain_tasks(&c) {
            results.push(success(task, -1.0)).unwrap();
        }
        results.push_stop();
        results.push_stop();

        let summary = c.run();
        assert_eq!(summary.evaluated, 2);
        assert_eq!(summary.observations.len(), 2);
        assert!(!summary.timed_out);
        assert_eq!(registered.lock().len(), 2);
    }

    #[test]
    fn run_gives_up_after_drain_timeout() {
        let (model, _) = Scripted::new(&[0.1]);
        let cfg = SchedulerConfig {
            drain_timeout: Some(Duration::from_millis(30)),
            ..config(1, 1)
        };
        let mut c = coordinator(model, &cfg);
        c.seed();
        assert!(c.control.signal().is_raised());

        // The single worker never reports back.
        let summary = c.run();
        assert!(summary.timed_out);
        assert_eq!(summary.evaluated, 0);
    }

    #[test]
    fn unbounded_drain_timeout_waits_for_every_worker() {
        let (model, _) = Scripted::new(&[0.1]);
        let cfg = SchedulerConfig {
            drain_timeout: Some(Duration::MAX),
            ..config(1, 1)
        };
        let mut c = coordinator(model, &cfg);
        c.seed();
        assert!(c.control.signal().is_raised());

        for task in drain_tasks(&c) {
            c.results.push(success(task, -0.5)).unwrap();
        }
        let results = c.results.clone();
        let worker = thread::spawn(move || {
            thread::sleep(Duration::from_millis(30));
            results.push_stop();
        });

        let summary = c.run();
        worker.join().unwrap();
        assert!(!summary.timed_out);
        assert_eq!(summary.evaluated, 1);
    }
}
