//! Evaluation workers.
//!
//! A worker repeatedly takes a candidate from the candidate queue,
//! evaluates it, and pushes exactly one [`EvaluationResult`] back. Any
//! failure of the objective (an error, a panic, an unusable score, a
//! workspace that cannot be provisioned) becomes [`Outcome::Failed`]; the
//! worker itself only stops when it dequeues a poison pill.

use core::any::Any;
use core::panic::AssertUnwindSafe;
use std::panic;
use std::sync::Arc;

use crate::candidate::Candidate;
use crate::objective::{EvalContext, Objective};
use crate::queue::{Message, WorkQueue};
use crate::workspace::{Workspace, WorkspaceConfig};

/// A candidate placed on the candidate queue.
#[derive(Clone, Debug, PartialEq)]
pub(crate) struct Task {
    pub(crate) ticket: u64,
    pub(crate) candidate: Candidate,
}

/// What an evaluation produced.
#[derive(Clone, Debug, PartialEq)]
pub(crate) enum Outcome {
    /// Fitness to register (higher is better).
    Fitness(f64),
    /// The evaluation failed; the reason is kept for logging.
    Failed(String),
}

/// One result per dequeued candidate.
#[derive(Clone, Debug, PartialEq)]
pub(crate) struct EvaluationResult {
    pub(crate) ticket: u64,
    pub(crate) worker: usize,
    pub(crate) candidate: Candidate,
    pub(crate) outcome: Outcome,
}

/// Pushes the worker-exit marker however the worker loop ends.
struct ExitMarker<'a>(&'a WorkQueue<EvaluationResult>);

impl Drop for ExitMarker<'_> {
    fn drop(&mut self) {
        self.0.push_stop();
    }
}

pub(crate) struct Worker<O> {
    pub(crate) index: usize,
    pub(crate) objective: Arc<O>,
    pub(crate) candidates: WorkQueue<Task>,
    pub(crate) results: WorkQueue<EvaluationResult>,
    pub(crate) workspace: Option<WorkspaceConfig>,
    pub(crate) run_tag: u32,
}

impl<O: Objective> Worker<O> {
    /// Serve candidates until a poison pill arrives. Returns the number of
    /// candidates evaluated.
    pub(crate) fn run(self) -> usize {
        let _exit = ExitMarker(&self.results);
        let mut evaluated = 0;

        while let Message::Work(task) = self.candidates.pop() {
            let outcome = self.evaluate(&task);
            evaluated += 1;
            let result = EvaluationResult {
                ticket: task.ticket,
                worker: self.index,
                candidate: task.candidate,
                outcome,
            };
            if self.results.push(result).is_err() {
                break;
            }
        }

        trace_debug!(worker = self.index, evaluated, "worker stopped");
        evaluated
    }

    /// Evaluate with retries; never panics and never returns an error.
    pub(crate) fn evaluate(&self, task: &Task) -> Outcome {
        let mut reason = String::new();
        for attempt in 0..=self.objective.max_retries() {
            match self.evaluate_once(task, attempt) {
                Ok(fitness) => return Outcome::Fitness(fitness),
                Err(e) => {
                    trace_warn!(
                        worker = self.index,
                        ticket = task.ticket,
                        attempt,
                        error = %e,
                        "evaluation failed"
                    );
                    reason = e;
                }
            }
        }
        Outcome::Failed(reason)
    }

    fn evaluate_once(&self, task: &Task, attempt: usize) -> Result<f64, String> {
        let workspace = match &self.workspace {
            Some(config) => {
                let name = format!(
                    "{:08x}-w{}-t{}-a{attempt}",
                    self.run_tag, self.index, task.ticket
                );
                let ws = Workspace::create(config, &name)
                    .map_err(|e| format!("workspace setup failed: {e}"))?;
                Some(ws)
            }
            None => None,
        };

        let ctx = EvalContext {
            worker: self.index,
            ticket: task.ticket,
            attempt,
            workspace: workspace.as_ref().map(|ws| ws.path().to_path_buf()),
        };

        let objective = &*self.objective;
        let attempted =
            panic::catch_unwind(AssertUnwindSafe(|| objective.evaluate(&task.candidate, &ctx)));
        drop(workspace);

        match attempted {
            Ok(Ok(score)) => score
                .fitness()
                .ok_or_else(|| "objective returned an empty or non-finite score".to_owned()),
            Ok(Err(e)) => Err(e.to_string()),
            Err(payload) => Err(format!("objective panicked: {}", panic_message(&*payload))),
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    payload
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| payload.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("unknown panic payload")
}
