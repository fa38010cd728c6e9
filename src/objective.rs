//! The [`Objective`] trait defines the expensive evaluation being scheduled.
//!
//! An objective turns one [`Candidate`] into a [`Score`]: typically it
//! writes the candidate into a simulator configuration, runs the
//! simulation, and compares the recorded motion statistics against
//! reference distributions. For simple cases a closure works:
//!
//! ```
//! use calibrate::{Candidate, EvalContext, Score};
//!
//! let objective = |c: &Candidate, _ctx: &EvalContext| {
//!     let x = c.get("x").ok_or("missing x")?;
//!     Ok::<_, &str>(Score::from(vec![x * x, (x - 1.0).abs()]))
//! };
//! # let _ = objective;
//! ```
//!
//! Implement the trait on a struct to enable retries via
//! [`max_retries`](Objective::max_retries).

use std::path::{Path, PathBuf};

use crate::candidate::Candidate;

/// Raw evaluation output.
///
/// A vector holds per-statistic divergences (lower is better). The
/// scheduler converts either form to a fitness of `-mean(values)` so that
/// higher fitness is better, which is the convention decision models
/// maximize.
#[derive(Clone, Debug, PartialEq)]
pub enum Score {
    /// A single divergence value.
    Scalar(f64),
    /// One divergence per compared statistic.
    Vector(Vec<f64>),
}

impl Score {
    /// Returns `-mean(divergences)`, or `None` if the score is empty or
    /// not finite.
    #[must_use]
    pub fn fitness(&self) -> Option<f64> {
        let mean = match self {
            Self::Scalar(v) => *v,
            Self::Vector(values) => {
                if values.is_empty() {
                    return None;
                }
                #[allow(clippy::cast_precision_loss)]
                let n = values.len() as f64;
                values.iter().sum::<f64>() / n
            }
        };
        mean.is_finite().then_some(-mean)
    }
}

impl From<f64> for Score {
    fn from(value: f64) -> Self {
        Self::Scalar(value)
    }
}

impl From<Vec<f64>> for Score {
    fn from(values: Vec<f64>) -> Self {
        Self::Vector(values)
    }
}

/// Information about the evaluation being performed.
#[derive(Clone, Debug)]
pub struct EvalContext {
    pub(crate) worker: usize,
    pub(crate) ticket: u64,
    pub(crate) attempt: usize,
    pub(crate) workspace: Option<PathBuf>,
}

impl EvalContext {
    /// Index of the worker running the evaluation.
    #[must_use]
    pub fn worker(&self) -> usize {
        self.worker
    }

    /// Issue number of the candidate (0-based, unique within the run).
    #[must_use]
    pub fn ticket(&self) -> u64 {
        self.ticket
    }

    /// Zero for the first attempt, incremented on each retry.
    #[must_use]
    pub fn attempt(&self) -> usize {
        self.attempt
    }

    /// Scratch directory provisioned for this evaluation, if the run was
    /// configured with a workspace root. It is removed once the
    /// evaluation returns.
    #[must_use]
    pub fn workspace(&self) -> Option<&Path> {
        self.workspace.as_deref()
    }
}

/// An expensive black-box evaluation.
///
/// Implementations are called concurrently from every worker thread and
/// must be `Send + Sync`. Errors and panics are isolated by the worker and
/// turned into failure markers; they never stop the run.
pub trait Objective: Send + Sync {
    /// The error type returned by [`evaluate`](Objective::evaluate).
    type Error: ToString + 'static;

    /// Evaluate one candidate.
    ///
    /// # Errors
    ///
    /// Any error whose type implements `ToString`. The candidate is then
    /// retried up to [`max_retries`](Objective::max_retries) times before
    /// being reported as failed.
    fn evaluate(&self, candidate: &Candidate, ctx: &EvalContext) -> Result<Score, Self::Error>;

    /// Maximum number of extra attempts for a failed evaluation.
    ///
    /// Default: `0` (no retries).
    fn max_retries(&self) -> usize {
        0
    }
}

impl<F, S, E> Objective for F
where
    F: Fn(&Candidate, &EvalContext) -> Result<S, E> + Send + Sync,
    S: Into<Score>,
    E: ToString + 'static,
{
    type Error = E;

    fn evaluate(&self, candidate: &Candidate, ctx: &EvalContext) -> Result<Score, E> {
        self(candidate, ctx).map(Into::into)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn vector_fitness_is_negated_mean() {
        let score = Score::from(vec![0.2, 0.4, 0.6]);
        let fitness = score.fitness().unwrap();
        assert!((fitness + 0.4).abs() < 1e-12);
    }

    #[test]
    fn scalar_fitness_is_negated() {
        assert_eq!(Score::from(1.5).fitness(), Some(-1.5));
    }

    #[test]
    fn invalid_scores_have_no_fitness() {
        assert_eq!(Score::Vector(Vec::new()).fitness(), None);
        assert_eq!(Score::from(vec![1.0, f64::NAN]).fitness(), None);
        assert_eq!(Score::from(f64::INFINITY).fitness(), None);
    }

    #[test]
    fn closures_are_objectives() {
        let objective = |c: &Candidate, _: &EvalContext| Ok::<_, String>(c.get("x").unwrap_or(0.0));
        let ctx = EvalContext {
            worker: 0,
            ticket: 0,
            attempt: 0,
            workspace: None,
        };
        let score = objective
            .evaluate(&Candidate::from_iter([("x", 2.0)]), &ctx)
            .unwrap();
        assert_eq!(score, Score::Scalar(2.0));
        assert_eq!(objective.max_retries(), 0);
    }
}
