//! Decision model trait and the baseline implementation.
//!
//! A [`DecisionModel`] is the stateful sequential optimizer the scheduler
//! drives: it proposes candidates and learns from registered
//! observations. The coordinator thread owns the model exclusively, so
//! implementations need `Send` but never `Sync`, and are never called
//! concurrently.

pub mod random;

pub use random::RandomSearch;

use crate::candidate::Candidate;

/// A sequential optimizer that maximizes fitness.
///
/// Surrogate fitting and acquisition belong to implementations; the
/// scheduler only ever calls [`suggest`](DecisionModel::suggest) and
/// [`register`](DecisionModel::register), strictly one at a time.
pub trait DecisionModel: Send {
    /// Propose the next candidate to evaluate.
    ///
    /// The scheduler rounds the suggestion and discards it if the rounded
    /// point was already issued, so a model may return the same point
    /// repeatedly; it is asked again up to the configured retry bound.
    fn suggest(&mut self) -> Candidate;

    /// Record a completed observation. Higher `fitness` is better.
    ///
    /// Failed evaluations are never registered.
    fn register(&mut self, candidate: &Candidate, fitness: f64);
}

impl<M: DecisionModel + ?Sized> DecisionModel for Box<M> {
    fn suggest(&mut self) -> Candidate {
        (**self).suggest()
    }

    fn register(&mut self, candidate: &Candidate, fitness: f64) {
        (**self).register(candidate, fitness);
    }
}
