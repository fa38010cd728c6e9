//! Uniform random search.

use crate::candidate::Candidate;
use crate::model::DecisionModel;
use crate::rng_util;
use crate::space::SearchSpace;

/// A decision model that samples uniformly inside the search space.
///
/// It ignores registered observations and serves as a baseline, or as
/// the warm-up phase of a more sophisticated model.
///
/// # Examples
///
/// ```
/// use calibrate::model::{DecisionModel, RandomSearch};
/// use calibrate::SearchSpace;
///
/// let space = SearchSpace::builder().param("x", 0.0, 1.0).build().unwrap();
/// let mut model = RandomSearch::with_seed(space.clone(), 42);
/// let c = model.suggest();
/// assert!(space.contains(&c));
/// ```
pub struct RandomSearch {
    space: SearchSpace,
    rng: fastrand::Rng,
    registered: usize,
}

impl RandomSearch {
    /// Creates a random search with a default random seed.
    #[must_use]
    pub fn new(space: SearchSpace) -> Self {
        Self {
            space,
            rng: fastrand::Rng::new(),
            registered: 0,
        }
    }

    /// Creates a random search with a fixed seed for reproducibility.
    ///
    /// Using the same seed produces the same sequence of suggestions.
    #[must_use]
    pub fn with_seed(space: SearchSpace, seed: u64) -> Self {
        Self {
            space,
            rng: fastrand::Rng::with_seed(seed),
            registered: 0,
        }
    }

    /// The space suggestions are drawn from.
    #[must_use]
    pub fn space(&self) -> &SearchSpace {
        &self.space
    }

    /// Number of observations registered so far.
    #[must_use]
    pub fn registered(&self) -> usize {
        self.registered
    }
}

impl DecisionModel for RandomSearch {
    fn suggest(&mut self) -> Candidate {
        let rng = &mut self.rng;
        self.space
            .iter()
            .map(|(name, b)| (name, rng_util::f64_range(rng, b.low, b.high)))
            .collect()
    }

    fn register(&mut self, _candidate: &Candidate, _fitness: f64) {
        self.registered += 1;
    }
}
