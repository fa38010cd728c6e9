//! Persisted run logs.
//!
//! The [`RunLog`] trait receives one [`Observation`] for every successful
//! registration with the decision model: never for failed evaluations,
//! never for discarded duplicates. The coordinator appends in
//! registration order.
//!
//! # Available backends
//!
//! | Backend | Description | Feature flag |
//! |---------|-------------|-------------|
//! | [`MemoryLog`] | In-memory `Vec` behind a read-write lock (the default) | — |
//! | `JournalLog` | Append-only JSONL file with `fs2` file locking | `journal` |
//!
//! A log can be shared with the caller to watch progress while the run is
//! going: wrap it in an `Arc`, hand one clone to the builder and keep the
//! other.
//!
//! ```
//! use std::sync::Arc;
//!
//! use calibrate::log::{MemoryLog, RunLog};
//!
//! let log = Arc::new(MemoryLog::new());
//! let for_scheduler: Arc<MemoryLog> = Arc::clone(&log);
//! # let _ = for_scheduler;
//! assert!(log.is_empty());
//! ```

#[cfg(feature = "journal")]
mod journal;
mod memory;

use std::sync::Arc;

#[cfg(feature = "journal")]
pub use journal::{JournalLog, load_observations};
pub use memory::MemoryLog;

use crate::candidate::Candidate;

/// A registered `(candidate, fitness)` pair.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Observation {
    /// Issue number of the candidate within the run.
    pub id: u64,
    /// Worker that evaluated it.
    pub worker: usize,
    /// The rounded candidate as it was issued.
    #[cfg_attr(feature = "serde", serde(rename = "params"))]
    pub candidate: Candidate,
    /// Registered fitness (higher is better).
    #[cfg_attr(feature = "serde", serde(rename = "target"))]
    pub fitness: f64,
}

/// Append-only record of registered observations.
///
/// Implementations must be `Send + Sync`; the coordinator thread appends
/// while other threads may read.
pub trait RunLog: Send + Sync {
    /// Record an observation.
    ///
    /// Implementations must keep the observation readable through
    /// [`observations`](RunLog::observations) even when persisting it
    /// fails.
    ///
    /// # Errors
    ///
    /// Returns an error if the observation could not be persisted.
    fn append(&self, observation: Observation) -> crate::Result<()>;

    /// All observations recorded so far, in append order.
    fn observations(&self) -> Vec<Observation>;

    /// Number of recorded observations.
    fn len(&self) -> usize;

    /// Returns `true` if nothing was recorded yet.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<L: RunLog + ?Sized> RunLog for Arc<L> {
    fn append(&self, observation: Observation) -> crate::Result<()> {
        (**self).append(observation)
    }

    fn observations(&self) -> Vec<Observation> {
        (**self).observations()
    }

    fn len(&self) -> usize {
        (**self).len()
    }
}

/// The observation with the highest fitness, if any.
#[must_use]
pub fn best(observations: &[Observation]) -> Option<&Observation> {
    observations
        .iter()
        .max_by(|a, b| a.fitness.total_cmp(&b.fitness))
}
