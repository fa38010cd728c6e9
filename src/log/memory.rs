use parking_lot::RwLock;

use super::{Observation, RunLog};

/// In-memory run log (the default).
#[derive(Debug, Default)]
pub struct MemoryLog {
    observations: RwLock<Vec<Observation>>,
}

impl MemoryLog {
    /// Creates a new, empty log.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a log pre-populated with `observations`.
    #[must_use]
    pub fn with_observations(observations: Vec<Observation>) -> Self {
        Self {
            observations: RwLock::new(observations),
        }
    }
}

impl RunLog for MemoryLog {
    fn append(&self, observation: Observation) -> crate::Result<()> {
        self.observations.write().push(observation);
        Ok(())
    }

    fn observations(&self) -> Vec<Observation> {
        self.observations.read().clone()
    }

    fn len(&self) -> usize {
        self.observations.read().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::candidate::Candidate;
    use crate::log::best;

    fn obs(id: u64, fitness: f64) -> Observation {
        Observation {
            id,
            worker: 0,
            candidate: Candidate::from_iter([("x", fitness)]),
            fitness,
        }
    }

    #[test]
    fn keeps_append_order() {
        let log = MemoryLog::new();
        for i in 0..4 {
            log.append(obs(i, -(i as f64))).unwrap();
        }
        let ids: Vec<u64> = log.observations().iter().map(|o| o.id).collect();
        assert_eq!(ids, vec![0, 1, 2, 3]);
        assert_eq!(log.len(), 4);
    }

    #[test]
    fn best_is_highest_fitness() {
        let all = vec![obs(0, -0.7), obs(1, -0.1), obs(2, -0.4)];
        assert_eq!(best(&all).map(|o| o.id), Some(1));
        assert!(best(&[]).is_none());
    }
}
