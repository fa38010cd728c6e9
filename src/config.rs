//! Run parameters.

use core::num::NonZeroUsize;
use core::time::Duration;

use crate::candidate::MAX_PRECISION;
use crate::space::SearchSpace;
use crate::workspace::WorkspaceConfig;

/// Longest accepted [`SchedulerConfig::poll_interval`].
pub const MAX_POLL_INTERVAL: Duration = Duration::from_secs(3600);

/// What the coordinator does when the decision model proposes a point
/// that was already issued.
#[derive(Clone, Debug, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum DuplicatePolicy {
    /// Ask the model again, up to the retry bound, then issue nothing for
    /// this result.
    #[default]
    Skip,
    /// After each duplicate, also try the suggestion shifted by whole
    /// precision steps along one random parameter, clamped to `space`.
    Perturb(SearchSpace),
}

/// Immutable configuration of one calibration run.
///
/// Usually assembled through [`SchedulerBuilder`](crate::SchedulerBuilder).
///
/// # Defaults
///
/// | Field | Default |
/// |-------|---------|
/// | `workers` | available parallelism |
/// | `budget` | 100 |
/// | `precision` | 4 decimal places |
/// | `max_duplicate_retries` | 32 |
/// | `duplicate_policy` | [`DuplicatePolicy::Skip`] |
/// | `poll_interval` | 1 s |
/// | `drain_timeout` | none (wait for every in-flight evaluation) |
/// | `workspace` | none |
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct SchedulerConfig {
    /// Number of parallel evaluation workers.
    pub workers: usize,
    /// Maximum number of candidates the run may issue, seeds included.
    pub budget: u64,
    /// Decimal places every candidate is rounded to before issuance.
    pub precision: u32,
    /// Extra suggestions requested after a duplicate before giving up.
    pub max_duplicate_retries: usize,
    /// Fallback applied to duplicate suggestions.
    pub duplicate_policy: DuplicatePolicy,
    /// Interval of the driver's progress check and of every bounded wait.
    pub poll_interval: Duration,
    /// How long to keep waiting for in-flight evaluations after shutdown.
    pub drain_timeout: Option<Duration>,
    /// Per-evaluation scratch directories.
    pub workspace: Option<WorkspaceConfig>,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            workers: std::thread::available_parallelism().map_or(1, NonZeroUsize::get),
            budget: 100,
            precision: 4,
            max_duplicate_retries: 32,
            duplicate_policy: DuplicatePolicy::Skip,
            poll_interval: Duration::from_secs(1),
            drain_timeout: None,
            workspace: None,
        }
    }
}

impl SchedulerConfig {
    /// Check that the configuration can drive a run.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidConfig`](crate::Error::InvalidConfig) if
    /// `workers` or `poll_interval` is zero, `poll_interval` exceeds
    /// [`MAX_POLL_INTERVAL`], or `precision` exceeds the supported maximum.
    pub fn validate(&self) -> crate::Result<()> {
        if self.workers == 0 {
            return Err(crate::Error::InvalidConfig(
                "at least one worker is required".into(),
            ));
        }
        if self.precision > MAX_PRECISION {
            return Err(crate::Error::InvalidConfig(format!(
                "precision {} exceeds the maximum of {MAX_PRECISION} decimal places",
                self.precision
            )));
        }
        if self.poll_interval.is_zero() {
            return Err(crate::Error::InvalidConfig(
                "poll interval must be positive".into(),
            ));
        }
        if self.poll_interval > MAX_POLL_INTERVAL {
            return Err(crate::Error::InvalidConfig(format!(
                "poll interval {:?} exceeds the maximum of {MAX_POLL_INTERVAL:?}",
                self.poll_interval
            )));
        }
        Ok(())
    }
}
