#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Returned when a parameter's lower bound is greater than its upper bound.
    #[error("invalid bounds for '{name}': low ({low}) must be less than or equal to high ({high})")]
    InvalidBounds {
        /// The parameter name.
        name: String,
        /// The lower bound value.
        low: f64,
        /// The upper bound value.
        high: f64,
    },

    /// Returned when a search space is built without any parameter.
    #[error("search space must contain at least one parameter")]
    EmptySearchSpace,

    /// Returned when the run configuration is unusable.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// Returned when the scheduler builder is missing a required component.
    #[error("scheduler is missing its {0}")]
    MissingComponent(&'static str),

    /// Returned when a worker or coordinator thread cannot be started.
    #[error("failed to spawn thread: {0}")]
    Spawn(String),

    /// Returned when an internal invariant is violated.
    #[error("internal error: {0}")]
    Internal(&'static str),

    /// Returned when an async task fails.
    #[cfg(feature = "async")]
    #[error("async task error: {0}")]
    TaskError(String),

    /// Returned when a run log operation fails.
    #[cfg(feature = "journal")]
    #[error("storage error: {0}")]
    Storage(String),
}

pub type Result<T> = core::result::Result<T, Error>;
