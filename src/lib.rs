#![forbid(unsafe_code)]
#![deny(clippy::all)]
#![deny(unreachable_pub)]
#![deny(clippy::correctness)]
#![deny(clippy::suspicious)]
#![deny(clippy::style)]
#![deny(clippy::complexity)]
#![deny(clippy::perf)]
#![deny(clippy::pedantic)]
#![deny(clippy::std_instead_of_core)]

//! Distributed asynchronous calibration of expensive simulators.
//!
//! A run proposes parameter vectors with a [`DecisionModel`](model::DecisionModel),
//! evaluates them on a pool of worker threads, and feeds every result back
//! into the model as soon as it arrives, so that no worker waits for the
//! slowest evaluation of a batch. Each result triggers at most one new
//! candidate until a fixed evaluation budget has been issued. Candidates are
//! rounded to a fixed precision and never issued twice.
//!
//! # Getting Started
//!
//! ```
//! use calibrate::model::RandomSearch;
//! use calibrate::prelude::*;
//!
//! let space = SearchSpace::builder()
//!     .param("car_tau", 0.1, 2.0)
//!     .param("car_speed_factor", 0.8, 1.3)
//!     .build()
//!     .unwrap();
//!
//! let scheduler = Scheduler::builder(|c: &Candidate, _: &EvalContext| {
//!     let tau = c.get("car_tau").unwrap_or_default();
//!     let factor = c.get("car_speed_factor").unwrap_or_default();
//!     Ok::<_, String>(vec![(tau - 1.0).abs(), (factor - 1.1).abs()])
//! })
//! .model(RandomSearch::with_seed(space, 42))
//! .workers(4)
//! .budget(40)
//! .build()
//! .unwrap();
//!
//! let report = scheduler.run().unwrap();
//! assert_eq!(report.issued, 40);
//! let best = report.best().unwrap();
//! println!("best fitness {:.4} at {:?}", best.fitness, best.candidate);
//! ```
//!
//! # Core Concepts
//!
//! | Type | Role |
//! |------|------|
//! | [`Scheduler`] | Drive a run: seed the queue, start workers, drain on shutdown. |
//! | [`Objective`] | The expensive evaluation, returning per-statistic divergences. |
//! | [`DecisionModel`](model::DecisionModel) | Propose the next candidate and learn from registered observations. |
//! | [`SearchSpace`] | Named parameters with inclusive bounds. |
//! | [`RunLog`](log::RunLog) | Append-only record of registered observations. |
//! | [`RunHandle`] | Cancel or observe a run from another thread. |
//!
//! # Feature Flags
//!
//! | Flag | What it enables | Default |
//! |------|----------------|---------|
//! | `journal` | [`JournalLog`](log::JournalLog): JSONL persistence with file locking (enables `serde`) | on |
//! | `tracing` | Structured log events via [`tracing`](https://docs.rs/tracing) at key run points | on |
//! | `serde` | `Serialize`/`Deserialize` on public types | off |
//! | `async` | [`Scheduler::run_async`] and [`Scheduler::run_until_ctrl_c`] via tokio | off |

/// Emit a `tracing::info!` event when the `tracing` feature is enabled.
/// No-op otherwise.
#[cfg(feature = "tracing")]
macro_rules! trace_info {
    ($($arg:tt)*) => { tracing::info!($($arg)*) };
}

#[cfg(not(feature = "tracing"))]
macro_rules! trace_info {
    ($($arg:tt)*) => {};
}

/// Emit a `tracing::debug!` event when the `tracing` feature is enabled.
/// No-op otherwise.
#[cfg(feature = "tracing")]
macro_rules! trace_debug {
    ($($arg:tt)*) => { tracing::debug!($($arg)*) };
}

#[cfg(not(feature = "tracing"))]
macro_rules! trace_debug {
    ($($arg:tt)*) => {};
}

/// Emit a `tracing::warn!` event when the `tracing` feature is enabled.
/// No-op otherwise.
#[cfg(feature = "tracing")]
macro_rules! trace_warn {
    ($($arg:tt)*) => { tracing::warn!($($arg)*) };
}

#[cfg(not(feature = "tracing"))]
macro_rules! trace_warn {
    ($($arg:tt)*) => {};
}

mod candidate;
mod config;
mod coordinator;
mod error;
pub mod log;
pub mod model;
mod objective;
mod queue;
mod rng_util;
mod scheduler;
mod signal;
mod space;
mod worker;
mod workspace;

pub use candidate::{Candidate, Fingerprint, FingerprintStore, MAX_PRECISION, round_to};
pub use config::{DuplicatePolicy, MAX_POLL_INTERVAL, SchedulerConfig};
pub use error::{Error, Result};
pub use log::Observation;
pub use objective::{EvalContext, Objective, Score};
pub use scheduler::{RunHandle, RunReport, Scheduler, SchedulerBuilder};
pub use signal::StopReason;
pub use space::{Bounds, SearchSpace, SearchSpaceBuilder};
pub use workspace::WorkspaceConfig;

/// Convenient wildcard import for the most common types.
///
/// ```
/// use calibrate::prelude::*;
/// ```
pub mod prelude {
    #[cfg(feature = "journal")]
    pub use crate::log::JournalLog;
    pub use crate::log::{MemoryLog, Observation, RunLog};
    pub use crate::model::{DecisionModel, RandomSearch};
    pub use crate::{
        Candidate, DuplicatePolicy, Error, EvalContext, Objective, Result, RunHandle, RunReport,
        Scheduler, SchedulerConfig, Score, SearchSpace, StopReason, WorkspaceConfig,
    };
}
