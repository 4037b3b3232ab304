/// Sensor observations consumed by the trackers
pub mod detection;

/// Track slot with lifecycle bookkeeping and the arena that recycles slots
pub mod track;

/// Multi-target and single-target trackers with the assignment engine
pub mod trackers;

/// Immutable track snapshots and the atomic cell they are published through
pub mod snapshot;

/// Background worker that drives a tracker from a detection source
pub mod worker;

/// Filters and other numeric utilities
pub mod utils;

/// Synthetic detection sources for tests, benchmarks and demos
pub mod test_stuff;

/// Commonly used types
pub mod prelude;

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum Errors {
    #[error("Innovation covariance is singular - correction skipped.")]
    DegenerateInnovation,
    #[error("Track slot {0} is expected to be free but it is active.")]
    SlotNotFree(usize),
    #[error("Track slot {0} does not exist.")]
    MissingSlot(usize),
    #[error("The pool has no free track slot.")]
    NoFreeSlot,
    #[error("Solver produced an invalid assignment: {0}")]
    InvalidAssignment(String),
    #[error("Snapshot was replaced by a concurrent writer.")]
    SnapshotRace,
    #[error("Tracking worker is already running.")]
    WorkerAlreadyRunning,
    #[error("Tracking worker lost its tracker after a panic.")]
    WorkerPoisoned,
    #[error("Invalid tracker option: {0}")]
    InvalidOption(String),
}

pub(crate) const EPS: f32 = 0.00001;
