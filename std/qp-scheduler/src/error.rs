///
/// Error types raised by the scheduler core.
///

use thiserror::Error;

/// Errors surfaced from [`crate::OrderedBatch::sort`] and
/// [`crate::Scheduler::run`].
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SchedulerError {
    /// A unit's `parents` list names an id with no corresponding unit in
    /// the batch. The batch is left unchanged; the caller may add the
    /// missing unit(s) and retry.
    #[error("missing parent id(s) referenced by the batch: {missing:?}")]
    DependencyMissing { missing: Vec<u64> },
}
