//!
//! qp-scheduler - Dependency-aware task scheduler over a fixed worker pool
//!
//! Callers assemble a batch of weighted, identified, parent-linked
//! [`Unit`]s, hand the batch to a [`Scheduler`] with a worker count, and
//! the scheduler executes every unit exactly once, honoring the
//! parent-before-child partial order, while keeping as many workers
//! busy as possible.
//!
//! ## Ordering
//!
//! [`OrderedBatch::sort`] permutes the batch into a sequence in which
//! every unit's ancestors appear before it, breaking ties among units at
//! the same dependency depth by weight (heavier first) — a heuristic
//! aimed at dispatching the long pole of the batch as early as possible.
//!
//! ## Coordination
//!
//! [`Scheduler`] coordinates its worker threads through a single mutex,
//! a condition variable, and a single-holder "baton" flag: one worker
//! scans the batch for the next ready unit at a time, releases the
//! baton before executing so the next scan can overlap with the current
//! execution, and notifies peers as units complete.
//!
//! ## Non-goals
//!
//! No persistence, no cross-process distribution, no per-unit
//! cancellation, no priority preemption, no dynamic insertion after
//! [`Scheduler::run`], no cycle detection — a cyclic batch is caller
//! error that may deadlock the pool — and no work-stealing or
//! per-worker queues.
//!

mod batch;
mod error;
mod scheduler;
mod sort;
mod unit;

pub use batch::OrderedBatch;
pub use error::SchedulerError;
pub use scheduler::Scheduler;
pub use unit::{Unit, UnitOutput};
