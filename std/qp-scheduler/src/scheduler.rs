///
/// The worker-pool runtime: spawns a fixed pool of OS threads that
/// repeatedly scan the Ordered Batch for the earliest ready unit,
/// execute it, and mark it done — coordinated through a single mutex, a
/// condition variable, and a single-holder "baton" flag.
///
/// The baton is a coarse, fair-ish mutex alternative: it lets one
/// worker scan the batch while the others sleep, and is released
/// *before* the unit executes so the next scan overlaps with the
/// current execution instead of waiting behind it.
///

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::thread::{self, JoinHandle};

use crate::batch::OrderedBatch;
use crate::error::SchedulerError;

struct State {
    batch: OrderedBatch,
    running: bool,
}

struct Shared {
    state: Mutex<State>,
    condvar: Condvar,
    baton: AtomicBool,
}

/// Owns an [`OrderedBatch`] and a fixed pool of worker threads.
///
/// Lifecycle: constructed idle → [`Scheduler::run`] sorts the batch and
/// launches workers → [`Scheduler::wait`] blocks until they all exit →
/// dropping the scheduler forces a shutdown if it is still running.
pub struct Scheduler {
    shared: Arc<Shared>,
    workers: Vec<JoinHandle<()>>,
    thread_count: usize,
}

impl Scheduler {
    /// `thread_count` is clamped to a minimum of 1. No threads are
    /// started until [`Scheduler::run`].
    pub fn new(batch: OrderedBatch, thread_count: usize) -> Self {
        let thread_count = thread_count.max(1);
        Self {
            shared: Arc::new(Shared {
                state: Mutex::new(State {
                    batch,
                    running: false,
                }),
                condvar: Condvar::new(),
                baton: AtomicBool::new(false),
            }),
            workers: Vec::new(),
            thread_count,
        }
    }

    /// Sorts the batch and launches `thread_count` worker threads.
    ///
    /// Idempotent while already running (a silent no-op). If the sort
    /// fails because a parent id is missing, the batch is left
    /// unchanged, no threads are spawned, and the error is returned to
    /// the caller to retry after fixing up the batch.
    pub fn run(&mut self) -> Result<(), SchedulerError> {
        let empty;
        {
            let mut state = self.shared.state.lock().unwrap();
            if state.running {
                return Ok(());
            }
            state.batch.sort()?;
            state.batch.reset_done();
            empty = state.batch.is_empty();
            state.running = !empty;
        }

        if empty {
            tracing::debug!("scheduler run() on an empty batch: nothing to dispatch");
            return Ok(());
        }

        self.shared.baton.store(false, Ordering::SeqCst);
        tracing::debug!(thread_count = self.thread_count, "scheduler starting workers");
        for index in 0..self.thread_count {
            let shared = Arc::clone(&self.shared);
            self.workers
                .push(thread::spawn(move || worker_loop(shared, index)));
        }
        Ok(())
    }

    /// Joins all worker threads. Safe to call from any thread other than
    /// a worker. Idempotent once the workers have already been joined.
    pub fn wait(&mut self) {
        for handle in self.workers.drain(..) {
            let _ = handle.join();
        }
    }
}

impl Drop for Scheduler {
    fn drop(&mut self) {
        {
            let mut state = self.shared.state.lock().unwrap();
            state.running = false;
        }
        self.shared.condvar.notify_all();
        self.wait();
    }
}

fn worker_loop(shared: Arc<Shared>, worker_index: usize) {
    let done = {
        let state = shared.state.lock().unwrap();
        state.batch.done_handle()
    };

    loop {
        let popped = {
            let mut state = shared.state.lock().unwrap();
            loop {
                if !state.running {
                    return;
                }
                if shared
                    .baton
                    .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
                    .is_ok()
                {
                    break;
                }
                state = shared.condvar.wait(state).unwrap();
            }

            let (unit, emptied) = state.batch.pop_next();
            if emptied {
                state.running = false;
                shared.condvar.notify_all();
            }
            unit
        };

        match popped {
            Some(mut unit) => {
                // Release the baton before executing so a peer can
                // start scanning for the next ready unit while this
                // payload runs.
                shared.baton.store(false, Ordering::SeqCst);
                shared.condvar.notify_one();

                let id = unit.id();
                tracing::trace!(worker = worker_index, unit = id, "executing unit");
                unit.execute();
                mark_done(&done, id);
                tracing::trace!(worker = worker_index, unit = id, "unit done");

                // A peer may have been sleeping because its parents
                // only just became ready.
                shared.baton.store(false, Ordering::SeqCst);
                shared.condvar.notify_one();
            }
            None => {
                // Nothing ready right now. Deliberately does not
                // release the baton: some other worker must currently
                // be executing the in-flight parent this scan is
                // waiting on, and that worker's own completion (above)
                // is what releases the baton and wakes a sleeper. If no
                // other worker is in flight, the batch has a cycle and
                // this is the documented deadlock case — the core does
                // not detect cycles.
            }
        }
    }
}

fn mark_done(done: &HashMap<u64, AtomicBool>, id: u64) {
    if let Some(flag) = done.get(&id) {
        flag.store(true, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::unit::Unit;
    use std::sync::atomic::AtomicU64;
    use std::time::Duration;

    #[test]
    fn single_unit_executes_exactly_once_regardless_of_thread_count() {
        for thread_count in [0usize, 1, 4] {
            let mut batch = OrderedBatch::new();
            let mut unit = Unit::new(1);
            let calls = Arc::new(AtomicU64::new(0));
            let calls_clone = Arc::clone(&calls);
            let out = unit.bind(move || {
                calls_clone.fetch_add(1, Ordering::SeqCst);
                123
            });
            batch.push(unit);

            let mut scheduler = Scheduler::new(batch, thread_count);
            scheduler.run().unwrap();
            scheduler.wait();

            assert_eq!(out.join(), 123);
            assert_eq!(calls.load(Ordering::SeqCst), 1);
        }
    }

    #[test]
    fn empty_batch_run_and_wait_succeed_immediately() {
        let batch = OrderedBatch::new();
        let mut scheduler = Scheduler::new(batch, 4);
        scheduler.run().unwrap();
        scheduler.wait();
    }

    #[test]
    fn missing_parent_fails_run_and_spawns_no_workers() {
        let mut batch = OrderedBatch::new();
        batch.push(Unit::with_parent(1, 9999));
        let mut scheduler = Scheduler::new(batch, 2);
        let err = scheduler.run().unwrap_err();
        assert!(matches!(err, SchedulerError::DependencyMissing { .. }));
        scheduler.wait();
    }

    #[test]
    fn run_twice_is_a_no_op_while_running() {
        let mut batch = OrderedBatch::new();
        let mut unit = Unit::new(1);
        let out = unit.bind(|| {
            thread::sleep(Duration::from_millis(20));
            1
        });
        batch.push(unit);

        let mut scheduler = Scheduler::new(batch, 1);
        scheduler.run().unwrap();
        scheduler.run().unwrap();
        scheduler.wait();
        assert_eq!(out.join(), 1);
    }

    #[test]
    fn diamond_executes_all_units_with_parents_before_children() {
        let mut batch = OrderedBatch::new();
        let mut a = Unit::new(1);
        let a_id = a.id();
        let order = Arc::new(Mutex::new(Vec::new()));

        let order_a = Arc::clone(&order);
        let out_a = a.bind(move || {
            order_a.lock().unwrap().push(a_id);
            a_id * a_id
        });
        batch.push(a);

        let mut c = Unit::with_parent(2, a_id);
        let c_id = c.id();
        let order_c = Arc::clone(&order);
        let out_c = c.bind(move || {
            order_c.lock().unwrap().push(c_id);
            c_id * c_id
        });
        batch.push(c);

        let mut b = Unit::with_parent(5, a_id);
        let b_id = b.id();
        let order_b = Arc::clone(&order);
        let out_b = b.bind(move || {
            order_b.lock().unwrap().push(b_id);
            b_id * b_id
        });
        batch.push(b);

        let mut d = Unit::with_parents(10, vec![a_id, c_id]);
        let d_id = d.id();
        let order_d = Arc::clone(&order);
        let out_d = d.bind(move || {
            order_d.lock().unwrap().push(d_id);
            d_id * d_id
        });
        batch.push(d);

        let mut scheduler = Scheduler::new(batch, 2);
        scheduler.run().unwrap();
        scheduler.wait();

        let mut results = vec![out_a.join(), out_b.join(), out_c.join(), out_d.join()];
        results.sort_unstable();
        let mut expected = vec![a_id * a_id, b_id * b_id, c_id * c_id, d_id * d_id];
        expected.sort_unstable();
        assert_eq!(results, expected);

        let executed = order.lock().unwrap();
        let pos = |id: u64| executed.iter().position(|&x| x == id).unwrap();
        assert!(pos(a_id) < pos(c_id));
        assert!(pos(a_id) < pos(b_id));
        assert!(pos(c_id) < pos(d_id));
        assert!(pos(a_id) < pos(d_id));
    }

    #[test]
    fn drop_mid_run_joins_cleanly_without_hanging() {
        let mut batch = OrderedBatch::new();
        for _ in 0..8 {
            let mut unit = Unit::new(1);
            let _ = unit.bind(|| {
                thread::sleep(Duration::from_millis(50));
            });
            batch.push(unit);
        }

        let mut scheduler = Scheduler::new(batch, 4);
        scheduler.run().unwrap();
        thread::sleep(Duration::from_millis(5));
        drop(scheduler);
    }
}
