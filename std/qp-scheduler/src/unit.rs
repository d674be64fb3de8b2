///
/// A single schedulable computation: identity, weight, parent links, and
/// an opaque payload invoked at most once by the [`crate::Scheduler`].
///

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Condvar, Mutex};

static NEXT_ID: AtomicU64 = AtomicU64::new(1);

fn next_id() -> u64 {
    NEXT_ID.fetch_add(1, Ordering::SeqCst)
}

type Payload = Box<dyn FnOnce() + Send>;

/// A unit of work: a numeric weight used only as an ordering hint, a
/// process-unique id, zero or more parent ids it depends on, and at most
/// one bound payload.
///
/// `Unit` is not [`Clone`]; it is moved into an [`crate::OrderedBatch`]
/// and thereafter owned by it.
pub struct Unit {
    id: u64,
    weight: u64,
    parents: Vec<u64>,
    payload: Option<Payload>,
}

impl Unit {
    /// Construct a unit with no parents.
    pub fn new(weight: u64) -> Self {
        Self {
            id: next_id(),
            weight,
            parents: Vec::new(),
            payload: None,
        }
    }

    /// Construct a unit depending on a single parent.
    pub fn with_parent(weight: u64, parent_id: u64) -> Self {
        Self {
            id: next_id(),
            weight,
            parents: vec![parent_id],
            payload: None,
        }
    }

    /// Construct a unit depending on a list of parents. Duplicate ids are
    /// tolerated; a self-reference is caller error and is not validated
    /// here — the scheduler does not detect cycles.
    pub fn with_parents(weight: u64, parents: Vec<u64>) -> Self {
        Self {
            id: next_id(),
            weight,
            parents,
            payload: None,
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn weight(&self) -> u64 {
        self.weight
    }

    pub fn parents(&self) -> &[u64] {
        &self.parents
    }

    /// Bind an invocable to this unit, returning a one-shot handle the
    /// caller can block on to observe its return value. Binding twice
    /// replaces the previous payload; the caller is responsible for any
    /// resulting confusion, which is not validated here.
    pub fn bind<F, T>(&mut self, func: F) -> UnitOutput<T>
    where
        F: FnOnce() -> T + Send + 'static,
        T: Send + 'static,
    {
        let slot: Arc<OutputSlot<T>> = Arc::new(OutputSlot {
            value: Mutex::new(None),
            ready: Condvar::new(),
        });
        let producer = Arc::clone(&slot);
        self.payload = Some(Box::new(move || {
            let value = func();
            let mut guard = producer.value.lock().unwrap();
            *guard = Some(value);
            producer.ready.notify_all();
        }));
        UnitOutput { slot }
    }

    /// Run the payload if one was bound; a no-op otherwise. Invoked at
    /// most once by the [`crate::Scheduler`].
    pub(crate) fn execute(&mut self) {
        if let Some(payload) = self.payload.take() {
            payload();
        }
    }
}

impl fmt::Debug for Unit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Unit")
            .field("id", &self.id)
            .field("weight", &self.weight)
            .field("parents", &self.parents)
            .field("has_payload", &self.payload.is_some())
            .finish()
    }
}

struct OutputSlot<T> {
    value: Mutex<Option<T>>,
    ready: Condvar,
}

/// A single-shot handle to a unit's eventual result, returned by
/// [`Unit::bind`]. Travels independently of [`crate::Scheduler::wait`] —
/// a caller may collect these and block on whichever ones it needs,
/// exactly as the scheduler's own completion tracking does not require
/// them.
pub struct UnitOutput<T> {
    slot: Arc<OutputSlot<T>>,
}

impl<T> UnitOutput<T> {
    /// Block until the bound payload has run and return its value.
    ///
    /// # Panics
    ///
    /// Panics if the unit's payload panicked without producing a value
    /// (a payload panic is not trapped by the core) or if the unit is
    /// never executed (e.g. the scheduler never ran, or shut down
    /// before reaching it).
    pub fn join(self) -> T {
        let mut guard = self.slot.value.lock().unwrap();
        loop {
            if let Some(value) = guard.take() {
                return value;
            }
            guard = self.slot.ready.wait(guard).unwrap();
        }
    }

    /// Non-blocking poll: `Some(value)` if the payload has already run.
    pub fn try_join(&self) -> Option<T> {
        self.slot.value.lock().unwrap().take()
    }
}
