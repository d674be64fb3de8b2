///
/// The Ordered Batch: owns the units, the id→position index, and the
/// per-unit completion flags. Not thread-safe by itself — the
/// `Scheduler` supplies the synchronization discipline described in its
/// module docs.
///

use std::collections::HashMap;
use std::ops::Index;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::error::SchedulerError;
use crate::sort;
use crate::unit::Unit;

/// A batch of units, optionally sorted into dependency order.
///
/// Positions `< cursor` have already been handed out by
/// [`OrderedBatch::pop_next`] (their slot is `None`); positions
/// `>= cursor` are still candidates.
pub struct OrderedBatch {
    units: Vec<Option<Unit>>,
    index_by_id: HashMap<u64, usize>,
    cursor: usize,
    done: Arc<HashMap<u64, AtomicBool>>,
}

impl OrderedBatch {
    pub fn new() -> Self {
        Self {
            units: Vec::new(),
            index_by_id: HashMap::new(),
            cursor: 0,
            done: Arc::new(HashMap::new()),
        }
    }

    /// Append a unit to the batch. Ordering among appended units has no
    /// meaning until [`OrderedBatch::sort`] runs.
    pub fn push(&mut self, unit: Unit) {
        self.units.push(Some(unit));
    }

    pub fn len(&self) -> usize {
        self.units.len()
    }

    pub fn is_empty(&self) -> bool {
        self.units.is_empty()
    }

    /// Sorts the batch into dependency order with a weight-descending
    /// tie-break among units at the same dependency depth. Standalone
    /// entry point: may be called on its own, independent of a
    /// `Scheduler` run.
    ///
    /// On failure the batch is left exactly as it was: same units, same
    /// order, `cursor` untouched.
    pub fn sort(&mut self) -> Result<(), SchedulerError> {
        let taken: Vec<Unit> = std::mem::take(&mut self.units)
            .into_iter()
            .map(|slot| slot.expect("sort() must run before any pop_next() call"))
            .collect();

        match sort::topo_sort(taken) {
            Ok(sorted) => {
                self.index_by_id = sorted
                    .iter()
                    .enumerate()
                    .map(|(pos, unit)| (unit.id(), pos))
                    .collect();
                self.units = sorted.into_iter().map(Some).collect();
                self.cursor = 0;
                Ok(())
            }
            Err((err, original)) => {
                self.index_by_id = original
                    .iter()
                    .enumerate()
                    .map(|(pos, unit)| (unit.id(), pos))
                    .collect();
                self.units = original.into_iter().map(Some).collect();
                Err(err)
            }
        }
    }

    /// Reinitializes completion tracking: every unit's `done` flag is
    /// set to false and `cursor` resets to 0. Called by
    /// [`crate::Scheduler::run`] after a successful sort, never by the
    /// caller directly in ordinary use.
    pub fn reset_done(&mut self) {
        let mut map = HashMap::with_capacity(self.units.len());
        for slot in &self.units {
            if let Some(unit) = slot {
                map.insert(unit.id(), AtomicBool::new(false));
            }
        }
        self.done = Arc::new(map);
        self.cursor = 0;
    }

    /// A cloned handle to the completion map, shareable across worker
    /// threads without the batch's own mutex: each cell is an
    /// independent atomic, so `mark_done` through this handle never
    /// needs to fight over `pop_next`'s lock.
    pub(crate) fn done_handle(&self) -> Arc<HashMap<u64, AtomicBool>> {
        Arc::clone(&self.done)
    }

    fn is_ready(&self, unit: &Unit) -> bool {
        unit.parents().iter().all(|parent| {
            self.done
                .get(parent)
                .map(|flag| flag.load(Ordering::SeqCst))
                .unwrap_or(false)
        })
    }

    /// Scans `units[cursor..]` for the first unit whose parents are all
    /// done, swaps it into position `cursor`, moves it out, and
    /// advances `cursor`. Returns the unit (if any) and whether this
    /// call emptied the batch.
    ///
    /// Matches the reference behavior exactly: the "emptied" flag is
    /// only set when a successful dispatch advances the cursor to the
    /// end. A scan that finds no ready candidate returns `(None, false)`
    /// even if every remaining unit is permanently blocked (a cycle) —
    /// the core does not detect cycles; see the crate's top-level docs.
    pub fn pop_next(&mut self) -> (Option<Unit>, bool) {
        let len = self.units.len();
        let mut found = None;
        for i in self.cursor..len {
            let ready = match &self.units[i] {
                Some(unit) => self.is_ready(unit),
                None => false,
            };
            if ready {
                found = Some(i);
                break;
            }
        }

        let Some(i) = found else {
            return (None, false);
        };

        if i != self.cursor {
            self.units.swap(i, self.cursor);
            let displaced_id = self.units[i].as_ref().map(Unit::id);
            let dispatched_id = self.units[self.cursor].as_ref().map(Unit::id);
            if let Some(id) = displaced_id {
                self.index_by_id.insert(id, i);
            }
            if let Some(id) = dispatched_id {
                self.index_by_id.insert(id, self.cursor);
            }
        }

        let unit = self.units[self.cursor]
            .take()
            .expect("position at cursor must hold a unit before it is dispatched");
        self.cursor += 1;
        let emptied = self.cursor == len;
        (Some(unit), emptied)
    }

    /// Marks `id` as done. Must only be called after that unit's payload
    /// has fully returned. Safe to call concurrently from any thread —
    /// each cell is an independent atomic.
    pub fn mark_done(&self, id: u64) {
        if let Some(flag) = self.done.get(&id) {
            flag.store(true, Ordering::SeqCst);
        }
    }
}

impl Default for OrderedBatch {
    fn default() -> Self {
        Self::new()
    }
}

impl Index<usize> for OrderedBatch {
    type Output = Unit;

    fn index(&self, i: usize) -> &Unit {
        self.units[i]
            .as_ref()
            .expect("position already dispatched by pop_next")
    }
}

impl FromIterator<Unit> for OrderedBatch {
    fn from_iter<I: IntoIterator<Item = Unit>>(iter: I) -> Self {
        let mut batch = Self::new();
        for unit in iter {
            batch.push(unit);
        }
        batch
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sort_then_pop_respects_dependency_order() {
        let mut batch = OrderedBatch::new();
        let a = Unit::new(1);
        let a_id = a.id();
        batch.push(a);
        let b = Unit::with_parent(1, a_id);
        let b_id = b.id();
        batch.push(b);

        batch.sort().unwrap();
        batch.reset_done();

        let (first, emptied) = batch.pop_next();
        let first = first.unwrap();
        assert_eq!(first.id(), a_id);
        assert!(!emptied);

        // B isn't ready until A is marked done.
        let (none, _) = batch.pop_next();
        assert!(none.is_none());

        batch.mark_done(a_id);
        let (second, emptied) = batch.pop_next();
        assert_eq!(second.unwrap().id(), b_id);
        assert!(emptied);
    }

    #[test]
    fn missing_parent_leaves_batch_unchanged() {
        let mut batch = OrderedBatch::new();
        batch.push(Unit::with_parent(1, 9999));
        let err = batch.sort().unwrap_err();
        assert!(matches!(err, SchedulerError::DependencyMissing { .. }));
        assert_eq!(batch.len(), 1);
    }

    #[test]
    fn empty_batch_pop_next_reports_not_emptied() {
        let mut batch = OrderedBatch::new();
        batch.sort().unwrap();
        batch.reset_done();
        let (unit, emptied) = batch.pop_next();
        assert!(unit.is_none());
        assert!(!emptied);
    }
}
