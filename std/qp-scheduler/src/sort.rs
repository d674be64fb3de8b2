///
/// Two-phase topological sort: a stable weight-descending pre-sort
/// followed by a dependency pass that emits each chain of ancestors
/// before its dependents. See `OrderedBatch::sort` for the public entry
/// point.
///

use std::collections::{BTreeSet, HashMap, VecDeque};

use crate::error::SchedulerError;
use crate::unit::Unit;

/// Sorts `units` into dependency order with a weight-descending
/// tie-break among units at the same dependency depth.
///
/// On success, returns the permuted vector. On failure (a unit
/// references a parent id absent from the batch), returns the missing
/// ids together with the original vector, untouched, so the caller can
/// restore it.
pub(crate) fn topo_sort(units: Vec<Unit>) -> Result<Vec<Unit>, (SchedulerError, Vec<Unit>)> {
    let n = units.len();
    if n == 0 {
        return Ok(units);
    }

    // Phase 1: weight-descending stable order, expressed as a
    // permutation of original indices (no mutation of `units` yet, so
    // a validation failure can hand the original vector straight back).
    let mut weight_order: Vec<usize> = (0..n).collect();
    weight_order.sort_by(|&a, &b| units[b].weight().cmp(&units[a].weight()));

    // Rank (position within the weight-sorted sequence), keyed by id.
    let mut pos_by_id: HashMap<u64, usize> = HashMap::with_capacity(n);
    for (rank, &orig_idx) in weight_order.iter().enumerate() {
        pos_by_id.insert(units[orig_idx].id(), rank);
    }

    let mut missing: Vec<u64> = Vec::new();
    for unit in &units {
        for &parent in unit.parents() {
            if !pos_by_id.contains_key(&parent) {
                missing.push(parent);
            }
        }
    }
    if !missing.is_empty() {
        missing.sort_unstable();
        missing.dedup();
        return Err((SchedulerError::DependencyMissing { missing }, units));
    }

    // Phase 2 operates purely on ranks; parents of rank `p` expressed as
    // ranks too.
    let parents_by_rank: Vec<Vec<usize>> = weight_order
        .iter()
        .map(|&orig_idx| {
            units[orig_idx]
                .parents()
                .iter()
                .map(|parent| pos_by_id[parent])
                .collect()
        })
        .collect();

    let mut emitted = vec![false; n];
    let mut pending = vec![false; n];
    let mut ordered_ranks: Vec<usize> = Vec::with_capacity(n);

    for i in 0..n {
        if emitted[i] {
            continue;
        }

        let mut chain: VecDeque<usize> = VecDeque::new();
        let mut current: Vec<usize> = vec![i];
        pending[i] = true;

        loop {
            let mut next: BTreeSet<usize> = BTreeSet::new();
            let mut all_parentless = true;

            for &p in &current {
                if parents_by_rank[p].is_empty() {
                    next.insert(p);
                    pending[p] = false;
                } else {
                    all_parentless = false;
                    for &q in &parents_by_rank[p] {
                        if !emitted[q] {
                            next.insert(q);
                            pending[q] = false;
                        }
                    }
                }
            }

            for &p in current.iter().rev() {
                if pending[p] {
                    chain.push_front(p);
                    emitted[p] = true;
                }
            }

            if all_parentless {
                for &p in next.iter().rev() {
                    chain.push_front(p);
                    emitted[p] = true;
                }
                break;
            }

            current = next.into_iter().collect();
            for &p in &current {
                pending[p] = true;
            }
        }

        ordered_ranks.extend(chain.drain(..));
    }

    let mut slots: Vec<Option<Unit>> = units.into_iter().map(Some).collect();
    let mut result = Vec::with_capacity(n);
    for rank in ordered_ranks {
        let orig_idx = weight_order[rank];
        result.push(
            slots[orig_idx]
                .take()
                .expect("each original index is consumed exactly once"),
        );
    }

    Ok(result)
}
