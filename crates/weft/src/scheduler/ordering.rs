use rustc_hash::{FxHashMap, FxHashSet};
use std::cmp::Reverse;

use super::unit::{BoundaryId, BoundaryUnit};
use crate::config::OrderingMode;

type Rank = (Reverse<i32>, u64);

/// Priority rank, capped by every ancestor still held by the scheduler. A
/// nested unit never outranks the unit whose patch carries its placeholder,
/// and its later registration puts it strictly behind that unit.
fn rank(unit: &BoundaryUnit, units: &FxHashMap<BoundaryId, BoundaryUnit>) -> Rank {
    let mut priority = unit.priority();
    let mut parent = unit.parent();
    while let Some(ancestor) = parent.and_then(|id| units.get(&id)) {
        priority = priority.min(ancestor.priority());
        parent = ancestor.parent();
    }
    (Reverse(priority), unit.seq)
}

/// Picks the terminal units that may be emitted now, in emission order.
///
/// `completion` and `fifo` release every terminal unit and only reorder the
/// batch. `priority` holds a terminal unit back while a non-terminal unit
/// outranks it. With `out_of_order` off, a unit waits for every unit
/// registered before it. In every mode a nested unit follows its parent.
pub(crate) fn release_order(
    units: &FxHashMap<BoundaryId, BoundaryUnit>,
    mode: OrderingMode,
    out_of_order: bool,
) -> Vec<BoundaryId> {
    let terminal = units.values().filter(|unit| unit.status().is_terminal());

    if !out_of_order {
        let barrier = units
            .values()
            .filter(|unit| !unit.status().is_terminal())
            .map(|unit| unit.seq)
            .min()
            .unwrap_or(u64::MAX);
        let mut batch: Vec<&BoundaryUnit> = terminal.filter(|unit| unit.seq < barrier).collect();
        batch.sort_by_key(|unit| unit.seq);
        return parents_first(batch, units);
    }

    let mut batch: Vec<&BoundaryUnit> = match mode {
        OrderingMode::Priority => {
            let barrier = units
                .values()
                .filter(|unit| !unit.status().is_terminal())
                .map(|unit| rank(unit, units))
                .min();
            terminal
                .filter(|unit| barrier.is_none_or(|barrier| rank(unit, units) < barrier))
                .collect()
        }
        OrderingMode::Fifo | OrderingMode::Completion => terminal.collect(),
    };

    match mode {
        OrderingMode::Fifo => batch.sort_by_key(|unit| unit.seq),
        OrderingMode::Priority => batch.sort_by_key(|unit| rank(unit, units)),
        OrderingMode::Completion => batch.sort_by_key(|unit| unit.terminal_seq),
    }

    parents_first(batch, units)
}

/// Reorders the batch so that no unit comes before its parent. A unit whose
/// parent is still held outside the batch stays behind for a later drain.
fn parents_first(
    mut batch: Vec<&BoundaryUnit>,
    units: &FxHashMap<BoundaryId, BoundaryUnit>,
) -> Vec<BoundaryId> {
    let mut emitted = FxHashSet::default();
    let mut order = Vec::with_capacity(batch.len());

    loop {
        let before = batch.len();
        batch.retain(|unit| {
            let blocked = unit
                .parent()
                .is_some_and(|parent| units.contains_key(&parent) && !emitted.contains(&parent));
            if !blocked {
                emitted.insert(unit.id());
                order.push(unit.id());
            }
            blocked
        });
        if batch.is_empty() || batch.len() == before {
            break;
        }
    }
    order
}
