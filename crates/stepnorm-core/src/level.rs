//! # Graph Leveler
//!
//! Computes, for every record, the length of the longest reference chain
//! reachable from it. Leaves (no outgoing references) are level 0; a record
//! is one level above the deepest record it references. The hasher visits
//! records in ascending level order so every referenced digest exists before
//! it is embedded.
//!
//! The walk is an explicit-stack depth-first traversal with tri-state marks:
//! a back-edge to an in-progress record is a cycle and fails fast instead of
//! overflowing the call stack on malformed input.

use crate::model::StepModel;
use crate::types::{Argument, NormError, RecordId};
use std::collections::{BTreeMap, BTreeSet};

// =============================================================================
// LEVELS
// =============================================================================

/// The computed level assignment and its inverse.
#[derive(Debug, Clone, Default)]
pub struct Levels {
    /// Record id -> level.
    pub of: BTreeMap<RecordId, u32>,
    /// Level -> record ids, in document order within each level.
    pub by_level: BTreeMap<u32, Vec<RecordId>>,
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Mark {
    InProgress,
    Done(u32),
}

/// Collect the distinct reference targets of one record, scanning nested
/// lists.
pub(crate) fn direct_refs(args: &[Argument]) -> BTreeSet<RecordId> {
    let mut out = BTreeSet::new();
    let mut pending: Vec<&Argument> = args.iter().collect();
    while let Some(arg) = pending.pop() {
        match arg {
            Argument::Ref(id) => {
                out.insert(*id);
            }
            Argument::List { items, .. } => pending.extend(items.iter()),
            _ => {}
        }
    }
    out
}

/// Compute levels for every record in the model.
///
/// Fails with [`NormError::CyclicReference`] on a reference cycle and
/// [`NormError::MissingRecord`] on a dangling reference.
pub fn compute_levels<M: StepModel + ?Sized>(model: &M) -> Result<Levels, NormError> {
    let mut marks: BTreeMap<RecordId, Mark> = BTreeMap::new();

    for &seed in model.ids() {
        if marks.contains_key(&seed) {
            continue;
        }
        let mut stack = vec![seed];
        while let Some(&id) = stack.last() {
            match marks.get(&id) {
                Some(Mark::Done(_)) => {
                    stack.pop();
                }
                Some(Mark::InProgress) => {
                    // All children are Done now; fold their levels.
                    let record = model.record(id)?;
                    let mut level = 0;
                    for target in direct_refs(&record.args) {
                        match marks.get(&target) {
                            Some(Mark::Done(child)) => level = level.max(child + 1),
                            _ => return Err(NormError::CyclicReference(target)),
                        }
                    }
                    marks.insert(id, Mark::Done(level));
                    stack.pop();
                }
                None => {
                    marks.insert(id, Mark::InProgress);
                    let record = model.record(id)?;
                    for target in direct_refs(&record.args) {
                        match marks.get(&target) {
                            Some(Mark::InProgress) => {
                                return Err(NormError::CyclicReference(target));
                            }
                            Some(Mark::Done(_)) => {}
                            None => stack.push(target),
                        }
                    }
                }
            }
        }
    }

    let mut levels = Levels::default();
    for &id in model.ids() {
        if let Some(Mark::Done(level)) = marks.get(&id) {
            levels.of.insert(id, *level);
            levels.by_level.entry(*level).or_default().push(id);
        }
    }
    Ok(levels)
}

// =============================================================================
// TESTS
// =============================================================================
