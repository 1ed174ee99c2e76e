//! Function summaries and the write-once store that publishes them.

use std::collections::BTreeMap;

use crate::middle::ir::{Address, RegisterId};
use crate::middle::lattice::UnionSet;

/// ABI kind of a summarized function.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FunctionKind {
    /// Has at least one normal return path.
    Regular,
    /// Never returns to the caller.
    NoReturn,
    /// Synthetic placeholder standing in for an unresolved indirect target.
    Fake,
}

/// Immutable summary of one function: its ABI kind and the registers it may
/// overwrite. Created once per entry point and never revised after
/// publication.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Func {
    pub kind: FunctionKind,
    pub clobbered: UnionSet<RegisterId>,
}

impl Func {
    pub fn new(kind: FunctionKind, clobbered: UnionSet<RegisterId>) -> Func {
        Func { kind, clobbered }
    }
}

/// Lookup service for previously computed summaries, consulted when
/// analyzing a caller. "Not yet available" is a normal interim state that
/// drives the interprocedural-wait path, not an error.
pub trait FunctionOracle {
    fn lookup(&self, entry: Address) -> Option<&Func>;
}

/// The concrete oracle: a write-once map from entry point to summary.
///
/// The first successful publish wins; later attempts return `false` and
/// leave the stored summary untouched.
#[derive(Debug, Default)]
pub struct SummaryStore {
    summaries: BTreeMap<Address, Func>,
}

impl SummaryStore {
    pub fn new() -> SummaryStore {
        SummaryStore {
            summaries: BTreeMap::new(),
        }
    }

    /// Publishes `func` for `entry` unless a summary is already present.
    pub fn try_publish(&mut self, entry: Address, func: Func) -> bool {
        if self.summaries.contains_key(&entry) {
            sabre_warn!("summary for {:#x} already published", entry);
            return false;
        }
        self.summaries.insert(entry, func);
        true
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Address, &Func)> {
        self.summaries.iter()
    }

    pub fn len(&self) -> usize {
        self.summaries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.summaries.is_empty()
    }
}

impl FunctionOracle for SummaryStore {
    fn lookup(&self, entry: Address) -> Option<&Func> {
        self.summaries.get(&entry)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn first_publish_wins() {
        let mut store = SummaryStore::new();
        let first = Func::new(FunctionKind::Regular, vec![RegisterId(1)].into_iter().collect());
        let second = Func::new(FunctionKind::NoReturn, UnionSet::new());

        assert!(store.try_publish(0x1000, first.clone()));
        assert!(!store.try_publish(0x1000, second));
        assert_eq!(store.lookup(0x1000), Some(&first));
    }

    #[test]
    fn lookup_of_unpublished_entry_is_none() {
        let store = SummaryStore::new();
        assert_eq!(store.lookup(0x4000), None);
    }
}
