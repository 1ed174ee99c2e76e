//! Join-semilattice values used to merge path-sensitive information.

use std::collections::BTreeSet;
use std::fmt::Debug;
use std::iter::FromIterator;

/// A join-semilattice element.
///
/// `join` computes the least upper bound in place, `lower_or_equal` the
/// partial order. Every transfer function in this crate is monotone with
/// respect to this order, which (together with the finite height of the
/// concrete lattices) is what guarantees fixpoint termination.
pub trait Lattice: Clone + Debug {
    /// The least element.
    fn bottom() -> Self;

    /// Joins `other` into `self`. Returns `true` if `self` grew.
    fn join(&mut self, other: &Self) -> bool;

    /// Whether `self` ≤ `other` in the lattice order.
    fn lower_or_equal(&self, other: &Self) -> bool;
}

/// A monotone set lattice: join is set union, the order is subset inclusion
/// and bottom is the empty set.
///
/// Used with `i64` stack slot offsets and with `RegisterId`s.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct UnionSet<T: Ord + Clone + Debug> {
    set: BTreeSet<T>,
}

impl<T: Ord + Clone + Debug> UnionSet<T> {
    pub fn new() -> UnionSet<T> {
        UnionSet {
            set: BTreeSet::new(),
        }
    }

    pub fn insert(&mut self, value: T) {
        self.set.insert(value);
    }

    pub fn remove(&mut self, value: &T) {
        self.set.remove(value);
    }

    pub fn contains(&self, value: &T) -> bool {
        self.set.contains(value)
    }

    /// Whether any element yielded by `values` is in the set.
    pub fn contains_any_of<'a, I>(&self, values: I) -> bool
    where
        I: IntoIterator<Item = &'a T>,
        T: 'a,
    {
        values.into_iter().any(|v| self.set.contains(v))
    }

    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.set.iter()
    }

    pub fn len(&self) -> usize {
        self.set.len()
    }

    pub fn is_empty(&self) -> bool {
        self.set.is_empty()
    }
}

impl<T: Ord + Clone + Debug> Lattice for UnionSet<T> {
    fn bottom() -> UnionSet<T> {
        UnionSet::new()
    }

    fn join(&mut self, other: &UnionSet<T>) -> bool {
        let before = self.set.len();
        self.set.extend(other.set.iter().cloned());
        self.set.len() > before
    }

    fn lower_or_equal(&self, other: &UnionSet<T>) -> bool {
        self.set.is_subset(&other.set)
    }
}

impl<T: Ord + Clone + Debug> FromIterator<T> for UnionSet<T> {
    fn from_iter<I: IntoIterator<Item = T>>(iter: I) -> UnionSet<T> {
        UnionSet {
            set: iter.into_iter().collect(),
        }
    }
}
