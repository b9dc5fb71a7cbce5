//! Change set for ordered collections.

use crate::list_change::{ListChange, ListChangeReason};
use alloc::vec::Vec;
use core::slice;

/// An ordered batch of positional changes.
///
/// Counts are per element: a range change of three items adds three to the
/// relevant count and to `total_changes`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ListChangeSet<T> {
    changes: Vec<ListChange<T>>,
    adds: usize,
    removes: usize,
    replaced: usize,
    refreshes: usize,
    moves: usize,
    total_changes: usize,
}

impl<T> Default for ListChangeSet<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> ListChangeSet<T> {
    /// The empty change set.
    pub const EMPTY: Self = Self::new();

    #[inline]
    pub const fn new() -> Self {
        Self {
            changes: Vec::new(),
            adds: 0,
            removes: 0,
            replaced: 0,
            refreshes: 0,
            moves: 0,
            total_changes: 0,
        }
    }

    /// Appends a change, keeping the counts current.
    pub fn push(&mut self, change: ListChange<T>) {
        let n = change.element_count();
        match change.reason() {
            ListChangeReason::Add | ListChangeReason::AddRange => self.adds += n,
            ListChangeReason::Remove | ListChangeReason::RemoveRange | ListChangeReason::Clear => {
                self.removes += n
            }
            ListChangeReason::Replace => self.replaced += n,
            ListChangeReason::Refresh => self.refreshes += n,
            ListChangeReason::Moved => self.moves += n,
        }
        self.total_changes += n;
        self.changes.push(change);
    }

    /// Returns true if there are no changes.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }

    /// Number of change records, counting a range once.
    #[inline]
    pub fn len(&self) -> usize {
        self.changes.len()
    }

    /// Number of affected elements, counting each item of a range.
    #[inline]
    pub fn total_changes(&self) -> usize {
        self.total_changes
    }

    #[inline]
    pub fn adds(&self) -> usize {
        self.adds
    }

    #[inline]
    pub fn removes(&self) -> usize {
        self.removes
    }

    #[inline]
    pub fn replaced(&self) -> usize {
        self.replaced
    }

    #[inline]
    pub fn refreshes(&self) -> usize {
        self.refreshes
    }

    #[inline]
    pub fn moves(&self) -> usize {
        self.moves
    }

    #[inline]
    pub fn iter(&self) -> slice::Iter<'_, ListChange<T>> {
        self.changes.iter()
    }

    #[inline]
    pub fn as_slice(&self) -> &[ListChange<T>] {
        &self.changes
    }

    #[inline]
    pub fn into_vec(self) -> Vec<ListChange<T>> {
        self.changes
    }
}

impl<T> Extend<ListChange<T>> for ListChangeSet<T> {
    fn extend<I: IntoIterator<Item = ListChange<T>>>(&mut self, iter: I) {
        for change in iter {
            self.push(change);
        }
    }
}

impl<T> FromIterator<ListChange<T>> for ListChangeSet<T> {
    fn from_iter<I: IntoIterator<Item = ListChange<T>>>(iter: I) -> Self {
        let mut changes = Self::new();
        changes.extend(iter);
        changes
    }
}

impl<'a, T> IntoIterator for &'a ListChangeSet<T> {
    type Item = &'a ListChange<T>;
    type IntoIter = slice::Iter<'a, ListChange<T>>;

    fn into_iter(self) -> Self::IntoIter {
        self.changes.iter()
    }
}
