//! Change set for keyed collections.
//!
//! A ChangeSet is the batch of changes produced by one edit, in the exact
//! order the mutations happened, together with per-reason counts.

use crate::change::{Change, ChangeReason};
use alloc::vec::Vec;
use core::slice;

/// An ordered batch of keyed changes.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ChangeSet<K, V> {
    changes: Vec<Change<K, V>>,
    adds: usize,
    updates: usize,
    removes: usize,
    refreshes: usize,
    moves: usize,
}

impl<K, V> Default for ChangeSet<K, V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K, V> ChangeSet<K, V> {
    /// The empty change set. Empty batches are never published.
    pub const EMPTY: Self = Self::new();

    /// Creates a new empty change set.
    #[inline]
    pub const fn new() -> Self {
        Self {
            changes: Vec::new(),
            adds: 0,
            updates: 0,
            removes: 0,
            refreshes: 0,
            moves: 0,
        }
    }

    /// Creates an empty change set with room for `capacity` changes.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            changes: Vec::with_capacity(capacity),
            ..Self::new()
        }
    }

    /// Appends a change, keeping the counts current.
    pub fn push(&mut self, change: Change<K, V>) {
        match change.reason() {
            ChangeReason::Add => self.adds += 1,
            ChangeReason::Update => self.updates += 1,
            ChangeReason::Remove => self.removes += 1,
            ChangeReason::Refresh => self.refreshes += 1,
            ChangeReason::Moved => self.moves += 1,
        }
        self.changes.push(change);
    }

    /// Returns true if there are no changes.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }

    /// Returns the total number of changes.
    #[inline]
    pub fn len(&self) -> usize {
        self.changes.len()
    }

    #[inline]
    pub fn adds(&self) -> usize {
        self.adds
    }

    #[inline]
    pub fn updates(&self) -> usize {
        self.updates
    }

    #[inline]
    pub fn removes(&self) -> usize {
        self.removes
    }

    #[inline]
    pub fn refreshes(&self) -> usize {
        self.refreshes
    }

    #[inline]
    pub fn moves(&self) -> usize {
        self.moves
    }

    /// Returns the changes in recorded order.
    #[inline]
    pub fn iter(&self) -> slice::Iter<'_, Change<K, V>> {
        self.changes.iter()
    }

    /// Returns the changes as a slice.
    #[inline]
    pub fn as_slice(&self) -> &[Change<K, V>] {
        &self.changes
    }

    /// Consumes the set, returning the changes.
    #[inline]
    pub fn into_vec(self) -> Vec<Change<K, V>> {
        self.changes
    }

    /// Re-keys every change using `key_selector` applied to the current value.
    ///
    /// Used to turn a collection keyed by `K` into one keyed by a value-derived
    /// key, for example a foreign key on the right side of a join.
    pub fn change_key<K2, F>(&self, key_selector: F) -> ChangeSet<K2, V>
    where
        K: Clone,
        V: Clone,
        F: Fn(&V) -> K2,
    {
        let mut result = ChangeSet::with_capacity(self.len());
        for change in &self.changes {
            let key = key_selector(change.current());
            result.push(change.clone().with_key(key));
        }
        result
    }

    /// Returns the changes recorded for `key`, in order.
    pub fn filter_key(&self, key: &K) -> ChangeSet<K, V>
    where
        K: Clone + PartialEq,
        V: Clone,
    {
        self.changes
            .iter()
            .filter(|change| change.key() == key)
            .cloned()
            .collect()
    }
}

impl<K, V> Extend<Change<K, V>> for ChangeSet<K, V> {
    fn extend<I: IntoIterator<Item = Change<K, V>>>(&mut self, iter: I) {
        for change in iter {
            self.push(change);
        }
    }
}

impl<K, V> FromIterator<Change<K, V>> for ChangeSet<K, V> {
    fn from_iter<I: IntoIterator<Item = Change<K, V>>>(iter: I) -> Self {
        let mut changes = Self::new();
        changes.extend(iter);
        changes
    }
}

impl<K, V> IntoIterator for ChangeSet<K, V> {
    type Item = Change<K, V>;
    type IntoIter = alloc::vec::IntoIter<Change<K, V>>;

    fn into_iter(self) -> Self::IntoIter {
        self.changes.into_iter()
    }
}

impl<'a, K, V> IntoIterator for &'a ChangeSet<K, V> {
    type Item = &'a Change<K, V>;
    type IntoIter = slice::Iter<'a, Change<K, V>>;

    fn into_iter(self) -> Self::IntoIter {
        self.changes.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::vec;

    #[test]
    fn test_change_set_new() {
        let cs: ChangeSet<i32, i32> = ChangeSet::new();
        assert!(cs.is_empty());
        assert_eq!(cs.len(), 0);
        assert_eq!(cs, ChangeSet::EMPTY);
    }

    #[test]
    fn test_change_set_counts() {
        let cs: ChangeSet<i32, &str> = vec![
            Change::add(1, "a"),
            Change::add(2, "b"),
            Change::update(1, "c", "a"),
            Change::refresh(2, "b"),
            Change::remove(2, "b"),
        ]
        .into_iter()
        .collect();

        assert_eq!(cs.len(), 5);
        assert_eq!(cs.adds(), 2);
        assert_eq!(cs.updates(), 1);
        assert_eq!(cs.refreshes(), 1);
        assert_eq!(cs.removes(), 1);
        assert_eq!(cs.moves(), 0);
    }

    #[test]
    fn test_change_set_preserves_order() {
        let mut cs = ChangeSet::new();
        cs.push(Change::add(3, 30));
        cs.push(Change::add(1, 10));
        cs.push(Change::remove(3, 30));

        let keys: Vec<_> = cs.iter().map(|c| *c.key()).collect();
        assert_eq!(keys, vec![3, 1, 3]);
    }

    #[test]
    fn test_change_set_change_key() {
        let mut cs = ChangeSet::new();
        cs.push(Change::add(100, (1, "x")));
        cs.push(Change::update(101, (2, "y"), (2, "w")));

        let rekeyed = cs.change_key(|v| v.0);
        assert_eq!(rekeyed.len(), 2);
        assert_eq!(*rekeyed.as_slice()[0].key(), 1);
        assert_eq!(*rekeyed.as_slice()[1].key(), 2);
        assert_eq!(rekeyed.as_slice()[1].previous(), Some(&(2, "w")));
        assert_eq!(rekeyed.updates(), 1);
    }

    #[test]
    fn test_change_set_filter_key() {
        let mut cs = ChangeSet::new();
        cs.push(Change::add(1, "a"));
        cs.push(Change::add(2, "b"));
        cs.push(Change::update(1, "c", "a"));

        let only_one = cs.filter_key(&1);
        assert_eq!(only_one.len(), 2);
        assert_eq!(only_one.adds(), 1);
        assert_eq!(only_one.updates(), 1);
        assert!(cs.filter_key(&3).is_empty());
    }
}
