//! Change-aware keyed store.
//!
//! A `ChangeAwareCache` is a key/value map that records every mutation into a
//! pending `ChangeSet`. `capture_changes` hands the pending batch out and
//! starts a new one, so the owner decides where one batch ends.

use alloc::vec::Vec;
use core::hash::Hash;
use hashbrown::hash_map;
use hashbrown::HashMap;
use rivulet_core::{Change, ChangeReason, ChangeSet};

/// A keyed store that captures all changes made to it.
///
/// Invariant: replaying the pending changes on top of the state at the last
/// capture yields the current state.
///
/// Neither the map nor the accumulator allocates until the first mutation,
/// unless a capacity hint is given.
#[derive(Clone, Debug)]
pub struct ChangeAwareCache<K, V> {
    /// Current state
    data: HashMap<K, V>,
    /// Changes recorded since the last capture
    changes: ChangeSet<K, V>,
}

impl<K, V> Default for ChangeAwareCache<K, V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K, V> ChangeAwareCache<K, V> {
    /// Creates a new empty cache.
    pub fn new() -> Self {
        Self {
            data: HashMap::new(),
            changes: ChangeSet::new(),
        }
    }

    /// Creates a new empty cache sized for `capacity` entries.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            data: HashMap::with_capacity(capacity),
            changes: ChangeSet::with_capacity(capacity),
        }
    }

    /// Returns the number of entries.
    #[inline]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Returns true if the cache holds no entries.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Returns true if changes were recorded since the last capture.
    #[inline]
    pub fn has_pending(&self) -> bool {
        !self.changes.is_empty()
    }

    /// Returns the changes recorded since the last capture.
    #[inline]
    pub fn pending(&self) -> &ChangeSet<K, V> {
        &self.changes
    }

    /// Returns the recorded batch and starts a new one.
    ///
    /// Returns an empty change set if nothing was recorded.
    pub fn capture_changes(&mut self) -> ChangeSet<K, V> {
        core::mem::take(&mut self.changes)
    }

    pub fn keys(&self) -> hash_map::Keys<'_, K, V> {
        self.data.keys()
    }

    pub fn values(&self) -> hash_map::Values<'_, K, V> {
        self.data.values()
    }

    pub fn iter(&self) -> hash_map::Iter<'_, K, V> {
        self.data.iter()
    }
}

impl<K, V> ChangeAwareCache<K, V>
where
    K: Eq + Hash,
{
    /// Looks up the value stored for `key`.
    #[inline]
    pub fn lookup(&self, key: &K) -> Option<&V> {
        self.data.get(key)
    }

    #[inline]
    pub fn contains_key(&self, key: &K) -> bool {
        self.data.contains_key(key)
    }
}

impl<K, V> ChangeAwareCache<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    /// Returns a copy of the value stored for `key`.
    #[inline]
    pub fn try_get(&self, key: &K) -> Option<V> {
        self.data.get(key).cloned()
    }

    /// Inserts without checking for an existing entry and records an `Add`.
    ///
    /// The caller guarantees that `key` is absent. Adding an existing key
    /// overwrites it while recording an `Add`, which breaks the replay
    /// invariant. Use [`add_or_update`](Self::add_or_update) when unsure.
    pub fn add(&mut self, key: K, item: V) {
        self.changes.push(Change::add(key.clone(), item.clone()));
        self.data.insert(key, item);
    }

    /// Inserts or replaces the value for `key`.
    ///
    /// Records `Add` if the key was absent, otherwise `Update` carrying the
    /// replaced value.
    pub fn add_or_update(&mut self, key: K, item: V) {
        let change = match self.data.insert(key.clone(), item.clone()) {
            Some(previous) => Change::update(key, item, previous),
            None => Change::add(key, item),
        };
        self.changes.push(change);
    }

    /// Removes `key`, recording a `Remove` with the removed value.
    ///
    /// Returns false and records nothing if the key was absent.
    pub fn remove(&mut self, key: &K) -> bool {
        match self.data.remove_entry(key) {
            Some((key, removed)) => {
                self.changes.push(Change::remove(key, removed));
                true
            }
            None => false,
        }
    }

    /// Removes every key in `keys` into the current batch.
    pub fn remove_many<I>(&mut self, keys: I)
    where
        I: IntoIterator<Item = K>,
    {
        for key in keys {
            self.remove(&key);
        }
    }

    /// Records a `Refresh` for `key` with its current value. No-op when absent.
    pub fn refresh(&mut self, key: &K) {
        if let Some((key, current)) = self.data.get_key_value(key) {
            self.changes.push(Change::refresh(key.clone(), current.clone()));
        }
    }

    /// Records a `Refresh` for every present key in `keys`.
    pub fn refresh_many<I>(&mut self, keys: I)
    where
        I: IntoIterator<Item = K>,
    {
        for key in keys {
            self.refresh(&key);
        }
    }

    /// Records a `Refresh` for every entry.
    pub fn refresh_all(&mut self) {
        let changes = &mut self.changes;
        for (key, current) in self.data.iter() {
            changes.push(Change::refresh(key.clone(), current.clone()));
        }
    }

    /// Removes every entry, recording a `Remove` for each.
    pub fn clear(&mut self) {
        for (key, removed) in self.data.drain() {
            self.changes.push(Change::remove(key, removed));
        }
    }

    /// Replays a change set produced elsewhere onto this cache.
    ///
    /// `Add` and `Update` become `add_or_update`, `Remove` becomes `remove`,
    /// `Refresh` becomes `refresh`. `Moved` has no keyed meaning and is skipped.
    /// The recorded batch is therefore the minimal effect on this cache, which
    /// may differ from the input.
    pub fn clone_changes(&mut self, changes: &ChangeSet<K, V>) {
        for change in changes {
            match change.reason() {
                ChangeReason::Add | ChangeReason::Update => {
                    self.add_or_update(change.key().clone(), change.current().clone());
                }
                ChangeReason::Remove => {
                    self.remove(change.key());
                }
                ChangeReason::Refresh => self.refresh(change.key()),
                ChangeReason::Moved => {}
            }
        }
    }

    /// Replaces the whole contents with `items`, recording only differences.
    ///
    /// Keys missing from `items` are removed, new keys are added and existing
    /// keys are updated only when `are_equal(old, new)` is false.
    pub fn edit_diff<I, F>(&mut self, items: I, are_equal: F)
    where
        I: IntoIterator<Item = (K, V)>,
        F: Fn(&V, &V) -> bool,
    {
        let incoming: HashMap<K, V> = items.into_iter().collect();

        let removed: Vec<K> = self
            .data
            .keys()
            .filter(|key| !incoming.contains_key(*key))
            .cloned()
            .collect();
        self.remove_many(removed);

        for (key, item) in incoming {
            let unchanged = self
                .data
                .get(&key)
                .map_or(false, |existing| are_equal(existing, &item));
            if !unchanged {
                self.add_or_update(key, item);
            }
        }
    }
}
