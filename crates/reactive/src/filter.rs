//! Static filters applied to a connected stream.
//!
//! A static filter evaluates its predicate against each value as the value
//! changes. It keeps its own mirror of the passing items so that an update
//! moving an item out of the predicate can be reported as a removal.

use rivulet_core::{ChangeReason, ChangeSet, ListChange, ListChangeReason, ListChangeSet, Result};
use rivulet_incremental::{ChangeAwareCache, ChangeAwareList};
use std::hash::Hash;
use std::sync::Arc;

/// Shared predicate over values.
pub type Predicate<V> = Arc<dyn Fn(&V) -> bool + Send + Sync>;

/// Keyed static filter.
pub struct StaticFilter<K, V> {
    predicate: Predicate<V>,
    passing: ChangeAwareCache<K, V>,
}

impl<K, V> StaticFilter<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    pub fn new(predicate: Predicate<V>) -> Self {
        Self {
            predicate,
            passing: ChangeAwareCache::new(),
        }
    }

    /// Seeds the filter from existing items, returning the passing ones as adds.
    pub fn initial<'a, I>(&mut self, items: I) -> ChangeSet<K, V>
    where
        I: IntoIterator<Item = (&'a K, &'a V)>,
        K: 'a,
        V: 'a,
    {
        for (key, value) in items {
            if (self.predicate)(value) {
                self.passing.add_or_update(key.clone(), value.clone());
            }
        }
        self.passing.capture_changes()
    }

    /// Translates an upstream batch into the filtered view's batch.
    pub fn process(&mut self, changes: &ChangeSet<K, V>) -> ChangeSet<K, V> {
        for change in changes {
            let key = change.key();
            let current = change.current();
            match change.reason() {
                ChangeReason::Add | ChangeReason::Update => {
                    if (self.predicate)(current) {
                        self.passing.add_or_update(key.clone(), current.clone());
                    } else {
                        self.passing.remove(key);
                    }
                }
                ChangeReason::Remove => {
                    self.passing.remove(key);
                }
                ChangeReason::Refresh => {
                    let matches = (self.predicate)(current);
                    match (self.passing.contains_key(key), matches) {
                        (true, true) => self.passing.refresh(key),
                        (false, true) => self.passing.add_or_update(key.clone(), current.clone()),
                        (true, false) => {
                            self.passing.remove(key);
                        }
                        (false, false) => {}
                    }
                }
                ChangeReason::Moved => {}
            }
        }
        self.passing.capture_changes()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.passing.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.passing.is_empty()
    }
}

/// Positional static filter.
///
/// Tracks which upstream positions pass the predicate and re-indexes every
/// change into the filtered view.
pub struct ListFilter<T> {
    predicate: Predicate<T>,
    included: Vec<bool>,
    passing: ChangeAwareList<T>,
}

impl<T: Clone> ListFilter<T> {
    pub fn new(predicate: Predicate<T>) -> Self {
        Self {
            predicate,
            included: Vec::new(),
            passing: ChangeAwareList::new(),
        }
    }

    /// Seeds the filter from the upstream items.
    pub fn initial(&mut self, items: &[T]) -> Result<ListChangeSet<T>> {
        let mut seed = ListChangeSet::new();
        if !items.is_empty() {
            seed.push(ListChange::add_range(items.to_vec(), 0));
        }
        self.process(&seed)
    }

    /// Translates an upstream batch into the filtered view's batch.
    pub fn process(&mut self, changes: &ListChangeSet<T>) -> Result<ListChangeSet<T>> {
        for change in changes {
            match change {
                ListChange::Item(item) => {
                    let index = item.current_index.unwrap_or(self.included.len());
                    match item.reason {
                        ListChangeReason::Add => self.insert_one(index, &item.current)?,
                        ListChangeReason::Replace => self.reevaluate(index, &item.current, false)?,
                        ListChangeReason::Refresh => self.reevaluate(index, &item.current, true)?,
                        ListChangeReason::Remove => self.remove_one(index)?,
                        ListChangeReason::Moved => {
                            if let Some(from) = item.previous_index {
                                self.move_one(from, index)?;
                            }
                        }
                        ListChangeReason::AddRange
                        | ListChangeReason::RemoveRange
                        | ListChangeReason::Clear => {}
                    }
                }
                ListChange::Range(range) => match range.reason {
                    ListChangeReason::AddRange => {
                        let index = range.index.unwrap_or(self.included.len());
                        self.insert_many(index, &range.items)?;
                    }
                    ListChangeReason::RemoveRange => {
                        let index = range.index.unwrap_or(0);
                        self.remove_many(index, range.items.len())?;
                    }
                    ListChangeReason::Clear => {
                        self.included.clear();
                        self.passing.clear();
                    }
                    _ => {}
                },
            }
        }
        Ok(self.passing.capture_changes())
    }

    /// Position in the filtered view of upstream position `index`.
    fn filtered_index(&self, index: usize) -> usize {
        self.included[..index].iter().filter(|passes| **passes).count()
    }

    fn check(&self, index: usize, len: usize) -> Result<()> {
        if index < len {
            Ok(())
        } else {
            Err(rivulet_core::Error::index_out_of_range(index, len))
        }
    }

    fn insert_one(&mut self, index: usize, item: &T) -> Result<()> {
        self.check(index, self.included.len() + 1)?;
        let passes = (self.predicate)(item);
        let filtered = self.filtered_index(index);
        self.included.insert(index, passes);
        if passes {
            self.passing.insert(filtered, item.clone())?;
        }
        Ok(())
    }

    fn insert_many(&mut self, index: usize, items: &[T]) -> Result<()> {
        self.check(index, self.included.len() + 1)?;
        let filtered = self.filtered_index(index);
        let mask: Vec<bool> = items.iter().map(|item| (self.predicate)(item)).collect();
        let passing: Vec<T> = items
            .iter()
            .zip(&mask)
            .filter(|(_, passes)| **passes)
            .map(|(item, _)| item.clone())
            .collect();
        self.included.splice(index..index, mask);
        self.passing.insert_range(passing, filtered)
    }

    fn remove_one(&mut self, index: usize) -> Result<()> {
        self.check(index, self.included.len())?;
        if self.included[index] {
            let filtered = self.filtered_index(index);
            self.passing.remove_at(filtered)?;
        }
        self.included.remove(index);
        Ok(())
    }

    fn remove_many(&mut self, index: usize, count: usize) -> Result<()> {
        if count == 0 {
            return Ok(());
        }
        self.check(index + count - 1, self.included.len())?;
        let filtered = self.filtered_index(index);
        let passing = self.included[index..index + count]
            .iter()
            .filter(|passes| **passes)
            .count();
        self.included.drain(index..index + count);
        self.passing.remove_range(filtered, passing)
    }

    fn reevaluate(&mut self, index: usize, item: &T, refresh: bool) -> Result<()> {
        self.check(index, self.included.len())?;
        let was = self.included[index];
        let now = (self.predicate)(item);
        let filtered = self.filtered_index(index);
        self.included[index] = now;
        match (was, now) {
            (true, true) if refresh => self.passing.refresh_at(filtered),
            (true, true) => self.passing.set_item(filtered, item.clone()).map(|_| ()),
            (true, false) => self.passing.remove_at(filtered).map(|_| ()),
            (false, true) => self.passing.insert(filtered, item.clone()),
            (false, false) => Ok(()),
        }
    }

    fn move_one(&mut self, from: usize, to: usize) -> Result<()> {
        self.check(from, self.included.len())?;
        self.check(to, self.included.len())?;
        let passes = self.included[from];
        let filtered_from = self.filtered_index(from);
        self.included.remove(from);
        self.included.insert(to, passes);
        if passes {
            let filtered_to = self.filtered_index(to);
            self.passing.move_item(filtered_from, filtered_to)?;
        }
        Ok(())
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.passing.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.passing.is_empty()
    }
}
