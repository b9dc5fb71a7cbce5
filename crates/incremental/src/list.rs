//! Change-aware ordered store.
//!
//! The positional analogue of [`ChangeAwareCache`](crate::ChangeAwareCache):
//! a `Vec` whose mutations are recorded into a pending `ListChangeSet`. Bulk
//! operations record a single range change instead of one change per item.

use alloc::vec::Vec;
use core::slice;
use rivulet_core::{Error, ListChange, ListChangeReason, ListChangeSet, Result};

/// An ordered store that captures all changes made to it.
///
/// Every index-taking operation validates its indices first; an invalid
/// index returns `Error::IndexOutOfRange` and records nothing.
#[derive(Clone, Debug)]
pub struct ChangeAwareList<T> {
    items: Vec<T>,
    changes: ListChangeSet<T>,
}

impl<T> Default for ChangeAwareList<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> ChangeAwareList<T> {
    /// Creates a new empty list.
    pub fn new() -> Self {
        Self {
            items: Vec::new(),
            changes: ListChangeSet::new(),
        }
    }

    /// Creates a new empty list sized for `capacity` items.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            items: Vec::with_capacity(capacity),
            changes: ListChangeSet::new(),
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    #[inline]
    pub fn get(&self, index: usize) -> Option<&T> {
        self.items.get(index)
    }

    #[inline]
    pub fn iter(&self) -> slice::Iter<'_, T> {
        self.items.iter()
    }

    #[inline]
    pub fn as_slice(&self) -> &[T] {
        &self.items
    }

    /// Returns true if changes were recorded since the last capture.
    #[inline]
    pub fn has_pending(&self) -> bool {
        !self.changes.is_empty()
    }

    /// Returns the recorded batch and starts a new one.
    pub fn capture_changes(&mut self) -> ListChangeSet<T> {
        core::mem::take(&mut self.changes)
    }

    /// Removes and returns the item at `index`, recording a `Remove`.
    pub fn remove_at(&mut self, index: usize) -> Result<T>
    where
        T: Clone,
    {
        self.check_index(index)?;
        let removed = self.items.remove(index);
        self.changes.push(ListChange::remove_at(removed.clone(), index));
        Ok(removed)
    }

    /// Removes every item, recording one `Clear` carrying them.
    pub fn clear(&mut self) {
        if self.items.is_empty() {
            return;
        }
        let removed = core::mem::take(&mut self.items);
        self.changes.push(ListChange::clear(removed));
    }

    #[inline]
    fn check_index(&self, index: usize) -> Result<()> {
        if index < self.items.len() {
            Ok(())
        } else {
            Err(Error::index_out_of_range(index, self.items.len()))
        }
    }

    #[inline]
    fn check_insert_index(&self, index: usize) -> Result<()> {
        if index <= self.items.len() {
            Ok(())
        } else {
            Err(Error::index_out_of_range(index, self.items.len()))
        }
    }
}

impl<T: Clone> ChangeAwareList<T> {
    /// Creates a list holding `items`, with nothing recorded.
    pub fn from_vec(items: Vec<T>) -> Self {
        Self {
            items,
            changes: ListChangeSet::new(),
        }
    }

    /// Returns a copy of the items.
    pub fn to_vec(&self) -> Vec<T> {
        self.items.clone()
    }

    /// Appends an item, recording an `Add` at the end.
    pub fn add(&mut self, item: T) {
        let index = self.items.len();
        self.changes.push(ListChange::add_at(item.clone(), index));
        self.items.push(item);
    }

    /// Inserts an item at `index`, shifting later items.
    pub fn insert(&mut self, index: usize, item: T) -> Result<()> {
        self.check_insert_index(index)?;
        self.changes.push(ListChange::add_at(item.clone(), index));
        self.items.insert(index, item);
        Ok(())
    }

    /// Appends `items`, recording one `AddRange`.
    pub fn add_range<I>(&mut self, items: I)
    where
        I: IntoIterator<Item = T>,
    {
        let index = self.items.len();
        self.splice_in(items, index);
    }

    /// Inserts `items` starting at `index`, recording one `AddRange`.
    pub fn insert_range<I>(&mut self, items: I, index: usize) -> Result<()>
    where
        I: IntoIterator<Item = T>,
    {
        self.check_insert_index(index)?;
        self.splice_in(items, index);
        Ok(())
    }

    /// Inserts `items` at an index already known to be in `0..=len`.
    fn splice_in<I>(&mut self, items: I, index: usize)
    where
        I: IntoIterator<Item = T>,
    {
        let added: Vec<T> = items.into_iter().collect();
        if added.is_empty() {
            return;
        }
        self.items.splice(index..index, added.iter().cloned());
        self.changes.push(ListChange::add_range(added, index));
    }

    /// Removes `count` items starting at `index`, recording one `RemoveRange`.
    pub fn remove_range(&mut self, index: usize, count: usize) -> Result<()> {
        let end = index
            .checked_add(count)
            .filter(|end| *end <= self.items.len())
            .ok_or_else(|| Error::index_out_of_range(index.saturating_add(count), self.items.len()))?;
        if count == 0 {
            return Ok(());
        }
        let removed: Vec<T> = self.items.drain(index..end).collect();
        self.changes.push(ListChange::remove_range(removed, index));
        Ok(())
    }

    /// Overwrites the item at `index`, recording a `Replace` with the old item.
    pub fn set_item(&mut self, index: usize, item: T) -> Result<T> {
        self.check_index(index)?;
        let previous = core::mem::replace(&mut self.items[index], item.clone());
        self.changes
            .push(ListChange::replace_at(item, previous.clone(), index));
        Ok(previous)
    }

    /// Moves the item at `from` to `to`, recording one `Moved`.
    ///
    /// `to` is the final position of the item. Moving to the same position
    /// records nothing.
    pub fn move_item(&mut self, from: usize, to: usize) -> Result<()> {
        self.check_index(from)?;
        self.check_index(to)?;
        if from == to {
            return Ok(());
        }
        let item = self.items.remove(from);
        self.items.insert(to, item.clone());
        self.changes.push(ListChange::moved(item, to, from)?);
        Ok(())
    }

    /// Records a `Refresh` for the item at `index` without mutating it.
    pub fn refresh_at(&mut self, index: usize) -> Result<()> {
        self.check_index(index)?;
        self.changes
            .push(ListChange::refresh_at(self.items[index].clone(), index));
        Ok(())
    }

    /// Replays a change set produced by another list.
    ///
    /// Changes apply in order and stop at the first one that does not fit
    /// this list; the ones before it stay applied and recorded.
    pub fn clone_changes(&mut self, changes: &ListChangeSet<T>) -> Result<()> {
        for change in changes {
            match change {
                ListChange::Item(item) => {
                    let index = item.current_index;
                    match item.reason {
                        ListChangeReason::Add => match index {
                            Some(index) => self.insert(index, item.current.clone())?,
                            None => self.add(item.current.clone()),
                        },
                        ListChangeReason::Replace => {
                            self.set_item(require_index(index)?, item.current.clone())?;
                        }
                        ListChangeReason::Remove => {
                            self.remove_at(require_index(index)?)?;
                        }
                        ListChangeReason::Refresh => self.refresh_at(require_index(index)?)?,
                        ListChangeReason::Moved => {
                            let from = require_index(item.previous_index)?;
                            self.move_item(from, require_index(index)?)?;
                        }
                        ListChangeReason::AddRange
                        | ListChangeReason::RemoveRange
                        | ListChangeReason::Clear => {
                            return Err(Error::invalid_argument(
                                "range reason on an item change",
                            ));
                        }
                    }
                }
                ListChange::Range(range) => match range.reason {
                    ListChangeReason::AddRange => match range.index {
                        Some(index) => self.insert_range(range.items.iter().cloned(), index)?,
                        None => self.add_range(range.items.iter().cloned()),
                    },
                    ListChangeReason::RemoveRange => {
                        self.remove_range(require_index(range.index)?, range.items.len())?;
                    }
                    ListChangeReason::Clear => self.clear(),
                    _ => {
                        return Err(Error::invalid_argument("item reason on a range change"));
                    }
                },
            }
        }
        Ok(())
    }
}

impl<T: Clone + PartialEq> ChangeAwareList<T> {
    /// Returns the position of the first item equal to `item`.
    pub fn index_of(&self, item: &T) -> Option<usize> {
        self.items.iter().position(|x| x == item)
    }

    /// Removes the first item equal to `item`. Returns false if none matched.
    pub fn remove(&mut self, item: &T) -> bool {
        match self.index_of(item) {
            Some(index) => self.remove_at(index).is_ok(),
            None => false,
        }
    }
}

fn require_index(index: Option<usize>) -> Result<usize> {
    index.ok_or_else(|| Error::invalid_argument("change does not carry an index"))
}
