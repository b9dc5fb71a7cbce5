//! Keyed change type.
//!
//! A `Change` describes one mutation of a keyed collection: what happened
//! (`ChangeReason`), to which key, the value afterwards and, for updates,
//! the value before.

use crate::error::{Error, Result};
use core::fmt;

/// The reason a keyed change was recorded.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ChangeReason {
    /// The key was not present and now is.
    Add,
    /// The key was present and its value was replaced.
    Update,
    /// The key was removed.
    Remove,
    /// Downstream operators should re-evaluate the value; nothing was mutated.
    Refresh,
    /// The value changed position. Only sorted or ordered views emit this.
    Moved,
}

impl fmt::Display for ChangeReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ChangeReason::Add => "Add",
            ChangeReason::Update => "Update",
            ChangeReason::Remove => "Remove",
            ChangeReason::Refresh => "Refresh",
            ChangeReason::Moved => "Moved",
        };
        f.write_str(name)
    }
}

/// A single change to a keyed collection.
///
/// Equality is structural over every field.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Change<K, V> {
    reason: ChangeReason,
    key: K,
    current: V,
    previous: Option<V>,
    current_index: Option<usize>,
    previous_index: Option<usize>,
}

impl<K, V> Change<K, V> {
    /// Creates a change without a previous value.
    ///
    /// `Update` needs a previous value and `Moved` needs indices, so both are
    /// rejected here; use [`Change::try_new`] or [`Change::moved`].
    pub fn new(reason: ChangeReason, key: K, current: V) -> Result<Self> {
        Self::try_new(reason, key, current, None, None, None)
    }

    /// Creates a change from every field, validating the combination.
    pub fn try_new(
        reason: ChangeReason,
        key: K,
        current: V,
        previous: Option<V>,
        current_index: Option<usize>,
        previous_index: Option<usize>,
    ) -> Result<Self> {
        match reason {
            ChangeReason::Add if previous.is_some() => {
                return Err(Error::invalid_argument(
                    "an Add change cannot carry a previous value",
                ));
            }
            ChangeReason::Update if previous.is_none() => {
                return Err(Error::invalid_argument(
                    "an Update change must carry a previous value",
                ));
            }
            ChangeReason::Moved => {
                if previous.is_some() {
                    return Err(Error::invalid_argument(
                        "a Moved change carries a previous index, not a previous value",
                    ));
                }
                match (current_index, previous_index) {
                    (Some(cur), Some(prev)) if cur != prev => {}
                    (Some(_), Some(_)) => {
                        return Err(Error::invalid_argument(
                            "a Moved change requires different current and previous indices",
                        ));
                    }
                    _ => {
                        return Err(Error::invalid_argument(
                            "a Moved change requires both current and previous indices",
                        ));
                    }
                }
            }
            _ => {}
        }

        Ok(Self {
            reason,
            key,
            current,
            previous,
            current_index,
            previous_index,
        })
    }

    /// Creates a `Moved` change.
    pub fn moved(key: K, current: V, current_index: usize, previous_index: usize) -> Result<Self> {
        Self::try_new(
            ChangeReason::Moved,
            key,
            current,
            None,
            Some(current_index),
            Some(previous_index),
        )
    }

    /// Creates an `Add` change.
    #[inline]
    pub fn add(key: K, current: V) -> Self {
        Self::unchecked(ChangeReason::Add, key, current, None)
    }

    /// Creates an `Update` change.
    #[inline]
    pub fn update(key: K, current: V, previous: V) -> Self {
        Self::unchecked(ChangeReason::Update, key, current, Some(previous))
    }

    /// Creates a `Remove` change. `current` is the value that was removed.
    #[inline]
    pub fn remove(key: K, current: V) -> Self {
        Self::unchecked(ChangeReason::Remove, key, current, None)
    }

    /// Creates a `Refresh` change.
    #[inline]
    pub fn refresh(key: K, current: V) -> Self {
        Self::unchecked(ChangeReason::Refresh, key, current, None)
    }

    #[inline]
    fn unchecked(reason: ChangeReason, key: K, current: V, previous: Option<V>) -> Self {
        Self {
            reason,
            key,
            current,
            previous,
            current_index: None,
            previous_index: None,
        }
    }

    /// Returns the reason.
    #[inline]
    pub fn reason(&self) -> ChangeReason {
        self.reason
    }

    /// Returns the key.
    #[inline]
    pub fn key(&self) -> &K {
        &self.key
    }

    /// Returns the current value. For removals this is the removed value.
    #[inline]
    pub fn current(&self) -> &V {
        &self.current
    }

    /// Returns the previous value, only present for updates.
    #[inline]
    pub fn previous(&self) -> Option<&V> {
        self.previous.as_ref()
    }

    #[inline]
    pub fn current_index(&self) -> Option<usize> {
        self.current_index
    }

    #[inline]
    pub fn previous_index(&self) -> Option<usize> {
        self.previous_index
    }

    /// Consumes the change, returning the key and current value.
    #[inline]
    pub fn into_parts(self) -> (K, V) {
        (self.key, self.current)
    }

    /// Re-keys this change, keeping every other field.
    pub fn with_key<K2>(self, key: K2) -> Change<K2, V> {
        Change {
            reason: self.reason,
            key,
            current: self.current,
            previous: self.previous,
            current_index: self.current_index,
            previous_index: self.previous_index,
        }
    }
}

impl<K: fmt::Debug, V: fmt::Debug> fmt::Display for Change<K, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}, Key: {:?}, Current: {:?}, Previous: {:?}",
            self.reason, self.key, self.current, self.previous
        )
    }
}
