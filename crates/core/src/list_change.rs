//! Positional change types for ordered collections.
//!
//! A `ListChange` is either a single-item change carrying indices, or a range
//! change carrying a contiguous run of items and the index where it starts.

use crate::error::{Error, Result};
use alloc::vec::Vec;
use core::fmt;

/// The reason an ordered change was recorded.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ListChangeReason {
    Add,
    AddRange,
    /// An item was overwritten in place. The previous item is kept.
    Replace,
    Remove,
    RemoveRange,
    Refresh,
    Moved,
    Clear,
}

/// Whether a reason describes one item or a contiguous range.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ChangeType {
    Item,
    Range,
}

impl ListChangeReason {
    /// Returns whether this reason belongs to an item or a range change.
    pub fn change_type(self) -> ChangeType {
        match self {
            ListChangeReason::AddRange | ListChangeReason::RemoveRange | ListChangeReason::Clear => {
                ChangeType::Range
            }
            _ => ChangeType::Item,
        }
    }
}

impl fmt::Display for ListChangeReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// A change to a single item.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ItemChange<T> {
    pub reason: ListChangeReason,
    pub current: T,
    pub previous: Option<T>,
    pub current_index: Option<usize>,
    pub previous_index: Option<usize>,
}

/// A change to a contiguous run of items.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RangeChange<T> {
    pub reason: ListChangeReason,
    pub items: Vec<T>,
    /// Index of the first item, if known.
    pub index: Option<usize>,
}

impl<T> RangeChange<T> {
    #[inline]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

/// A single change to an ordered collection.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ListChange<T> {
    Item(ItemChange<T>),
    Range(RangeChange<T>),
}

impl<T> ListChange<T> {
    /// Creates an item change, validating the reason/value/index combination.
    pub fn item(
        reason: ListChangeReason,
        current: T,
        previous: Option<T>,
        current_index: Option<usize>,
        previous_index: Option<usize>,
    ) -> Result<Self> {
        if reason.change_type() == ChangeType::Range {
            return Err(Error::invalid_argument(
                "a range reason cannot be used for an item change",
            ));
        }
        match reason {
            ListChangeReason::Add if previous.is_some() => {
                return Err(Error::invalid_argument(
                    "an Add change cannot carry a previous value",
                ));
            }
            ListChangeReason::Replace if previous.is_none() => {
                return Err(Error::invalid_argument(
                    "a Replace change must carry a previous value",
                ));
            }
            ListChangeReason::Refresh if current_index.is_none() => {
                return Err(Error::invalid_argument("a Refresh change must carry an index"));
            }
            ListChangeReason::Moved => {
                return match (current_index, previous_index, previous) {
                    (Some(to), Some(from), None) => Self::moved(current, to, from),
                    _ => Err(Error::invalid_argument(
                        "a Moved change requires both indices and no previous value",
                    )),
                };
            }
            _ => {}
        }

        Ok(ListChange::Item(ItemChange {
            reason,
            current,
            previous,
            current_index,
            previous_index,
        }))
    }

    /// Creates a range change.
    pub fn range(reason: ListChangeReason, items: Vec<T>, index: Option<usize>) -> Result<Self> {
        if reason.change_type() != ChangeType::Range {
            return Err(Error::invalid_argument(
                "an item reason cannot be used for a range change",
            ));
        }
        if matches!(reason, ListChangeReason::AddRange | ListChangeReason::RemoveRange)
            && index.is_none()
        {
            return Err(Error::invalid_argument(
                "AddRange and RemoveRange must carry a start index",
            ));
        }
        Ok(ListChange::Range(RangeChange {
            reason,
            items,
            index,
        }))
    }

    /// Creates a `Moved` change. The two indices must differ.
    pub fn moved(current: T, current_index: usize, previous_index: usize) -> Result<Self> {
        if current_index == previous_index {
            return Err(Error::invalid_argument(
                "a Moved change requires different current and previous indices",
            ));
        }
        Ok(ListChange::Item(ItemChange {
            reason: ListChangeReason::Moved,
            current,
            previous: None,
            current_index: Some(current_index),
            previous_index: Some(previous_index),
        }))
    }

    /// Creates an `Add` at `index`.
    pub fn add_at(current: T, index: usize) -> Self {
        ListChange::Item(ItemChange {
            reason: ListChangeReason::Add,
            current,
            previous: None,
            current_index: Some(index),
            previous_index: None,
        })
    }

    /// Creates a `Remove` of the item that was at `index`.
    pub fn remove_at(current: T, index: usize) -> Self {
        ListChange::Item(ItemChange {
            reason: ListChangeReason::Remove,
            current,
            previous: None,
            current_index: Some(index),
            previous_index: None,
        })
    }

    /// Creates a `Replace` of the item at `index`.
    pub fn replace_at(current: T, previous: T, index: usize) -> Self {
        ListChange::Item(ItemChange {
            reason: ListChangeReason::Replace,
            current,
            previous: Some(previous),
            current_index: Some(index),
            previous_index: Some(index),
        })
    }

    pub fn refresh_at(current: T, index: usize) -> Self {
        ListChange::Item(ItemChange {
            reason: ListChangeReason::Refresh,
            current,
            previous: None,
            current_index: Some(index),
            previous_index: None,
        })
    }

    /// Creates an `AddRange` starting at `index`.
    pub fn add_range(items: Vec<T>, index: usize) -> Self {
        ListChange::Range(RangeChange {
            reason: ListChangeReason::AddRange,
            items,
            index: Some(index),
        })
    }

    /// Creates a `RemoveRange` of the items that started at `index`.
    pub fn remove_range(items: Vec<T>, index: usize) -> Self {
        ListChange::Range(RangeChange {
            reason: ListChangeReason::RemoveRange,
            items,
            index: Some(index),
        })
    }

    /// Creates a `Clear` carrying every removed item.
    pub fn clear(items: Vec<T>) -> Self {
        ListChange::Range(RangeChange {
            reason: ListChangeReason::Clear,
            items,
            index: None,
        })
    }

    /// Returns the reason.
    #[inline]
    pub fn reason(&self) -> ListChangeReason {
        match self {
            ListChange::Item(item) => item.reason,
            ListChange::Range(range) => range.reason,
        }
    }

    #[inline]
    pub fn change_type(&self) -> ChangeType {
        self.reason().change_type()
    }

    /// Returns the item change, if this is one.
    #[inline]
    pub fn as_item(&self) -> Option<&ItemChange<T>> {
        match self {
            ListChange::Item(item) => Some(item),
            ListChange::Range(_) => None,
        }
    }

    /// Returns the range change, if this is one.
    #[inline]
    pub fn as_range(&self) -> Option<&RangeChange<T>> {
        match self {
            ListChange::Item(_) => None,
            ListChange::Range(range) => Some(range),
        }
    }

    /// Number of elements this change touches.
    #[inline]
    pub fn element_count(&self) -> usize {
        match self {
            ListChange::Item(_) => 1,
            ListChange::Range(range) => range.items.len(),
        }
    }
}

impl<T: fmt::Debug> fmt::Display for ListChange<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ListChange::Item(item) => write!(
                f,
                "{}. Current: {:?}, Previous: {:?}",
                item.reason, item.current, item.previous
            ),
            ListChange::Range(range) => write!(f, "{}. {} changes", range.reason, range.items.len()),
        }
    }
}
