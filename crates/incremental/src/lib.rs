//! Rivulet Incremental - Change-aware stores.
//!
//! Every store in this crate records the mutations made to it and hands them
//! out as one batch on `capture_changes`. Replaying a captured batch into a
//! copy of the original state reproduces the current state.
//!
//! - `ChangeAwareCache<K, V>`: keyed store recording a `ChangeSet<K, V>`
//! - `ChangeAwareList<T>`: ordered store recording a `ListChangeSet<T>`
//! - `Group<K, V, G>`: an immutable snapshot of the members sharing a group key
//!
//! # Example
//!
//! ```rust
//! use rivulet_incremental::ChangeAwareCache;
//!
//! let mut cache = ChangeAwareCache::new();
//! cache.add_or_update(1, "a");
//! cache.add_or_update(1, "b");
//! cache.remove(&1);
//!
//! let changes = cache.capture_changes();
//! assert_eq!(changes.adds(), 1);
//! assert_eq!(changes.updates(), 1);
//! assert_eq!(changes.removes(), 1);
//! assert!(cache.capture_changes().is_empty());
//! ```

#![no_std]

extern crate alloc;

mod cache;
mod group;
mod list;

pub use cache::ChangeAwareCache;
pub use group::Group;
pub use list::ChangeAwareList;
