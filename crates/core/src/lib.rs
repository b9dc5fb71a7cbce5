//! Rivulet Core - Change model for live-editable collections.
//!
//! This crate provides the vocabulary shared by every Rivulet collection:
//!
//! - `Change` / `ChangeSet`: what happened to a keyed collection in one edit
//! - `ListChange` / `ListChangeSet`: positional changes, including ranges and moves
//! - `Error`: error types for construction and collection operations
//!
//! # Example
//!
//! ```rust
//! use rivulet_core::{Change, ChangeReason, ChangeSet};
//!
//! let mut changes = ChangeSet::new();
//! changes.push(Change::add(1, "a"));
//! changes.push(Change::update(1, "b", "a"));
//!
//! assert_eq!(changes.adds(), 1);
//! assert_eq!(changes.updates(), 1);
//!
//! // Inconsistent combinations are rejected
//! assert!(Change::new(ChangeReason::Update, 1, "b").is_err());
//! ```

#![no_std]

extern crate alloc;

mod change;
mod change_set;
mod error;
mod list_change;
mod list_change_set;

pub use change::{Change, ChangeReason};
pub use change_set::ChangeSet;
pub use error::{Error, Result};
pub use list_change::{ChangeType, ItemChange, ListChange, ListChangeReason, RangeChange};
pub use list_change_set::ListChangeSet;
