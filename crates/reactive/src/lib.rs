//! Rivulet Reactive - Observable collections and derived views.
//!
//! This crate turns the change-aware stores of `rivulet-incremental` into
//! live collections that publish every edit as one batch, and maintains
//! derived collections incrementally from those batches.
//!
//! # Core Concepts
//!
//! - `ChangeStream`: a push-based source of values, subscribed with a `Subscriber`
//! - `Subscription`: handle that detaches a subscriber when cancelled or dropped
//! - `Broadcaster`: a multicast source that values are pushed into
//! - `ObservableCache` / `ObservableList`: editable collections whose edits are observable
//!
//! # Operators
//!
//! - `FullJoin` / `LeftJoin`: keyed joins of two streams
//! - `ImmutableGroups`: grouping into immutable snapshots
//! - `LeftJoinMany`: left join of a stream with the groups of another
//!
//! # Example
//!
//! ```rust
//! use rivulet_reactive::{ChangeStream, FullJoin, ObservableCache};
//!
//! let people: ObservableCache<u32, &str> = ObservableCache::new();
//! let addresses: ObservableCache<u32, (u32, &str)> = ObservableCache::new();
//!
//! // addresses reference their person by the first tuple field
//! let join = FullJoin::new(&people, &addresses, |a: &(u32, &str)| a.0, |_, person, address| {
//!     (person.copied(), address.map(|a| a.1))
//! });
//!
//! people.edit(|s| s.add_or_update(1, "ann"));
//! addresses.edit(|s| s.add_or_update(10, (1, "harbour road")));
//!
//! assert_eq!(join.output().lookup(&1), Some((Some("ann"), Some("harbour road"))));
//! ```
//!
//! Logging goes through `tracing`; install a subscriber in the application to
//! see published batches and subscriber lifecycle events.

mod filter;
mod observable_cache;
mod observable_list;
pub mod operators;
mod stream;
mod subscription;

pub use filter::{ListFilter, Predicate, StaticFilter};
pub use observable_cache::{Connect, CountChanged, ObservableCache, Watch};
pub use observable_list::{ListConnect, ListCountChanged, ObservableList};
pub use operators::{FullJoin, ImmutableGroups, LeftJoin, LeftJoinMany};
pub use stream::{Broadcaster, ChangeStream, Terminal};
pub use subscription::{Subscriber, Subscription, SubscriptionId, SubscriptionManager};

// Re-export commonly used types from dependencies
pub use rivulet_core::{Change, ChangeReason, ChangeSet, Error, ListChange, ListChangeSet, Result};
pub use rivulet_incremental::{ChangeAwareCache, ChangeAwareList, Group};
