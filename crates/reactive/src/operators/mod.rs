//! Derived collections maintained incrementally from upstream streams.
//!
//! - `FullJoin` / `LeftJoin`: keyed joins of two streams
//! - `ImmutableGroups`: grouping into immutable snapshots
//! - `LeftJoinMany`: left join of a stream with the groups of another

mod group;
mod join;
mod serial;

pub use group::{ImmutableGroups, LeftJoinMany};
pub use join::{FullJoin, LeftJoin};
