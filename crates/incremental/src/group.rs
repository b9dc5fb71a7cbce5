//! Immutable group snapshots.

use alloc::sync::Arc;
use core::fmt;
use core::hash::Hash;
use hashbrown::hash_map;
use hashbrown::HashMap;

/// A group key paired with a point-in-time snapshot of its members.
///
/// A group never changes after construction. When membership changes a new
/// group is built, so a snapshot handed to a consumer stays valid forever.
/// Cloning is cheap: the member map is shared.
pub struct Group<K, V, G> {
    key: G,
    items: Arc<HashMap<K, V>>,
}

impl<K, V, G> Group<K, V, G> {
    /// Creates a group from its key and members.
    pub fn new(key: G, items: HashMap<K, V>) -> Self {
        Self {
            key,
            items: Arc::new(items),
        }
    }

    /// Creates the empty group for `key`.
    pub fn empty(key: G) -> Self {
        Self::new(key, HashMap::new())
    }

    #[inline]
    pub fn key(&self) -> &G {
        &self.key
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
    pub fn iter(&self) -> hash_map::Iter<'_, K, V> {
        self.items.iter()
    }

    #[inline]
    pub fn keys(&self) -> hash_map::Keys<'_, K, V> {
        self.items.keys()
    }

    #[inline]
    pub fn values(&self) -> hash_map::Values<'_, K, V> {
        self.items.values()
    }

    /// Returns true if both groups share the same member snapshot.
    #[inline]
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.items, &other.items)
    }
}

impl<K: Eq + Hash, V, G> Group<K, V, G> {
    #[inline]
    pub fn lookup(&self, key: &K) -> Option<&V> {
        self.items.get(key)
    }

    #[inline]
    pub fn contains_key(&self, key: &K) -> bool {
        self.items.contains_key(key)
    }
}

impl<K, V, G: Clone> Clone for Group<K, V, G> {
    fn clone(&self) -> Self {
        Self {
            key: self.key.clone(),
            items: Arc::clone(&self.items),
        }
    }
}

impl<K, V, G> PartialEq for Group<K, V, G>
where
    K: Eq + Hash,
    V: PartialEq,
    G: PartialEq,
{
    fn eq(&self, other: &Self) -> bool {
        self.key == other.key && (self.ptr_eq(other) || self.items == other.items)
    }
}

impl<K, V, G> fmt::Debug for Group<K, V, G>
where
    K: fmt::Debug,
    V: fmt::Debug,
    G: fmt::Debug,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Group")
            .field("key", &self.key)
            .field("items", &self.items)
            .finish()
    }
}

impl<K, V, G: fmt::Display> fmt::Display for Group<K, V, G> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Group: {} ({} items)", self.key, self.items.len())
    }
}
