//! Observable keyed cache.
//!
//! An `ObservableCache` wraps a `ChangeAwareCache` and publishes the batch of
//! changes recorded by each `edit` to every connected subscriber.
//!
//! Locking follows one order everywhere: the write lock, then the broadcast
//! lock, then the store lock. Attaching a subscriber holds the broadcast lock
//! while it reads the snapshot and registers, so no batch can be missed or
//! delivered twice.

use crate::filter::{Predicate, StaticFilter};
use crate::stream::{Broadcaster, ChangeStream, Terminal};
use crate::subscription::{Subscriber, Subscription};
use parking_lot::{Mutex, ReentrantMutex, RwLock};
use rivulet_core::{Change, ChangeSet, Error};
use rivulet_incremental::ChangeAwareCache;
use std::hash::Hash;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use tracing::{debug, trace, warn};

struct CacheInner<K, V> {
    write_lock: ReentrantMutex<()>,
    broadcast_lock: ReentrantMutex<()>,
    store: RwLock<ChangeAwareCache<K, V>>,
    changes: Broadcaster<ChangeSet<K, V>>,
    counts: Broadcaster<usize>,
    upstream: Mutex<Option<Subscription>>,
    disposed: AtomicBool,
}

/// A keyed collection whose edits are observable.
///
/// Cloning produces another handle to the same cache.
pub struct ObservableCache<K, V> {
    inner: Arc<CacheInner<K, V>>,
}

impl<K, V> Clone for ObservableCache<K, V> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<K, V> Default for ObservableCache<K, V>
where
    K: Eq + Hash + Clone + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<K, V> ObservableCache<K, V>
where
    K: Eq + Hash + Clone + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    /// Creates an empty cache.
    pub fn new() -> Self {
        Self::from_store(ChangeAwareCache::new())
    }

    /// Creates an empty cache sized for `capacity` items.
    pub fn with_capacity(capacity: usize) -> Self {
        Self::from_store(ChangeAwareCache::with_capacity(capacity))
    }

    fn from_store(store: ChangeAwareCache<K, V>) -> Self {
        Self {
            inner: Arc::new(CacheInner {
                write_lock: ReentrantMutex::new(()),
                broadcast_lock: ReentrantMutex::new(()),
                store: RwLock::new(store),
                changes: Broadcaster::new(),
                counts: Broadcaster::new(),
                upstream: Mutex::new(None),
                disposed: AtomicBool::new(false),
            }),
        }
    }

    /// Creates a cache that mirrors an upstream stream of change sets.
    ///
    /// Each upstream batch is applied as one edit. Upstream errors and
    /// completion terminate every stream of this cache.
    pub fn from_stream<S>(source: &S) -> Self
    where
        S: ChangeStream<ChangeSet<K, V>> + ?Sized,
    {
        let cache = Self::new();
        let on_next: Weak<CacheInner<K, V>> = Arc::downgrade(&cache.inner);
        let on_error = on_next.clone();
        let on_completed = on_next.clone();

        let subscriber = Subscriber::new(move |changes: &ChangeSet<K, V>| {
            if let Some(inner) = on_next.upgrade() {
                ObservableCache { inner }.edit(|store| store.clone_changes(changes));
            }
        })
        .on_error(move |error| {
            if let Some(inner) = on_error.upgrade() {
                ObservableCache { inner }.fail(error.clone());
            }
        })
        .on_completed(move || {
            if let Some(inner) = on_completed.upgrade() {
                ObservableCache { inner }.complete();
            }
        });

        let upstream = source.subscribe(subscriber);
        *cache.inner.upstream.lock() = Some(upstream);
        debug!("cache attached to upstream");
        cache
    }

    /// Runs `f` against the store and publishes the changes it recorded.
    ///
    /// Edits are serialized. Every change recorded by `f` is published as a
    /// single batch, followed by the new count; nothing is published when `f`
    /// recorded nothing. `f` must not read this cache through another handle.
    ///
    /// Changes are not rolled back if `f` returns early with an error: the
    /// batch recorded so far is still published.
    pub fn edit<F, R>(&self, f: F) -> R
    where
        F: FnOnce(&mut ChangeAwareCache<K, V>) -> R,
    {
        let inner = &*self.inner;
        let _write = inner.write_lock.lock();
        let _broadcast = inner.broadcast_lock.lock();

        let (result, changes, count) = {
            let mut store = inner.store.write();
            let result = f(&mut store);
            (result, store.capture_changes(), store.len())
        };

        if !changes.is_empty() && !inner.disposed.load(Ordering::Acquire) {
            trace!(
                changes = changes.len(),
                adds = changes.adds(),
                updates = changes.updates(),
                removes = changes.removes(),
                refreshes = changes.refreshes(),
                "publishing cache changes"
            );
            inner.changes.publish(&changes);
            inner.counts.publish(&count);
        }
        result
    }

    /// Connects to all changes, starting with the current contents as adds.
    pub fn connect(&self) -> Connect<K, V> {
        Connect {
            inner: Arc::clone(&self.inner),
            filter: None,
            snapshot: true,
        }
    }

    /// Connects to the changes of the items matching `predicate`.
    ///
    /// The predicate is re-evaluated on every change, so an update that
    /// stops matching is delivered as a removal.
    pub fn connect_filtered<P>(&self, predicate: P) -> Connect<K, V>
    where
        P: Fn(&V) -> bool + Send + Sync + 'static,
    {
        Connect {
            inner: Arc::clone(&self.inner),
            filter: Some(Arc::new(predicate)),
            snapshot: true,
        }
    }

    /// Like `connect`, without the initial snapshot.
    pub fn preview(&self) -> Connect<K, V> {
        Connect {
            inner: Arc::clone(&self.inner),
            filter: None,
            snapshot: false,
        }
    }

    /// Like `connect_filtered`, without the initial snapshot.
    pub fn preview_filtered<P>(&self, predicate: P) -> Connect<K, V>
    where
        P: Fn(&V) -> bool + Send + Sync + 'static,
    {
        Connect {
            inner: Arc::clone(&self.inner),
            filter: Some(Arc::new(predicate)),
            snapshot: false,
        }
    }

    /// Watches a single key: its current value as an add, then its changes.
    pub fn watch(&self, key: K) -> Watch<K, V> {
        Watch {
            inner: Arc::clone(&self.inner),
            key,
        }
    }

    /// The current count followed by every distinct change to it.
    pub fn count_changed(&self) -> CountChanged<K, V> {
        CountChanged {
            inner: Arc::clone(&self.inner),
        }
    }

    /// Returns a copy of the value stored under `key`.
    pub fn lookup(&self, key: &K) -> Option<V> {
        self.inner.store.read().try_get(key)
    }

    /// Same as `lookup`.
    #[inline]
    pub fn try_get(&self, key: &K) -> Option<V> {
        self.lookup(key)
    }

    pub fn contains_key(&self, key: &K) -> bool {
        self.inner.store.read().contains_key(key)
    }

    pub fn count(&self) -> usize {
        self.inner.store.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.store.read().is_empty()
    }

    pub fn keys(&self) -> Vec<K> {
        self.inner.store.read().keys().cloned().collect()
    }

    pub fn items(&self) -> Vec<(K, V)> {
        self.inner
            .store
            .read()
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }

    /// Terminates every stream of this cache with `error`.
    pub fn fail(&self, error: Error) {
        warn!(%error, "cache failed");
        let _broadcast = self.inner.broadcast_lock.lock();
        self.inner.changes.fail(error.clone());
        self.inner.counts.fail(error);
    }

    /// Completes every stream of this cache.
    pub fn complete(&self) {
        let _broadcast = self.inner.broadcast_lock.lock();
        self.inner.changes.complete();
        self.inner.counts.complete();
    }

    /// Completes every stream and detaches from the upstream, if any.
    ///
    /// Later edits still change the store but publish nothing. Calling
    /// `dispose` again does nothing.
    pub fn dispose(&self) {
        if self.inner.disposed.swap(true, Ordering::AcqRel) {
            return;
        }
        debug!("disposing cache");
        self.complete();
        let upstream = self.inner.upstream.lock().take();
        drop(upstream);
    }

    #[inline]
    pub fn is_disposed(&self) -> bool {
        self.inner.disposed.load(Ordering::Acquire)
    }

    /// How the cache's streams ended, if they have.
    pub fn terminal(&self) -> Option<Terminal> {
        self.inner.changes.terminal()
    }
}

impl<K, V> ChangeStream<ChangeSet<K, V>> for ObservableCache<K, V>
where
    K: Eq + Hash + Clone + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    fn subscribe(&self, subscriber: Subscriber<ChangeSet<K, V>>) -> Subscription {
        self.connect().subscribe(subscriber)
    }
}

/// Stream of a cache's change sets, optionally filtered.
pub struct Connect<K, V> {
    inner: Arc<CacheInner<K, V>>,
    filter: Option<Predicate<V>>,
    snapshot: bool,
}

impl<K, V> ChangeStream<ChangeSet<K, V>> for Connect<K, V>
where
    K: Eq + Hash + Clone + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    fn subscribe(&self, subscriber: Subscriber<ChangeSet<K, V>>) -> Subscription {
        let inner = &*self.inner;
        let _broadcast = inner.broadcast_lock.lock();
        if inner.changes.is_terminated() {
            return inner.changes.subscribe(subscriber);
        }

        match &self.filter {
            None => {
                if self.snapshot {
                    let initial: ChangeSet<K, V> = inner
                        .store
                        .read()
                        .iter()
                        .map(|(k, v)| Change::add(k.clone(), v.clone()))
                        .collect();
                    if !initial.is_empty() {
                        subscriber.next(&initial);
                    }
                }
                inner.changes.subscribe(subscriber)
            }
            Some(predicate) => {
                let mut filter = StaticFilter::new(Arc::clone(predicate));
                let initial = {
                    let store = inner.store.read();
                    filter.initial(store.iter())
                };
                if self.snapshot && !initial.is_empty() {
                    subscriber.next(&initial);
                }

                let filter = Mutex::new(filter);
                let forward = Subscriber::forwarding(Arc::new(subscriber), move |sub, changes: &ChangeSet<K, V>| {
                    let filtered = filter.lock().process(changes);
                    if !filtered.is_empty() {
                        sub.next(&filtered);
                    }
                });
                inner.changes.subscribe(forward)
            }
        }
    }
}

/// Stream of the changes to one key.
pub struct Watch<K, V> {
    inner: Arc<CacheInner<K, V>>,
    key: K,
}

impl<K, V> ChangeStream<Change<K, V>> for Watch<K, V>
where
    K: Eq + Hash + Clone + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    fn subscribe(&self, subscriber: Subscriber<Change<K, V>>) -> Subscription {
        let inner = &*self.inner;
        let _broadcast = inner.broadcast_lock.lock();
        if let Some(terminal) = inner.changes.terminal() {
            match terminal {
                Terminal::Completed => subscriber.completed(),
                Terminal::Failed(error) => subscriber.error(&error),
            }
            return Subscription::empty();
        }

        let current = inner.store.read().try_get(&self.key);
        if let Some(value) = current {
            subscriber.next(&Change::add(self.key.clone(), value));
        }

        let key = self.key.clone();
        let forward = Subscriber::forwarding(Arc::new(subscriber), move |sub, changes: &ChangeSet<K, V>| {
            for change in changes.iter().filter(|change| *change.key() == key) {
                sub.next(change);
            }
        });
        inner.changes.subscribe(forward)
    }
}

/// Stream of a cache's count, distinct values only.
pub struct CountChanged<K, V> {
    inner: Arc<CacheInner<K, V>>,
}

impl<K, V> ChangeStream<usize> for CountChanged<K, V>
where
    K: Eq + Hash + Clone + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    fn subscribe(&self, subscriber: Subscriber<usize>) -> Subscription {
        let inner = &*self.inner;
        let _broadcast = inner.broadcast_lock.lock();
        if inner.counts.is_terminated() {
            return inner.counts.subscribe(subscriber);
        }

        let current = inner.store.read().len();
        subscriber.next(&current);

        let last = Mutex::new(current);
        let forward = Subscriber::forwarding(Arc::new(subscriber), move |sub, count: &usize| {
            let mut last = last.lock();
            if *last != *count {
                *last = *count;
                sub.next(count);
            }
        });
        inner.counts.subscribe(forward)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rivulet_core::ChangeReason;

    type Batches<K, V> = Arc<Mutex<Vec<ChangeSet<K, V>>>>;

    fn make_recorder<K, V>() -> (Batches<K, V>, Subscriber<ChangeSet<K, V>>)
    where
        K: Send + Sync + Clone + 'static,
        V: Send + Sync + Clone + 'static,
    {
        let batches = Arc::new(Mutex::new(Vec::new()));
        let clone = Arc::clone(&batches);
        let sub = Subscriber::new(move |cs: &ChangeSet<K, V>| clone.lock().push(cs.clone()));
        (batches, sub)
    }

    fn make_cache() -> ObservableCache<i32, &'static str> {
        let cache = ObservableCache::new();
        cache.edit(|store| {
            store.add_or_update(1, "a");
            store.add_or_update(2, "b");
        });
        cache
    }

    #[test]
    fn test_cache_connect_snapshot_then_live() {
        let cache = make_cache();
        let (batches, sub) = make_recorder();
        let _handle = cache.connect().subscribe(sub);

        cache.edit(|store| store.add_or_update(3, "c"));

        let batches = batches.lock();
        assert_eq!(batches.len(), 2);
        assert_eq!(batches[0].adds(), 2);
        assert_eq!(batches[1].as_slice(), &[Change::add(3, "c")]);
    }

    #[test]
    fn test_cache_connect_empty_has_no_snapshot() {
        let cache: ObservableCache<i32, i32> = ObservableCache::new();
        let (batches, sub) = make_recorder();
        let _handle = cache.connect().subscribe(sub);
        assert!(batches.lock().is_empty());
    }

    #[test]
    fn test_cache_one_edit_one_batch() {
        let cache = ObservableCache::new();
        let (batches, sub) = make_recorder();
        let _handle = cache.preview().subscribe(sub);

        cache.edit(|store| {
            store.add_or_update(1, 10);
            store.add_or_update(1, 11);
            store.remove(&1);
        });
        cache.edit(|store| {
            store.remove(&42);
        });

        let batches = batches.lock();
        assert_eq!(batches.len(), 1);
        assert_eq!(batches[0].len(), 3);
    }

    #[test]
    fn test_cache_edit_returns_value() {
        let cache: ObservableCache<i32, i32> = ObservableCache::new();
        let removed = cache.edit(|store| {
            store.add_or_update(1, 1);
            store.remove(&1)
        });
        assert!(removed);
        assert_eq!(cache.count(), 0);
    }

    #[test]
    fn test_cache_edit_not_atomic() {
        let cache: ObservableCache<i32, i32> = ObservableCache::new();
        let (batches, sub) = make_recorder();
        let _handle = cache.preview().subscribe(sub);

        let result: rivulet_core::Result<()> = cache.edit(|store| {
            store.add_or_update(1, 1);
            if store.contains_key(&1) {
                return Err(Error::invalid_argument("stop"));
            }
            store.add_or_update(2, 2);
            Ok(())
        });

        assert!(result.is_err());
        assert_eq!(cache.keys(), vec![1]);
        assert_eq!(batches.lock()[0].as_slice(), &[Change::add(1, 1)]);
    }

    #[test]
    fn test_cache_connect_filtered() {
        let cache = ObservableCache::new();
        cache.edit(|store| {
            store.add_or_update(1, 2);
            store.add_or_update(2, 3);
        });

        let (batches, sub) = make_recorder();
        let _handle = cache.connect_filtered(|v: &i32| v % 2 == 0).subscribe(sub);

        cache.edit(|store| store.add_or_update(1, 5));
        cache.edit(|store| store.add_or_update(2, 3));

        let batches = batches.lock();
        assert_eq!(batches.len(), 2);
        assert_eq!(batches[0].as_slice(), &[Change::add(1, 2)]);
        assert_eq!(batches[1].as_slice(), &[Change::remove(1, 2)]);
    }

    #[test]
    fn test_cache_watch() {
        let cache = make_cache();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let seen_clone = Arc::clone(&seen);
        let _handle = cache
            .watch(1)
            .subscribe_fn(move |change: &Change<i32, &str>| seen_clone.lock().push(change.clone()));

        cache.edit(|store| {
            store.add_or_update(2, "x");
            store.add_or_update(1, "z");
        });
        cache.edit(|store| {
            store.remove(&1);
        });

        let seen = seen.lock();
        assert_eq!(seen.len(), 3);
        assert_eq!(seen[0], Change::add(1, "a"));
        assert_eq!(seen[1], Change::update(1, "z", "a"));
        assert_eq!(seen[2].reason(), ChangeReason::Remove);
    }

    #[test]
    fn test_cache_count_changed_distinct() {
        let cache = make_cache();
        let counts = Arc::new(Mutex::new(Vec::new()));
        let counts_clone = Arc::clone(&counts);
        let _handle = cache
            .count_changed()
            .subscribe_fn(move |count: &usize| counts_clone.lock().push(*count));

        cache.edit(|store| store.add_or_update(3, "c"));
        cache.edit(|store| store.add_or_update(3, "d"));
        cache.edit(|store| store.refresh_all());
        cache.edit(|store| {
            store.remove(&1);
        });

        assert_eq!(*counts.lock(), vec![2, 3, 2]);
    }

    #[test]
    fn test_cache_reads() {
        let cache = make_cache();
        assert_eq!(cache.lookup(&1), Some("a"));
        assert_eq!(cache.try_get(&3), None);
        assert!(cache.contains_key(&2));
        assert_eq!(cache.count(), 2);

        let mut keys = cache.keys();
        keys.sort();
        assert_eq!(keys, vec![1, 2]);

        let mut items = cache.items();
        items.sort();
        assert_eq!(items, vec![(1, "a"), (2, "b")]);
    }

    #[test]
    fn test_cache_dispose() {
        let cache = make_cache();
        let completions = Arc::new(Mutex::new(0));
        let c1 = Arc::clone(&completions);
        let _handle = cache.connect().subscribe(Subscriber::new(|_| {}).on_completed(move || *c1.lock() += 1));

        cache.dispose();
        cache.dispose();
        assert_eq!(*completions.lock(), 1);
        assert!(cache.is_disposed());

        // the store still changes but nothing is published
        let (batches, sub) = make_recorder();
        let late = cache.connect().subscribe(sub);
        cache.edit(|store| store.add_or_update(9, "z"));
        assert!(batches.lock().is_empty());
        assert!(late.is_closed());
        assert_eq!(cache.count(), 3);
    }

    #[test]
    fn test_cache_cancel_stops_delivery() {
        let cache = make_cache();
        let (batches, sub) = make_recorder();
        let mut handle = cache.preview().subscribe(sub);

        cache.edit(|store| store.add_or_update(3, "c"));
        handle.cancel();
        cache.edit(|store| store.add_or_update(4, "d"));

        assert_eq!(batches.lock().len(), 1);
    }

    #[test]
    fn test_cache_from_stream() {
        let source = Broadcaster::new();
        let cache = ObservableCache::from_stream(&source);

        let mut batch = ChangeSet::new();
        batch.push(Change::add(1, "a"));
        batch.push(Change::add(2, "b"));
        source.publish(&batch);

        let mut batch = ChangeSet::new();
        batch.push(Change::update(1, "c", "a"));
        source.publish(&batch);

        assert_eq!(cache.lookup(&1), Some("c"));
        assert_eq!(cache.count(), 2);

        let errors = Arc::new(Mutex::new(Vec::new()));
        let errors_clone = Arc::clone(&errors);
        let _live = cache
            .connect()
            .subscribe(Subscriber::new(|_| {}).on_error(move |e| errors_clone.lock().push(e.clone())));

        source.fail(Error::upstream("disconnected"));

        let late_errors = Arc::new(Mutex::new(Vec::new()));
        let late_clone = Arc::clone(&late_errors);
        let _late = cache
            .connect()
            .subscribe(Subscriber::new(|_| {}).on_error(move |e| late_clone.lock().push(e.clone())));

        assert_eq!(*errors.lock(), vec![Error::upstream("disconnected")]);
        assert_eq!(*late_errors.lock(), vec![Error::upstream("disconnected")]);
        assert_eq!(
            cache.terminal(),
            Some(Terminal::Failed(Error::upstream("disconnected")))
        );
    }

    #[test]
    fn test_cache_dispose_detaches_upstream() {
        let source: Broadcaster<ChangeSet<i32, i32>> = Broadcaster::new();
        let cache = ObservableCache::from_stream(&source);
        assert_eq!(source.subscriber_count(), 1);

        cache.dispose();
        assert_eq!(source.subscriber_count(), 0);
    }
}
