//! Observable ordered list.
//!
//! The positional counterpart of [`ObservableCache`](crate::ObservableCache),
//! with the same locking and publishing rules.

use crate::filter::{ListFilter, Predicate};
use crate::stream::{Broadcaster, ChangeStream, Terminal};
use crate::subscription::{Subscriber, Subscription};
use parking_lot::{Mutex, ReentrantMutex, RwLock};
use rivulet_core::{Error, ListChange, ListChangeSet};
use rivulet_incremental::ChangeAwareList;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use tracing::{debug, trace, warn};

struct ListInner<T> {
    write_lock: ReentrantMutex<()>,
    broadcast_lock: ReentrantMutex<()>,
    store: RwLock<ChangeAwareList<T>>,
    changes: Broadcaster<ListChangeSet<T>>,
    counts: Broadcaster<usize>,
    upstream: Mutex<Option<Subscription>>,
    disposed: AtomicBool,
}

/// An ordered collection whose edits are observable.
pub struct ObservableList<T> {
    inner: Arc<ListInner<T>>,
}

impl<T> Clone for ObservableList<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T: Clone + Send + Sync + 'static> Default for ObservableList<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Clone + Send + Sync + 'static> ObservableList<T> {
    pub fn new() -> Self {
        Self::from_store(ChangeAwareList::new())
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self::from_store(ChangeAwareList::with_capacity(capacity))
    }

    fn from_store(store: ChangeAwareList<T>) -> Self {
        Self {
            inner: Arc::new(ListInner {
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

    /// Creates a list that mirrors an upstream stream of list change sets.
    ///
    /// A batch that does not fit the mirrored list fails the list.
    pub fn from_stream<S>(source: &S) -> Self
    where
        S: ChangeStream<ListChangeSet<T>> + ?Sized,
    {
        let list = Self::new();
        let on_next: Weak<ListInner<T>> = Arc::downgrade(&list.inner);
        let on_error = on_next.clone();
        let on_completed = on_next.clone();

        let subscriber = Subscriber::new(move |changes: &ListChangeSet<T>| {
            if let Some(inner) = on_next.upgrade() {
                let list = ObservableList { inner };
                if let Err(error) = list.edit(|store| store.clone_changes(changes)) {
                    list.fail(error);
                }
            }
        })
        .on_error(move |error| {
            if let Some(inner) = on_error.upgrade() {
                ObservableList { inner }.fail(error.clone());
            }
        })
        .on_completed(move || {
            if let Some(inner) = on_completed.upgrade() {
                ObservableList { inner }.complete();
            }
        });

        let upstream = source.subscribe(subscriber);
        *list.inner.upstream.lock() = Some(upstream);
        debug!("list attached to upstream");
        list
    }

    /// Runs `f` against the list and publishes the changes it recorded as one
    /// batch, followed by the new count.
    pub fn edit<F, R>(&self, f: F) -> R
    where
        F: FnOnce(&mut ChangeAwareList<T>) -> R,
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
                total = changes.total_changes(),
                adds = changes.adds(),
                removes = changes.removes(),
                moves = changes.moves(),
                "publishing list changes"
            );
            inner.changes.publish(&changes);
            inner.counts.publish(&count);
        }
        result
    }

    /// Connects to all changes, starting with the current items as one range.
    pub fn connect(&self) -> ListConnect<T> {
        ListConnect {
            inner: Arc::clone(&self.inner),
            filter: None,
            snapshot: true,
        }
    }

    /// Connects to a view holding only the items matching `predicate`.
    pub fn connect_filtered<P>(&self, predicate: P) -> ListConnect<T>
    where
        P: Fn(&T) -> bool + Send + Sync + 'static,
    {
        ListConnect {
            inner: Arc::clone(&self.inner),
            filter: Some(Arc::new(predicate)),
            snapshot: true,
        }
    }

    /// Like `connect`, without the initial snapshot.
    pub fn preview(&self) -> ListConnect<T> {
        ListConnect {
            inner: Arc::clone(&self.inner),
            filter: None,
            snapshot: false,
        }
    }

    /// The current count followed by every distinct change to it.
    pub fn count_changed(&self) -> ListCountChanged<T> {
        ListCountChanged {
            inner: Arc::clone(&self.inner),
        }
    }

    pub fn count(&self) -> usize {
        self.inner.store.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.store.read().is_empty()
    }

    pub fn get(&self, index: usize) -> Option<T> {
        self.inner.store.read().get(index).cloned()
    }

    pub fn items(&self) -> Vec<T> {
        self.inner.store.read().to_vec()
    }

    /// Terminates every stream of this list with `error`.
    pub fn fail(&self, error: Error) {
        warn!(%error, "list failed");
        let _broadcast = self.inner.broadcast_lock.lock();
        self.inner.changes.fail(error.clone());
        self.inner.counts.fail(error);
    }

    pub fn complete(&self) {
        let _broadcast = self.inner.broadcast_lock.lock();
        self.inner.changes.complete();
        self.inner.counts.complete();
    }

    /// Completes every stream and detaches from the upstream. Idempotent.
    pub fn dispose(&self) {
        if self.inner.disposed.swap(true, Ordering::AcqRel) {
            return;
        }
        debug!("disposing list");
        self.complete();
        let upstream = self.inner.upstream.lock().take();
        drop(upstream);
    }

    #[inline]
    pub fn is_disposed(&self) -> bool {
        self.inner.disposed.load(Ordering::Acquire)
    }

    pub fn terminal(&self) -> Option<Terminal> {
        self.inner.changes.terminal()
    }
}

impl<T: Clone + Send + Sync + 'static> ChangeStream<ListChangeSet<T>> for ObservableList<T> {
    fn subscribe(&self, subscriber: Subscriber<ListChangeSet<T>>) -> Subscription {
        self.connect().subscribe(subscriber)
    }
}

/// Stream of a list's change sets, optionally filtered.
pub struct ListConnect<T> {
    inner: Arc<ListInner<T>>,
    filter: Option<Predicate<T>>,
    snapshot: bool,
}

impl<T: Clone + Send + Sync + 'static> ChangeStream<ListChangeSet<T>> for ListConnect<T> {
    fn subscribe(&self, subscriber: Subscriber<ListChangeSet<T>>) -> Subscription {
        let inner = &*self.inner;
        let _broadcast = inner.broadcast_lock.lock();
        if inner.changes.is_terminated() {
            return inner.changes.subscribe(subscriber);
        }

        match &self.filter {
            None => {
                if self.snapshot {
                    let items = inner.store.read().to_vec();
                    if !items.is_empty() {
                        let mut initial = ListChangeSet::new();
                        initial.push(ListChange::add_range(items, 0));
                        subscriber.next(&initial);
                    }
                }
                inner.changes.subscribe(subscriber)
            }
            Some(predicate) => {
                let mut filter = ListFilter::new(Arc::clone(predicate));
                let initial = {
                    let store = inner.store.read();
                    filter.initial(store.as_slice())
                };
                let initial = match initial {
                    Ok(initial) => initial,
                    Err(error) => {
                        subscriber.error(&error);
                        return Subscription::empty();
                    }
                };
                if self.snapshot && !initial.is_empty() {
                    subscriber.next(&initial);
                }

                let filter = Mutex::new(filter);
                let forward = Subscriber::forwarding(
                    Arc::new(subscriber),
                    move |sub, changes: &ListChangeSet<T>| {
                        // a failed filter has already ended this subscriber
                        if !sub.is_active() {
                            return;
                        }
                        match filter.lock().process(changes) {
                            Ok(filtered) if !filtered.is_empty() => sub.next(&filtered),
                            Ok(_) => {}
                            Err(error) => sub.error(&error),
                        }
                    },
                );
                inner.changes.subscribe(forward)
            }
        }
    }
}

/// Stream of a list's count, distinct values only.
pub struct ListCountChanged<T> {
    inner: Arc<ListInner<T>>,
}

impl<T: Clone + Send + Sync + 'static> ChangeStream<usize> for ListCountChanged<T> {
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
    use rivulet_core::ListChangeReason;

    type Batches<T> = Arc<Mutex<Vec<ListChangeSet<T>>>>;

    fn make_recorder<T: Clone + Send + Sync + 'static>() -> (Batches<T>, Subscriber<ListChangeSet<T>>) {
        let batches = Arc::new(Mutex::new(Vec::new()));
        let clone = Arc::clone(&batches);
        let sub = Subscriber::new(move |cs: &ListChangeSet<T>| clone.lock().push(cs.clone()));
        (batches, sub)
    }

    fn make_list() -> ObservableList<&'static str> {
        let list = ObservableList::new();
        list.edit(|store| store.add_range(vec!["A", "B", "C"]));
        list
    }

    #[test]
    fn test_list_connect_snapshot() {
        let list = make_list();
        let (batches, sub) = make_recorder();
        let _handle = list.connect().subscribe(sub);

        let batches = batches.lock();
        assert_eq!(batches.len(), 1);
        assert_eq!(
            batches[0].as_slice(),
            &[ListChange::add_range(vec!["A", "B", "C"], 0)]
        );
    }

    #[test]
    fn test_list_move_publishes_one_change() {
        let list = make_list();
        let (batches, sub) = make_recorder();
        let _handle = list.preview().subscribe(sub);

        list.edit(|store| store.move_item(0, 2)).unwrap();

        assert_eq!(list.items(), vec!["B", "C", "A"]);
        let batches = batches.lock();
        assert_eq!(batches.len(), 1);
        assert_eq!(batches[0].len(), 1);
        let item = batches[0].as_slice()[0].as_item().unwrap();
        assert_eq!(item.reason, ListChangeReason::Moved);
        assert_eq!(item.current, "A");
        assert_eq!(item.previous_index, Some(0));
        assert_eq!(item.current_index, Some(2));
    }

    #[test]
    fn test_list_index_error_publishes_nothing() {
        let list = make_list();
        let (batches, sub) = make_recorder();
        let _handle = list.preview().subscribe(sub);

        let result = list.edit(|store| store.insert(10, "X"));
        assert_eq!(result, Err(Error::index_out_of_range(10, 3)));
        assert!(batches.lock().is_empty());
    }

    #[test]
    fn test_list_connect_filtered() {
        let list = ObservableList::new();
        list.edit(|store| store.add_range(1..=4));

        let (batches, sub) = make_recorder();
        let _handle = list.connect_filtered(|v: &i32| v % 2 == 0).subscribe(sub);

        list.edit(|store| store.set_item(1, 3)).unwrap();

        let batches = batches.lock();
        assert_eq!(batches[0].as_slice(), &[ListChange::add_range(vec![2, 4], 0)]);
        assert_eq!(batches[1].as_slice(), &[ListChange::remove_at(2, 0)]);
    }

    #[test]
    fn test_list_filtered_silent_after_error() {
        let list = ObservableList::new();
        list.edit(|store| store.add_range(1..=4));

        let events = Arc::new(Mutex::new(Vec::new()));
        let (on_next, on_error) = (Arc::clone(&events), Arc::clone(&events));
        let _handle = list.connect_filtered(|v: &i32| v % 2 == 0).subscribe(
            Subscriber::new(move |cs: &ListChangeSet<i32>| on_next.lock().push(format!("next {}", cs.len())))
                .on_error(move |e| on_error.lock().push(format!("error {}", e))),
        );

        // a batch that does not fit the filtered view ends the subscriber
        let mut bad = ListChangeSet::new();
        bad.push(ListChange::remove_at(9, 40));
        list.inner.changes.publish(&bad);
        list.edit(|store| store.add(6));

        assert_eq!(
            *events.lock(),
            vec!["next 1", "error Index 40 out of range for length 4"]
        );
    }

    #[test]
    fn test_list_count_changed() {
        let list = make_list();
        let counts = Arc::new(Mutex::new(Vec::new()));
        let counts_clone = Arc::clone(&counts);
        let _handle = list
            .count_changed()
            .subscribe_fn(move |count: &usize| counts_clone.lock().push(*count));

        list.edit(|store| store.add("D"));
        list.edit(|store| store.set_item(0, "Z")).unwrap();
        list.edit(|store| store.clear());

        assert_eq!(*counts.lock(), vec![3, 4, 0]);
    }

    #[test]
    fn test_list_reads() {
        let list = make_list();
        assert_eq!(list.count(), 3);
        assert_eq!(list.get(1), Some("B"));
        assert_eq!(list.get(3), None);
    }

    #[test]
    fn test_list_from_stream() {
        let source = Broadcaster::new();
        let list = ObservableList::from_stream(&source);

        let mut batch = ListChangeSet::new();
        batch.push(ListChange::add_range(vec![1, 2, 3], 0));
        source.publish(&batch);
        assert_eq!(list.items(), vec![1, 2, 3]);

        // a batch that does not fit fails the list
        let mut batch = ListChangeSet::new();
        batch.push(ListChange::remove_at(9, 7));
        source.publish(&batch);

        assert_eq!(
            list.terminal(),
            Some(Terminal::Failed(Error::index_out_of_range(7, 3)))
        );
    }

    #[test]
    fn test_list_dispose() {
        let list = make_list();
        let done = Arc::new(Mutex::new(0));
        let done_clone = Arc::clone(&done);
        let _handle = list
            .connect()
            .subscribe(Subscriber::new(|_| {}).on_completed(move || *done_clone.lock() += 1));

        list.dispose();
        list.dispose();
        assert_eq!(*done.lock(), 1);
    }
}
