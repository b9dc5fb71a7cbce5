//! Incremental joins of two keyed streams.
//!
//! Both joins keep a mirror of each side keyed by the left key. Every
//! upstream batch is replayed into its mirror, and the mirror's recorded
//! changes are turned into edits of the output cache while the join state is
//! held. One upstream batch produces at most one output batch.

use super::serial::Serialized;
use crate::observable_cache::{Connect, ObservableCache};
use crate::stream::{ChangeStream, Terminal};
use crate::subscription::{Subscriber, Subscription};
use parking_lot::Mutex;
use rivulet_core::{Change, ChangeReason, ChangeSet, Error};
use rivulet_incremental::ChangeAwareCache;
use std::hash::Hash;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use tracing::{debug, warn};

type FullFn<K, L, R, D> = Box<dyn Fn(&K, Option<&L>, Option<&R>) -> D + Send + Sync>;
type LeftFn<K, L, R, D> = Box<dyn Fn(&K, &L, Option<&R>) -> D + Send + Sync>;

enum Combine<K, L, R, D> {
    Full(FullFn<K, L, R, D>),
    Left(LeftFn<K, L, R, D>),
}

/// Mirrors of both sides.
struct JoinState<K, L, R> {
    left: ChangeAwareCache<K, L>,
    right: ChangeAwareCache<K, R>,
}

impl<K, L, R> JoinState<K, L, R> {
    fn reset(&mut self) {
        self.left = ChangeAwareCache::new();
        self.right = ChangeAwareCache::new();
    }
}

/// An upstream batch, with right changes already keyed by the left key.
enum Batch<K, L, R> {
    Left(ChangeSet<K, L>),
    Right(ChangeSet<K, R>),
}

#[derive(Clone, Copy, Debug)]
enum Side {
    Left,
    Right,
}

struct JoinCore<K, L, R, D> {
    state: Serialized<JoinState<K, L, R>, Batch<K, L, R>>,
    combine: Combine<K, L, R, D>,
    output: ObservableCache<K, D>,
    upstream: Mutex<Vec<Subscription>>,
    left_completed: AtomicBool,
    right_completed: AtomicBool,
    disposed: AtomicBool,
}

impl<K, L, R, D> JoinCore<K, L, R, D>
where
    K: Eq + Hash + Clone + Send + Sync + 'static,
    L: Clone + Send + Sync + 'static,
    R: Clone + Send + Sync + 'static,
    D: Clone + Send + Sync + 'static,
{
    fn start<SL, SR, K2, FK>(
        left: &SL,
        right: &SR,
        right_key_selector: FK,
        combine: Combine<K, L, R, D>,
    ) -> Arc<Self>
    where
        SL: ChangeStream<ChangeSet<K, L>> + ?Sized,
        SR: ChangeStream<ChangeSet<K2, R>> + ?Sized,
        K2: Clone + 'static,
        FK: Fn(&R) -> K + Send + Sync + 'static,
    {
        let core = Arc::new(JoinCore {
            state: Serialized::new(JoinState {
                left: ChangeAwareCache::new(),
                right: ChangeAwareCache::new(),
            }),
            combine,
            output: ObservableCache::new(),
            upstream: Mutex::new(Vec::with_capacity(2)),
            left_completed: AtomicBool::new(false),
            right_completed: AtomicBool::new(false),
            disposed: AtomicBool::new(false),
        });

        let weak = Arc::downgrade(&core);
        let left_subscription = left.subscribe(Self::side_subscriber(
            weak.clone(),
            Side::Left,
            |core: &Self, changes: &ChangeSet<K, L>| core.on_batch(Batch::Left(changes.clone())),
        ));
        let right_subscription = right.subscribe(Self::side_subscriber(
            weak,
            Side::Right,
            move |core: &Self, changes: &ChangeSet<K2, R>| {
                core.on_batch(Batch::Right(rekey(changes, &right_key_selector)));
            },
        ));

        core.upstream
            .lock()
            .extend([left_subscription, right_subscription]);
        debug!("join attached to both sides");
        core
    }

    fn side_subscriber<T, F>(weak: Weak<Self>, side: Side, on_next: F) -> Subscriber<T>
    where
        T: 'static,
        F: Fn(&Self, &T) + Send + Sync + 'static,
    {
        let on_error = weak.clone();
        let on_completed = weak.clone();
        Subscriber::new(move |value: &T| {
            if let Some(core) = weak.upgrade() {
                on_next(&*core, value);
            }
        })
        .on_error(move |error| {
            if let Some(core) = on_error.upgrade() {
                core.on_error(side, error);
            }
        })
        .on_completed(move || {
            if let Some(core) = on_completed.upgrade() {
                core.on_completed(side);
            }
        })
    }

    fn on_batch(&self, batch: Batch<K, L, R>) {
        if self.disposed.load(Ordering::Acquire) {
            return;
        }
        self.state.apply(batch, |state, batch| {
            if self.disposed.load(Ordering::Acquire) {
                return;
            }
            match batch {
                Batch::Left(changes) => self.on_left(state, &changes),
                Batch::Right(changes) => self.on_right(state, &changes),
            }
            // disposed while the output edit was running on this thread
            if self.disposed.load(Ordering::Acquire) {
                state.reset();
            }
        });
    }

    fn on_left(&self, state: &mut JoinState<K, L, R>, changes: &ChangeSet<K, L>) {
        state.left.clone_changes(changes);
        let captured = state.left.capture_changes();
        let right = &state.right;

        self.output.edit(|out| {
            for change in &captured {
                let key = change.key();
                let current = change.current();
                let right_value = right.lookup(key);
                match (change.reason(), &self.combine) {
                    (ChangeReason::Add | ChangeReason::Update, Combine::Full(f)) => {
                        out.add_or_update(key.clone(), f(key, Some(current), right_value));
                    }
                    (ChangeReason::Add | ChangeReason::Update, Combine::Left(f)) => {
                        out.add_or_update(key.clone(), f(key, current, right_value));
                    }
                    (ChangeReason::Remove, Combine::Full(f)) => match right_value {
                        Some(r) => out.add_or_update(key.clone(), f(key, None, Some(r))),
                        None => {
                            out.remove(key);
                        }
                    },
                    (ChangeReason::Remove, Combine::Left(_)) => {
                        out.remove(key);
                    }
                    (ChangeReason::Refresh, _) => out.refresh(key),
                    (ChangeReason::Moved, _) => {}
                }
            }
        });
    }

    fn on_right(&self, state: &mut JoinState<K, L, R>, changes: &ChangeSet<K, R>) {
        state.right.clone_changes(changes);
        let captured = state.right.capture_changes();
        let left = &state.left;

        self.output.edit(|out| {
            for change in &captured {
                let key = change.key();
                let current = change.current();
                let left_value = left.lookup(key);
                match (change.reason(), &self.combine) {
                    (ChangeReason::Add | ChangeReason::Update, Combine::Full(f)) => {
                        out.add_or_update(key.clone(), f(key, left_value, Some(current)));
                    }
                    (ChangeReason::Add | ChangeReason::Update, Combine::Left(f)) => {
                        if let Some(l) = left_value {
                            out.add_or_update(key.clone(), f(key, l, Some(current)));
                        }
                    }
                    (ChangeReason::Remove, Combine::Full(f)) => match left_value {
                        Some(l) => out.add_or_update(key.clone(), f(key, Some(l), None)),
                        None => {
                            out.remove(key);
                        }
                    },
                    (ChangeReason::Remove, Combine::Left(f)) => {
                        if let Some(l) = left_value {
                            out.add_or_update(key.clone(), f(key, l, None));
                        }
                    }
                    (ChangeReason::Refresh, _) => out.refresh(key),
                    (ChangeReason::Moved, _) => {}
                }
            }
        });
    }

    fn on_error(&self, side: Side, error: &Error) {
        warn!(?side, %error, "join upstream failed");
        self.output.fail(error.clone());
    }

    fn on_completed(&self, side: Side) {
        match side {
            Side::Left => self.left_completed.store(true, Ordering::Release),
            Side::Right => self.right_completed.store(true, Ordering::Release),
        }
        debug!(?side, "join upstream completed");
        if self.left_completed.load(Ordering::Acquire) && self.right_completed.load(Ordering::Acquire) {
            self.output.complete();
        }
    }

    fn dispose(&self) {
        if self.disposed.swap(true, Ordering::AcqRel) {
            return;
        }
        debug!("disposing join");
        self.output.dispose();
        let upstream: Vec<Subscription> = self.upstream.lock().drain(..).collect();
        drop(upstream);
        // busy means a batch is being applied on this thread; it resets the
        // mirrors itself once its output edit returns
        self.state.reset_with(JoinState::reset);
        self.output.edit(|store| store.clear());
    }
}

/// Re-keys a right-side batch by the left key.
///
/// An update whose left key changed becomes a removal under the old key
/// followed by an add under the new one.
fn rekey<K2, K, R, FK>(changes: &ChangeSet<K2, R>, key_selector: &FK) -> ChangeSet<K, R>
where
    K2: Clone,
    K: PartialEq,
    R: Clone,
    FK: Fn(&R) -> K,
{
    let key_changed = changes.iter().any(|change| {
        change.reason() == ChangeReason::Update
            && change
                .previous()
                .is_some_and(|previous| key_selector(previous) != key_selector(change.current()))
    });
    if !key_changed {
        return changes.change_key(key_selector);
    }

    let mut rekeyed = ChangeSet::with_capacity(changes.len());
    for change in changes {
        let key = key_selector(change.current());
        match (change.reason(), change.previous()) {
            (ChangeReason::Update, Some(previous)) => {
                let old_key = key_selector(previous);
                if old_key == key {
                    rekeyed.push(change.clone().with_key(key));
                } else {
                    rekeyed.push(Change::remove(old_key, previous.clone()));
                    rekeyed.push(Change::add(key, change.current().clone()));
                }
            }
            _ => rekeyed.push(change.clone().with_key(key)),
        }
    }
    rekeyed
}

macro_rules! join_handle {
    ($name:ident) => {
        impl<K, L, R, D> $name<K, L, R, D>
        where
            K: Eq + Hash + Clone + Send + Sync + 'static,
            L: Clone + Send + Sync + 'static,
            R: Clone + Send + Sync + 'static,
            D: Clone + Send + Sync + 'static,
        {
            /// The joined rows.
            #[inline]
            pub fn output(&self) -> &ObservableCache<K, D> {
                &self.core.output
            }

            /// Connects to the joined rows.
            pub fn connect(&self) -> Connect<K, D> {
                self.core.output.connect()
            }

            /// Like `connect`, without the initial snapshot.
            pub fn preview(&self) -> Connect<K, D> {
                self.core.output.preview()
            }

            /// Detaches from both upstreams and completes the output. Idempotent.
            pub fn dispose(&self) {
                self.core.dispose();
            }

            #[inline]
            pub fn is_disposed(&self) -> bool {
                self.core.disposed.load(Ordering::Acquire)
            }

            pub fn terminal(&self) -> Option<Terminal> {
                self.core.output.terminal()
            }
        }

        impl<K, L, R, D> ChangeStream<ChangeSet<K, D>> for $name<K, L, R, D>
        where
            K: Eq + Hash + Clone + Send + Sync + 'static,
            L: Clone + Send + Sync + 'static,
            R: Clone + Send + Sync + 'static,
            D: Clone + Send + Sync + 'static,
        {
            fn subscribe(&self, subscriber: Subscriber<ChangeSet<K, D>>) -> Subscription {
                self.core.output.connect().subscribe(subscriber)
            }
        }
    };
}

/// Full outer join of two keyed streams.
///
/// A row exists for every key present on either side. `combinator` receives
/// the key and whichever sides are present.
pub struct FullJoin<K, L, R, D> {
    core: Arc<JoinCore<K, L, R, D>>,
}

impl<K, L, R, D> FullJoin<K, L, R, D>
where
    K: Eq + Hash + Clone + Send + Sync + 'static,
    L: Clone + Send + Sync + 'static,
    R: Clone + Send + Sync + 'static,
    D: Clone + Send + Sync + 'static,
{
    /// Joins `left` with `right`, matching a right item to the left key
    /// returned by `right_key_selector`.
    pub fn new<SL, SR, K2, FK, FC>(
        left: &SL,
        right: &SR,
        right_key_selector: FK,
        combinator: FC,
    ) -> Self
    where
        SL: ChangeStream<ChangeSet<K, L>> + ?Sized,
        SR: ChangeStream<ChangeSet<K2, R>> + ?Sized,
        K2: Clone + 'static,
        FK: Fn(&R) -> K + Send + Sync + 'static,
        FC: Fn(&K, Option<&L>, Option<&R>) -> D + Send + Sync + 'static,
    {
        Self {
            core: JoinCore::start(
                left,
                right,
                right_key_selector,
                Combine::Full(Box::new(combinator)),
            ),
        }
    }
}

join_handle!(FullJoin);

/// Left join of two keyed streams.
///
/// A row exists only for keys present on the left. `combinator` receives the
/// left value and the matching right value, if any.
pub struct LeftJoin<K, L, R, D> {
    core: Arc<JoinCore<K, L, R, D>>,
}

impl<K, L, R, D> LeftJoin<K, L, R, D>
where
    K: Eq + Hash + Clone + Send + Sync + 'static,
    L: Clone + Send + Sync + 'static,
    R: Clone + Send + Sync + 'static,
    D: Clone + Send + Sync + 'static,
{
    pub fn new<SL, SR, K2, FK, FC>(
        left: &SL,
        right: &SR,
        right_key_selector: FK,
        combinator: FC,
    ) -> Self
    where
        SL: ChangeStream<ChangeSet<K, L>> + ?Sized,
        SR: ChangeStream<ChangeSet<K2, R>> + ?Sized,
        K2: Clone + 'static,
        FK: Fn(&R) -> K + Send + Sync + 'static,
        FC: Fn(&K, &L, Option<&R>) -> D + Send + Sync + 'static,
    {
        Self {
            core: JoinCore::start(
                left,
                right,
                right_key_selector,
                Combine::Left(Box::new(combinator)),
            ),
        }
    }
}

join_handle!(LeftJoin);
