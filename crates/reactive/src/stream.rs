//! The stream abstraction shared by every live collection and operator.

use crate::subscription::{Subscriber, Subscription, SubscriptionId, SubscriptionManager};
use parking_lot::ReentrantMutex;
use rivulet_core::Error;
use std::cell::RefCell;
use std::sync::{Arc, Weak};
use tracing::debug;

/// A push-based source of values.
///
/// Subscribing attaches the subscriber and returns the handle that detaches
/// it. Values, errors and completion are delivered synchronously on the
/// thread that produced them.
pub trait ChangeStream<T> {
    /// Attaches `subscriber`.
    fn subscribe(&self, subscriber: Subscriber<T>) -> Subscription;

    /// Attaches a subscriber that only handles values.
    fn subscribe_fn<F>(&self, on_next: F) -> Subscription
    where
        Self: Sized,
        F: Fn(&T) + Send + Sync + 'static,
    {
        self.subscribe(Subscriber::new(on_next))
    }
}

impl<T, S: ChangeStream<T> + ?Sized> ChangeStream<T> for Arc<S> {
    fn subscribe(&self, subscriber: Subscriber<T>) -> Subscription {
        (**self).subscribe(subscriber)
    }
}

impl<T, S: ChangeStream<T> + ?Sized> ChangeStream<T> for &S {
    fn subscribe(&self, subscriber: Subscriber<T>) -> Subscription {
        (**self).subscribe(subscriber)
    }
}

/// How a stream ended.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Terminal {
    Completed,
    Failed(Error),
}

impl Terminal {
    fn deliver<T>(&self, subscriber: &Subscriber<T>) {
        match self {
            Terminal::Completed => subscriber.completed(),
            Terminal::Failed(error) => subscriber.error(error),
        }
    }
}

struct BroadcastState<T> {
    subscribers: SubscriptionManager<T>,
    terminal: Option<Terminal>,
}

struct BroadcastInner<T> {
    state: ReentrantMutex<RefCell<BroadcastState<T>>>,
}

impl<T> BroadcastInner<T> {
    fn unsubscribe(&self, id: SubscriptionId) {
        let guard = self.state.lock();
        let removed = guard.borrow_mut().subscribers.take(id);
        if removed.is_some() {
            debug!(id, "subscriber detached");
        }
        // dropped outside the borrow: a subscriber may own other handles
        drop(removed);
    }
}

/// A multicast source that values are pushed into.
///
/// Publishing and attaching are serialized by one re-entrant lock, so a
/// subscriber may detach itself or attach others from inside a callback.
/// Once completed or failed the terminal signal is replayed to every later
/// subscriber and further publishing is ignored.
pub struct Broadcaster<T> {
    inner: Arc<BroadcastInner<T>>,
}

impl<T> Clone for Broadcaster<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T> Default for Broadcaster<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Broadcaster<T> {
    /// Creates a broadcaster with no subscribers.
    pub fn new() -> Self {
        Self {
            inner: Arc::new(BroadcastInner {
                state: ReentrantMutex::new(RefCell::new(BroadcastState {
                    subscribers: SubscriptionManager::new(),
                    terminal: None,
                })),
            }),
        }
    }

    /// Delivers `value` to every attached subscriber, in attach order.
    pub fn publish(&self, value: &T) {
        let guard = self.inner.state.lock();
        let subscribers = {
            let state = guard.borrow();
            if state.terminal.is_some() {
                return;
            }
            state.subscribers.subscribers()
        };
        for subscriber in subscribers {
            subscriber.next(value);
        }
    }

    /// Terminates with `error`. Later calls are ignored.
    pub fn fail(&self, error: Error) {
        self.terminate(Terminal::Failed(error));
    }

    /// Terminates normally. Later calls are ignored.
    pub fn complete(&self) {
        self.terminate(Terminal::Completed);
    }

    fn terminate(&self, terminal: Terminal) {
        let guard = self.inner.state.lock();
        let subscribers = {
            let mut state = guard.borrow_mut();
            if state.terminal.is_some() {
                return;
            }
            state.terminal = Some(terminal.clone());
            state.subscribers.drain()
        };
        for subscriber in subscribers {
            terminal.deliver(&subscriber);
        }
    }

    /// Returns how the stream ended, if it has.
    pub fn terminal(&self) -> Option<Terminal> {
        let guard = self.inner.state.lock();
        let terminal = guard.borrow().terminal.clone();
        terminal
    }

    #[inline]
    pub fn is_terminated(&self) -> bool {
        self.terminal().is_some()
    }

    /// Number of attached subscribers.
    pub fn subscriber_count(&self) -> usize {
        let guard = self.inner.state.lock();
        let count = guard.borrow().subscribers.len();
        count
    }
}

impl<T: 'static> ChangeStream<T> for Broadcaster<T> {
    fn subscribe(&self, subscriber: Subscriber<T>) -> Subscription {
        let guard = self.inner.state.lock();
        let mut state = guard.borrow_mut();
        if let Some(terminal) = state.terminal.clone() {
            drop(state);
            terminal.deliver(&subscriber);
            return Subscription::empty();
        }

        let id = state.subscribers.subscribe(subscriber);
        debug!(id, "subscriber attached");
        drop(state);

        let weak: Weak<BroadcastInner<T>> = Arc::downgrade(&self.inner);
        Subscription::new(move || {
            if let Some(inner) = weak.upgrade() {
                inner.unsubscribe(id);
            }
        })
    }
}
