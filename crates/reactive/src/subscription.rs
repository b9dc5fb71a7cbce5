//! Subscribers, subscription handles and the per-source subscriber registry.

use hashbrown::HashMap;
use rivulet_core::Error;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Unique identifier for a subscriber within one source.
pub type SubscriptionId = u64;

type NextFn<T> = Box<dyn Fn(&T) + Send + Sync>;
type ErrorFn = Box<dyn Fn(&Error) + Send + Sync>;
type CompletedFn = Box<dyn Fn() + Send + Sync>;

/// The receiving end of a stream: callbacks for values, errors and completion.
///
/// A subscriber is active until it is detached from its source or receives
/// `error` or `completed`. Calls to an inactive subscriber are ignored.
pub struct Subscriber<T> {
    on_next: NextFn<T>,
    on_error: Option<ErrorFn>,
    on_completed: Option<CompletedFn>,
    active: AtomicBool,
}

impl<T> Subscriber<T> {
    /// Creates a subscriber that only handles values.
    pub fn new<F>(on_next: F) -> Self
    where
        F: Fn(&T) + Send + Sync + 'static,
    {
        Self {
            on_next: Box::new(on_next),
            on_error: None,
            on_completed: None,
            active: AtomicBool::new(true),
        }
    }

    /// Sets the error callback.
    pub fn on_error<F>(mut self, on_error: F) -> Self
    where
        F: Fn(&Error) + Send + Sync + 'static,
    {
        self.on_error = Some(Box::new(on_error));
        self
    }

    /// Sets the completion callback.
    pub fn on_completed<F>(mut self, on_completed: F) -> Self
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.on_completed = Some(Box::new(on_completed));
        self
    }

    /// Returns whether this subscriber still receives calls.
    #[inline]
    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }

    /// Deactivates this subscriber. Later calls are ignored.
    #[inline]
    pub fn deactivate(&self) {
        self.active.store(false, Ordering::Release);
    }

    #[inline]
    pub fn next(&self, value: &T) {
        if self.is_active() {
            (self.on_next)(value);
        }
    }

    pub fn error(&self, error: &Error) {
        if !self.active.swap(false, Ordering::AcqRel) {
            return;
        }
        if let Some(on_error) = &self.on_error {
            on_error(error);
        }
    }

    pub fn completed(&self) {
        if !self.active.swap(false, Ordering::AcqRel) {
            return;
        }
        if let Some(on_completed) = &self.on_completed {
            on_completed();
        }
    }
}

impl<T: 'static> Subscriber<T> {
    /// Wraps a shared subscriber, replacing its value handler.
    ///
    /// Errors and completion are forwarded to `inner` unchanged. Used by
    /// derived streams that transform values before delivering them.
    pub fn forwarding<U, F>(inner: Arc<Subscriber<U>>, on_next: F) -> Self
    where
        U: 'static,
        F: Fn(&Subscriber<U>, &T) + Send + Sync + 'static,
    {
        let on_error = Arc::clone(&inner);
        let on_completed = Arc::clone(&inner);
        Subscriber::new(move |value: &T| on_next(&inner, value))
            .on_error(move |error| on_error.error(error))
            .on_completed(move || on_completed.completed())
    }
}

impl<T> fmt::Debug for Subscriber<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscriber")
            .field("active", &self.is_active())
            .field("on_error", &self.on_error.is_some())
            .field("on_completed", &self.on_completed.is_some())
            .finish()
    }
}

/// A handle to an attached subscriber.
///
/// Dropping the handle detaches the subscriber. `cancel` detaches it
/// explicitly and may be called any number of times.
#[must_use = "dropping a Subscription detaches the subscriber immediately"]
pub struct Subscription {
    cancel: Option<Box<dyn FnOnce() + Send>>,
}

impl Subscription {
    /// Creates a handle that runs `cancel` once when cancelled or dropped.
    pub fn new<F>(cancel: F) -> Self
    where
        F: FnOnce() + Send + 'static,
    {
        Self {
            cancel: Some(Box::new(cancel)),
        }
    }

    /// Creates a handle with nothing to cancel.
    pub fn empty() -> Self {
        Self { cancel: None }
    }

    /// Detaches the subscriber. Later calls do nothing.
    pub fn cancel(&mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel();
        }
    }

    /// Returns true once the handle has been cancelled, or if it never held
    /// anything to cancel.
    #[inline]
    pub fn is_closed(&self) -> bool {
        self.cancel.is_none()
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.cancel();
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("closed", &self.is_closed())
            .finish()
    }
}

/// Registry of the subscribers attached to one source.
pub struct SubscriptionManager<T> {
    /// Attached subscribers
    subscriptions: HashMap<SubscriptionId, Arc<Subscriber<T>>>,
    /// Next subscription ID to assign
    next_id: SubscriptionId,
}

impl<T> Default for SubscriptionManager<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> SubscriptionManager<T> {
    /// Creates a new subscription manager.
    pub fn new() -> Self {
        Self {
            subscriptions: HashMap::new(),
            next_id: 1,
        }
    }

    /// Attaches a subscriber. Returns the ID used to detach it.
    pub fn subscribe(&mut self, subscriber: Subscriber<T>) -> SubscriptionId {
        let id = self.next_id;
        self.next_id += 1;
        self.subscriptions.insert(id, Arc::new(subscriber));
        id
    }

    /// Detaches by ID.
    ///
    /// Returns true if the subscription was found and removed.
    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        self.take(id).is_some()
    }

    /// Detaches by ID, handing the subscriber back to the caller.
    ///
    /// Lets the caller drop the subscriber after releasing any lock around
    /// the registry.
    pub fn take(&mut self, id: SubscriptionId) -> Option<Arc<Subscriber<T>>> {
        let sub = self.subscriptions.remove(&id)?;
        // a publish already in flight may still hold this subscriber
        sub.deactivate();
        Some(sub)
    }

    /// Returns the attached subscribers in attach order.
    ///
    /// The returned list is detached from the registry, so callers may
    /// invoke the subscribers while the registry is modified.
    pub fn subscribers(&self) -> Vec<Arc<Subscriber<T>>> {
        let mut entries: Vec<_> = self.subscriptions.iter().collect();
        entries.sort_unstable_by_key(|(id, _)| **id);
        entries.into_iter().map(|(_, sub)| Arc::clone(sub)).collect()
    }

    /// Detaches every subscriber, returning them in attach order.
    pub fn drain(&mut self) -> Vec<Arc<Subscriber<T>>> {
        let mut entries: Vec<_> = self.subscriptions.drain().collect();
        entries.sort_unstable_by_key(|(id, _)| *id);
        entries.into_iter().map(|(_, sub)| sub).collect()
    }

    /// Notifies all attached subscribers.
    pub fn notify_all(&self, value: &T) {
        for sub in self.subscribers() {
            sub.next(value);
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.subscriptions.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.subscriptions.is_empty()
    }
}
