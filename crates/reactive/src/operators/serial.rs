//! Re-entrant serialization of operator state.

use parking_lot::ReentrantMutex;
use std::cell::RefCell;
use std::collections::VecDeque;

/// Operator state shared by several upstream subscriptions.
///
/// Batches are applied one at a time. A batch that arrives on a thread which
/// is already applying one, because a downstream subscriber edited an
/// upstream source, is queued and applied by that same thread as soon as the
/// current batch finishes.
pub(crate) struct Serialized<S, B> {
    inner: ReentrantMutex<Slots<S, B>>,
}

struct Slots<S, B> {
    state: RefCell<S>,
    queue: RefCell<VecDeque<B>>,
}

impl<S, B> Serialized<S, B> {
    pub(crate) fn new(state: S) -> Self {
        Self {
            inner: ReentrantMutex::new(Slots {
                state: RefCell::new(state),
                queue: RefCell::new(VecDeque::new()),
            }),
        }
    }

    /// Applies `batch`, then every batch queued while it was being applied.
    pub(crate) fn apply<F>(&self, batch: B, mut f: F)
    where
        F: FnMut(&mut S, B),
    {
        let slots = self.inner.lock();
        slots.queue.borrow_mut().push_back(batch);
        // busy: the call further up this thread's stack drains the queue
        let Ok(mut state) = slots.state.try_borrow_mut() else {
            return;
        };
        loop {
            let next = slots.queue.borrow_mut().pop_front();
            match next {
                Some(batch) => f(&mut state, batch),
                None => break,
            }
        }
    }

    /// Runs `f` on the state and drops any queued batches.
    ///
    /// Returns `None` without running `f` when this thread is in the middle
    /// of applying a batch.
    pub(crate) fn reset_with<R, F>(&self, f: F) -> Option<R>
    where
        F: FnOnce(&mut S) -> R,
    {
        let slots = self.inner.lock();
        slots.queue.borrow_mut().clear();
        let mut state = slots.state.try_borrow_mut().ok()?;
        Some(f(&mut state))
    }
}
