//! Blocking multi-producer, multi-consumer hand-off queue.

use core::time::Duration;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Instant;

use parking_lot::{Condvar, Mutex};

/// An entry of a [`WorkQueue`].
#[derive(Debug, PartialEq)]
pub(crate) enum Message<T> {
    /// An item to process.
    Work(T),
    /// Poison pill: the consumer that dequeues it must stop.
    Stop,
}

struct State<T> {
    items: VecDeque<Message<T>>,
    closed: bool,
}

struct Inner<T> {
    state: Mutex<State<T>>,
    available: Condvar,
}

/// Unbounded FIFO queue with blocking dequeue.
///
/// Closing the queue rejects further work items but still lets consumers
/// drain what is queued; poison pills are how consumers are told to
/// leave. Cloning yields another handle to the same queue.
pub(crate) struct WorkQueue<T> {
    inner: Arc<Inner<T>>,
}

impl<T> Clone for WorkQueue<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T> WorkQueue<T> {
    pub(crate) fn new() -> Self {
        Self {
            inner: Arc::new(Inner {
                state: Mutex::new(State {
                    items: VecDeque::new(),
                    closed: false,
                }),
                available: Condvar::new(),
            }),
        }
    }

    /// Enqueue a work item. Never blocks.
    ///
    /// # Errors
    ///
    /// Gives the item back if the queue was closed.
    pub(crate) fn push(&self, item: T) -> Result<(), T> {
        let mut state = self.inner.state.lock();
        if state.closed {
            return Err(item);
        }
        state.items.push_back(Message::Work(item));
        drop(state);
        self.inner.available.notify_one();
        Ok(())
    }

    /// Enqueue a single poison pill, even on a closed queue.
    pub(crate) fn push_stop(&self) {
        self.inner.state.lock().items.push_back(Message::Stop);
        self.inner.available.notify_one();
    }

    /// Close the queue and append `pills` poison pills behind whatever is
    /// queued. With `discard_pending`, queued work items are dropped first.
    ///
    /// Returns the number of discarded work items. Closing twice is a
    /// no-op that returns `None`.
    pub(crate) fn close(&self, pills: usize, discard_pending: bool) -> Option<usize> {
        let mut state = self.inner.state.lock();
        if state.closed {
            return None;
        }
        state.closed = true;
        let before = state.items.len();
        if discard_pending {
            state.items.retain(|m| matches!(m, Message::Stop));
        }
        let discarded = before - state.items.len();
        state.items.extend((0..pills).map(|_| Message::Stop));
        drop(state);
        self.inner.available.notify_all();
        Some(discarded)
    }

    /// Block until a message is available.
    pub(crate) fn pop(&self) -> Message<T> {
        let mut state = self.inner.state.lock();
        loop {
            if let Some(msg) = state.items.pop_front() {
                return msg;
            }
            self.inner.available.wait(&mut state);
        }
    }

    /// Block for at most `timeout` waiting for a message. A timeout too
    /// large to express as an instant waits without a deadline.
    pub(crate) fn pop_timeout(&self, timeout: Duration) -> Option<Message<T>> {
        let Some(deadline) = Instant::now().checked_add(timeout) else {
            return Some(self.pop());
        };
        let mut state = self.inner.state.lock();
        loop {
            if let Some(msg) = state.items.pop_front() {
                return Some(msg);
            }
            if self
                .inner
                .available
                .wait_until(&mut state, deadline)
                .timed_out()
            {
                return state.items.pop_front();
            }
        }
    }

    #[cfg(test)]
    pub(crate) fn is_closed(&self) -> bool {
        self.inner.state.lock().closed
    }

    /// Number of queued messages, poison pills included.
    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.inner.state.lock().items.len()
    }
}
