//! The event queue: arrival-order delivery of events and asynchronous
//! errors to the application.
//!
//! The receiver must never block on a full queue — blocking it would halt
//! reply dispatch and deadlock every waiter — so the queue is unbounded
//! with a soft capacity that only produces a slow-consumer warning. This
//! keeps arrival order exact even under overload.

use std::any::Any;
use std::collections::VecDeque;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::task::{Context, Poll, Waker};

use crate::error::ServerError;

/// A decoded X event, as produced by an event constructor from the
/// [`Registry`](crate::Registry).
///
/// The transport does not interpret event payloads. Concrete event types
/// come from the generated protocol layer; [`UnknownEvent`](crate::UnknownEvent)
/// stands in when no constructor is registered for a kind.
pub trait ServerEvent: fmt::Debug + Send + Sync + 'static {
    /// The 7-bit event kind (classification byte masked with 0x7F).
    fn event_code(&self) -> u8;

    /// Downcasting support for callers that know the concrete type.
    fn as_any(&self) -> &dyn Any;
}

/// What the event stream yields: an event, or a server error for a request
/// whose delivery mode has no error endpoint.
pub type EventOrError = Result<Box<dyn ServerEvent>, Box<dyn ServerError>>;

/// Arrival-order queue between the receiver and the application.
///
/// `VecDeque` under a mutex with waker-based notification; pushing never
/// blocks and never drops. Closing wakes all waiters so they observe the
/// end of the stream.
pub(crate) struct EventQueue {
    inner: Mutex<Inner>,
    soft_capacity: usize,
}

struct Inner {
    queue: VecDeque<EventOrError>,
    wakers: Vec<Waker>,
    closed: bool,
    above_soft_capacity: bool,
}

impl EventQueue {
    pub(crate) fn new(soft_capacity: usize) -> Self {
        Self {
            inner: Mutex::new(Inner {
                queue: VecDeque::new(),
                wakers: Vec::new(),
                closed: false,
                above_soft_capacity: false,
            }),
            soft_capacity,
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Append an item. Never blocks; items pushed after `close` are dropped.
    pub(crate) fn push(&self, item: EventOrError) {
        let mut inner = self.lock();
        if inner.closed {
            tracing::debug!("event dropped: queue already closed");
            return;
        }
        inner.queue.push_back(item);
        if inner.queue.len() >= self.soft_capacity && !inner.above_soft_capacity {
            inner.above_soft_capacity = true;
            tracing::warn!(
                queued = inner.queue.len(),
                soft_capacity = self.soft_capacity,
                "event queue over soft capacity; the consumer is not keeping up"
            );
        }
        for waker in inner.wakers.drain(..) {
            waker.wake();
        }
    }

    /// Non-blocking pop; `None` when nothing is queued.
    pub(crate) fn try_pop(&self) -> Option<EventOrError> {
        let mut inner = self.lock();
        let item = inner.queue.pop_front();
        if inner.queue.len() < self.soft_capacity {
            inner.above_soft_capacity = false;
        }
        item
    }

    /// Wait for the next item; `None` once the queue is closed and drained.
    pub(crate) fn pop(&self) -> PopFuture<'_> {
        PopFuture { queue: self }
    }

    /// Mark the end of the stream and wake all waiters. Queued items stay
    /// observable until drained.
    pub(crate) fn close(&self) {
        let mut inner = self.lock();
        inner.closed = true;
        for waker in inner.wakers.drain(..) {
            waker.wake();
        }
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.lock().queue.len()
    }
}

/// Future returned by [`EventQueue::pop`].
pub(crate) struct PopFuture<'a> {
    queue: &'a EventQueue,
}

impl Future for PopFuture<'_> {
    type Output = Option<EventOrError>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let mut inner = self.queue.lock();
        if let Some(item) = inner.queue.pop_front() {
            if inner.queue.len() < self.queue.soft_capacity {
                inner.above_soft_capacity = false;
            }
            return Poll::Ready(Some(item));
        }
        if inner.closed {
            return Poll::Ready(None);
        }
        inner.wakers.push(cx.waker().clone());
        Poll::Pending
    }
}
