//! Per-connection outbound queue
//!
//! A bounded FIFO with a drop-oldest overflow policy. The hub is the only
//! producer and the connection's write loop the only consumer, so pushes
//! never wait: when the queue is full the oldest envelope is displaced.
//! Closing the queue lets the consumer drain what is left and then stop.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};

use tokio::sync::Notify;

use crate::envelope::Envelope;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PushOutcome {
    Enqueued,
    /// The envelope was queued after evicting the oldest one.
    DisplacedOldest,
    Closed,
}

#[derive(Debug, Default)]
struct Inner {
    buf: VecDeque<Arc<Envelope>>,
    closed: bool,
    displaced: u64,
}

#[derive(Debug)]
pub struct OutboundQueue {
    inner: Mutex<Inner>,
    notify: Notify,
    capacity: usize,
}

impl OutboundQueue {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            inner: Mutex::new(Inner {
                buf: VecDeque::with_capacity(capacity),
                ..Inner::default()
            }),
            notify: Notify::new(),
            capacity,
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        // A panic while holding this lock cannot leave the deque half-updated.
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn push(&self, envelope: Arc<Envelope>) -> PushOutcome {
        let outcome = {
            let mut inner = self.lock();
            if inner.closed {
                return PushOutcome::Closed;
            }
            let outcome = if inner.buf.len() >= self.capacity {
                inner.buf.pop_front();
                inner.displaced += 1;
                PushOutcome::DisplacedOldest
            } else {
                PushOutcome::Enqueued
            };
            inner.buf.push_back(envelope);
            outcome
        };
        self.notify.notify_one();
        outcome
    }

    /// Wait for the next envelope. Returns `None` once the queue is closed and drained.
    pub async fn pop(&self) -> Option<Arc<Envelope>> {
        loop {
            {
                let mut inner = self.lock();
                if let Some(envelope) = inner.buf.pop_front() {
                    return Some(envelope);
                }
                if inner.closed {
                    return None;
                }
            }
            // Single consumer: a notify_one issued between the check and here
            // leaves a permit, so the wakeup is not lost.
            self.notify.notified().await;
        }
    }

    pub fn try_pop(&self) -> Option<Arc<Envelope>> {
        self.lock().buf.pop_front()
    }

    pub fn close(&self) {
        self.lock().closed = true;
        self.notify.notify_one();
    }

    pub fn is_closed(&self) -> bool {
        self.lock().closed
    }

    pub fn len(&self) -> usize {
        self.lock().buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Total envelopes evicted by the drop-oldest policy.
    pub fn displaced(&self) -> u64 {
        self.lock().displaced
    }
}
