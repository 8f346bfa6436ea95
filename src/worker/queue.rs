//! Bounded blocking queue
//!
//! Multi-producer, multi-consumer FIFO with a fixed capacity. Senders block
//! while the queue is full and receivers block while it is empty. Closing the
//! queue wakes everyone: pending items can still be received, after which
//! `recv` reports [`QueueClosed`].

use std::collections::VecDeque;
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};

/// Bounded queue shared between the walker, the workers and the aggregator
#[derive(Debug)]
pub struct BoundedQueue<T> {
    inner: Arc<QueueInner<T>>,
}

#[derive(Debug)]
struct QueueInner<T> {
    buffer: Mutex<QueueBuffer<T>>,
    not_empty: Condvar,
    not_full: Condvar,
}

#[derive(Debug)]
struct QueueBuffer<T> {
    items: VecDeque<T>,
    capacity: usize,
    closed: bool,
}

/// The queue was closed (and, for receivers, fully drained)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueueClosed;

impl std::fmt::Display for QueueClosed {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "queue closed")
    }
}

impl std::error::Error for QueueClosed {}

impl<T> BoundedQueue<T> {
    /// Create a queue holding at most `capacity` items (minimum 1)
    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            inner: Arc::new(QueueInner {
                buffer: Mutex::new(QueueBuffer {
                    items: VecDeque::with_capacity(capacity),
                    capacity,
                    closed: false,
                }),
                not_empty: Condvar::new(),
                not_full: Condvar::new(),
            }),
        }
    }

    // Items are plain data, so a panic while holding the lock cannot leave
    // the buffer half-updated.
    fn lock(&self) -> MutexGuard<'_, QueueBuffer<T>> {
        self.inner.buffer.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Push an item, blocking while the queue is full
    pub fn send(&self, value: T) -> Result<(), QueueClosed> {
        let mut buffer = self.lock();

        while buffer.items.len() >= buffer.capacity && !buffer.closed {
            buffer = self
                .inner
                .not_full
                .wait(buffer)
                .unwrap_or_else(PoisonError::into_inner);
        }

        if buffer.closed {
            return Err(QueueClosed);
        }

        buffer.items.push_back(value);
        self.inner.not_empty.notify_one();
        Ok(())
    }

    /// Pop an item, blocking while the queue is empty and still open
    pub fn recv(&self) -> Result<T, QueueClosed> {
        let mut buffer = self.lock();

        while buffer.items.is_empty() && !buffer.closed {
            buffer = self
                .inner
                .not_empty
                .wait(buffer)
                .unwrap_or_else(PoisonError::into_inner);
        }

        match buffer.items.pop_front() {
            Some(value) => {
                self.inner.not_full.notify_one();
                Ok(value)
            }
            None => Err(QueueClosed),
        }
    }

    /// Close the queue. Items already queued remain receivable.
    pub fn close(&self) {
        let mut buffer = self.lock();
        buffer.closed = true;
        self.inner.not_empty.notify_all();
        self.inner.not_full.notify_all();
    }

    pub fn is_closed(&self) -> bool {
        self.lock().closed
    }

    /// Number of items currently queued
    pub fn len(&self) -> usize {
        self.lock().items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.lock().capacity
    }

    /// Blocking iterator that ends once the queue is closed and drained
    pub fn iter(&self) -> Drain<'_, T> {
        Drain { queue: self }
    }
}

impl<T> Clone for BoundedQueue<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

/// Iterator returned by [`BoundedQueue::iter`]
pub struct Drain<'a, T> {
    queue: &'a BoundedQueue<T>,
}

impl<T> Iterator for Drain<'_, T> {
    type Item = T;

    fn next(&mut self) -> Option<T> {
        self.queue.recv().ok()
    }
}
