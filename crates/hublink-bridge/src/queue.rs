use std::collections::VecDeque;
use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};

use crate::error::{BridgeError, Result};

/// Thread-safe fixed-capacity FIFO.
///
/// `size() <= capacity()` holds at every observable point. A push onto a full
/// queue is refused and the item is handed back untouched; it never blocks.
pub struct BoundedQueue<T> {
    name: &'static str,
    capacity: usize,
    state: Mutex<QueueState<T>>,
    not_empty: Condvar,
}

struct QueueState<T> {
    items: VecDeque<T>,
    closed: bool,
}

impl<T> BoundedQueue<T> {
    /// Create a queue. A capacity of zero is a configuration error.
    pub fn new(name: &'static str, capacity: usize) -> Result<Self> {
        if capacity == 0 {
            return Err(BridgeError::InvalidConfig(format!(
                "{name} queue capacity must be greater than zero"
            )));
        }
        Ok(Self {
            name,
            capacity,
            state: Mutex::new(QueueState {
                items: VecDeque::with_capacity(capacity),
                closed: false,
            }),
            not_empty: Condvar::new(),
        })
    }

    fn lock(&self) -> MutexGuard<'_, QueueState<T>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Enqueue `item`.
    ///
    /// Returns `Err(item)` when the queue is full or closed.
    pub fn push(&self, item: T) -> std::result::Result<(), T> {
        let mut state = self.lock();
        if state.closed || state.items.len() >= self.capacity {
            return Err(item);
        }
        state.items.push_back(item);
        drop(state);
        self.not_empty.notify_one();
        Ok(())
    }

    /// Enqueue `item`, evicting the oldest entry if the queue is full.
    ///
    /// Returns the evicted entry, or `item` itself if the queue is closed.
    pub fn push_evicting(&self, item: T) -> Option<T> {
        let mut state = self.lock();
        if state.closed {
            return Some(item);
        }
        let evicted = if state.items.len() >= self.capacity {
            state.items.pop_front()
        } else {
            None
        };
        state.items.push_back(item);
        drop(state);
        self.not_empty.notify_one();
        evicted
    }

    /// Wait until an item is available and remove the oldest one.
    ///
    /// Returns `None` once the queue is closed, even if items remain; those
    /// are collected with [`drain`](Self::drain).
    pub fn pop_blocking(&self) -> Option<T> {
        let guard = self.lock();
        let mut state = self
            .not_empty
            .wait_while(guard, |s| s.items.is_empty() && !s.closed)
            .unwrap_or_else(PoisonError::into_inner);
        if state.closed {
            return None;
        }
        state.items.pop_front()
    }

    /// Remove the oldest item without waiting.
    pub fn try_pop(&self) -> Option<T> {
        let mut state = self.lock();
        if state.closed {
            return None;
        }
        state.items.pop_front()
    }

    /// Snapshot of the current length.
    pub fn size(&self) -> usize {
        self.lock().items.len()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn is_empty(&self) -> bool {
        self.size() == 0
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Close the queue and wake every waiter.
    pub fn close(&self) {
        self.lock().closed = true;
        self.not_empty.notify_all();
    }

    pub fn is_closed(&self) -> bool {
        self.lock().closed
    }

    /// Take everything still queued, oldest first.
    pub fn drain(&self) -> Vec<T> {
        self.lock().items.drain(..).collect()
    }
}

impl<T: Clone> BoundedQueue<T> {
    /// Copy of the queued items, oldest first.
    pub fn snapshot(&self) -> Vec<T> {
        self.lock().items.iter().cloned().collect()
    }
}
