//! In-memory bounded FIFO queue.

use std::collections::VecDeque;

use parking_lot::Mutex;
use tokio::sync::{Semaphore, SemaphorePermit, TryAcquireError};

use crate::error::{ConfigError, QueueError};

struct QueueState<T> {
    items: VecDeque<T>,
    closed: bool,
}

/// Fixed-capacity FIFO buffer shared by producers and consumers.
///
/// Design:
/// - `slots` holds one permit per free slot and `ready` one permit per queued
///   item. Tokio's semaphore hands released permits straight to the oldest
///   waiter, so blocked producers and blocked consumers are both served
///   first-come first-served. A late caller cannot take a permit that is
///   already promised to a waiter.
/// - `close` adds one extra `ready` permit. A consumer that finds the queue
///   closed and empty returns that permit, which wakes the next consumer.
/// - `state` is a short critical section only. No lock is held across `.await`.
pub struct BoundedQueue<T> {
    state: Mutex<QueueState<T>>,
    slots: Semaphore,
    ready: Semaphore,
    capacity: usize,
}

impl<T> BoundedQueue<T> {
    pub fn new(capacity: usize) -> Result<Self, ConfigError> {
        if capacity == 0 {
            return Err(ConfigError::ZeroCapacity);
        }
        if capacity > Semaphore::MAX_PERMITS {
            return Err(ConfigError::CapacityTooLarge(capacity));
        }
        Ok(Self {
            state: Mutex::new(QueueState {
                items: VecDeque::new(),
                closed: false,
            }),
            slots: Semaphore::new(capacity),
            ready: Semaphore::new(0),
            capacity,
        })
    }

    /// Append `item`, waiting while the queue is full.
    ///
    /// Fails with `QueueError::Closed` if the queue is closed before or while
    /// waiting. Cancel safe: dropping the future before it completes leaves
    /// the queue untouched.
    pub async fn enqueue(&self, item: T) -> Result<(), QueueError> {
        let permit = self
            .slots
            .acquire()
            .await
            .map_err(|_| QueueError::Closed)?;
        // the slot is given back by whoever dequeues the item
        permit.forget();
        self.push(item)
    }

    /// Append `item` without waiting.
    pub fn try_enqueue(&self, item: T) -> Result<(), QueueError> {
        match self.slots.try_acquire() {
            Ok(permit) => {
                permit.forget();
                self.push(item)
            }
            Err(TryAcquireError::Closed) => Err(QueueError::Closed),
            Err(TryAcquireError::NoPermits) => Err(QueueError::Full),
        }
    }

    fn push(&self, item: T) -> Result<(), QueueError> {
        {
            let mut state = self.state.lock();
            if state.closed {
                return Err(QueueError::Closed);
            }
            state.items.push_back(item);
        }
        self.ready.add_permits(1);
        Ok(())
    }

    /// Remove the oldest item, waiting while the queue is empty.
    ///
    /// Returns `None` once the queue is closed and every remaining item has
    /// been handed out.
    pub async fn dequeue(&self) -> Option<T> {
        loop {
            // 待っている consumer には到着順に permit が直接渡る
            let permit = self.ready.acquire().await.ok()?;
            match self.claim(permit) {
                Ok(Some(item)) => return Some(item),
                // drain に先を越された permit。もう一度待つ
                Ok(None) => {}
                Err(_) => return None,
            }
        }
    }

    /// Non-blocking dequeue.
    ///
    /// - `Ok(Some(item))`: the oldest item
    /// - `Ok(None)`: nothing available right now
    /// - `Err(QueueError::Closed)`: closed and empty
    pub fn try_dequeue(&self) -> Result<Option<T>, QueueError> {
        match self.ready.try_acquire() {
            Ok(permit) => self.claim(permit),
            Err(_) => {
                let state = self.state.lock();
                if state.closed && state.items.is_empty() {
                    Err(QueueError::Closed)
                } else {
                    Ok(None)
                }
            }
        }
    }

    /// Pop the front item on behalf of a `ready` permit holder.
    fn claim(&self, permit: SemaphorePermit<'_>) -> Result<Option<T>, QueueError> {
        let item = {
            let mut state = self.state.lock();
            match state.items.pop_front() {
                Some(item) => item,
                // closed: dropping the permit passes the wakeup on
                None if state.closed => return Err(QueueError::Closed),
                None => {
                    permit.forget();
                    return Ok(None);
                }
            }
        };
        permit.forget();
        self.slots.add_permits(1);
        Ok(Some(item))
    }

    /// Close the queue.
    ///
    /// Blocked and future `enqueue` calls fail; `dequeue` keeps returning
    /// the remaining items and then `None`. Returns `false` if the queue was
    /// already closed.
    pub fn close(&self) -> bool {
        let newly_closed = {
            let mut state = self.state.lock();
            !std::mem::replace(&mut state.closed, true)
        };
        if newly_closed {
            self.closed_wakeup();
        }
        newly_closed
    }

    /// Close the queue and take every queued item in the same critical
    /// section, oldest first.
    ///
    /// No consumer can claim an item once this starts. Returns whether the
    /// queue was newly closed, plus the removed items.
    pub fn close_and_drain(&self) -> (bool, Vec<T>) {
        let (newly_closed, items) = {
            let mut state = self.state.lock();
            let newly_closed = !std::mem::replace(&mut state.closed, true);
            let items: Vec<T> = state.items.drain(..).collect();
            (newly_closed, items)
        };
        self.release_drained(items.len());
        if newly_closed {
            self.closed_wakeup();
        }
        (newly_closed, items)
    }

    /// Remove and return every queued item, oldest first.
    pub fn drain(&self) -> Vec<T> {
        let items: Vec<T> = {
            let mut state = self.state.lock();
            state.items.drain(..).collect()
        };
        self.release_drained(items.len());
        items
    }

    /// Give back the slots of `n` removed items and retire their `ready`
    /// permits. Permits already handed to a consumer are retired by `claim`.
    fn release_drained(&self, n: usize) {
        for _ in 0..n {
            match self.ready.try_acquire() {
                Ok(permit) => permit.forget(),
                Err(_) => break,
            }
        }
        self.slots.add_permits(n);
    }

    fn closed_wakeup(&self) {
        self.slots.close();
        self.ready.add_permits(1);
    }

    pub fn len(&self) -> usize {
        self.state.lock().items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.state.lock().items.is_empty()
    }

    pub fn is_closed(&self) -> bool {
        self.state.lock().closed
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
