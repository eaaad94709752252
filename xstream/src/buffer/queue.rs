//! Unbounded FIFO shared between producers and the reader.
//!
//! Producers push from any thread; only the reader drains. The queue
//! holds payloads plus a single end marker that seals it.

use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard, PoisonError};

use crate::error::{Error, ErrorKind, Result};

/// A queued entry: either a payload or the end-of-stream marker.
#[derive(Debug, PartialEq, Eq)]
pub enum Slot<T> {
    /// A payload sent by a producer.
    Item(T),

    /// Sentinel enqueued by `close`. Always last.
    End,
}

#[derive(Debug)]
struct Inner<T> {
    slots: VecDeque<Slot<T>>,
    sealed: bool,
}

/// Mutex-protected queue of slots.
///
/// The lock is the ordering authority: the order in which `push` calls
/// complete is the order the reader observes.
#[derive(Debug)]
pub struct ItemQueue<T> {
    inner: Mutex<Inner<T>>,
    /// Capacity each fresh buffer starts with after a drain.
    initial_capacity: usize,
}

impl<T> ItemQueue<T> {
    /// Creates an empty queue with room for `capacity` slots before growing.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            inner: Mutex::new(Inner {
                slots: VecDeque::with_capacity(capacity),
                sealed: false,
            }),
            initial_capacity: capacity,
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner<T>> {
        // A panicking producer cannot leave the deque half-written.
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Appends an item to the tail.
    ///
    /// Fails once the end marker has been enqueued.
    pub fn push(&self, item: T) -> Result<()> {
        let mut inner = self.lock();
        if inner.sealed {
            return Err(Error::new(ErrorKind::SendOnClosed));
        }
        inner.slots.push_back(Slot::Item(item));
        Ok(())
    }

    /// Appends the end marker unless it is already queued.
    ///
    /// Returns true if this call sealed the queue.
    pub fn seal(&self) -> bool {
        let mut inner = self.lock();
        if inner.sealed {
            return false;
        }
        inner.sealed = true;
        inner.slots.push_back(Slot::End);
        true
    }

    /// Removes and returns everything currently queued, in order.
    ///
    /// The queue restarts at its configured capacity, so one large burst
    /// does not make every later drain allocate a buffer of that size.
    pub fn try_drain_all(&self) -> VecDeque<Slot<T>> {
        let mut inner = self.lock();
        if inner.slots.is_empty() {
            return VecDeque::new();
        }
        let fresh = VecDeque::with_capacity(self.initial_capacity);
        core::mem::replace(&mut inner.slots, fresh)
    }

    /// Puts slots the reader drained but never handed out back at the head.
    pub fn requeue_front(&self, mut slots: VecDeque<Slot<T>>) {
        if slots.is_empty() {
            return;
        }
        let mut inner = self.lock();
        slots.append(&mut inner.slots);
        inner.slots = slots;
    }

    /// Returns true once the end marker has been enqueued.
    pub fn is_sealed(&self) -> bool {
        self.lock().sealed
    }

    /// Returns the number of queued slots, end marker included.
    pub fn len(&self) -> usize {
        self.lock().slots.len()
    }

    /// Returns true if nothing is queued.
    pub fn is_empty(&self) -> bool {
        self.lock().slots.is_empty()
    }
}
