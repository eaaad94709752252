//! Consumer side of the memory stream.
//!
//! Iteration drains everything queued at once and hands items out one
//! per poll, suspending only when the queue is empty.

use core::fmt;
use core::pin::Pin;
use core::task::{Context, Poll};
use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::Ordering;

use futures::Stream;
use futures::stream::FusedStream;

use super::{ChannelState, ChannelStats, Shared};
use crate::buffer::Slot;
use crate::error::{Error, ErrorKind, Result};

/// Consumer view of a memory stream.
///
/// Clones share the one queue; draining is destructive, so only one
/// iteration should be active at a time.
pub struct ReceiveStream<T> {
    shared: Arc<Shared<T>>,
}

impl<T> ReceiveStream<T> {
    pub(super) fn new(shared: Arc<Shared<T>>) -> Self {
        Self { shared }
    }

    /// Begins one pass over the stream.
    ///
    /// The pass ends normally at the end marker. Starting another pass
    /// after that poisons the channel: its first item is a
    /// [`ErrorKind::Closed`] error.
    pub fn iter(&self) -> Iter<T> {
        Iter {
            shared: Arc::clone(&self.shared),
            pending: VecDeque::new(),
            started: false,
            done: false,
        }
    }

    /// Returns the current channel state.
    pub fn state(&self) -> ChannelState {
        self.shared.state()
    }

    /// Returns activity counters.
    pub fn stats(&self) -> ChannelStats {
        self.shared.counters.snapshot()
    }
}

impl<T> Clone for ReceiveStream<T> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<T> fmt::Debug for ReceiveStream<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReceiveStream")
            .field("label", &self.shared.label)
            .field("state", &self.shared.state())
            .finish()
    }
}

/// One asynchronous pass over a [`ReceiveStream`].
///
/// Must be polled on the reader loop the stream is bound to.
pub struct Iter<T> {
    shared: Arc<Shared<T>>,
    /// Slots drained but not yet handed out.
    pending: VecDeque<Slot<T>>,
    started: bool,
    done: bool,
}

// Nothing in `Iter` is structurally pinned.
impl<T> Unpin for Iter<T> {}

impl<T> Iter<T> {
    fn fail(&mut self) -> Poll<Option<Result<T>>> {
        self.done = true;
        self.pending.clear();
        Poll::Ready(Some(Err(Error::new(ErrorKind::Closed))))
    }
}

impl<T> Stream for Iter<T> {
    type Item = Result<T>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        if this.done {
            return Poll::Ready(None);
        }

        if !this.started {
            this.started = true;
            if this.shared.begin_iteration().is_err() {
                return this.fail();
            }
        } else if this.shared.is_poisoned() {
            return this.fail();
        }

        loop {
            match this.pending.pop_front() {
                Some(Slot::Item(item)) => {
                    this.shared
                        .counters
                        .items_received
                        .fetch_add(1, Ordering::Relaxed);
                    return Poll::Ready(Some(Ok(item)));
                }
                Some(Slot::End) => {
                    this.done = true;
                    this.shared.mark_exhausted();
                    return Poll::Ready(None);
                }
                None => {}
            }

            // Register before draining so a send landing in between
            // still wakes this task.
            this.shared.waker.register(cx.waker());
            let drained = this.shared.queue.try_drain_all();
            if drained.is_empty() {
                return Poll::Pending;
            }
            log::trace!("[{}] Drained {} slots", this.shared.label, drained.len());
            this.pending = drained;
        }
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        if self.done {
            return (0, Some(0));
        }
        let buffered = self
            .pending
            .iter()
            .filter(|slot| matches!(slot, Slot::Item(_)))
            .count();
        (buffered, None)
    }
}

impl<T> Drop for Iter<T> {
    fn drop(&mut self) {
        // Undelivered slots go back so a later pass still sees them.
        let pending = core::mem::take(&mut self.pending);
        self.shared.queue.requeue_front(pending);
    }
}

impl<T> FusedStream for Iter<T> {
    fn is_terminated(&self) -> bool {
        self.done
    }
}

impl<T> fmt::Debug for Iter<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Iter")
            .field("label", &self.shared.label)
            .field("buffered", &self.pending.len())
            .field("done", &self.done)
            .finish()
    }
}
