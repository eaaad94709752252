//! Producer side of the memory stream.

use core::fmt;
use std::sync::Arc;
use std::sync::atomic::Ordering;

use super::{ChannelState, Shared};
use crate::error::{Error, ErrorKind, Result};

/// Producer view of a memory stream.
///
/// Cheap to clone. Every clone feeds the same queue, and any of them may
/// be used concurrently from any thread or runtime.
pub struct SendStream<T> {
    shared: Arc<Shared<T>>,
}

impl<T> SendStream<T> {
    pub(super) fn new(shared: Arc<Shared<T>>) -> Self {
        Self { shared }
    }

    /// Returns true once any send view has closed the channel.
    pub fn is_closed(&self) -> bool {
        self.shared.queue.is_sealed()
    }

    /// Returns the current channel state.
    pub fn state(&self) -> ChannelState {
        self.shared.state()
    }
}

impl<T: Send + 'static> SendStream<T> {
    /// Sends an item and wakes the reader.
    ///
    /// Returns once the item is queued and the wake is submitted; the
    /// reader picks it up later on its own loop.
    ///
    /// A reader loop that is already gone fails the send before anything is
    /// queued. If the loop shuts down after that check, the item stays
    /// queued and counted while the wake still fails with
    /// [`ErrorKind::ReaderUnavailable`].
    pub fn send(&self, item: T) -> Result<()> {
        if !self.shared.reader.is_alive() {
            log::warn!("[{}] Send with reader loop gone", self.shared.label);
            return Err(Error::new(ErrorKind::ReaderUnavailable));
        }

        self.shared
            .queue
            .push(item)
            .inspect_err(|_| log::warn!("[{}] Send on closed channel", self.shared.label))?;
        self.shared.counters.items_sent.fetch_add(1, Ordering::Relaxed);
        log::trace!("[{}] Queued item", self.shared.label);

        self.shared.wake()
    }

    /// Sends every item in order, stopping at the first failure.
    ///
    /// Returns the number of items sent.
    pub fn send_all<I>(&self, items: I) -> Result<usize>
    where
        I: IntoIterator<Item = T>,
    {
        let mut sent = 0;
        for item in items {
            self.send(item)?;
            sent += 1;
        }
        Ok(sent)
    }

    /// Enqueues the end marker and wakes the reader.
    ///
    /// Closing an already closed channel does nothing.
    pub fn close(&self) -> Result<()> {
        if !self.shared.queue.seal() {
            return Ok(());
        }
        log::debug!("[{}] Closed by producer", self.shared.label);

        self.shared.wake()
    }
}

impl<T> Clone for SendStream<T> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<T> fmt::Debug for SendStream<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SendStream")
            .field("label", &self.shared.label)
            .field("closed", &self.is_closed())
            .finish()
    }
}
