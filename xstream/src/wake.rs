//! Cross-runtime wake primitive.
//!
//! A [`ReaderLoop`] is a handle to the runtime the consumer iterates on.
//! Any thread can hand it a callback to run on that runtime, whether the
//! caller is a task on the same loop, a blocking thread, or a task on an
//! unrelated runtime.

use core::fmt;
use std::sync::{Arc, OnceLock};
use std::thread::{self, ThreadId};

use tokio::runtime::{Handle, RuntimeFlavor};
use tokio::sync::mpsc;

use crate::error::{Error, ErrorKind, Result};

/// Work submitted to the reader loop.
pub type Callback = Box<dyn FnOnce() + Send + 'static>;

/// Handle to the runtime that hosts the reader.
///
/// Binding spawns a small callback pump on the reader runtime. Callbacks
/// submitted through [`call_soon`](Self::call_soon) run on the pump in
/// submission order. When the runtime shuts down the pump is dropped and
/// further submissions fail with [`ErrorKind::ReaderUnavailable`].
#[derive(Clone)]
pub struct ReaderLoop {
    handle: Handle,
    callbacks: mpsc::UnboundedSender<Callback>,
    /// Thread driving a current-thread reader runtime, once known.
    thread: Arc<OnceLock<ThreadId>>,
}

impl ReaderLoop {
    /// Binds to the runtime behind `handle`.
    ///
    /// May be called from any thread, inside or outside a runtime.
    pub fn new(handle: Handle) -> Self {
        let (callbacks, rx) = mpsc::unbounded_channel();
        let thread = Arc::new(OnceLock::new());

        let track = match handle.runtime_flavor() {
            RuntimeFlavor::CurrentThread => Some(Arc::clone(&thread)),
            _ => None,
        };
        handle.spawn(pump(rx, track));

        log::debug!("Bound reader loop ({:?})", handle.runtime_flavor());

        Self {
            handle,
            callbacks,
            thread,
        }
    }

    /// Binds to the runtime the caller is running on.
    ///
    /// The reader thread is learned from the pump once it runs, not from
    /// the caller, which may be a `spawn_blocking` thread.
    pub fn current() -> Result<Self> {
        let handle =
            Handle::try_current().map_err(|_| Error::new(ErrorKind::ReaderUnavailable))?;
        Ok(Self::new(handle))
    }

    /// Returns the runtime handle this loop is bound to.
    pub fn handle(&self) -> &Handle {
        &self.handle
    }

    /// Returns true when called from the thread driving the reader loop.
    ///
    /// Only current-thread runtimes can be recognised. Callers on a
    /// multi-thread reader runtime always get `false` and take the
    /// marshalled path.
    pub fn is_current(&self) -> bool {
        let on_reader_thread = self
            .thread
            .get()
            .is_some_and(|id| *id == thread::current().id());
        on_reader_thread && Handle::try_current().is_ok()
    }

    /// Returns false once the reader runtime has shut down.
    pub fn is_alive(&self) -> bool {
        !self.callbacks.is_closed()
    }

    /// Schedules `callback` to run on the reader loop.
    ///
    /// Never waits for the reader to act on it.
    pub fn call_soon<F>(&self, callback: F) -> Result<()>
    where
        F: FnOnce() + Send + 'static,
    {
        self.callbacks
            .send(Box::new(callback))
            .map_err(|_| Error::new(ErrorKind::ReaderUnavailable))
    }
}

impl fmt::Debug for ReaderLoop {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReaderLoop")
            .field("flavor", &self.handle.runtime_flavor())
            .field("thread", &self.thread.get())
            .field("alive", &self.is_alive())
            .finish()
    }
}

async fn pump(
    mut callbacks: mpsc::UnboundedReceiver<Callback>,
    track: Option<Arc<OnceLock<ThreadId>>>,
) {
    if let Some(reader_thread) = track {
        let _ = reader_thread.set(thread::current().id());
    }

    while let Some(callback) = callbacks.recv().await {
        callback();
    }

    log::trace!("Reader loop released by all handles");
}
