//! Send and receive views over one memory stream.
//!
//! A [`MemoryStream`] owns the shared queue and the binding to its reader
//! loop. Producers hold [`SendStream`]s, the consumer holds a
//! [`ReceiveStream`] and iterates it on the reader loop.

mod sender;
mod receiver;

pub use sender::SendStream;
pub use receiver::{Iter, ReceiveStream};

use core::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use futures::task::AtomicWaker;

use crate::buffer::ItemQueue;
use crate::config::ChannelConfig;
use crate::error::{Error, ErrorKind, Result};
use crate::wake::ReaderLoop;

/// Channel state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelState {
    /// Producers may still send.
    Open,

    /// The end marker is queued; items before it may remain.
    ClosedPending,

    /// The reader consumed the end marker.
    Exhausted,

    /// The reader tried to iterate an exhausted stream.
    Poisoned,
}

/// Counters describing channel activity.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ChannelStats {
    /// Items accepted by `send`.
    pub items_sent: u64,

    /// Items handed to the consumer.
    pub items_received: u64,

    /// Wakes delivered directly on the reader loop.
    pub direct_wakes: u64,

    /// Wakes marshalled onto the reader loop from another thread.
    pub marshalled_wakes: u64,
}

#[derive(Debug, Default)]
struct Counters {
    items_sent: AtomicU64,
    items_received: AtomicU64,
    direct_wakes: AtomicU64,
    marshalled_wakes: AtomicU64,
}

impl Counters {
    fn snapshot(&self) -> ChannelStats {
        ChannelStats {
            items_sent: self.items_sent.load(Ordering::Relaxed),
            items_received: self.items_received.load(Ordering::Relaxed),
            direct_wakes: self.direct_wakes.load(Ordering::Relaxed),
            marshalled_wakes: self.marshalled_wakes.load(Ordering::Relaxed),
        }
    }
}

/// How far the reader has got. Only the receive side moves it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Progress {
    Active,
    Exhausted,
    Poisoned,
}

/// State shared by every view of one channel.
struct Shared<T> {
    queue: ItemQueue<T>,
    progress: Mutex<Progress>,
    waker: AtomicWaker,
    reader: ReaderLoop,
    counters: Counters,
    label: String,
}

impl<T> Shared<T> {
    fn progress(&self) -> MutexGuard<'_, Progress> {
        self.progress.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn state(&self) -> ChannelState {
        match *self.progress() {
            Progress::Poisoned => ChannelState::Poisoned,
            Progress::Exhausted => ChannelState::Exhausted,
            Progress::Active if self.queue.is_sealed() => ChannelState::ClosedPending,
            Progress::Active => ChannelState::Open,
        }
    }

    /// Starts an iteration; poisons the channel if it was already read.
    fn begin_iteration(&self) -> Result<()> {
        let mut progress = self.progress();
        match *progress {
            Progress::Active => Ok(()),
            Progress::Exhausted | Progress::Poisoned => {
                *progress = Progress::Poisoned;
                log::warn!("[{}] Iterating a stream that was already consumed", self.label);
                Err(Error::new(ErrorKind::Closed))
            }
        }
    }

    fn is_poisoned(&self) -> bool {
        *self.progress() == Progress::Poisoned
    }

    fn mark_exhausted(&self) {
        let mut progress = self.progress();
        if *progress == Progress::Active {
            *progress = Progress::Exhausted;
            log::debug!("[{}] End of stream reached", self.label);
        }
    }
}

impl<T: Send + 'static> Shared<T> {
    /// Wakes the reader, directly when already on its loop.
    fn wake(self: &Arc<Self>) -> Result<()> {
        if self.reader.is_current() {
            self.waker.wake();
            self.counters.direct_wakes.fetch_add(1, Ordering::Relaxed);
            log::trace!("[{}] Woke reader directly", self.label);
            return Ok(());
        }

        let shared = Arc::downgrade(self);
        self.reader
            .call_soon(move || {
                if let Some(shared) = shared.upgrade() {
                    shared.waker.wake();
                }
            })
            .inspect_err(|_| log::warn!("[{}] Reader loop is gone", self.label))?;
        self.counters.marshalled_wakes.fetch_add(1, Ordering::Relaxed);
        log::trace!("[{}] Marshalled wake onto reader loop", self.label);
        Ok(())
    }
}

/// An unbounded, single-reader memory stream.
///
/// The stream is bound to one [`ReaderLoop`] for its whole life. Items sent
/// from any thread are delivered, in send order, to the iteration running
/// on that loop.
///
/// ```rust,ignore
/// let stream = MemoryStream::new(ReaderLoop::current()?);
/// let tx = stream.send_stream();
/// let rx = stream.receive_stream();
///
/// std::thread::spawn(move || {
///     tx.send("hello")?;
///     tx.close()
/// });
///
/// let mut items = rx.iter();
/// while let Some(item) = items.next().await {
///     println!("{}", item?);
/// }
/// ```
pub struct MemoryStream<T> {
    shared: Arc<Shared<T>>,
}

impl<T: Send + 'static> MemoryStream<T> {
    /// Creates a stream read on `reader`.
    pub fn new(reader: ReaderLoop) -> Self {
        Self::with_config(reader, ChannelConfig::default())
    }

    /// Creates a stream with explicit settings.
    pub fn with_config(reader: ReaderLoop, config: ChannelConfig) -> Self {
        log::debug!("[{}] Created memory stream", config.label);
        Self {
            shared: Arc::new(Shared {
                queue: ItemQueue::with_capacity(config.initial_capacity),
                progress: Mutex::new(Progress::Active),
                waker: AtomicWaker::new(),
                reader,
                counters: Counters::default(),
                label: config.label,
            }),
        }
    }

    /// Returns a producer view. May be called any number of times.
    pub fn send_stream(&self) -> SendStream<T> {
        SendStream::new(Arc::clone(&self.shared))
    }

    /// Returns a consumer view. May be called any number of times.
    pub fn receive_stream(&self) -> ReceiveStream<T> {
        ReceiveStream::new(Arc::clone(&self.shared))
    }
}

impl<T> MemoryStream<T> {
    /// Returns the current channel state.
    pub fn state(&self) -> ChannelState {
        self.shared.state()
    }

    /// Returns activity counters.
    pub fn stats(&self) -> ChannelStats {
        self.shared.counters.snapshot()
    }

    /// Returns the label from the channel config.
    pub fn label(&self) -> &str {
        &self.shared.label
    }

    /// Returns the reader loop the stream is bound to.
    pub fn reader(&self) -> &ReaderLoop {
        &self.shared.reader
    }
}

impl<T> fmt::Debug for MemoryStream<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemoryStream")
            .field("label", &self.shared.label)
            .field("state", &self.shared.state())
            .field("queued", &self.shared.queue.len())
            .finish()
    }
}

/// Creates a stream on `reader` and returns its two views.
pub fn channel<T: Send + 'static>(reader: ReaderLoop) -> (SendStream<T>, ReceiveStream<T>) {
    let stream = MemoryStream::new(reader);
    (stream.send_stream(), stream.receive_stream())
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::{StreamExt, TryStreamExt};
    use std::sync::atomic::AtomicUsize;
    use std::thread;
    use std::time::{Duration, Instant};

    /// Upper bound on foreign-thread hand-off latency.
    const LATENCY_BUDGET: Duration = Duration::from_millis(10);

    fn current_thread_runtime() -> tokio::runtime::Runtime {
        tokio::runtime::Builder::new_current_thread()
            .enable_time()
            .build()
            .unwrap()
    }

    #[tokio::test]
    async fn test_order_preserved() {
        let stream = MemoryStream::new(ReaderLoop::current().unwrap());
        let tx = stream.send_stream();
        let rx = stream.receive_stream();

        for i in 0..100 {
            tx.send(i).unwrap();
        }
        assert_eq!(stream.state(), ChannelState::Open);
        tx.close().unwrap();
        assert_eq!(stream.state(), ChannelState::ClosedPending);

        let items: Vec<u32> = rx.iter().try_collect().await.unwrap();
        assert_eq!(items, (0..100).collect::<Vec<_>>());
        assert_eq!(stream.state(), ChannelState::Exhausted);

        let stats = stream.stats();
        assert_eq!(stats.items_sent, 100);
        assert_eq!(stats.items_received, 100);
    }

    #[tokio::test]
    async fn test_empty_stream() {
        let (tx, rx) = channel::<String>(ReaderLoop::current().unwrap());
        tx.close().unwrap();

        let mut items = rx.iter();
        assert!(items.next().await.is_none());
        assert_eq!(rx.state(), ChannelState::Exhausted);
    }

    #[tokio::test]
    async fn test_idempotent_close() {
        let (tx, rx) = channel(ReaderLoop::current().unwrap());
        tx.send("only").unwrap();
        tx.close().unwrap();
        tx.close().unwrap();
        tx.clone().close().unwrap();

        let items: Vec<_> = rx.iter().try_collect().await.unwrap();
        assert_eq!(items, vec!["only"]);
        assert_eq!(rx.state(), ChannelState::Exhausted);
    }

    #[tokio::test]
    async fn test_poisoned_after_exhaustion() {
        let (tx, rx) = channel::<u8>(ReaderLoop::current().unwrap());
        tx.close().unwrap();

        // First pass ends normally.
        let mut first = rx.iter();
        assert!(first.next().await.is_none());
        // The same pass stays ended.
        assert!(first.next().await.is_none());

        // A second pass fails at once without yielding items.
        let mut second = rx.iter();
        let err = second.next().await.unwrap().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Closed);
        assert!(second.next().await.is_none());
        assert_eq!(rx.state(), ChannelState::Poisoned);

        // Any further pass fails too, from any receive view.
        let err = rx.clone().iter().next().await.unwrap().unwrap_err();
        assert!(err.is_closed());
    }

    #[tokio::test]
    async fn test_send_after_close() {
        let stream = MemoryStream::new(ReaderLoop::current().unwrap());
        let first = stream.send_stream();
        let second = stream.send_stream();

        first.send(1).unwrap();
        first.close().unwrap();

        let err = second.send(2).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::SendOnClosed);
        assert!(second.is_closed());

        let items: Vec<_> = stream.receive_stream().iter().try_collect().await.unwrap();
        assert_eq!(items, vec![1]);
    }

    #[tokio::test]
    async fn test_same_loop_producer() {
        let stream = MemoryStream::new(ReaderLoop::current().unwrap());
        let tx = stream.send_stream();

        tokio::spawn(async move {
            for i in 0..3 {
                tokio::time::sleep(Duration::from_millis(5)).await;
                tx.send(i).unwrap();
            }
            tx.close().unwrap();
        });

        let items: Vec<_> = stream.receive_stream().iter().try_collect().await.unwrap();
        assert_eq!(items, vec![0, 1, 2]);

        let stats = stream.stats();
        assert_eq!(stats.direct_wakes, 4);
        assert_eq!(stats.marshalled_wakes, 0);
    }

    #[tokio::test]
    async fn test_foreign_runtime_latency() {
        let stream = MemoryStream::new(ReaderLoop::current().unwrap());
        let tx = stream.send_stream();

        // Blocking code on another thread driving its own runtime.
        let worker = thread::spawn(move || {
            current_thread_runtime().block_on(async move {
                for _ in 0..3 {
                    tokio::time::sleep(Duration::from_millis(20)).await;
                    tx.send(Instant::now()).unwrap();
                }
                tx.close().unwrap();
            })
        });

        let mut items = stream.receive_stream().iter();
        let mut received = 0;
        while let Some(sent_at) = items.next().await {
            let latency = sent_at.unwrap().elapsed();
            assert!(latency < LATENCY_BUDGET, "latency: {:?}", latency);
            received += 1;
        }
        worker.join().unwrap();

        assert_eq!(received, 3);
        assert!(stream.stats().marshalled_wakes >= 4);
    }

    #[tokio::test]
    async fn test_same_loop_and_foreign_producers() {
        const PER_PRODUCER: usize = 50;

        let stream = MemoryStream::new(ReaderLoop::current().unwrap());
        let remaining = Arc::new(AtomicUsize::new(2));

        let finish = |tx: SendStream<(char, usize)>, remaining: Arc<AtomicUsize>| {
            if remaining.fetch_sub(1, Ordering::AcqRel) == 1 {
                tx.close().unwrap();
            }
        };

        let tx = stream.send_stream();
        let left = Arc::clone(&remaining);
        tokio::spawn(async move {
            for i in 0..PER_PRODUCER {
                tx.send(('L', i)).unwrap();
                tokio::task::yield_now().await;
            }
            finish(tx, left);
        });

        let tx = stream.send_stream();
        let left = Arc::clone(&remaining);
        let worker = thread::spawn(move || {
            current_thread_runtime().block_on(async {
                for i in 0..PER_PRODUCER {
                    tx.send(('F', i)).unwrap();
                    tokio::time::sleep(Duration::from_micros(100)).await;
                }
            });
            finish(tx, left);
        });

        let mut items = stream.receive_stream().iter();
        let mut received = Vec::new();
        while let Some(item) = items.next().await {
            received.push(item.unwrap());
        }
        // Terminated exactly once.
        assert!(items.next().await.is_none());
        worker.join().unwrap();

        assert_eq!(received.len(), 2 * PER_PRODUCER);
        for tag in ['L', 'F'] {
            let own: Vec<_> = received
                .iter()
                .filter(|(t, _)| *t == tag)
                .map(|(_, i)| *i)
                .collect();
            assert_eq!(own, (0..PER_PRODUCER).collect::<Vec<_>>());
        }
        assert_eq!(stream.state(), ChannelState::Exhausted);
    }

    #[test]
    fn test_reader_gone() {
        let runtime = current_thread_runtime();
        let (tx, rx) = channel::<u8>(ReaderLoop::new(runtime.handle().clone()));
        drop(runtime);

        let err = tx.send(1).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ReaderUnavailable);
        assert!(err.is_send_on_closed());
        // Refused before queueing.
        assert_eq!(rx.stats().items_sent, 0);

        // The end marker is still recorded.
        let err = tx.close().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ReaderUnavailable);
        assert!(tx.is_closed());
        assert_eq!(rx.state(), ChannelState::ClosedPending);
    }
}
