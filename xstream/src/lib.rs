//! # XStream - An In-Process Memory Stream Across Runtimes
//!
//! XStream is an unbounded, single-reader channel that lets code on any
//! thread feed an asynchronous `Stream` running on one designated runtime
//! (the *reader loop*). It provides:
//!
//! - **Cross-runtime hand-off**: producers may be tasks on the reader loop,
//!   plain blocking threads, or tasks on an unrelated runtime
//! - **No polling**: the reader sleeps until a producer wakes it
//! - **Ordered delivery**: items arrive in the order they were queued
//! - **Graceful close**: the reader drains what is left, then the stream ends
//! - **Single use**: iterating a stream that was already read is an error
//!
//! ## Architecture
//!
//! ```text
//! ┌───────────────────────┐      ┌───────────────────────┐
//! │  producer task        │      │  worker thread        │
//! │  (reader loop)        │      │  (own runtime / none) │
//! └──────────┬────────────┘      └──────────┬────────────┘
//!            │ SendStream::send             │ SendStream::send
//!            ▼                              ▼
//! ┌─────────────────────────────────────────────────────────┐
//! │                    ItemQueue (mutex)                     │
//! ├─────────────────────────────────────────────────────────┤
//! │   direct wake            │     ReaderLoop::call_soon    │
//! └──────────┬───────────────┴──────────────┬───────────────┘
//!            ▼                              ▼
//! ┌─────────────────────────────────────────────────────────┐
//! │          ReceiveStream::iter() on the reader loop        │
//! └─────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Example
//!
//! ```rust,ignore
//! use futures::StreamExt;
//! use xstream::{MemoryStream, ReaderLoop};
//!
//! let stream = MemoryStream::new(ReaderLoop::current()?);
//! let tx = stream.send_stream();
//!
//! std::thread::spawn(move || {
//!     for i in 0..3 {
//!         tx.send(i)?;
//!     }
//!     tx.close()
//! });
//!
//! let mut items = stream.receive_stream().iter();
//! while let Some(item) = items.next().await {
//!     println!("{}", item?);
//! }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod buffer;
pub mod channel;
pub mod config;
pub mod error;
pub mod wake;

// Re-export commonly used types
pub use channel::{
    channel, ChannelState, ChannelStats, Iter, MemoryStream, ReceiveStream, SendStream,
};
pub use config::ChannelConfig;
pub use error::{Error, ErrorKind, Result};
pub use wake::ReaderLoop;

/// Default number of queue slots allocated up front
pub const DEFAULT_INITIAL_CAPACITY: usize = 16;
