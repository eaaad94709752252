//! Buffer management for the memory stream.
//!
//! - ItemQueue: unbounded FIFO of payloads sealed by an end marker

mod queue;

pub use queue::{ItemQueue, Slot};
