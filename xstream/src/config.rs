//! Channel configuration.

use crate::DEFAULT_INITIAL_CAPACITY;

/// Per-channel settings.
#[derive(Debug, Clone)]
pub struct ChannelConfig {
    /// Name used in log lines.
    pub label: String,
    /// Slots pre-allocated in the queue. Not a bound.
    pub initial_capacity: usize,
}

impl ChannelConfig {
    /// Creates the default settings.
    pub fn new() -> Self {
        Self {
            label: String::from("memory-stream"),
            initial_capacity: DEFAULT_INITIAL_CAPACITY,
        }
    }

    /// Sets the log label.
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = label.into();
        self
    }

    /// Sets the number of pre-allocated queue slots.
    pub fn with_initial_capacity(mut self, capacity: usize) -> Self {
        self.initial_capacity = capacity;
        self
    }
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self::new()
    }
}
