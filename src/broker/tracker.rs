//! Reference-counted local interest in streams

use std::collections::HashMap;

use parking_lot::Mutex;

/// Tracks how many local subscribers each stream has
///
/// Only the 0 → 1 and 1 → 0 transitions are reported, so the fan-out layer
/// hears about a stream once no matter how many channels watch it.
#[derive(Debug, Default)]
pub struct StreamsTracker {
    streams: Mutex<HashMap<String, u64>>,
}

impl StreamsTracker {
    /// Create an empty tracker
    pub fn new() -> Self {
        Self::default()
    }

    /// Add interest in a stream
    ///
    /// Returns true if the stream was not watched before.
    pub fn add(&self, stream: &str) -> bool {
        let mut streams = self.streams.lock();

        match streams.get_mut(stream) {
            Some(count) => {
                *count += 1;
                false
            }
            None => {
                streams.insert(stream.to_string(), 1);
                true
            }
        }
    }

    /// Check whether the stream has local subscribers
    pub fn has(&self, stream: &str) -> bool {
        self.streams.lock().contains_key(stream)
    }

    /// Remove interest in a stream
    ///
    /// Returns true if that was the last subscriber. Removing an unknown
    /// stream is a no-op.
    pub fn remove(&self, stream: &str) -> bool {
        let mut streams = self.streams.lock();

        match streams.get_mut(stream) {
            Some(count) if *count > 1 => {
                *count -= 1;
                false
            }
            Some(_) => {
                streams.remove(stream);
                true
            }
            None => false,
        }
    }

    /// Number of watched streams
    pub fn len(&self) -> usize {
        self.streams.lock().len()
    }

    /// Whether no stream is watched
    pub fn is_empty(&self) -> bool {
        self.streams.lock().is_empty()
    }
}
