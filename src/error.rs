//! Error types for broker operations
//!
//! Errors are grouped by what the caller is expected to do about them:
//!
//! - **Unavailable**: the backend is not started or not compiled in.
//! - **Stale reference**: the requested epoch/offset can no longer be served;
//!   the client must drop its position and resync from scratch.
//! - **Backend**: network or serialization failures from an external store.
//!
//! "Nothing found" is never an error: restores return `Ok(None)` and unknown
//! streams in [`history_since`](crate::Broker::history_since) return an empty list.

use thiserror::Error;

/// Boxed error used at the seams with external stores and [`Cacheable`](crate::Cacheable) values
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Error type for broker operations
#[derive(Debug, Error)]
pub enum BrokerError {
    /// Backend has not been started (or has been shut down)
    #[error("broker is not started")]
    NotStarted,

    /// Adapter was requested but is not compiled into this build
    #[error("broker adapter is not available in this build: {0}")]
    AdapterUnavailable(String),

    /// Requested epoch doesn't match the current one
    #[error("epoch mismatch: requested {requested}, current {current}")]
    EpochMismatch { requested: String, current: String },

    /// History for the stream doesn't exist (never written or expired)
    #[error("stream not found: {0}")]
    StreamNotFound(String),

    /// The stream log exists but currently holds no entries
    #[error("stream is empty: {0}")]
    StreamEmpty(String),

    /// Requested offset has already been evicted
    #[error("requested offset unavailable: {requested}, lowest: {lowest}")]
    OffsetUnavailable { requested: u64, lowest: u64 },

    /// Requested offset has not been produced yet
    #[error("requested offset is ahead of the stream: {requested}, latest: {latest}")]
    OffsetAhead { requested: u64, latest: u64 },

    /// Explicit insert with an offset that is not greater than the current one
    #[error("offset {offset} is already taken (current: {current})")]
    OffsetTaken { offset: u64, current: u64 },

    /// Backend doesn't keep streams history
    #[error("history not supported")]
    HistoryNotSupported,

    /// Backend doesn't track presence
    #[error("presence not supported")]
    PresenceNotSupported,

    /// Session already joined the stream under another presence id
    #[error("presence id mismatch for session {sid} in stream {stream}")]
    PresenceIdMismatch { stream: String, sid: String },

    /// Session has no presence record in the stream
    #[error("presence record not found for session {sid} in stream {stream}")]
    PresenceNotFound { stream: String, sid: String },

    /// Session state couldn't be serialized
    #[error("failed to serialize session: {0}")]
    Serialization(#[source] BoxError),

    /// Invalid configuration
    #[error("invalid configuration: {0}")]
    Config(String),

    /// External store failure
    #[error("{context}: {source}")]
    Backend {
        context: &'static str,
        #[source]
        source: BoxError,
    },
}

impl BrokerError {
    /// Wrap an external store error with the name of the failed operation
    pub fn backend<E>(context: &'static str, source: E) -> Self
    where
        E: Into<BoxError>,
    {
        BrokerError::Backend {
            context,
            source: source.into(),
        }
    }

    /// Whether the error means the client's stream position can't be served anymore
    ///
    /// Callers should force a full resync instead of resuming with gaps.
    pub fn is_stale(&self) -> bool {
        matches!(
            self,
            BrokerError::EpochMismatch { .. }
                | BrokerError::OffsetUnavailable { .. }
                | BrokerError::StreamNotFound(_)
                | BrokerError::StreamEmpty(_)
                | BrokerError::OffsetAhead { .. }
        )
    }
}

/// Result type for broker operations
pub type Result<T> = std::result::Result<T, BrokerError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stale_classification() {
        let err = BrokerError::EpochMismatch {
            requested: "old".into(),
            current: "new".into(),
        };
        assert!(err.is_stale());
        assert!(BrokerError::OffsetUnavailable {
            requested: 1,
            lowest: 3
        }
        .is_stale());

        assert!(!BrokerError::NotStarted.is_stale());
        assert!(!BrokerError::HistoryNotSupported.is_stale());
        assert!(!BrokerError::PresenceNotSupported.is_stale());
    }

    #[test]
    fn test_backend_context_in_message() {
        let io = std::io::Error::new(std::io::ErrorKind::ConnectionReset, "reset by peer");
        let err = BrokerError::backend("failed to add message to stream", io);

        assert_eq!(
            err.to_string(),
            "failed to add message to stream: reset by peer"
        );
        assert!(std::error::Error::source(&err).is_some());
    }
}
