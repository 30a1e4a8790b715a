//! Message types flowing through the broker
//!
//! [`StreamMessage`] is what ingestion hands to the broker and what the broker
//! hands to fan-out and to catching-up clients. Payloads are `bytes::Bytes`, so
//! the history copy and every fan-out copy share a single allocation.

use bytes::Bytes;

/// Delivery hints attached to a broadcast
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StreamMessageMetadata {
    /// Skip history and go straight to fan-out
    pub transient: bool,
    /// Connection identifier that must not receive this message
    pub exclude_recipient: Option<String>,
    /// Kind of payload for the fan-out layer (e.g. `presence`), `None` for plain data
    pub broadcast_type: Option<String>,
}

/// A message published to a named stream
///
/// `offset` and `epoch` are assigned by the broker when the message is appended
/// to the stream history; they stay at their defaults for transient messages.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamMessage {
    /// Stream name
    pub stream: String,
    /// Opaque payload
    pub data: Bytes,
    /// Position within the stream history (starts at 1, 0 = not stored)
    pub offset: u64,
    /// Generation of the backing store that assigned `offset`
    pub epoch: String,
    /// Optional delivery hints
    pub meta: Option<StreamMessageMetadata>,
}

impl StreamMessage {
    /// Create a message that will be stored in history
    pub fn new(stream: impl Into<String>, data: impl Into<Bytes>) -> Self {
        Self {
            stream: stream.into(),
            data: data.into(),
            offset: 0,
            epoch: String::new(),
            meta: None,
        }
    }

    /// Create a message that bypasses history
    pub fn transient(stream: impl Into<String>, data: impl Into<Bytes>) -> Self {
        Self::new(stream, data).with_meta(StreamMessageMetadata {
            transient: true,
            ..Default::default()
        })
    }

    /// Attach delivery hints
    pub fn with_meta(mut self, meta: StreamMessageMetadata) -> Self {
        self.meta = Some(meta);
        self
    }

    /// Exclude a connection from the fan-out of this message
    pub fn exclude(mut self, recipient: impl Into<String>) -> Self {
        let meta = self.meta.get_or_insert_with(Default::default);
        meta.exclude_recipient = Some(recipient.into());
        self
    }

    /// Whether the message must skip history
    pub fn is_transient(&self) -> bool {
        self.meta.as_ref().is_some_and(|meta| meta.transient)
    }

    /// Build a message read back from history
    pub(crate) fn from_history(stream: &str, data: Bytes, offset: u64, epoch: &str) -> Self {
        Self {
            stream: stream.to_string(),
            data,
            offset,
            epoch: epoch.to_string(),
            meta: None,
        }
    }
}

/// Out-of-band control message (e.g. force-disconnect of an identifier)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteCommandMessage {
    /// Command name
    pub command: String,
    /// Command payload, opaque to the broker
    pub payload: Bytes,
}

impl RemoteCommandMessage {
    /// Create a command message
    pub fn new(command: impl Into<String>, payload: impl Into<Bytes>) -> Self {
        Self {
            command: command.into(),
            payload: payload.into(),
        }
    }

    /// Disconnect command for the given connection identifier
    pub fn disconnect(identifier: impl Into<Bytes>) -> Self {
        Self::new("disconnect", identifier)
    }
}
