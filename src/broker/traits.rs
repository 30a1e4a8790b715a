//! Broker contract and the collaborators it depends on

use async_trait::async_trait;
use bytes::Bytes;
use serde_json::Value;

use super::presence::{PresenceEvent, PresenceInfo, PresenceInfoOptions};
use crate::error::{BoxError, Result};
use crate::message::{RemoteCommandMessage, StreamMessage};

/// Fan-out capability provided by the connection layer
///
/// The broker calls into it; it never implements it. Calls must not block:
/// implementations hand messages off to their own delivery machinery.
pub trait Broadcaster: Send + Sync {
    /// Deliver a stream message to subscribers
    fn broadcast(&self, msg: &StreamMessage);

    /// Deliver an out-of-band command
    fn broadcast_command(&self, msg: &RemoteCommandMessage);

    /// Start receiving messages for the stream
    fn subscribe(&self, stream: &str);

    /// Stop receiving messages for the stream
    fn unsubscribe(&self, stream: &str);
}

/// State that can be persisted in the session cache
///
/// The broker never looks inside the produced bytes.
pub trait Cacheable: Send + Sync {
    /// Serialize the state into an opaque cache entry
    fn to_cache_entry(&self) -> std::result::Result<Bytes, BoxError>;
}

impl Cacheable for Bytes {
    fn to_cache_entry(&self) -> std::result::Result<Bytes, BoxError> {
        Ok(self.clone())
    }
}

impl Cacheable for Vec<u8> {
    fn to_cache_entry(&self) -> std::result::Result<Bytes, BoxError> {
        Ok(Bytes::copy_from_slice(self))
    }
}

impl Cacheable for String {
    fn to_cache_entry(&self) -> std::result::Result<Bytes, BoxError> {
        Ok(Bytes::copy_from_slice(self.as_bytes()))
    }
}

impl Cacheable for &'static str {
    fn to_cache_entry(&self) -> std::result::Result<Bytes, BoxError> {
        Ok(Bytes::from_static(self.as_bytes()))
    }
}

/// Streams history, session cache and local stream tracking behind one contract
///
/// All methods may be called concurrently from any number of tasks.
#[async_trait]
pub trait Broker: Send + Sync {
    /// Acquire backend resources and spawn background tasks
    async fn start(&self) -> Result<()>;

    /// Release backend resources
    ///
    /// Safe to call more than once and after a failed `start`.
    async fn shutdown(&self) -> Result<()>;

    /// Human-readable description for startup logging
    fn announce(&self) -> String;

    /// Append the message to history (unless transient) and fan it out
    async fn handle_broadcast(&self, msg: StreamMessage) -> Result<()>;

    /// Pass a control message through to fan-out
    async fn handle_command(&self, msg: RemoteCommandMessage) -> Result<()>;

    /// Register local interest in a stream, returns the stream identifier
    fn subscribe(&self, stream: &str) -> String;

    /// Drop local interest in a stream, returns the stream identifier
    fn unsubscribe(&self, stream: &str) -> String;

    /// Messages with offset greater than `offset` within `epoch`, oldest first
    async fn history_from(
        &self,
        stream: &str,
        epoch: &str,
        offset: u64,
    ) -> Result<Vec<StreamMessage>>;

    /// Messages stored at or after the unix timestamp `since` (seconds)
    ///
    /// Unknown streams yield an empty list.
    async fn history_since(&self, stream: &str, since: i64) -> Result<Vec<StreamMessage>>;

    /// Save session state for later recovery
    async fn commit_session(&self, sid: &str, session: &dyn Cacheable) -> Result<()>;

    /// Fetch previously committed session state, `None` if missing or expired
    async fn restore_session(&self, sid: &str) -> Result<Option<Bytes>>;

    /// Restart the session expiration countdown
    async fn finish_session(&self, sid: &str) -> Result<()>;

    /// Record that session `sid` is present in `stream` as user `pid`
    ///
    /// Returns a join event when this is the first session of `pid` in the
    /// stream. The latest `info` wins for the stream record.
    async fn presence_add(
        &self,
        stream: &str,
        sid: &str,
        pid: &str,
        info: Value,
    ) -> Result<Option<PresenceEvent>>;

    /// Drop the presence of session `sid` in `stream`
    ///
    /// Returns a leave event when it was the last session of its presence id.
    async fn presence_remove(&self, stream: &str, sid: &str) -> Result<Option<PresenceEvent>>;

    /// Presence ids currently in `stream`
    async fn presence_info(
        &self,
        stream: &str,
        opts: PresenceInfoOptions,
    ) -> Result<PresenceInfo>;

    /// Keep the presence records of a connected session alive
    async fn touch_presence(&self, sid: &str) -> Result<()>;
}
