//! Fan-out only broker
//!
//! Keeps no history, sessions or presence. Broadcasts are delivered only for
//! streams with local subscribers.

use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use serde_json::Value;

use super::presence::{PresenceEvent, PresenceInfo, PresenceInfoOptions};
use super::tracker::StreamsTracker;
use super::traits::{Broadcaster, Broker, Cacheable};
use crate::error::{BrokerError, Result};
use crate::message::{RemoteCommandMessage, StreamMessage};

/// Broker without history or session recovery
pub struct LegacyBroker {
    broadcaster: Arc<dyn Broadcaster>,
    tracker: StreamsTracker,
}

impl LegacyBroker {
    /// Create a broker delivering through the given broadcaster
    pub fn new(broadcaster: Arc<dyn Broadcaster>) -> Self {
        Self {
            broadcaster,
            tracker: StreamsTracker::new(),
        }
    }
}

#[async_trait]
impl Broker for LegacyBroker {
    async fn start(&self) -> Result<()> {
        Ok(())
    }

    async fn shutdown(&self) -> Result<()> {
        Ok(())
    }

    fn announce(&self) -> String {
        "Using no-op (legacy) broker".to_string()
    }

    async fn handle_broadcast(&self, msg: StreamMessage) -> Result<()> {
        if self.tracker.has(&msg.stream) {
            self.broadcaster.broadcast(&msg);
        }

        Ok(())
    }

    async fn handle_command(&self, msg: RemoteCommandMessage) -> Result<()> {
        self.broadcaster.broadcast_command(&msg);
        Ok(())
    }

    fn subscribe(&self, stream: &str) -> String {
        if self.tracker.add(stream) {
            self.broadcaster.subscribe(stream);
        }

        stream.to_string()
    }

    fn unsubscribe(&self, stream: &str) -> String {
        if self.tracker.remove(stream) {
            self.broadcaster.unsubscribe(stream);
        }

        stream.to_string()
    }

    async fn history_from(
        &self,
        _stream: &str,
        _epoch: &str,
        _offset: u64,
    ) -> Result<Vec<StreamMessage>> {
        Err(BrokerError::HistoryNotSupported)
    }

    async fn history_since(&self, _stream: &str, _since: i64) -> Result<Vec<StreamMessage>> {
        Err(BrokerError::HistoryNotSupported)
    }

    async fn commit_session(&self, _sid: &str, _session: &dyn Cacheable) -> Result<()> {
        Ok(())
    }

    async fn restore_session(&self, _sid: &str) -> Result<Option<Bytes>> {
        Ok(None)
    }

    async fn finish_session(&self, _sid: &str) -> Result<()> {
        Ok(())
    }

    async fn presence_add(
        &self,
        _stream: &str,
        _sid: &str,
        _pid: &str,
        _info: Value,
    ) -> Result<Option<PresenceEvent>> {
        Err(BrokerError::PresenceNotSupported)
    }

    async fn presence_remove(&self, _stream: &str, _sid: &str) -> Result<Option<PresenceEvent>> {
        Err(BrokerError::PresenceNotSupported)
    }

    async fn presence_info(
        &self,
        _stream: &str,
        _opts: PresenceInfoOptions,
    ) -> Result<PresenceInfo> {
        Err(BrokerError::PresenceNotSupported)
    }

    async fn touch_presence(&self, _sid: &str) -> Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use tokio_test::{assert_err, assert_ok};

    use super::*;
    use crate::broker::testing::RecordingBroadcaster;

    #[tokio::test]
    async fn test_broadcast_requires_local_interest() {
        let broadcaster = Arc::new(RecordingBroadcaster::default());
        let broker = LegacyBroker::new(broadcaster.clone());

        assert_ok!(broker.handle_broadcast(StreamMessage::new("chat", "a")).await);
        assert!(broadcaster.broadcasts().is_empty());

        broker.subscribe("chat");
        assert_ok!(broker.handle_broadcast(StreamMessage::new("chat", "b")).await);

        let delivered = broadcaster.broadcasts();
        assert_eq!(delivered.len(), 1);
        assert_eq!(delivered[0].data, Bytes::from_static(b"b"));
        assert_eq!(delivered[0].offset, 0);
    }

    #[tokio::test]
    async fn test_subscribe_notifies_on_transitions() {
        let broadcaster = Arc::new(RecordingBroadcaster::default());
        let broker = LegacyBroker::new(broadcaster.clone());

        assert_eq!(broker.subscribe("chat"), "chat");
        broker.subscribe("chat");
        broker.unsubscribe("chat");
        assert!(broadcaster.unsubscribed().is_empty());
        broker.unsubscribe("chat");

        assert_eq!(broadcaster.subscribed(), vec!["chat".to_string()]);
        assert_eq!(broadcaster.unsubscribed(), vec!["chat".to_string()]);
    }

    #[tokio::test]
    async fn test_history_not_supported() {
        let broker = LegacyBroker::new(Arc::new(RecordingBroadcaster::default()));

        let err = assert_err!(broker.history_from("chat", "e", 0).await);
        assert!(matches!(err, BrokerError::HistoryNotSupported));
        assert_err!(broker.history_since("chat", 0).await);
    }

    #[tokio::test]
    async fn test_presence_not_supported() {
        let broker = LegacyBroker::new(Arc::new(RecordingBroadcaster::default()));

        let err = assert_err!(broker.presence_add("chat", "s1", "u1", Value::Null).await);
        assert!(matches!(err, BrokerError::PresenceNotSupported));
        let err = assert_err!(broker.presence_remove("chat", "s1").await);
        assert!(matches!(err, BrokerError::PresenceNotSupported));
        assert_err!(broker.presence_info("chat", PresenceInfoOptions::default()).await);
        assert_ok!(broker.touch_presence("s1").await);
    }

    #[tokio::test]
    async fn test_sessions_are_noops() {
        let broker = LegacyBroker::new(Arc::new(RecordingBroadcaster::default()));

        assert_ok!(broker.commit_session("s1", &"state").await);
        assert_eq!(assert_ok!(broker.restore_session("s1").await), None);
        assert_ok!(broker.finish_session("s1").await);
    }
}
