//! Presence records and events
//!
//! A presence id (`pid`) names a user; a user may be present in a stream
//! through several sessions at once. Join is reported when the first session
//! of a pid enters a stream, leave when the last one goes away.

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{BrokerError, Result};
use crate::message::{StreamMessage, StreamMessageMetadata};

/// `broadcast_type` of presence notifications
pub const PRESENCE_BROADCAST_TYPE: &str = "presence";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PresenceEventKind {
    Join,
    Leave,
}

/// Presence change, or a presence record when `kind` is `None`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PresenceEvent {
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<PresenceEventKind>,
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub info: Option<Value>,
}

impl PresenceEvent {
    pub fn join(id: impl Into<String>, info: Value) -> Self {
        Self {
            kind: Some(PresenceEventKind::Join),
            id: id.into(),
            info: Some(info),
        }
    }

    pub fn leave(id: impl Into<String>) -> Self {
        Self {
            kind: Some(PresenceEventKind::Leave),
            id: id.into(),
            info: None,
        }
    }

    pub fn record(id: impl Into<String>, info: Value) -> Self {
        Self {
            kind: None,
            id: id.into(),
            info: Some(info),
        }
    }

    /// Encode as a transient presence broadcast for `stream`
    pub fn to_message(&self, stream: &str) -> Result<StreamMessage> {
        let payload =
            serde_json::to_vec(self).map_err(|e| BrokerError::Serialization(Box::new(e)))?;

        Ok(
            StreamMessage::new(stream, Bytes::from(payload)).with_meta(StreamMessageMetadata {
                transient: true,
                broadcast_type: Some(PRESENCE_BROADCAST_TYPE.to_string()),
                ..Default::default()
            }),
        )
    }
}

/// Who is present in a stream
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PresenceInfo {
    /// Number of distinct presence ids
    pub total: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub records: Option<Vec<PresenceEvent>>,
}

/// What [`presence_info`](crate::Broker::presence_info) should return
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PresenceInfoOptions {
    /// Include the individual records, not just the total
    pub return_records: bool,
}

impl Default for PresenceInfoOptions {
    fn default() -> Self {
        Self {
            return_records: true,
        }
    }
}

impl PresenceInfoOptions {
    /// Only count presence ids
    pub fn total_only() -> Self {
        Self {
            return_records: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn test_event_json() {
        let join = PresenceEvent::join("user_1", json!({"name": "John"}));
        assert_eq!(
            serde_json::to_value(&join).unwrap(),
            json!({"type": "join", "id": "user_1", "info": {"name": "John"}})
        );

        let leave = PresenceEvent::leave("user_1");
        assert_eq!(
            serde_json::to_value(&leave).unwrap(),
            json!({"type": "leave", "id": "user_1"})
        );

        let record = PresenceEvent::record("user_2", json!("kate"));
        assert_eq!(
            serde_json::to_value(&record).unwrap(),
            json!({"id": "user_2", "info": "kate"})
        );
    }

    #[test]
    fn test_leave_message() {
        let msg = PresenceEvent::leave("user_1").to_message("room").unwrap();

        assert_eq!(msg.stream, "room");
        assert!(msg.is_transient());
        assert_eq!(
            msg.meta.unwrap().broadcast_type.as_deref(),
            Some(PRESENCE_BROADCAST_TYPE)
        );

        let decoded: PresenceEvent = serde_json::from_slice(&msg.data).unwrap();
        assert_eq!(decoded, PresenceEvent::leave("user_1"));
    }

    #[test]
    fn test_info_options() {
        assert!(PresenceInfoOptions::default().return_records);
        assert!(!PresenceInfoOptions::total_only().return_records);
    }
}
