//! Recording broadcaster for unit tests

use parking_lot::Mutex;

use super::traits::Broadcaster;
use crate::message::{RemoteCommandMessage, StreamMessage};

#[derive(Debug, Default)]
pub(crate) struct RecordingBroadcaster {
    pub broadcasts: Mutex<Vec<StreamMessage>>,
    pub commands: Mutex<Vec<RemoteCommandMessage>>,
    pub subscribed: Mutex<Vec<String>>,
    pub unsubscribed: Mutex<Vec<String>>,
}

impl RecordingBroadcaster {
    pub fn broadcasts(&self) -> Vec<StreamMessage> {
        self.broadcasts.lock().clone()
    }

    pub fn subscribed(&self) -> Vec<String> {
        self.subscribed.lock().clone()
    }

    pub fn unsubscribed(&self) -> Vec<String> {
        self.unsubscribed.lock().clone()
    }
}

impl Broadcaster for RecordingBroadcaster {
    fn broadcast(&self, msg: &StreamMessage) {
        self.broadcasts.lock().push(msg.clone());
    }

    fn broadcast_command(&self, msg: &RemoteCommandMessage) {
        self.commands.lock().push(msg.clone());
    }

    fn subscribe(&self, stream: &str) {
        self.subscribed.lock().push(stream.to_string());
    }

    fn unsubscribe(&self, stream: &str) {
        self.unsubscribed.lock().push(stream.to_string());
    }
}
