use crate::bus::{BusError, Publisher};
use std::sync::{Mutex, MutexGuard};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishedMessage {
    pub topic: String,
    pub payload: String,
    pub retain: bool,
}

#[derive(Debug, Default)]
struct Recorded {
    messages: Vec<PublishedMessage>,
    fail: bool,
}

/// Publisher that keeps every message in memory.
#[derive(Debug, Default)]
pub struct RecordingPublisher {
    inner: Mutex<Recorded>,
}

impl RecordingPublisher {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Recorded> {
        self.inner
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn set_failing(&self, fail: bool) {
        self.lock().fail = fail;
    }

    pub fn messages(&self) -> Vec<PublishedMessage> {
        self.lock().messages.clone()
    }

    pub fn on_topic(&self, topic: &str) -> Vec<String> {
        self.lock()
            .messages
            .iter()
            .filter(|message| message.topic == topic)
            .map(|message| message.payload.clone())
            .collect()
    }

    pub fn last_payload(&self, topic: &str) -> Option<String> {
        self.on_topic(topic).pop()
    }

    pub fn clear(&self) {
        self.lock().messages.clear();
    }
}

impl Publisher for RecordingPublisher {
    fn publish(&self, topic: &str, payload: &str, retain: bool) -> Result<(), BusError> {
        let mut recorded = self.lock();
        if recorded.fail {
            return Err(BusError::Publish {
                topic: topic.to_string(),
                reason: "mock publisher offline".to_string(),
            });
        }
        recorded.messages.push(PublishedMessage {
            topic: topic.to_string(),
            payload: payload.to_string(),
            retain,
        });
        Ok(())
    }
}
