//! Envelope definitions for the broker
//!
//! Every frame on the wire is a single JSON object carrying at least `cmd`
//! and `topic`:
//!
//! ```json
//! {"cmd": "sub", "topic": "u1"}
//! {"cmd": "pub", "topic": "u1", "type": "ChatAvatarRobotResponse", "robot": "..."}
//! ```
//!
//! For `pub`, everything except `cmd` and `topic` is the application message.
//! The broker keeps it as an untyped JSON map and relays it verbatim; only the
//! chat session interprets it (see `session::message`).

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::utils::EnvelopeError;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "cmd")]
pub enum Envelope {
    #[serde(rename = "sub")]
    Subscribe { topic: String },

    #[serde(rename = "pub")]
    Publish {
        topic: String,
        #[serde(flatten)]
        body: Map<String, Value>,
    },

    /// Any `cmd` other than `sub`/`pub`. Ignored by the broker.
    #[serde(other)]
    Unknown,
}

impl Envelope {
    pub fn subscribe(topic: impl Into<String>) -> Self {
        Envelope::Subscribe {
            topic: topic.into(),
        }
    }

    pub fn publish(topic: impl Into<String>, body: Map<String, Value>) -> Self {
        Envelope::Publish {
            topic: topic.into(),
            body,
        }
    }

    /// Decode one inbound frame. Text and binary frames are both accepted as
    /// long as they carry UTF-8 JSON.
    pub fn parse(raw: &[u8]) -> Result<Self, EnvelopeError> {
        // Internally tagged enums also accept sequences; only objects are envelopes.
        let value: Value = serde_json::from_slice(raw)?;
        if !value.is_object() {
            return Err(EnvelopeError::NotAnObject);
        }

        let envelope: Envelope = serde_json::from_value(value)?;
        match &envelope {
            Envelope::Subscribe { topic } | Envelope::Publish { topic, .. } if topic.is_empty() => {
                Err(EnvelopeError::EmptyTopic)
            }
            _ => Ok(envelope),
        }
    }

    pub fn topic(&self) -> Option<&str> {
        match self {
            Envelope::Subscribe { topic } | Envelope::Publish { topic, .. } => Some(topic.as_str()),
            Envelope::Unknown => None,
        }
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}
