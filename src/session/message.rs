//! Application-level messages
//!
//! These travel as the body of a `pub` envelope and are discriminated by the
//! `type` field. The broker never looks at them; workers and chat sessions do.
//! Bodies whose `type` is not one of the variants below decode to
//! `Message::Opaque`, so newer workers do not break older sessions.

use serde::ser::Error as _;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// One human/robot pair sent as conversational context.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Exchange {
    pub human: String,
    pub robot: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Message {
    ChatMessageCreate {
        id: String,
        human: String,
        previous: Vec<Exchange>,
        stream: bool,
        #[serde(rename = "replyTopic")]
        reply_topic: String,
    },
    ChatMessageRobotResponse {
        id: String,
        robot: String,
    },
    ChatMessageRobotStreamResponse {
        id: String,
        robot: String,
    },
    ChatImageCreate {
        id: String,
        human: String,
        #[serde(rename = "replyTopic")]
        reply_topic: String,
    },
    /// `robot` is a base64-encoded image.
    ChatImageRobotResponse {
        id: String,
        robot: String,
    },
    ChatAvatarCreate {
        id: String,
        #[serde(rename = "replyTopic")]
        reply_topic: String,
    },
    /// `robot` is a base64-encoded texture. Not tied to a turn.
    ChatAvatarRobotResponse {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        id: Option<String>,
        robot: String,
    },
    SystemResourceUpdate {
        resources: Value,
    },
    /// A body with an unrecognised or missing `type`, kept as-is.
    #[serde(skip)]
    Opaque(Value),
}

impl Message {
    const KNOWN_TYPES: [&'static str; 8] = [
        "ChatMessageCreate",
        "ChatMessageRobotResponse",
        "ChatMessageRobotStreamResponse",
        "ChatImageCreate",
        "ChatImageRobotResponse",
        "ChatAvatarCreate",
        "ChatAvatarRobotResponse",
        "SystemResourceUpdate",
    ];

    /// Decode a frame payload. Fails only when the payload is not JSON or a
    /// known `type` is missing required fields.
    pub fn decode(raw: &[u8]) -> Result<Self, serde_json::Error> {
        let value: Value = serde_json::from_slice(raw)?;
        Self::from_value(value)
    }

    pub fn from_value(value: Value) -> Result<Self, serde_json::Error> {
        let known = value
            .get("type")
            .and_then(Value::as_str)
            .is_some_and(|t| Self::KNOWN_TYPES.contains(&t));

        if known {
            serde_json::from_value(value)
        } else {
            Ok(Message::Opaque(value))
        }
    }

    /// The JSON object that goes next to `cmd`/`topic` in a `pub` envelope.
    pub fn into_body(self) -> Result<Map<String, Value>, serde_json::Error> {
        let value = match self {
            Message::Opaque(value) => value,
            message => serde_json::to_value(message)?,
        };

        match value {
            Value::Object(map) => Ok(map),
            other => Err(serde_json::Error::custom(format!(
                "message body must be a JSON object, got {other}"
            ))),
        }
    }

    pub fn type_name(&self) -> &str {
        match self {
            Message::ChatMessageCreate { .. } => "ChatMessageCreate",
            Message::ChatMessageRobotResponse { .. } => "ChatMessageRobotResponse",
            Message::ChatMessageRobotStreamResponse { .. } => "ChatMessageRobotStreamResponse",
            Message::ChatImageCreate { .. } => "ChatImageCreate",
            Message::ChatImageRobotResponse { .. } => "ChatImageRobotResponse",
            Message::ChatAvatarCreate { .. } => "ChatAvatarCreate",
            Message::ChatAvatarRobotResponse { .. } => "ChatAvatarRobotResponse",
            Message::SystemResourceUpdate { .. } => "SystemResourceUpdate",
            Message::Opaque(value) => value.get("type").and_then(Value::as_str).unwrap_or(""),
        }
    }

    /// Turn id carried by the message, if any.
    pub fn id(&self) -> Option<&str> {
        match self {
            Message::ChatMessageCreate { id, .. }
            | Message::ChatMessageRobotResponse { id, .. }
            | Message::ChatMessageRobotStreamResponse { id, .. }
            | Message::ChatImageCreate { id, .. }
            | Message::ChatImageRobotResponse { id, .. }
            | Message::ChatAvatarCreate { id, .. } => Some(id.as_str()),
            Message::ChatAvatarRobotResponse { id, .. } => id.as_deref(),
            Message::SystemResourceUpdate { .. } | Message::Opaque(_) => None,
        }
    }
}
