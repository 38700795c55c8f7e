//! Conversation reducer
//!
//! Folds the asynchronous, possibly interleaved responses of the text, image
//! and avatar workers into one ordered log of turns. Responses are matched to
//! turns by id; a response for an id that is not in the log is dropped.
//!
//! Stream fragments are appended as they arrive. There is no sequence number
//! on the wire, so a fragment delivered twice is appended twice.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde_json::Value;
use tracing::debug;

use crate::session::message::{Exchange, Message};

/// Placeholder shown for a non-streamed turn until the full answer lands.
pub const THINKING: &str = "🧠";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Turn {
    pub id: String,
    pub human: String,
    pub robot: String,
    /// Base64-encoded image for this turn, once the image worker answers.
    pub image: Option<String>,
}

impl Turn {
    pub fn new(id: impl Into<String>, human: impl Into<String>, stream: bool) -> Self {
        Self {
            id: id.into(),
            human: human.into(),
            robot: if stream {
                String::new()
            } else {
                THINKING.to_string()
            },
            image: None,
        }
    }

    pub fn exchange(&self) -> Exchange {
        Exchange {
            human: self.human.clone(),
            robot: self.robot.clone(),
        }
    }

    pub fn image_bytes(&self) -> Option<Result<Vec<u8>, base64::DecodeError>> {
        self.image.as_deref().map(decode_base64)
    }
}

/// What applying one message did to the conversation.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    /// No rule matched, or the turn id is unknown.
    Ignored,
    StatusUpdated,
    /// A stream fragment was appended to the turn.
    Streamed { id: String },
    /// The turn received its full answer. An image of `prompt` should be
    /// requested for it.
    Answered { id: String, prompt: String },
    ImageAttached { id: String },
    AvatarUpdated,
}

#[derive(Debug, Default)]
pub struct Conversation {
    turns: Vec<Turn>,
    status: Option<Value>,
    avatar_texture: Option<String>,
}

impl Conversation {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn turns(&self) -> &[Turn] {
        &self.turns
    }

    pub fn turn(&self, id: &str) -> Option<&Turn> {
        self.turns.iter().find(|t| t.id == id)
    }

    /// Latest `SystemResourceUpdate.resources` value.
    pub fn status(&self) -> Option<&Value> {
        self.status.as_ref()
    }

    /// Latest avatar texture, base64-encoded.
    pub fn avatar_texture(&self) -> Option<&str> {
        self.avatar_texture.as_deref()
    }

    pub fn avatar_texture_bytes(&self) -> Option<Result<Vec<u8>, base64::DecodeError>> {
        self.avatar_texture.as_deref().map(decode_base64)
    }

    /// Append a turn to the log.
    pub fn record(&mut self, turn: Turn) {
        self.turns.push(turn);
    }

    pub fn apply(&mut self, message: Message) -> Outcome {
        match message {
            Message::SystemResourceUpdate { resources } => {
                self.status = Some(resources);
                Outcome::StatusUpdated
            }
            Message::ChatMessageRobotResponse { id, robot } => match self.turn_mut(&id) {
                Some(turn) => {
                    turn.robot = robot.clone();
                    Outcome::Answered { id, prompt: robot }
                }
                None => Self::unknown(&id),
            },
            Message::ChatMessageRobotStreamResponse { id, robot } => match self.turn_mut(&id) {
                Some(turn) => {
                    turn.robot.push_str(&robot);
                    Outcome::Streamed { id }
                }
                None => Self::unknown(&id),
            },
            Message::ChatImageRobotResponse { id, robot } => match self.turn_mut(&id) {
                Some(turn) => {
                    turn.image = Some(robot);
                    Outcome::ImageAttached { id }
                }
                None => Self::unknown(&id),
            },
            Message::ChatAvatarRobotResponse { robot, .. } => {
                self.avatar_texture = Some(robot);
                Outcome::AvatarUpdated
            }
            other => {
                debug!(kind = other.type_name(), "message not handled by the conversation");
                Outcome::Ignored
            }
        }
    }

    fn turn_mut(&mut self, id: &str) -> Option<&mut Turn> {
        self.turns.iter_mut().find(|t| t.id == id)
    }

    fn unknown(id: &str) -> Outcome {
        debug!(id, "response for unknown turn dropped");
        Outcome::Ignored
    }
}

fn decode_base64(payload: &str) -> Result<Vec<u8>, base64::DecodeError> {
    STANDARD.decode(payload.trim())
}
