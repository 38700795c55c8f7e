//! Session protocol
//!
//! Formats the envelopes a chat client sends. Each session owns a private
//! reply topic (a fresh UUID) that workers publish their responses to; every
//! request carries it as `replyTopic`.

use uuid::Uuid;

use crate::broker::Envelope;
use crate::config::SessionSettings;
use crate::session::message::{Exchange, Message};
use crate::session::reducer::Turn;
use crate::utils::SessionError;

/// Number of most recent turns sent as context with a new turn.
pub const CONTEXT_WINDOW: usize = 4;

#[derive(Debug, Clone)]
pub struct Session {
    reply_topic: String,
    conversation_topic: String,
    resources_topic: String,
    image_topic: String,
}

impl Session {
    pub fn new(settings: &SessionSettings) -> Self {
        Self::with_reply_topic(settings, Uuid::new_v4().to_string())
    }

    pub fn with_reply_topic(settings: &SessionSettings, reply_topic: impl Into<String>) -> Self {
        Self {
            reply_topic: reply_topic.into(),
            conversation_topic: settings.conversation_topic.clone(),
            resources_topic: settings.resources_topic(),
            image_topic: settings.image_topic.clone(),
        }
    }

    pub fn reply_topic(&self) -> &str {
        &self.reply_topic
    }

    pub fn conversation_topic(&self) -> &str {
        &self.conversation_topic
    }

    pub fn resources_topic(&self) -> &str {
        &self.resources_topic
    }

    pub fn image_topic(&self) -> &str {
        &self.image_topic
    }

    /// The two `sub` envelopes sent once the transport is ready: the private
    /// reply topic, then the shared resource-status topic.
    pub fn subscriptions(&self) -> [Envelope; 2] {
        [
            Envelope::subscribe(&self.reply_topic),
            Envelope::subscribe(&self.resources_topic),
        ]
    }

    /// `ChatMessageCreate` for a new turn. `previous` is the whole log before
    /// this turn; only the last `CONTEXT_WINDOW` turns are sent.
    pub fn publish_message(
        &self,
        id: &str,
        previous: &[Turn],
        human: &str,
        stream: bool,
    ) -> Result<Envelope, SessionError> {
        let message = Message::ChatMessageCreate {
            id: id.to_string(),
            human: human.to_string(),
            previous: context_window(previous),
            stream,
            reply_topic: self.reply_topic.clone(),
        };
        self.envelope(&self.conversation_topic, message)
    }

    pub fn request_image(&self, id: &str, prompt: &str) -> Result<Envelope, SessionError> {
        let message = Message::ChatImageCreate {
            id: id.to_string(),
            human: prompt.to_string(),
            reply_topic: self.reply_topic.clone(),
        };
        self.envelope(&self.image_topic, message)
    }

    pub fn request_texture(&self, id: &str) -> Result<Envelope, SessionError> {
        let message = Message::ChatAvatarCreate {
            id: id.to_string(),
            reply_topic: self.reply_topic.clone(),
        };
        self.envelope(&self.image_topic, message)
    }

    fn envelope(&self, topic: &str, message: Message) -> Result<Envelope, SessionError> {
        Ok(Envelope::publish(topic, message.into_body()?))
    }
}

/// Human/robot pairs of the most recent turns, oldest first.
pub fn context_window(turns: &[Turn]) -> Vec<Exchange> {
    let start = turns.len().saturating_sub(CONTEXT_WINDOW);
    turns[start..].iter().map(Turn::exchange).collect()
}
