//! The `session` module is the client side of the bus.
//!
//! - `message`: the typed application messages carried in `pub` envelopes
//! - `protocol`: reply-topic ownership and outbound envelope formatting
//! - `reducer`: merges worker responses into the per-turn conversation log
//! - `client`: runs a chat session against a broker over WebSocket

pub mod client;
pub mod message;
pub mod protocol;
pub mod reducer;

pub use client::ChatSession;
pub use message::{Exchange, Message};
pub use protocol::Session;
pub use reducer::{Conversation, Outcome, Turn};

#[cfg(test)]
mod tests;
