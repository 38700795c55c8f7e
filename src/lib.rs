//! # chatbus
//!
//! `chatbus` is an in-memory, topic-based publish/subscribe relay over
//! WebSockets, together with the client-side protocol a chat front end uses to
//! talk to independent backend workers (text, image and avatar-texture
//! generation) through it.
//!
//! ## Core Modules
//!
//! - `connection`: one peer's session as seen by the broker.
//! - `broker`: the topic registry, fan-out publish and the wire envelope.
//! - `transport`: the WebSocket server that feeds envelopes to the broker.
//! - `session`: reply topics, request formatting and the conversation reducer.
//! - `config`: layered settings loading.
//! - `utils`: error types and logging.

pub mod broker;
pub mod config;
pub mod connection;
pub mod session;
pub mod transport;
pub mod utils;
