//! The `broker` module is the relay at the centre of the system.
//!
//! It owns the topic registry (topic name to subscriber set, plus the
//! per-connection reverse index kept on each `Connection`) and the inbound
//! `Envelope` format that the transport decodes before dispatching here.

pub mod engine;
pub mod message;
pub mod topic;

pub use engine::{Broker, Delivery};
pub use message::Envelope;
