//! The `connection` module defines the broker's view of one peer.
//!
//! A `Connection` is a single duplex WebSocket session, either a chat client
//! or a backend worker. The broker does not distinguish between the two.

pub mod peer;
pub use peer::{Connection, ConnectionId};
