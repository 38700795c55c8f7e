//! Connection representation
//!
//! `Connection` holds the sending side of a per-connection channel that the
//! transport drains into the WebSocket sink, plus the set of topics the
//! connection has joined. The topic set is the reverse index the broker uses
//! to clean up on disconnect without scanning every topic.

use std::collections::HashSet;

use tokio::sync::mpsc::UnboundedSender;
use tungstenite::protocol::Message as WsMessage;
use uuid::Uuid;

pub type ConnectionId = String;

#[derive(Debug)]
pub struct Connection {
    pub id: ConnectionId,
    pub sender: UnboundedSender<WsMessage>,
    /// Topics this connection is subscribed to.
    pub topics: HashSet<String>,
    /// Milliseconds since UNIX epoch.
    pub connected_at: i64,
}

impl Connection {
    /// Create a new connection around a sender channel. The `id` is a
    /// UUID-based handle used in every broker operation.
    pub fn new(sender: UnboundedSender<WsMessage>) -> Self {
        Self {
            id: format!("conn-{}", Uuid::new_v4()),
            sender,
            topics: HashSet::new(),
            connected_at: chrono::Utc::now().timestamp_millis(),
        }
    }

    /// Whether the transport side of this connection is still draining frames.
    pub fn is_open(&self) -> bool {
        !self.sender.is_closed()
    }

    /// Push a frame towards the peer. Returns `false` when the connection is
    /// no longer writable; the frame is dropped in that case.
    pub fn deliver(&self, frame: WsMessage) -> bool {
        self.is_open() && self.sender.send(frame).is_ok()
    }

    /// Milliseconds this connection has been alive.
    pub fn age_ms(&self) -> i64 {
        chrono::Utc::now().timestamp_millis() - self.connected_at
    }
}
