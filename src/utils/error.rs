//! Error types used across `chatbus`.
//!
//! None of these are fatal to the broker process: the transport logs them and
//! keeps serving the affected connection (or drops just that connection).

use thiserror::Error;

/// An inbound frame that could not be turned into a broker command.
#[derive(Debug, Error)]
pub enum EnvelopeError {
    #[error("frame is not a JSON envelope: {0}")]
    Json(#[from] serde_json::Error),

    #[error("envelope is not a JSON object")]
    NotAnObject,

    #[error("envelope names an empty topic")]
    EmptyTopic,
}

/// Failures of the listening side of the broker.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },
}

/// Failures of the client-side chat session.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("failed to encode outbound envelope: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("transport is closed")]
    TransportClosed,

    #[error("websocket error: {0}")]
    WebSocket(#[from] tungstenite::Error),

    #[error("failed to read input: {0}")]
    Input(#[from] std::io::Error),
}
