//! The `transport` module carries envelopes between peers and the broker
//! over WebSockets.
//!
//! It implements the server accept loop, one read loop and one send loop per
//! connection, and the dispatch of decoded envelopes to the `Broker`.

pub mod websocket;

pub use websocket::{dispatch, serve, start_websocket_server};
