//! WebSocket transport
//!
//! This file implements the broker's WebSocket server. Responsibilities:
//! - Accept TCP/WebSocket connections (no handshake beyond the WebSocket
//!   upgrade, no authentication)
//! - Create a `Connection` for each socket and register it with the `Broker`
//! - Decode each inbound frame as an `Envelope` and dispatch it
//! - Unsubscribe the connection from everything exactly once when it closes
//!
//! Malformed frames are logged and skipped; the connection stays open.

use futures_util::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::spawn;
use tokio::sync::mpsc;
use tokio_tungstenite::accept_async;
use tracing::{debug, error, info, warn};
use tungstenite::protocol::Message as WsMessage;

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::broker::{Broker, Delivery, Envelope};
use crate::config::BrokerSettings;
use crate::connection::{Connection, ConnectionId};
use crate::utils::{EnvelopeError, ServerError};

/// Bind `addr` and serve connections until the task is dropped.
pub async fn start_websocket_server(
    addr: &str,
    broker: Arc<Mutex<Broker>>,
    settings: BrokerSettings,
) -> Result<(), ServerError> {
    let listener = TcpListener::bind(addr)
        .await
        .map_err(|source| ServerError::Bind {
            addr: addr.to_string(),
            source,
        })?;

    info!("WebSocket server listening on ws://{addr}");
    serve(listener, broker, settings).await;
    Ok(())
}

/// Accept loop over an already bound listener.
///
/// A slot is reserved before the WebSocket handshake starts, so sockets still
/// mid-handshake count against `max_connections`.
pub async fn serve(listener: TcpListener, broker: Arc<Mutex<Broker>>, settings: BrokerSettings) {
    let active = Arc::new(AtomicUsize::new(0));

    loop {
        let (stream, peer) = match listener.accept().await {
            Ok(accepted) => accepted,
            Err(e) => {
                error!("Failed to accept connection: {e}");
                continue;
            }
        };

        let Some(slot) = ConnectionSlot::acquire(&active, settings.max_connections) else {
            warn!(
                %peer,
                max_connections = settings.max_connections,
                "connection limit reached, closing"
            );
            drop(stream);
            continue;
        };

        tokio::spawn(handle_connection(stream, broker.clone(), slot));
    }
}

/// One reserved unit of `max_connections`, released on drop.
struct ConnectionSlot {
    active: Arc<AtomicUsize>,
}

impl ConnectionSlot {
    fn acquire(active: &Arc<AtomicUsize>, limit: usize) -> Option<Self> {
        active
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| {
                (n < limit).then_some(n + 1)
            })
            .ok()?;

        Some(Self {
            active: active.clone(),
        })
    }
}

impl Drop for ConnectionSlot {
    fn drop(&mut self) {
        self.active.fetch_sub(1, Ordering::AcqRel);
    }
}

async fn handle_connection(stream: TcpStream, broker: Arc<Mutex<Broker>>, _slot: ConnectionSlot) {
    let ws_stream = match accept_async(stream).await {
        Ok(ws) => ws,
        Err(e) => {
            warn!("WebSocket handshake error: {e}");
            return;
        }
    };
    let (mut ws_sender, mut ws_receiver) = ws_stream.split();
    let (tx, mut rx) = mpsc::unbounded_channel::<WsMessage>();
    let client = Connection::new(tx);
    let client_id = client.id.clone();
    lock(&broker).register_client(client);
    info!(%client_id, "client connected");

    let cleanup_called = Arc::new(AtomicBool::new(false));

    let do_cleanup = {
        let broker = broker.clone();
        let client_id = client_id.clone();
        let cleanup_called = cleanup_called.clone();

        move || {
            if !cleanup_called.swap(true, Ordering::SeqCst) {
                lock(&broker).cleanup_client(&client_id);
            }
        }
    };

    {
        let client_id = client_id.clone();
        let do_cleanup = do_cleanup.clone();

        spawn(async move {
            while let Some(msg) = rx.recv().await {
                if let Err(e) = ws_sender.send(msg).await {
                    warn!(%client_id, "Failed to send message: {e}");
                    break;
                }
            }

            do_cleanup();
            debug!(%client_id, "send loop closed");
        });
    }

    while let Some(frame) = ws_receiver.next().await {
        match frame {
            Ok(frame) if frame.is_close() => break,
            Ok(frame) => {
                if let Err(err) = dispatch(&broker, &client_id, frame) {
                    warn!(%client_id, "Invalid envelope: {err}");
                }
            }
            Err(e) => {
                warn!(%client_id, "transport error: {e}");
                break;
            }
        }
    }

    info!(%client_id, "client closed connection");
    do_cleanup();
}

/// Apply one inbound frame to the broker on behalf of `client_id`.
///
/// Returns the fan-out outcome for `pub`, `None` for everything else
/// (subscriptions, unknown commands, control frames).
pub fn dispatch(
    broker: &Mutex<Broker>,
    client_id: &ConnectionId,
    frame: WsMessage,
) -> Result<Option<Delivery>, EnvelopeError> {
    let binary = frame.is_binary();
    if !(binary || frame.is_text()) {
        return Ok(None);
    }

    match Envelope::parse(&frame.into_data())? {
        Envelope::Subscribe { topic } => {
            lock(broker).subscribe(&topic, client_id);
            Ok(None)
        }
        Envelope::Publish { topic, body } => {
            let payload = serde_json::to_string(&body)?;
            let frame = if binary {
                WsMessage::binary(payload.into_bytes())
            } else {
                WsMessage::text(payload)
            };
            Ok(Some(lock(broker).publish(&topic, client_id, frame)))
        }
        Envelope::Unknown => {
            debug!(%client_id, "ignoring unknown command");
            Ok(None)
        }
    }
}

/// Lock the broker, recovering from poisoning.
fn lock(broker: &Mutex<Broker>) -> MutexGuard<'_, Broker> {
    broker.lock().unwrap_or_else(PoisonError::into_inner)
}
