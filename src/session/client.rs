//! Chat session over a WebSocket
//!
//! `ChatSession` ties the protocol and the reducer to one outbound channel.
//! `connect` dials the broker, spawns the send loop and subscribes; `run`
//! drives an interactive session from stdin. A dropped transport ends the
//! session: there is no reconnection.

use std::collections::HashMap;
use std::io::Write;

use futures_util::stream::SplitStream;
use futures_util::{SinkExt, StreamExt};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::net::TcpStream;
use tokio::sync::mpsc::{self, UnboundedSender};
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tracing::{debug, info, warn};
use tungstenite::protocol::Message as WsMessage;
use uuid::Uuid;

use crate::broker::Envelope;
use crate::config::SessionSettings;
use crate::session::message::Message;
use crate::session::protocol::Session;
use crate::session::reducer::{Conversation, Outcome, Turn};
use crate::utils::SessionError;

pub type Inbound = SplitStream<WebSocketStream<MaybeTlsStream<TcpStream>>>;

#[derive(Debug)]
pub struct ChatSession {
    protocol: Session,
    conversation: Conversation,
    outbound: UnboundedSender<WsMessage>,
    stream: bool,
}

impl ChatSession {
    pub fn new(protocol: Session, stream: bool, outbound: UnboundedSender<WsMessage>) -> Self {
        Self {
            protocol,
            conversation: Conversation::new(),
            outbound,
            stream,
        }
    }

    pub fn protocol(&self) -> &Session {
        &self.protocol
    }

    pub fn conversation(&self) -> &Conversation {
        &self.conversation
    }

    /// Subscribe to the reply topic and the resource-status topic.
    pub fn start(&self) -> Result<(), SessionError> {
        for envelope in self.protocol.subscriptions() {
            self.send(&envelope)?;
        }
        info!(reply_topic = self.protocol.reply_topic(), "session subscribed");
        Ok(())
    }

    /// Submit a human message as a new turn: request the answer (with the
    /// recent turns as context) and a fresh avatar texture, then record the
    /// turn. Returns the new turn's id.
    pub fn submit(&mut self, human: &str) -> Result<String, SessionError> {
        let id = Uuid::new_v4().to_string();

        let create =
            self.protocol
                .publish_message(&id, self.conversation.turns(), human, self.stream)?;
        self.send(&create)?;
        self.send(&self.protocol.request_texture(&id)?)?;

        self.conversation.record(Turn::new(id.clone(), human, self.stream));
        Ok(id)
    }

    /// Apply one inbound frame. Frames that are not JSON are logged and
    /// ignored. A full answer triggers an image request for that turn.
    pub fn handle_frame(&mut self, frame: WsMessage) -> Result<Outcome, SessionError> {
        if !(frame.is_text() || frame.is_binary()) {
            return Ok(Outcome::Ignored);
        }

        let message = match Message::decode(&frame.into_data()) {
            Ok(message) => message,
            Err(e) => {
                warn!("Ignoring undecodable frame: {e}");
                return Ok(Outcome::Ignored);
            }
        };
        debug!(kind = message.type_name(), id = ?message.id(), "received");

        let outcome = self.conversation.apply(message);
        if let Outcome::Answered { id, prompt } = &outcome {
            self.send(&self.protocol.request_image(id, prompt)?)?;
        }
        Ok(outcome)
    }

    fn send(&self, envelope: &Envelope) -> Result<(), SessionError> {
        let frame = WsMessage::text(envelope.to_json()?);
        self.outbound
            .send(frame)
            .map_err(|_| SessionError::TransportClosed)
    }
}

/// Dial the broker, start the send loop and subscribe. The returned stream
/// yields the frames published to this session's topics.
pub async fn connect(settings: &SessionSettings) -> Result<(ChatSession, Inbound), SessionError> {
    let (ws_stream, _response) = connect_async(settings.url.as_str()).await?;
    let (mut ws_sender, ws_receiver) = ws_stream.split();
    let (tx, mut rx) = mpsc::unbounded_channel::<WsMessage>();

    tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            if let Err(e) = ws_sender.send(msg).await {
                warn!("Failed to send to broker: {e}");
                break;
            }
        }
        debug!("Session send loop closed");
    });

    let session = ChatSession::new(Session::new(settings), settings.stream, tx);
    session.start()?;
    info!(url = %settings.url, "session connected");

    Ok((session, ws_receiver))
}

/// Interactive session: every stdin line becomes a turn, and the turn log is
/// printed as workers answer. Ends on EOF or when the broker goes away.
pub async fn run(settings: &SessionSettings) -> Result<(), SessionError> {
    let (mut session, mut inbound) = connect(settings).await?;
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut printed: HashMap<String, usize> = HashMap::new();

    loop {
        tokio::select! {
            line = lines.next_line() => match line? {
                Some(text) if !text.trim().is_empty() => {
                    let id = session.submit(text.trim())?;
                    printed.insert(id, 0);
                }
                Some(_) => {}
                None => break,
            },
            frame = inbound.next() => match frame {
                Some(Ok(frame)) => {
                    let outcome = session.handle_frame(frame)?;
                    render(
                        &mut std::io::stdout().lock(),
                        session.conversation(),
                        &outcome,
                        &mut printed,
                    );
                }
                Some(Err(e)) => return Err(e.into()),
                None => {
                    info!("broker closed the connection");
                    break;
                }
            },
        }
    }

    Ok(())
}

pub(crate) fn render(
    out: &mut impl Write,
    conversation: &Conversation,
    outcome: &Outcome,
    printed: &mut HashMap<String, usize>,
) {
    let written = match outcome {
        Outcome::Streamed { id } | Outcome::Answered { id, .. } => {
            let Some(turn) = conversation.turn(id) else {
                return;
            };
            let seen = printed.entry(id.clone()).or_default();
            let result = if matches!(outcome, Outcome::Answered { .. }) {
                writeln!(out, "\n{}", turn.robot)
            } else {
                write!(out, "{}", turn.robot.get(*seen..).unwrap_or_default())
            };
            *seen = turn.robot.len();
            result
        }
        Outcome::ImageAttached { id } => writeln!(out, "\n[image ready for {id}]"),
        Outcome::AvatarUpdated => writeln!(out, "\n[avatar texture updated]"),
        Outcome::StatusUpdated => match conversation.status() {
            Some(status) => writeln!(out, "\n[status: {status}]"),
            None => Ok(()),
        },
        Outcome::Ignored => Ok(()),
    };
    if let Err(e) = written.and_then(|()| out.flush()) {
        debug!("failed to write to stdout: {e}");
    }
}
