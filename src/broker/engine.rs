//! Broker engine
//!
//! This module contains the in-memory topic registry responsible for:
//! - tracking which connections are subscribed to which topics
//! - fanning a published frame out to every subscriber except the publisher
//! - removing every subscription of a connection when it closes
//!
//! Concurrency and usage notes:
//! - The public API here is synchronous and designed to be held behind a
//!   lock (`Arc<Mutex<Broker>>`) by the transport layer. No method awaits,
//!   so the lock is never held across network I/O.
//! - Delivery is fire-and-forget. A subscriber whose channel is closed is
//!   skipped; nothing is queued or retried.

use std::collections::HashMap;

use tracing::{debug, info, warn};
use tungstenite::protocol::Message as WsMessage;

use crate::broker::topic::Topic;
use crate::connection::{Connection, ConnectionId};

/// Outcome of a single publish.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    /// The topic had no subscribers at all. The frame was dropped.
    NoSubscribers,
    /// `delivered` subscribers got the frame, `skipped` were not writable.
    /// The publisher itself is counted in neither.
    Fanout { delivered: usize, skipped: usize },
}

#[derive(Debug, Default)]
pub struct Broker {
    pub topics: HashMap<String, Topic>,
    pub clients: HashMap<ConnectionId, Connection>,
}

impl Broker {
    pub fn new() -> Self {
        Self {
            topics: HashMap::new(),
            clients: HashMap::new(),
        }
    }

    pub fn register_client(&mut self, client: Connection) {
        debug!(client_id = %client.id, "registered connection");
        self.clients.insert(client.id.clone(), client);
    }

    pub fn connection_count(&self) -> usize {
        self.clients.len()
    }

    /// Subscribe a registered connection to `topic`, creating the topic on
    /// first use. Subscribing twice is a logged no-op. Returns `true` when a
    /// new subscription was recorded.
    pub fn subscribe(&mut self, topic: &str, client_id: &ConnectionId) -> bool {
        let Some(client) = self.clients.get_mut(client_id) else {
            warn!(%client_id, topic, "subscribe from unregistered connection ignored");
            return false;
        };

        let entry = self
            .topics
            .entry(topic.to_string())
            .or_insert_with(|| Topic::new(topic));

        if entry.subscribe(client_id.clone()) {
            client.topics.insert(entry.name.clone());
            info!(
                %client_id,
                topic = %entry.name,
                subscribers = entry.subscribers.len(),
                "subscribed"
            );
            true
        } else {
            debug!(%client_id, topic = %entry.name, "already subscribed");
            false
        }
    }

    /// Remove one subscription. Topics left without subscribers are dropped.
    pub fn unsubscribe(&mut self, topic: &str, client_id: &ConnectionId) -> bool {
        if let Some(client) = self.clients.get_mut(client_id) {
            client.topics.remove(topic);
        }

        let removed = match self.topics.get_mut(topic) {
            Some(t) => t.unsubscribe(client_id),
            None => false,
        };

        if self.topics.get(topic).is_some_and(Topic::is_empty) {
            self.topics.remove(topic);
        }

        removed
    }

    /// Deliver `frame` to every subscriber of `topic` except `sender`.
    ///
    /// The frame is cloned per subscriber, so text frames stay text and
    /// binary frames stay binary.
    pub fn publish(&self, topic: &str, sender: &ConnectionId, frame: WsMessage) -> Delivery {
        let subscribers = match self.topics.get(topic) {
            Some(t) if !t.is_empty() => &t.subscribers,
            _ => {
                warn!(topic, "there were no subscribers for topic");
                return Delivery::NoSubscribers;
            }
        };

        let mut delivered = 0;
        let mut skipped = 0;

        for sub_id in subscribers {
            if sub_id == sender {
                continue;
            }
            match self.clients.get(sub_id) {
                Some(client) if client.deliver(frame.clone()) => delivered += 1,
                _ => skipped += 1,
            }
        }

        debug!(topic, %sender, delivered, skipped, "published");
        Delivery::Fanout { delivered, skipped }
    }

    /// Remove a connection and every subscription it holds. Uses the
    /// connection's own topic set, so the cost is proportional to the
    /// topics it joined rather than to every topic in the registry.
    pub fn cleanup_client(&mut self, client_id: &ConnectionId) {
        let Some(client) = self.clients.remove(client_id) else {
            return;
        };

        for topic in &client.topics {
            if let Some(t) = self.topics.get_mut(topic) {
                t.unsubscribe(client_id);
                if t.is_empty() {
                    debug!(topic = %t.name, "dropping empty topic");
                    self.topics.remove(topic);
                }
            }
            debug!(%client_id, topic, "unsubscribed");
        }

        info!(
            %client_id,
            topics = client.topics.len(),
            age_ms = client.age_ms(),
            "cleaned up connection"
        );
    }

    /// Current subscribers of `topic`, in no particular order.
    pub fn subscribers(&self, topic: &str) -> Vec<ConnectionId> {
        self.topics
            .get(topic)
            .map(|t| t.subscribers.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Topics `client_id` is currently subscribed to, in no particular order.
    pub fn topics_of(&self, client_id: &ConnectionId) -> Vec<String> {
        self.clients
            .get(client_id)
            .map(|c| c.topics.iter().cloned().collect())
            .unwrap_or_default()
    }
}
