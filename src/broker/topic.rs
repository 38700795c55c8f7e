//! Topic management
//!
//! A `Topic` holds the subscriber IDs for a particular topic name. Membership
//! is a `HashSet`, so a connection appears at most once per topic.
//!
//! Callers must synchronize access to `Topic` (the broker lock does this).

use std::collections::HashSet;

use crate::connection::ConnectionId;

#[derive(Debug, Default)]
pub struct Topic {
    pub name: String,
    pub subscribers: HashSet<ConnectionId>,
}

impl Topic {
    /// Create a new topic with the given name.
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            subscribers: HashSet::new(),
        }
    }

    /// Add a subscriber. Returns `false` if it was already present.
    pub fn subscribe(&mut self, id: ConnectionId) -> bool {
        self.subscribers.insert(id)
    }

    /// Remove a subscriber. Returns `false` if it was not present.
    pub fn unsubscribe(&mut self, id: &ConnectionId) -> bool {
        self.subscribers.remove(id)
    }

    pub fn is_empty(&self) -> bool {
        self.subscribers.is_empty()
    }
}
