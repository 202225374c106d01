use std::collections::HashMap;
use std::time::Duration;
use tokio::time::Instant;

use crate::common::models::UserId;

/// Receiver side of typing notices: who is typing to us right now.
#[derive(Debug)]
pub struct TypingIndicator {
    expiry: Duration,
    until: HashMap<UserId, Instant>,
}

impl TypingIndicator {
    pub fn new(expiry: Duration) -> Self {
        Self { expiry, until: HashMap::new() }
    }

    /// Each notice restarts the expiry window of its sender.
    pub fn on_typing(&mut self, sender: UserId, now: Instant) {
        self.until.insert(sender, now + self.expiry);
    }

    /// A real message from the sender ends the indicator at once.
    pub fn on_message(&mut self, sender: UserId) {
        self.until.remove(&sender);
    }

    pub fn is_typing(&self, sender: UserId, now: Instant) -> bool {
        self.until.get(&sender).map(|t| now < *t).unwrap_or(false)
    }

    pub fn typing_users(&self, now: Instant) -> Vec<UserId> {
        let mut users: Vec<UserId> = self
            .until
            .iter()
            .filter(|(_, t)| now < **t)
            .map(|(u, _)| *u)
            .collect();
        users.sort_unstable();
        users
    }

    pub fn prune(&mut self, now: Instant) {
        self.until.retain(|_, t| now < *t);
    }

    pub fn clear(&mut self) {
        self.until.clear();
    }
}
