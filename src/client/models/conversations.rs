use std::cmp::Ordering;

use crate::common::models::{ConnectionId, ConversationSummary, Message, Timestamp, UserId};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Conversation {
    pub connection_id: ConnectionId,
    pub partner_id: UserId,
    pub partner_name: String,
    pub connected_at: Timestamp,
    pub last_message_at: Option<Timestamp>,
    pub unread_count: u32,
    pub is_online: bool,
}

impl From<ConversationSummary> for Conversation {
    fn from(s: ConversationSummary) -> Self {
        Self {
            connection_id: s.connection_id,
            partner_id: s.user_id,
            partner_name: s.username,
            connected_at: s.connected_at,
            last_message_at: s.last_message_sent_at,
            unread_count: s.unread_count,
            is_online: s.is_online,
        }
    }
}

/// Conversation order: messaged ones first, newest message first; then the
/// never-messaged ones, newest connection first; ties broken by partner id
/// and connection id, ascending.
pub fn conversation_order(a: &Conversation, b: &Conversation) -> Ordering {
    let by_recency = match (a.last_message_at, b.last_message_at) {
        (Some(x), Some(y)) => y.cmp(&x),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => b.connected_at.cmp(&a.connected_at),
    };
    by_recency
        .then_with(|| a.partner_id.cmp(&b.partner_id))
        .then_with(|| a.connection_id.cmp(&b.connection_id))
}

/// What a pushed message did to the list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MessageEffect {
    /// The conversation exists locally.
    pub known: bool,
    /// The conversation is open and the message is addressed to us:
    /// acknowledge it on the server.
    pub needs_read_receipt: bool,
}

/// Local change applied while a list fetch was in flight.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Delta {
    Message { at: Timestamp, unread: bool },
    Cleared,
    Presence(bool),
}

/// Handle of one in-flight list fetch, see [`ConversationList::begin_sync`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyncTicket(u64);

#[derive(Debug, Default)]
pub struct ConversationList {
    items: Vec<Conversation>,
    // cambiamenti locali da riapplicare sopra una lista appena scaricata
    journal: Vec<(u64, UserId, Delta)>,
    seq: u64,
    in_flight: Vec<u64>,
}

impl ConversationList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn items(&self) -> &[Conversation] {
        &self.items
    }

    pub fn get(&self, partner: UserId) -> Option<&Conversation> {
        self.items.iter().find(|c| c.partner_id == partner)
    }

    fn get_mut(&mut self, partner: UserId) -> Option<&mut Conversation> {
        self.items.iter_mut().find(|c| c.partner_id == partner)
    }

    pub fn total_unread(&self) -> u32 {
        self.items.iter().map(|c| c.unread_count).sum()
    }

    fn resort(&mut self) {
        self.items.sort_by(conversation_order);
    }

    fn record(&mut self, partner: UserId, delta: Delta) {
        if !self.in_flight.is_empty() {
            self.journal.push((self.seq, partner, delta));
            self.seq += 1;
        }
    }

    fn prune_journal(&mut self) {
        match self.in_flight.iter().min().copied() {
            Some(oldest) => self.journal.retain(|(seq, _, _)| *seq >= oldest),
            None => self.journal.clear(),
        }
    }

    /// A list fetch is about to start. Pushed changes from now on are kept
    /// until [`finish_sync`](Self::finish_sync) merges the fetched list.
    pub fn begin_sync(&mut self) -> SyncTicket {
        self.in_flight.push(self.seq);
        SyncTicket(self.seq)
    }

    /// The fetch failed or was dropped.
    pub fn cancel_sync(&mut self, ticket: SyncTicket) {
        if let Some(i) = self.in_flight.iter().position(|s| *s == ticket.0) {
            self.in_flight.remove(i);
        }
        self.prune_journal();
    }

    /// Install a fetched list and replay what was pushed since the fetch
    /// started. A pushed message not newer than the fetched last-message time
    /// is assumed to be already counted by the server.
    pub fn finish_sync(&mut self, ticket: SyncTicket, fetched: Vec<ConversationSummary>, open_partner: Option<UserId>) {
        let Some(i) = self.in_flight.iter().position(|s| *s == ticket.0) else {
            // lista azzerata nel frattempo (logout)
            return;
        };
        self.in_flight.remove(i);

        let mut items: Vec<Conversation> = fetched.into_iter().map(Conversation::from).collect();
        for (_, partner, delta) in self.journal.iter().filter(|(seq, _, _)| *seq >= ticket.0) {
            let Some(conv) = items.iter_mut().find(|c| c.partner_id == *partner) else {
                continue;
            };
            match *delta {
                Delta::Message { at, unread } => {
                    if conv.last_message_at.map_or(true, |last| at > last) {
                        conv.last_message_at = Some(at);
                        if unread {
                            conv.unread_count += 1;
                        }
                    }
                }
                Delta::Cleared => conv.unread_count = 0,
                Delta::Presence(online) => conv.is_online = online,
            }
        }
        self.install(items, open_partner);
        self.prune_journal();
    }

    /// Replace with a fresh fetch. The open conversation keeps 0 unread.
    pub fn replace_all(&mut self, fetched: Vec<ConversationSummary>, open_partner: Option<UserId>) {
        self.install(fetched.into_iter().map(Conversation::from).collect(), open_partner);
    }

    fn install(&mut self, items: Vec<Conversation>, open_partner: Option<UserId>) {
        self.items = items;
        if let Some(open) = open_partner.and_then(|p| self.get_mut(p)) {
            open.unread_count = 0;
        }
        self.resort();
    }

    pub fn on_message(&mut self, msg: &Message, me: UserId, open_partner: Option<UserId>) -> MessageEffect {
        let partner = msg.partner_of(me);
        let incoming = msg.receiver_id == me;
        let is_open = open_partner == Some(partner);
        self.record(partner, Delta::Message { at: msg.timestamp, unread: incoming && !is_open });

        let Some(conv) = self.get_mut(partner) else {
            return MessageEffect::default();
        };
        bump(conv, msg.timestamp);

        let mut effect = MessageEffect { known: true, needs_read_receipt: false };
        if incoming {
            if is_open {
                conv.unread_count = 0;
                effect.needs_read_receipt = true;
            } else {
                conv.unread_count += 1;
            }
        }
        self.resort();
        effect
    }

    /// Optimistic bump for a message we just sent; the server timestamp
    /// replaces `at` once the send is confirmed.
    pub fn on_local_send(&mut self, partner: UserId, at: Timestamp) {
        self.record(partner, Delta::Message { at, unread: false });
        if let Some(conv) = self.get_mut(partner) {
            bump(conv, at);
            self.resort();
        }
    }

    /// Mark the conversation as opened. True when it had unread messages,
    /// i.e. when a read receipt must be sent.
    pub fn open(&mut self, partner: UserId) -> bool {
        self.record(partner, Delta::Cleared);
        match self.get_mut(partner) {
            Some(conv) if conv.unread_count > 0 => {
                conv.unread_count = 0;
                true
            }
            _ => false,
        }
    }

    /// Another session of ours read everything from `sender`.
    pub fn on_read_receipt(&mut self, sender: UserId) {
        self.record(sender, Delta::Cleared);
        if let Some(conv) = self.get_mut(sender) {
            conv.unread_count = 0;
        }
    }

    pub fn on_presence(&mut self, user: UserId, is_online: bool) {
        self.record(user, Delta::Presence(is_online));
        if let Some(conv) = self.get_mut(user) {
            conv.is_online = is_online;
        }
    }

    pub fn remove(&mut self, connection_id: ConnectionId) -> Option<Conversation> {
        let idx = self.items.iter().position(|c| c.connection_id == connection_id)?;
        Some(self.items.remove(idx))
    }

    pub fn clear(&mut self) {
        self.items.clear();
        self.journal.clear();
        self.in_flight.clear();
    }
}

// l'ultimo messaggio non torna mai indietro nel tempo
fn bump(conv: &mut Conversation, at: Timestamp) {
    if conv.last_message_at.map_or(true, |last| at > last) {
        conv.last_message_at = Some(at);
    }
}
