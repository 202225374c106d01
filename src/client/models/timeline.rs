use std::collections::HashSet;
use uuid::Uuid;

use crate::common::models::{Message, MessageId, Timestamp, UserId};

/// A message typed locally and not yet acknowledged by the server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutgoingDraft {
    pub temp_id: Uuid,
    pub receiver_id: UserId,
    pub content: String,
    pub created_at: Timestamp,
}

impl OutgoingDraft {
    pub fn new(receiver_id: UserId, content: impl Into<String>) -> Self {
        Self {
            temp_id: Uuid::new_v4(),
            receiver_id,
            content: content.into(),
            created_at: Timestamp::now(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TimelineEntry {
    Pending(OutgoingDraft),
    Confirmed(Message),
    Rejected { draft: OutgoingDraft, reason: String },
}

impl TimelineEntry {
    pub fn message_id(&self) -> Option<MessageId> {
        match self {
            TimelineEntry::Confirmed(m) => Some(m.id),
            _ => None,
        }
    }

    pub fn temp_id(&self) -> Option<Uuid> {
        match self {
            TimelineEntry::Pending(d) | TimelineEntry::Rejected { draft: d, .. } => Some(d.temp_id),
            TimelineEntry::Confirmed(_) => None,
        }
    }

    pub fn content(&self) -> &str {
        match self {
            TimelineEntry::Pending(d) | TimelineEntry::Rejected { draft: d, .. } => &d.content,
            TimelineEntry::Confirmed(m) => &m.content,
        }
    }

    fn is_confirmed(&self) -> bool {
        matches!(self, TimelineEntry::Confirmed(_))
    }
}

/// Messages of one conversation, oldest first, each server id at most once.
/// Local drafts stay after the confirmed messages.
#[derive(Debug, Default)]
pub struct Timeline {
    entries: Vec<TimelineEntry>,
    ids: HashSet<MessageId>,
}

impl Timeline {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entries(&self) -> &[TimelineEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains(&self, id: MessageId) -> bool {
        self.ids.contains(&id)
    }

    pub fn confirmed(&self) -> impl Iterator<Item = &Message> {
        self.entries.iter().filter_map(|e| match e {
            TimelineEntry::Confirmed(m) => Some(m),
            _ => None,
        })
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.ids.clear();
    }

    // posizione dopo l'ultimo messaggio confermato, prima delle bozze
    fn confirmed_tail(&self) -> usize {
        self.entries
            .iter()
            .rposition(TimelineEntry::is_confirmed)
            .map(|i| i + 1)
            .unwrap_or(0)
    }

    /// Swap confirmed history for a freshly fetched newest page; drafts survive.
    pub fn replace_with_page(&mut self, messages: Vec<Message>) {
        let drafts: Vec<TimelineEntry> = self.entries.drain(..).filter(|e| !e.is_confirmed()).collect();
        self.ids.clear();
        for m in messages {
            if self.ids.insert(m.id) {
                self.entries.push(TimelineEntry::Confirmed(m));
            }
        }
        self.entries.extend(drafts);
    }

    /// Put an older page in front. Returns how many entries were added.
    pub fn prepend_page(&mut self, messages: Vec<Message>) -> usize {
        let fresh: Vec<TimelineEntry> = messages
            .into_iter()
            .filter(|m| self.ids.insert(m.id))
            .map(TimelineEntry::Confirmed)
            .collect();
        let added = fresh.len();
        self.entries.splice(0..0, fresh);
        added
    }

    /// Append a message that arrived on the push channel. False if already there.
    pub fn append_pushed(&mut self, message: Message) -> bool {
        if !self.ids.insert(message.id) {
            return false;
        }
        let at = self.confirmed_tail();
        self.entries.insert(at, TimelineEntry::Confirmed(message));
        true
    }

    /// Merge the newest page fetched after a reconnect, keeping order.
    pub fn merge_tail(&mut self, messages: Vec<Message>) -> usize {
        let mut added = 0;
        for m in messages {
            if self.ids.contains(&m.id) {
                continue;
            }
            let key = (m.timestamp, m.id);
            // inserimento ordinato tra i confermati
            let at = self.entries[..self.confirmed_tail()]
                .iter()
                .rposition(|e| match e {
                    TimelineEntry::Confirmed(c) => (c.timestamp, c.id) < key,
                    _ => false,
                })
                .map(|i| i + 1)
                .unwrap_or(0);
            self.ids.insert(m.id);
            self.entries.insert(at, TimelineEntry::Confirmed(m));
            added += 1;
        }
        added
    }

    pub fn push_pending(&mut self, draft: OutgoingDraft) {
        self.entries.push(TimelineEntry::Pending(draft));
    }

    /// The server accepted the draft. If the push channel delivered the
    /// message first, the draft simply disappears.
    pub fn confirm(&mut self, temp_id: Uuid, message: Message) -> bool {
        let Some(idx) = self.position_of(temp_id) else {
            return self.append_pushed(message);
        };
        if self.ids.insert(message.id) {
            self.entries[idx] = TimelineEntry::Confirmed(message);
            // spostato in coda ai confermati se altre bozze lo precedono
            let entry = self.entries.remove(idx);
            let at = self.confirmed_tail();
            self.entries.insert(at, entry);
        } else {
            self.entries.remove(idx);
        }
        true
    }

    pub fn reject(&mut self, temp_id: Uuid, reason: impl Into<String>) -> bool {
        let Some(idx) = self.position_of(temp_id) else {
            return false;
        };
        if let TimelineEntry::Pending(draft) = self.entries[idx].clone() {
            self.entries[idx] = TimelineEntry::Rejected { draft, reason: reason.into() };
            return true;
        }
        false
    }

    /// Drop a rejected draft the user dismissed.
    pub fn dismiss(&mut self, temp_id: Uuid) -> bool {
        match self.position_of(temp_id) {
            Some(idx) if matches!(self.entries[idx], TimelineEntry::Rejected { .. }) => {
                self.entries.remove(idx);
                true
            }
            _ => false,
        }
    }

    fn position_of(&self, temp_id: Uuid) -> Option<usize> {
        self.entries.iter().position(|e| e.temp_id() == Some(temp_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn msg(id: MessageId, at: i64) -> Message {
        Message {
            id,
            sender_id: 1,
            receiver_id: 2,
            content: format!("m{}", id),
            timestamp: Timestamp::from_unix(at),
            read: false,
        }
    }

    fn ids(t: &Timeline) -> Vec<MessageId> {
        t.confirmed().map(|m| m.id).collect()
    }

    #[test]
    fn duplicate_ids_appear_once() {
        let mut t = Timeline::new();
        t.replace_with_page(vec![msg(1, 10), msg(2, 20)]);
        assert!(!t.append_pushed(msg(2, 20)));
        assert!(t.append_pushed(msg(3, 30)));
        assert!(!t.append_pushed(msg(3, 30)));
        assert_eq!(t.prepend_page(vec![msg(0, 5), msg(1, 10)]), 1);
        assert_eq!(ids(&t), vec![0, 1, 2, 3]);
    }

    #[test]
    fn confirm_replaces_draft_in_place() {
        let mut t = Timeline::new();
        t.replace_with_page(vec![msg(1, 10)]);
        let draft = OutgoingDraft::new(2, "ciao");
        let temp = draft.temp_id;
        t.push_pending(draft);
        assert!(matches!(t.entries()[1], TimelineEntry::Pending(_)));
        t.confirm(temp, msg(2, 20));
        assert_eq!(t.len(), 2);
        assert_eq!(ids(&t), vec![1, 2]);
    }

    #[test]
    fn confirm_after_push_echo_drops_the_draft() {
        let mut t = Timeline::new();
        let draft = OutgoingDraft::new(2, "ciao");
        let temp = draft.temp_id;
        t.push_pending(draft);
        t.append_pushed(msg(9, 20));
        t.confirm(temp, msg(9, 20));
        assert_eq!(t.len(), 1);
        assert_eq!(ids(&t), vec![9]);
    }

    #[test]
    fn pushed_messages_land_before_pending_drafts() {
        let mut t = Timeline::new();
        t.replace_with_page(vec![msg(1, 10)]);
        t.push_pending(OutgoingDraft::new(2, "draft"));
        t.append_pushed(msg(2, 20));
        assert!(matches!(t.entries()[1], TimelineEntry::Confirmed(_)));
        assert!(matches!(t.entries()[2], TimelineEntry::Pending(_)));
    }

    #[test]
    fn rejected_draft_keeps_reason_until_dismissed() {
        let mut t = Timeline::new();
        let draft = OutgoingDraft::new(2, "nope");
        let temp = draft.temp_id;
        t.push_pending(draft);
        assert!(t.reject(temp, "forbidden"));
        assert!(matches!(&t.entries()[0], TimelineEntry::Rejected { reason, .. } if reason == "forbidden"));
        assert!(t.dismiss(temp));
        assert!(t.is_empty());
    }

    #[test]
    fn merge_tail_fills_gaps_in_order() {
        let mut t = Timeline::new();
        t.replace_with_page(vec![msg(1, 10), msg(4, 40)]);
        t.push_pending(OutgoingDraft::new(2, "draft"));
        assert_eq!(t.merge_tail(vec![msg(2, 20), msg(4, 40), msg(5, 50)]), 2);
        assert_eq!(ids(&t), vec![1, 2, 4, 5]);
        assert!(matches!(t.entries().last(), Some(TimelineEntry::Pending(_))));
    }

    #[test]
    fn replace_keeps_drafts() {
        let mut t = Timeline::new();
        t.replace_with_page(vec![msg(1, 10)]);
        t.push_pending(OutgoingDraft::new(2, "draft"));
        t.replace_with_page(vec![msg(7, 70)]);
        assert_eq!(ids(&t), vec![7]);
        assert!(!t.contains(1));
        assert_eq!(t.len(), 2);
    }
}
