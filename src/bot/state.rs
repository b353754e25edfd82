//! Per-conversation tracking state for the status-report command.
//!
//! Tracks the most recent bot-sent message per conversation, plus the
//! counterparty's reaction and read receipt for that message. The table
//! lives only in process memory; a restart resets tracking until the
//! next send.

use std::collections::HashMap;
use std::sync::Mutex;

use crate::bot::message::SentMessage;

/// Read state of the tracked message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadStatus {
    Unread,
    Read,
}

/// Decode the numeric status code carried by message-update events.
///
/// Code 4 marks the message as read; lower codes are delivery stages and
/// leave the tracked state untouched.
pub fn read_status_from_code(code: i64) -> Option<ReadStatus> {
    match code {
        4 => Some(ReadStatus::Read),
        _ => None,
    }
}

/// Decode the receipt-type string carried by receipt events. The transport
/// may deliver read confirmation through this channel instead of (or in
/// addition to) the numeric one.
pub fn read_status_from_receipt(receipt_type: &str) -> Option<ReadStatus> {
    match receipt_type {
        "read" | "read-self" => Some(ReadStatus::Read),
        _ => None,
    }
}

#[derive(Debug, Default)]
struct ConversationState {
    last_sent: Option<SentMessage>,
    last_reaction: Option<String>,
    read_status: Option<ReadStatus>,
}

/// Snapshot handed to the status-report handler.
#[derive(Debug, Clone)]
pub struct TrackedMessage {
    pub sent: SentMessage,
    pub reaction: Option<String>,
    pub read_status: Option<ReadStatus>,
}

/// In-memory table of per-conversation tracking state, keyed by
/// conversation identifier. Entries are created lazily on first send.
#[derive(Default)]
pub struct StateTable {
    entries: Mutex<HashMap<String, ConversationState>>,
}

impl StateTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a newly sent message. Reaction and read status are cleared:
    /// they described the previous message.
    pub fn record_send(&self, sent: SentMessage) {
        let mut entries = self.entries.lock().unwrap();
        let entry = entries.entry(sent.conversation_id.clone()).or_default();
        entry.last_sent = Some(sent);
        entry.last_reaction = None;
        entry.read_status = None;
    }

    /// Tracking state for a conversation, or `None` if the bot has not
    /// sent anything there yet.
    pub fn tracked(&self, conversation_id: &str) -> Option<TrackedMessage> {
        let entries = self.entries.lock().unwrap();
        let entry = entries.get(conversation_id)?;
        let sent = entry.last_sent.clone()?;
        Some(TrackedMessage {
            sent,
            reaction: entry.last_reaction.clone(),
            read_status: entry.read_status,
        })
    }

    /// Apply a reaction event. Accepted only when it targets the tracked
    /// message and comes from the counterparty, not the bot itself.
    /// Returns whether the event was applied.
    pub fn apply_reaction(
        &self,
        conversation_id: &str,
        message_id: &str,
        from_self: bool,
        reaction: &str,
    ) -> bool {
        if from_self {
            return false;
        }
        let mut entries = self.entries.lock().unwrap();
        let Some(entry) = entries.get_mut(conversation_id) else {
            return false;
        };
        match &entry.last_sent {
            Some(sent) if sent.message_id == message_id => {
                entry.last_reaction = Some(reaction.to_string());
                true
            }
            _ => false,
        }
    }

    /// Apply an already-decoded read-status update. Accepted only when it
    /// targets the tracked message. Returns whether the event was applied.
    pub fn apply_read_status(
        &self,
        conversation_id: &str,
        message_id: &str,
        status: ReadStatus,
    ) -> bool {
        let mut entries = self.entries.lock().unwrap();
        let Some(entry) = entries.get_mut(conversation_id) else {
            return false;
        };
        match &entry.last_sent {
            Some(sent) if sent.message_id == message_id => {
                entry.read_status = Some(status);
                true
            }
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sent(conversation_id: &str, message_id: &str) -> SentMessage {
        SentMessage {
            conversation_id: conversation_id.to_string(),
            message_id: message_id.to_string(),
            text: "reply".to_string(),
            sent_at: "2026-01-01T00:00:00Z".to_string(),
        }
    }

    #[test]
    fn test_status_code_decoder() {
        assert_eq!(read_status_from_code(4), Some(ReadStatus::Read));
        assert_eq!(read_status_from_code(3), None);
        assert_eq!(read_status_from_code(0), None);
    }

    #[test]
    fn test_receipt_type_decoder() {
        assert_eq!(read_status_from_receipt("read"), Some(ReadStatus::Read));
        assert_eq!(read_status_from_receipt("read-self"), Some(ReadStatus::Read));
        assert_eq!(read_status_from_receipt("delivery"), None);
        assert_eq!(read_status_from_receipt(""), None);
    }

    #[test]
    fn test_record_send_clears_reaction_and_read_status() {
        let table = StateTable::new();
        table.record_send(sent("c1", "m1"));
        assert!(table.apply_reaction("c1", "m1", false, "👍"));
        assert!(table.apply_read_status("c1", "m1", ReadStatus::Read));

        table.record_send(sent("c1", "m2"));
        let tracked = table.tracked("c1").unwrap();
        assert_eq!(tracked.sent.message_id, "m2");
        assert_eq!(tracked.reaction, None);
        assert_eq!(tracked.read_status, None);
    }

    #[test]
    fn test_reaction_requires_matching_message() {
        let table = StateTable::new();
        table.record_send(sent("c1", "m1"));

        // Stale message id
        assert!(!table.apply_reaction("c1", "m0", false, "👍"));
        // Unknown conversation
        assert!(!table.apply_reaction("c2", "m1", false, "👍"));
        // Bot's own reaction
        assert!(!table.apply_reaction("c1", "m1", true, "👍"));

        assert!(table.apply_reaction("c1", "m1", false, "❤️"));
        assert_eq!(table.tracked("c1").unwrap().reaction.as_deref(), Some("❤️"));
    }

    #[test]
    fn test_read_status_requires_matching_message() {
        let table = StateTable::new();
        table.record_send(sent("c1", "m1"));

        assert!(!table.apply_read_status("c1", "m0", ReadStatus::Read));
        assert!(table.apply_read_status("c1", "m1", ReadStatus::Read));
        assert_eq!(table.tracked("c1").unwrap().read_status, Some(ReadStatus::Read));
    }

    #[test]
    fn test_tracked_is_none_before_first_send() {
        let table = StateTable::new();
        assert!(table.tracked("c1").is_none());
        // Events arriving before any send are dropped, not buffered.
        assert!(!table.apply_read_status("c1", "m1", ReadStatus::Read));
        assert!(table.tracked("c1").is_none());
    }

    #[test]
    fn test_conversations_are_independent() {
        let table = StateTable::new();
        table.record_send(sent("c1", "m1"));
        table.record_send(sent("c2", "m9"));
        assert!(table.apply_reaction("c2", "m9", false, "🔥"));

        assert_eq!(table.tracked("c1").unwrap().reaction, None);
        assert_eq!(table.tracked("c2").unwrap().reaction.as_deref(), Some("🔥"));
    }
}
