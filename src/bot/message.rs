//! Message types shared across the bot.

use serde::{Deserialize, Serialize};

/// Conversation identifier of the network's status/broadcast channel.
/// Messages arriving on it are never handled.
pub const BROADCAST_ID: &str = "status@broadcast";

/// Sender tag used for bot-authored entries in the conversation log.
pub const BOT_SENDER: &str = "bot";

/// Suffix marking a group conversation identifier.
const GROUP_SUFFIX: &str = "@g.us";

/// One inbound message event from the transport session.
#[derive(Debug, Clone)]
pub struct InboundMessage {
    pub conversation_id: String,
    /// Sending participant, set only for group-origin messages.
    pub participant_id: Option<String>,
    pub message_id: String,
    pub text: String,
    pub from_self: bool,
    /// Push name attached to the message, when the sender exposes one.
    pub display_name: Option<String>,
}

impl InboundMessage {
    pub fn is_group(&self) -> bool {
        self.conversation_id.ends_with(GROUP_SUFFIX)
    }

    pub fn is_broadcast(&self) -> bool {
        self.conversation_id == BROADCAST_ID
    }
}

/// Reference to the most recent message the bot sent in a conversation.
/// Overwritten on every tracked send, never appended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentMessage {
    pub conversation_id: String,
    pub message_id: String,
    pub text: String,
    pub sent_at: String,
}

/// A message as persisted in the conversation log.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredMessage {
    pub message_id: String,
    /// `"bot"` for bot-authored messages, the conversation identifier otherwise.
    pub sender: String,
    pub text: String,
    /// RFC 3339 timestamp; log order is timestamp order.
    pub timestamp: String,
}

impl StoredMessage {
    pub fn is_from_bot(&self) -> bool {
        self.sender == BOT_SENDER
    }
}

/// The phone-number part of a conversation identifier (everything before `@`).
pub fn phone_number(conversation_id: &str) -> &str {
    conversation_id.split('@').next().unwrap_or(conversation_id)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_phone_number() {
        assert_eq!(phone_number("20100000000@s.whatsapp.net"), "20100000000");
        assert_eq!(phone_number("plain"), "plain");
    }

    #[test]
    fn test_group_detection() {
        let msg = InboundMessage {
            conversation_id: "1234-5678@g.us".to_string(),
            participant_id: Some("20100000000@s.whatsapp.net".to_string()),
            message_id: "m1".to_string(),
            text: "hi".to_string(),
            from_self: false,
            display_name: None,
        };
        assert!(msg.is_group());
        assert!(!msg.is_broadcast());
    }

    #[test]
    fn test_broadcast_detection() {
        let msg = InboundMessage {
            conversation_id: BROADCAST_ID.to_string(),
            participant_id: None,
            message_id: "m2".to_string(),
            text: "status".to_string(),
            from_self: false,
            display_name: None,
        };
        assert!(msg.is_broadcast());
        assert!(!msg.is_group());
    }

    #[test]
    fn test_bot_sender() {
        let msg = StoredMessage {
            message_id: "m3".to_string(),
            sender: BOT_SENDER.to_string(),
            text: "reply".to_string(),
            timestamp: "2026-01-01T00:00:00Z".to_string(),
        };
        assert!(msg.is_from_bot());
    }
}
