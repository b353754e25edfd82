//! Transport seam.
//!
//! The chat-network session (auth, framing, QR login) lives in an external
//! gateway process. The bot sees it as the [`Transport`] trait plus a
//! stream of [`SessionEvent`]s, so handlers can be exercised with
//! synthetic events and a mock transport.

use async_trait::async_trait;
use std::fmt;

use crate::bot::message::InboundMessage;

/// Errors surfaced by transport operations.
#[derive(Debug)]
pub enum TransportError {
    /// Session credentials rejected; the supervisor must re-authenticate.
    Unauthorized,
    /// Request failed before an HTTP status was obtained.
    Request(String),
    /// Non-success HTTP status from the gateway.
    Api { status: u16, message: String },
}

impl fmt::Display for TransportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unauthorized => write!(f, "session unauthorized"),
            Self::Request(e) => write!(f, "transport request failed: {e}"),
            Self::Api { status, message } => {
                write!(f, "transport error {status}: {message}")
            }
        }
    }
}

impl std::error::Error for TransportError {}

/// Presence signal shown to the counterparty.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Presence {
    Composing,
    Available,
}

impl Presence {
    pub fn as_str(&self) -> &'static str {
        match self {
            Presence::Composing => "composing",
            Presence::Available => "available",
        }
    }
}

/// One member of a group.
#[derive(Debug, Clone)]
pub struct GroupParticipant {
    pub id: String,
    /// Admin rank as reported by the network: `admin` or `superadmin`.
    pub admin_rank: Option<String>,
}

impl GroupParticipant {
    pub fn is_admin(&self) -> bool {
        matches!(self.admin_rank.as_deref(), Some("admin") | Some("superadmin"))
    }
}

/// Metadata of a group the session participates in.
#[derive(Debug, Clone)]
pub struct GroupMetadata {
    pub subject: String,
    pub participants: Vec<GroupParticipant>,
}

/// Metadata resolved from a group invite code.
#[derive(Debug, Clone)]
pub struct GroupInviteInfo {
    pub subject: String,
    /// Conversation identifier of the group creator, when the network
    /// exposes it.
    pub owner: Option<String>,
}

/// Reaction attached to a message.
#[derive(Debug, Clone)]
pub struct ReactionEvent {
    pub conversation_id: String,
    /// The message the reaction targets.
    pub message_id: String,
    pub from_self: bool,
    pub text: String,
}

/// Delivery-status update for a sent message (numeric wire shape).
#[derive(Debug, Clone)]
pub struct MessageStatusEvent {
    pub conversation_id: String,
    pub message_id: String,
    pub status_code: i64,
}

/// Read receipt for a sent message (receipt-type wire shape).
#[derive(Debug, Clone)]
pub struct ReceiptEvent {
    pub conversation_id: String,
    pub message_id: String,
    pub receipt_type: String,
}

/// Connection-state change of the underlying session.
#[derive(Debug, Clone)]
pub enum ConnectionEvent {
    Open,
    /// A login QR payload to be scanned out of band.
    Qr(String),
    Closed { status_code: Option<u16> },
}

/// Everything the session can emit, delivered on a single feed.
#[derive(Debug, Clone)]
pub enum SessionEvent {
    Message(InboundMessage),
    Reaction(ReactionEvent),
    MessageStatus(MessageStatusEvent),
    Receipt(ReceiptEvent),
    Connection(ConnectionEvent),
}

/// Operations the session exposes. Each call is independent and may fail
/// on its own; none is retried automatically.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Send a text message; returns the transport-assigned message id.
    async fn send_message(
        &self,
        conversation_id: &str,
        text: &str,
    ) -> Result<String, TransportError>;

    /// Send a text message carrying an explicit mention list.
    async fn send_mentions(
        &self,
        conversation_id: &str,
        text: &str,
        mentions: &[String],
    ) -> Result<String, TransportError>;

    /// Send an image by URL with a caption.
    async fn send_image(
        &self,
        conversation_id: &str,
        image_url: &str,
        caption: &str,
    ) -> Result<String, TransportError>;

    async fn group_metadata(
        &self,
        conversation_id: &str,
    ) -> Result<GroupMetadata, TransportError>;

    async fn invite_info(&self, invite_code: &str) -> Result<GroupInviteInfo, TransportError>;

    async fn profile_picture_url(&self, conversation_id: &str)
    -> Result<String, TransportError>;

    /// Whether the peer account carries a business profile.
    async fn business_profile(&self, conversation_id: &str) -> Result<bool, TransportError>;

    async fn set_presence(
        &self,
        conversation_id: &str,
        presence: Presence,
    ) -> Result<(), TransportError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_admin_ranks() {
        let admin = GroupParticipant {
            id: "a".to_string(),
            admin_rank: Some("admin".to_string()),
        };
        let superadmin = GroupParticipant {
            id: "b".to_string(),
            admin_rank: Some("superadmin".to_string()),
        };
        let member = GroupParticipant {
            id: "c".to_string(),
            admin_rank: None,
        };

        assert!(admin.is_admin());
        assert!(superadmin.is_admin());
        assert!(!member.is_admin());
    }

    #[test]
    fn test_presence_wire_values() {
        assert_eq!(Presence::Composing.as_str(), "composing");
        assert_eq!(Presence::Available.as_str(), "available");
    }
}
