//! HTTP client for the session gateway.
//!
//! The gateway process owns the chat-network session; this client is a set
//! of thin request/response wrappers plus a long-poll event feed.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::warn;

use crate::bot::message::InboundMessage;
use crate::bot::transport::{
    ConnectionEvent, GroupInviteInfo, GroupMetadata, GroupParticipant, MessageStatusEvent,
    Presence, ReactionEvent, ReceiptEvent, SessionEvent, Transport, TransportError,
};
use async_trait::async_trait;

/// Deadline applied to every gateway call.
const REQUEST_DEADLINE: Duration = Duration::from_secs(30);

/// The event feed holds the request open server-side; allow a margin on top.
const EVENT_POLL_DEADLINE: Duration = Duration::from_secs(40);

pub struct GatewayClient {
    base_url: String,
    http: reqwest::Client,
}

#[derive(Serialize)]
struct SendRequest<'a> {
    conversation_id: &'a str,
    text: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    mentions: Option<&'a [String]>,
    #[serde(skip_serializing_if = "Option::is_none")]
    image_url: Option<&'a str>,
}

#[derive(Deserialize)]
struct SendResponse {
    message_id: String,
}

#[derive(Serialize)]
struct PresenceRequest<'a> {
    conversation_id: &'a str,
    presence: &'a str,
}

#[derive(Deserialize)]
struct AvatarResponse {
    url: String,
}

#[derive(Deserialize)]
struct BusinessResponse {
    business: bool,
}

#[derive(Deserialize)]
struct WireParticipant {
    id: String,
    #[serde(default)]
    admin: Option<String>,
}

#[derive(Deserialize)]
struct GroupMetadataResponse {
    subject: String,
    participants: Vec<WireParticipant>,
}

#[derive(Deserialize)]
struct InviteInfoResponse {
    subject: String,
    #[serde(default)]
    owner: Option<String>,
}

#[derive(Deserialize)]
struct EventsResponse {
    events: Vec<WireEvent>,
}

/// Wire shape of one event on the feed.
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum WireEvent {
    Message {
        conversation_id: String,
        #[serde(default)]
        participant_id: Option<String>,
        message_id: String,
        #[serde(default)]
        text: String,
        #[serde(default)]
        from_self: bool,
        #[serde(default)]
        display_name: Option<String>,
    },
    Reaction {
        conversation_id: String,
        message_id: String,
        #[serde(default)]
        from_self: bool,
        text: String,
    },
    MessageStatus {
        conversation_id: String,
        message_id: String,
        status_code: i64,
    },
    Receipt {
        conversation_id: String,
        message_id: String,
        receipt_type: String,
    },
    Connection {
        #[serde(default)]
        state: String,
        #[serde(default)]
        status_code: Option<u16>,
        #[serde(default)]
        qr: Option<String>,
    },
}

/// Map a wire event into a session event.
fn decode_event(wire: WireEvent) -> SessionEvent {
    match wire {
        WireEvent::Message {
            conversation_id,
            participant_id,
            message_id,
            text,
            from_self,
            display_name,
        } => SessionEvent::Message(InboundMessage {
            conversation_id,
            participant_id,
            message_id,
            text,
            from_self,
            display_name,
        }),
        WireEvent::Reaction {
            conversation_id,
            message_id,
            from_self,
            text,
        } => SessionEvent::Reaction(ReactionEvent {
            conversation_id,
            message_id,
            from_self,
            text,
        }),
        WireEvent::MessageStatus {
            conversation_id,
            message_id,
            status_code,
        } => SessionEvent::MessageStatus(MessageStatusEvent {
            conversation_id,
            message_id,
            status_code,
        }),
        WireEvent::Receipt {
            conversation_id,
            message_id,
            receipt_type,
        } => SessionEvent::Receipt(ReceiptEvent {
            conversation_id,
            message_id,
            receipt_type,
        }),
        WireEvent::Connection { state, status_code, qr } => {
            let event = if let Some(qr) = qr {
                ConnectionEvent::Qr(qr)
            } else if state == "open" {
                ConnectionEvent::Open
            } else {
                ConnectionEvent::Closed { status_code }
            };
            SessionEvent::Connection(event)
        }
    }
}

impl GatewayClient {
    pub fn new(base_url: &str) -> Self {
        let http = reqwest::Client::builder()
            .timeout(REQUEST_DEADLINE)
            .build()
            .expect("Failed to build HTTP client");

        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            http,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn decode<T: DeserializeOwned>(
        response: reqwest::Response,
    ) -> Result<T, TransportError> {
        let status = response.status();
        if status == reqwest::StatusCode::UNAUTHORIZED {
            return Err(TransportError::Unauthorized);
        }
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(TransportError::Api {
                status: status.as_u16(),
                message,
            });
        }
        response
            .json()
            .await
            .map_err(|e| TransportError::Request(e.to_string()))
    }

    async fn check_ok(response: reqwest::Response) -> Result<(), TransportError> {
        let status = response.status();
        if status == reqwest::StatusCode::UNAUTHORIZED {
            return Err(TransportError::Unauthorized);
        }
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(TransportError::Api {
                status: status.as_u16(),
                message,
            });
        }
        Ok(())
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T, TransportError> {
        let response = self
            .http
            .get(self.url(path))
            .send()
            .await
            .map_err(|e| TransportError::Request(e.to_string()))?;
        Self::decode(response).await
    }

    async fn post_json<B: Serialize, T: DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T, TransportError> {
        let response = self
            .http
            .post(self.url(path))
            .json(body)
            .send()
            .await
            .map_err(|e| TransportError::Request(e.to_string()))?;
        Self::decode(response).await
    }

    /// Ensure the gateway has an active session (or a pending login).
    pub async fn open_session(&self) -> Result<(), TransportError> {
        let response = self
            .http
            .post(self.url("/session"))
            .send()
            .await
            .map_err(|e| TransportError::Request(e.to_string()))?;
        Self::check_ok(response).await
    }

    /// Discard persisted credentials and restart the login flow. Used when
    /// the session is reported as unauthorized.
    pub async fn reset_session(&self) -> Result<(), TransportError> {
        let response = self
            .http
            .post(self.url("/session/reset"))
            .send()
            .await
            .map_err(|e| TransportError::Request(e.to_string()))?;
        Self::check_ok(response).await
    }

    /// Long-poll the event feed once. Returns an empty batch when the
    /// window elapses without events.
    pub async fn next_events(&self) -> Result<Vec<SessionEvent>, TransportError> {
        let response = self
            .http
            .get(self.url("/events"))
            .timeout(EVENT_POLL_DEADLINE)
            .send()
            .await
            .map_err(|e| TransportError::Request(e.to_string()))?;
        let batch: EventsResponse = Self::decode(response).await?;
        Ok(batch.events.into_iter().map(decode_event).collect())
    }

    async fn send(&self, request: &SendRequest<'_>) -> Result<String, TransportError> {
        let response: SendResponse = self.post_json("/messages", request).await?;
        Ok(response.message_id)
    }
}

#[async_trait]
impl Transport for GatewayClient {
    async fn send_message(
        &self,
        conversation_id: &str,
        text: &str,
    ) -> Result<String, TransportError> {
        self.send(&SendRequest {
            conversation_id,
            text,
            mentions: None,
            image_url: None,
        })
        .await
    }

    async fn send_mentions(
        &self,
        conversation_id: &str,
        text: &str,
        mentions: &[String],
    ) -> Result<String, TransportError> {
        self.send(&SendRequest {
            conversation_id,
            text,
            mentions: Some(mentions),
            image_url: None,
        })
        .await
    }

    async fn send_image(
        &self,
        conversation_id: &str,
        image_url: &str,
        caption: &str,
    ) -> Result<String, TransportError> {
        self.send(&SendRequest {
            conversation_id,
            text: caption,
            mentions: None,
            image_url: Some(image_url),
        })
        .await
    }

    async fn group_metadata(
        &self,
        conversation_id: &str,
    ) -> Result<GroupMetadata, TransportError> {
        let path = format!("/groups/{}", urlencoding::encode(conversation_id));
        let response: GroupMetadataResponse = self.get_json(&path).await?;
        Ok(GroupMetadata {
            subject: response.subject,
            participants: response
                .participants
                .into_iter()
                .map(|p| GroupParticipant {
                    id: p.id,
                    admin_rank: p.admin,
                })
                .collect(),
        })
    }

    async fn invite_info(&self, invite_code: &str) -> Result<GroupInviteInfo, TransportError> {
        let path = format!("/invites/{}", urlencoding::encode(invite_code));
        let response: InviteInfoResponse = self.get_json(&path).await?;
        Ok(GroupInviteInfo {
            subject: response.subject,
            owner: response.owner,
        })
    }

    async fn profile_picture_url(
        &self,
        conversation_id: &str,
    ) -> Result<String, TransportError> {
        let path = format!("/contacts/{}/avatar", urlencoding::encode(conversation_id));
        let response: AvatarResponse = self.get_json(&path).await?;
        Ok(response.url)
    }

    async fn business_profile(&self, conversation_id: &str) -> Result<bool, TransportError> {
        let path = format!("/contacts/{}/business", urlencoding::encode(conversation_id));
        let response: BusinessResponse = self.get_json(&path).await?;
        Ok(response.business)
    }

    async fn set_presence(
        &self,
        conversation_id: &str,
        presence: Presence,
    ) -> Result<(), TransportError> {
        let body = PresenceRequest {
            conversation_id,
            presence: presence.as_str(),
        };
        let response = self
            .http
            .post(self.url("/presence"))
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                warn!("Presence update failed: {e}");
                TransportError::Request(e.to_string())
            })?;
        Self::check_ok(response).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decode_one(json: &str) -> SessionEvent {
        let wire: WireEvent = serde_json::from_str(json).unwrap();
        decode_event(wire)
    }

    #[test]
    fn test_decode_message_event() {
        let event = decode_one(
            r#"{"type":"message","conversation_id":"20100000000@s.whatsapp.net",
               "message_id":"m1","text":"hello","from_self":false,
               "display_name":"Alice"}"#,
        );
        match event {
            SessionEvent::Message(msg) => {
                assert_eq!(msg.conversation_id, "20100000000@s.whatsapp.net");
                assert_eq!(msg.text, "hello");
                assert!(!msg.from_self);
                assert_eq!(msg.display_name.as_deref(), Some("Alice"));
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[test]
    fn test_decode_reaction_event() {
        let event = decode_one(
            r#"{"type":"reaction","conversation_id":"c1","message_id":"m1",
               "from_self":false,"text":"👍"}"#,
        );
        match event {
            SessionEvent::Reaction(r) => {
                assert_eq!(r.message_id, "m1");
                assert_eq!(r.text, "👍");
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[test]
    fn test_decode_status_and_receipt_events() {
        let status = decode_one(
            r#"{"type":"message_status","conversation_id":"c1","message_id":"m1",
               "status_code":4}"#,
        );
        assert!(matches!(
            status,
            SessionEvent::MessageStatus(MessageStatusEvent { status_code: 4, .. })
        ));

        let receipt = decode_one(
            r#"{"type":"receipt","conversation_id":"c1","message_id":"m1",
               "receipt_type":"read"}"#,
        );
        match receipt {
            SessionEvent::Receipt(r) => assert_eq!(r.receipt_type, "read"),
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[test]
    fn test_decode_connection_events() {
        let open = decode_one(r#"{"type":"connection","state":"open"}"#);
        assert!(matches!(
            open,
            SessionEvent::Connection(ConnectionEvent::Open)
        ));

        let qr = decode_one(r#"{"type":"connection","state":"close","qr":"QRDATA"}"#);
        assert!(matches!(
            qr,
            SessionEvent::Connection(ConnectionEvent::Qr(_))
        ));

        let closed = decode_one(r#"{"type":"connection","state":"close","status_code":401}"#);
        match closed {
            SessionEvent::Connection(ConnectionEvent::Closed { status_code }) => {
                assert_eq!(status_code, Some(401));
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }
}
