//! Wire protocol for the deskwire realtime channel.
//!
//! Every frame in either direction is a [`WsEnvelope`]: a JSON object
//! carrying a unique frame id, an adjacently tagged payload (`type` +
//! `data`), a timestamp, and an optional correlation id. The `data` member
//! is always present, even when empty.
//!
//! The client authenticates by sending [`ClientCommand::Authenticate`] as
//! its first frame after the socket opens; the server answers with
//! [`ServerEvent::AuthOk`] or [`ServerEvent::AuthError`] before anything
//! else flows. Application event payloads are opaque to the transport
//! layer: the client forwards them to listeners without interpreting them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Envelope wrapping every frame on the realtime channel.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WsEnvelope<T> {
    pub id: String,
    #[serde(flatten)]
    pub payload: T,
    pub ts: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub correlation_id: Option<String>,
}

impl<T> WsEnvelope<T> {
    /// Wrap a payload in a freshly stamped envelope.
    pub fn new(payload: T) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            payload,
            ts: Utc::now(),
            correlation_id: None,
        }
    }

    /// Wrap a payload, tagging it with a correlation id for response
    /// tracking.
    pub fn with_correlation(payload: T, correlation_id: impl Into<String>) -> Self {
        Self {
            correlation_id: Some(correlation_id.into()),
            ..Self::new(payload)
        }
    }
}

/// Bus names of the application events a deskwire server pushes.
pub mod events {
    pub const TICKET_UPDATED: &str = "ticket-updated";
    pub const NEW_MESSAGE: &str = "new-message";
    pub const NOTIFICATION: &str = "notification";
    pub const USER_TYPING: &str = "user-typing";
    pub const USER_STOPPED_TYPING: &str = "user-stopped-typing";
    pub const USER_ONLINE: &str = "user-online";
    pub const USER_OFFLINE: &str = "user-offline";
    /// Server-reported fault frames are re-published under this name.
    pub const SERVER_ERROR: &str = "error";
}

/// Frames sent by the client.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "kebab-case")]
pub enum ClientCommand {
    /// Handshake frame; must be the first frame after the socket opens.
    Authenticate { token: String },
    /// Start receiving events scoped to `room` (a ticket, a chat, ...).
    JoinRoom { room: String },
    /// Stop receiving events scoped to `room`.
    LeaveRoom { room: String },
    /// Free-form application event addressed to the server.
    Publish { event: String, payload: Value },
}

impl ClientCommand {
    /// Wire name of the frame, for logging.
    pub fn name(&self) -> &'static str {
        match self {
            ClientCommand::Authenticate { .. } => "authenticate",
            ClientCommand::JoinRoom { .. } => "join-room",
            ClientCommand::LeaveRoom { .. } => "leave-room",
            ClientCommand::Publish { .. } => "publish",
        }
    }
}

/// Frames sent by the server.
///
/// The application-event variants carry their payloads verbatim; the client
/// never looks inside them.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "kebab-case")]
pub enum ServerEvent {
    #[serde(rename = "auth.ok", rename_all = "camelCase")]
    AuthOk {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        user_id: Option<String>,
    },
    #[serde(rename = "auth.error")]
    AuthError { code: String, message: String },
    TicketUpdated(Value),
    NewMessage(Value),
    Notification(Value),
    UserTyping(Value),
    UserStoppedTyping(Value),
    UserOnline(Value),
    UserOffline(Value),
    #[serde(rename_all = "camelCase")]
    Error {
        code: String,
        message: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        correlation_id: Option<String>,
    },
}

impl ServerEvent {
    /// Wire name of the frame.
    pub fn name(&self) -> &'static str {
        match self {
            ServerEvent::AuthOk { .. } => "auth.ok",
            ServerEvent::AuthError { .. } => "auth.error",
            ServerEvent::TicketUpdated(_) => events::TICKET_UPDATED,
            ServerEvent::NewMessage(_) => events::NEW_MESSAGE,
            ServerEvent::Notification(_) => events::NOTIFICATION,
            ServerEvent::UserTyping(_) => events::USER_TYPING,
            ServerEvent::UserStoppedTyping(_) => events::USER_STOPPED_TYPING,
            ServerEvent::UserOnline(_) => events::USER_ONLINE,
            ServerEvent::UserOffline(_) => events::USER_OFFLINE,
            ServerEvent::Error { .. } => events::SERVER_ERROR,
        }
    }

    /// Split an application event into its bus name and opaque payload.
    /// Control frames (auth acks, fault frames) return `None`.
    pub fn into_application_event(self) -> Option<(&'static str, Value)> {
        match self {
            ServerEvent::TicketUpdated(v) => Some((events::TICKET_UPDATED, v)),
            ServerEvent::NewMessage(v) => Some((events::NEW_MESSAGE, v)),
            ServerEvent::Notification(v) => Some((events::NOTIFICATION, v)),
            ServerEvent::UserTyping(v) => Some((events::USER_TYPING, v)),
            ServerEvent::UserStoppedTyping(v) => Some((events::USER_STOPPED_TYPING, v)),
            ServerEvent::UserOnline(v) => Some((events::USER_ONLINE, v)),
            ServerEvent::UserOffline(v) => Some((events::USER_OFFLINE, v)),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn join_room_wire_shape() {
        let frame = WsEnvelope::new(ClientCommand::JoinRoom {
            room: "ticket:T-42".to_string(),
        });
        let value = serde_json::to_value(&frame).unwrap();
        assert_eq!(value["type"], "join-room");
        assert_eq!(value["data"]["room"], "ticket:T-42");
        assert!(value["id"].is_string());
        assert!(value.get("correlationId").is_none());
    }

    #[test]
    fn authenticate_carries_token() {
        let value = serde_json::to_value(WsEnvelope::new(ClientCommand::Authenticate {
            token: "tok_123".to_string(),
        }))
        .unwrap();
        assert_eq!(value["type"], "authenticate");
        assert_eq!(value["data"]["token"], "tok_123");
    }

    #[test]
    fn ticket_updated_payload_is_opaque() {
        let raw = json!({
            "id": "f-1",
            "type": "ticket-updated",
            "data": { "ticketId": "T-42", "status": "closed", "nested": { "x": 1 } },
            "ts": "2026-03-01T12:00:00Z",
        });
        let frame: WsEnvelope<ServerEvent> = serde_json::from_value(raw).unwrap();
        let (name, payload) = frame.payload.into_application_event().unwrap();
        assert_eq!(name, "ticket-updated");
        assert_eq!(payload["nested"]["x"], 1);
    }

    #[test]
    fn auth_frames_round_trip() {
        let ok: WsEnvelope<ServerEvent> = serde_json::from_str(
            r#"{"id":"f-2","type":"auth.ok","data":{"userId":"u-9"},"ts":"2026-03-01T12:00:00Z"}"#,
        )
        .unwrap();
        assert!(matches!(
            ok.payload,
            ServerEvent::AuthOk { user_id: Some(ref u) } if u == "u-9"
        ));

        let err: WsEnvelope<ServerEvent> = serde_json::from_str(
            r#"{"id":"f-3","type":"auth.error","data":{"code":"invalid_token","message":"expired"},"ts":"2026-03-01T12:00:00Z"}"#,
        )
        .unwrap();
        assert!(matches!(err.payload, ServerEvent::AuthError { ref code, .. } if code == "invalid_token"));
    }

    #[test]
    fn unknown_frame_type_is_an_error() {
        let raw = json!({
            "id": "f-4",
            "type": "totally-unknown",
            "data": {},
            "ts": "2026-03-01T12:00:00Z",
        });
        assert!(serde_json::from_value::<WsEnvelope<ServerEvent>>(raw).is_err());
    }

    #[test]
    fn correlation_id_round_trips() {
        let frame = WsEnvelope::with_correlation(
            ClientCommand::Publish {
                event: "agent-assigned".to_string(),
                payload: json!({ "agent": "a-7" }),
            },
            "corr-1",
        );
        let json = serde_json::to_string(&frame).unwrap();
        let back: WsEnvelope<ClientCommand> = serde_json::from_str(&json).unwrap();
        assert_eq!(back.correlation_id.as_deref(), Some("corr-1"));
        assert_eq!(back.payload.name(), "publish");
    }
}
