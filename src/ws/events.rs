//! Wire types for the real-time channel.
//!
//! Frames are JSON text in both directions: `{"event": "<name>", "data": {…}}`.
//! Event names and field spellings are part of the client contract and must
//! not change.

use axum::extract::ws::Message;
use serde::{Deserialize, Serialize};

/// Display profile a caller attaches to an offer so the callee can render
/// the ringing screen before any user-store lookup. Best effort, opaque to
/// the router.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CallerProfile {
    pub full_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub profile_pic: Option<String>,
}

/// Events a client may send over the WebSocket.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "event", content = "data")]
pub enum ClientEvent {
    #[serde(rename = "call:offer")]
    CallOffer {
        to: String,
        sdp: String,
        #[serde(rename = "fromUser", default)]
        from_user: Option<CallerProfile>,
    },
    #[serde(rename = "call:answer")]
    CallAnswer { to: String, sdp: String },
    #[serde(rename = "call:candidate")]
    CallCandidate {
        to: String,
        /// ICE candidate data, forwarded untouched.
        candidate: serde_json::Value,
    },
    #[serde(rename = "call:hangup")]
    CallHangup { to: String },
}

/// A chat message as sent to clients (WebSocket fan-out and REST responses).
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MessagePayload {
    #[serde(rename = "_id")]
    pub id: String,
    pub sender_id: String,
    pub receiver_id: String,
    pub text: Option<String>,
    pub image: Option<String>,
    pub audio: Option<String>,
    pub created_at: String,
    pub updated_at: String,
    pub sender_name: Option<String>,
}

/// Events the server pushes to clients.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", content = "data")]
pub enum ServerEvent {
    /// Full snapshot of online user ids, sent to every connection whenever
    /// anyone connects or disconnects.
    #[serde(rename = "getOnlineUsers")]
    OnlineUsers(Vec<String>),
    #[serde(rename = "newMessage")]
    NewMessage(MessagePayload),
    #[serde(rename = "messageDeleted")]
    MessageDeleted {
        #[serde(rename = "messageId")]
        message_id: String,
        scope: String,
        #[serde(rename = "userId", skip_serializing_if = "Option::is_none")]
        user_id: Option<String>,
    },
    #[serde(rename = "messageUpdated")]
    MessageUpdated {
        #[serde(rename = "_id")]
        id: String,
        text: Option<String>,
        #[serde(rename = "updatedAt")]
        updated_at: String,
    },
    #[serde(rename = "call:incoming")]
    CallIncoming {
        from: String,
        #[serde(rename = "fromUser", skip_serializing_if = "Option::is_none")]
        from_user: Option<CallerProfile>,
        sdp: String,
    },
    #[serde(rename = "call:answered")]
    CallAnswered { from: String, sdp: String },
    #[serde(rename = "call:candidate")]
    CallCandidate {
        from: String,
        candidate: serde_json::Value,
    },
    #[serde(rename = "call:hangup")]
    CallHangup { from: String },
}

impl ServerEvent {
    /// Serialize into a WebSocket text frame. Serialization of these types
    /// cannot fail in practice; a failure is logged and yields None.
    pub fn to_message(&self) -> Option<Message> {
        match serde_json::to_string(self) {
            Ok(json) => Some(Message::Text(json.into())),
            Err(e) => {
                tracing::error!(error = %e, "Failed to serialize server event");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn client_event_names_parse() {
        let offer: ClientEvent = serde_json::from_value(json!({
            "event": "call:offer",
            "data": { "to": "u2", "sdp": "X", "fromUser": { "fullName": "Ana" } }
        }))
        .unwrap();
        match offer {
            ClientEvent::CallOffer { to, sdp, from_user } => {
                assert_eq!(to, "u2");
                assert_eq!(sdp, "X");
                assert_eq!(from_user.unwrap().full_name, "Ana");
            }
            other => panic!("Expected CallOffer, got {:?}", other),
        }

        let hangup: ClientEvent = serde_json::from_value(json!({
            "event": "call:hangup",
            "data": { "to": "u1" }
        }))
        .unwrap();
        assert!(matches!(hangup, ClientEvent::CallHangup { .. }));
    }

    #[test]
    fn server_event_wire_shape() {
        let event = ServerEvent::MessageDeleted {
            message_id: "m1".to_string(),
            scope: "me".to_string(),
            user_id: Some("u1".to_string()),
        };
        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["event"], "messageDeleted");
        assert_eq!(value["data"]["messageId"], "m1");
        assert_eq!(value["data"]["userId"], "u1");

        let snapshot = ServerEvent::OnlineUsers(vec!["u1".to_string(), "u2".to_string()]);
        let value = serde_json::to_value(&snapshot).unwrap();
        assert_eq!(value["event"], "getOnlineUsers");
        assert_eq!(value["data"], json!(["u1", "u2"]));
    }

    #[test]
    fn message_updated_uses_underscore_id() {
        let event = ServerEvent::MessageUpdated {
            id: "m9".to_string(),
            text: Some("edited".to_string()),
            updated_at: "2025-01-01T00:00:00Z".to_string(),
        };
        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["data"]["_id"], "m9");
        assert_eq!(value["data"]["updatedAt"], "2025-01-01T00:00:00Z");
    }

    #[test]
    fn candidate_payload_is_opaque() {
        let candidate = json!({ "sdpMid": "0", "candidate": "candidate:1 1 UDP …" });
        let event = ServerEvent::CallCandidate {
            from: "u1".to_string(),
            candidate: candidate.clone(),
        };
        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["data"]["candidate"], candidate);
    }
}
