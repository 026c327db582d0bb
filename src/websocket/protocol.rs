//! Realtime wire protocol
//!
//! Every frame is a JSON text message of the form
//! `{"event": "<name>", "data": <payload>}`.

use crate::chat::{ConversationId, Message, UserId};
use crate::state::SessionIdentity;
use serde::{Deserialize, Serialize};

/// Outgoing message payload
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct OutgoingMessage {
    /// Conversation the message is for
    pub conversation_id: ConversationId,
    /// Text content
    pub body: String,
}

/// Typing indicator payload
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct TypingNotice {
    /// Conversation where someone is typing
    pub conversation_id: ConversationId,
    /// Who is typing, when the backend says
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<UserId>,
}

/// Events the client emits
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(tag = "event", content = "data")]
pub enum ClientEvent {
    /// Announce the session identity after connecting
    #[serde(rename = "setup")]
    Setup(SessionIdentity),
    /// Subscribe to a conversation's room
    #[serde(rename = "join-conversation")]
    JoinConversation(ConversationId),
    /// Ask the backend to persist and broadcast a message
    #[serde(rename = "send-message")]
    SendMessage(OutgoingMessage),
    /// The user started typing in a conversation
    #[serde(rename = "typing")]
    Typing(ConversationId),
    /// The user stopped typing in a conversation
    #[serde(rename = "stop-typing")]
    StopTyping(ConversationId),
}

impl ClientEvent {
    /// Wire name of the event
    pub fn name(&self) -> &'static str {
        match self {
            ClientEvent::Setup(_) => "setup",
            ClientEvent::JoinConversation(_) => "join-conversation",
            ClientEvent::SendMessage(_) => "send-message",
            ClientEvent::Typing(_) => "typing",
            ClientEvent::StopTyping(_) => "stop-typing",
        }
    }
}

/// Events the backend emits
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(tag = "event", content = "data")]
pub enum ServerEvent {
    /// The backend accepted the `setup` handshake
    #[serde(rename = "connection")]
    Connection,
    /// A persisted message, including echoes of our own sends
    #[serde(rename = "new-message")]
    NewMessage(Message),
    /// Someone started typing
    #[serde(rename = "typing")]
    Typing(TypingNotice),
    /// Someone stopped typing
    #[serde(rename = "stop-typing")]
    StopTyping(TypingNotice),
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_setup_frame() {
        let event = ClientEvent::Setup(SessionIdentity {
            user_id: "u1".to_string(),
            name: "Ada".to_string(),
            email: "ada@example.com".to_string(),
        });
        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["event"], "setup");
        assert_eq!(value["data"]["_id"], "u1");
        assert_eq!(event.name(), "setup");
    }

    #[test]
    fn test_send_message_frame() {
        let event = ClientEvent::SendMessage(OutgoingMessage {
            conversation_id: "c1".to_string(),
            body: "hello".to_string(),
        });
        assert_eq!(
            serde_json::to_value(&event).unwrap(),
            json!({"event": "send-message", "data": {"conversationId": "c1", "body": "hello"}})
        );
    }

    #[test]
    fn test_join_frame() {
        let event = ClientEvent::JoinConversation("c1".to_string());
        assert_eq!(
            serde_json::to_value(&event).unwrap(),
            json!({"event": "join-conversation", "data": "c1"})
        );
    }

    #[test]
    fn test_parse_connection_without_data() {
        let event: ServerEvent = serde_json::from_str(r#"{"event":"connection"}"#).unwrap();
        assert_eq!(event, ServerEvent::Connection);
    }

    #[test]
    fn test_parse_new_message() {
        let event: ServerEvent = serde_json::from_value(json!({
            "event": "new-message",
            "data": {
                "_id": "m1",
                "sender": {"_id": "u2", "name": "Bob"},
                "message": "hey",
                "chat": {"_id": "c1", "users": []},
                "createdAt": "2024-03-01T10:00:00Z"
            }
        }))
        .unwrap();

        match event {
            ServerEvent::NewMessage(message) => {
                assert_eq!(message.conversation_id, "c1");
                assert_eq!(message.body, "hey");
            }
            other => panic!("unexpected event: {:?}", other),
        }
    }

    #[test]
    fn test_parse_typing_without_user() {
        let event: ServerEvent =
            serde_json::from_str(r#"{"event":"typing","data":{"conversationId":"c1"}}"#).unwrap();
        assert_eq!(
            event,
            ServerEvent::Typing(TypingNotice {
                conversation_id: "c1".to_string(),
                user_id: None,
            })
        );
    }

    #[test]
    fn test_unknown_event_fails_to_parse() {
        assert!(serde_json::from_str::<ServerEvent>(r#"{"event":"nope","data":1}"#).is_err());
    }
}
