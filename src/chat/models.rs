//! Chat data models
//!
//! Defines users, conversations and messages as the backend delivers them,
//! plus the membership rules derived from a conversation's participants.

use chrono::{DateTime, Local, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use thiserror::Error;

/// Unique identifier for a user
pub type UserId = String;

/// Unique identifier for a conversation
pub type ConversationId = String;

/// Unique identifier for a message
pub type MessageId = String;

/// The backend sometimes sends a bare id and sometimes the populated object
#[derive(Deserialize)]
#[serde(untagged)]
enum IdRef {
    Id(String),
    Object {
        #[serde(rename = "_id")]
        id: String,
    },
}

impl From<IdRef> for String {
    fn from(value: IdRef) -> Self {
        match value {
            IdRef::Id(id) | IdRef::Object { id } => id,
        }
    }
}

fn id_or_object<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    IdRef::deserialize(deserializer).map(String::from)
}

fn optional_id_or_object<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<IdRef>::deserialize(deserializer)?.map(String::from))
}

/// A user as shown in participant lists and search results
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserSummary {
    /// Unique identifier of the user
    #[serde(rename = "_id")]
    pub id: UserId,
    /// Display name
    pub name: String,
    /// Email address
    #[serde(default)]
    pub email: String,
    /// Avatar reference (URL), if any
    #[serde(rename = "pic", default, skip_serializing_if = "Option::is_none")]
    pub avatar: Option<String>,
}

/// Data-integrity failures found while resolving a conversation's membership
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum IntegrityError {
    /// The conversation has no participants at all
    #[error("Conversation {0} has no participants")]
    EmptyParticipants(ConversationId),

    /// The stored admin id matches none of the participants
    #[error("Group admin {admin_id} is not a member of conversation {conversation_id}")]
    AdminNotFound {
        /// Conversation being resolved
        conversation_id: ConversationId,
        /// Admin id that could not be matched
        admin_id: UserId,
    },

    /// A group conversation without any admin
    #[error("Group conversation {0} has no admin")]
    MissingAdmin(ConversationId),

    /// A direct conversation where no participant besides the current user exists
    #[error("Conversation {0} has no other participant")]
    NoCounterpart(ConversationId),
}

/// A direct or group chat thread
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Conversation {
    /// Unique identifier for the conversation
    #[serde(rename = "_id")]
    pub id: ConversationId,
    /// Whether this is a group conversation
    #[serde(rename = "isGroupChat", default)]
    pub is_group: bool,
    /// Chat name as stored by the backend (meaningful for groups)
    #[serde(rename = "chatName", default)]
    pub display_name: String,
    /// Participants in backend order
    #[serde(rename = "users", default)]
    pub participants: Vec<UserSummary>,
    /// Admin of a group conversation
    #[serde(
        rename = "groupAdmin",
        default,
        deserialize_with = "optional_id_or_object",
        skip_serializing_if = "Option::is_none"
    )]
    pub admin_id: Option<UserId>,
}

/// Resolved view of who is in a conversation, relative to the current user
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Membership {
    /// Title shown in the header: the group name, or the other person's name
    pub title: String,
    /// The other participant of a direct conversation
    pub counterpart: Option<UserSummary>,
    /// The admin of a group conversation
    pub admin: Option<UserSummary>,
}

impl Conversation {
    /// Check structural invariants that must hold for every conversation
    pub fn validate(&self) -> Result<(), IntegrityError> {
        if self.participants.is_empty() {
            return Err(IntegrityError::EmptyParticipants(self.id.clone()));
        }
        Ok(())
    }

    /// Find a participant by id
    pub fn participant(&self, user_id: &str) -> Option<&UserSummary> {
        self.participants.iter().find(|u| u.id == user_id)
    }

    /// Whether the given user participates in this conversation
    pub fn has_participant(&self, user_id: &str) -> bool {
        self.participant(user_id).is_some()
    }

    /// Resolve the group admin among the participants
    ///
    /// Returns `Ok(None)` for direct conversations.
    pub fn resolve_admin(&self) -> Result<Option<&UserSummary>, IntegrityError> {
        if !self.is_group {
            return Ok(None);
        }
        let admin_id = self
            .admin_id
            .as_deref()
            .ok_or_else(|| IntegrityError::MissingAdmin(self.id.clone()))?;

        self.participant(admin_id)
            .map(Some)
            .ok_or_else(|| IntegrityError::AdminNotFound {
                conversation_id: self.id.clone(),
                admin_id: admin_id.to_string(),
            })
    }

    /// The first participant that is not the current user
    pub fn counterpart(&self, current_user_id: &str) -> Option<&UserSummary> {
        self.participants.iter().find(|u| u.id != current_user_id)
    }

    /// Whether the current user administers this group
    pub fn is_admin(&self, user_id: &str) -> bool {
        self.is_group && self.admin_id.as_deref() == Some(user_id)
    }

    /// Resolve the participants relative to the current user
    pub fn membership(&self, current_user_id: &str) -> Result<Membership, IntegrityError> {
        self.validate()?;

        if self.is_group {
            let admin = self.resolve_admin()?.cloned();
            return Ok(Membership {
                title: self.display_name.clone(),
                counterpart: None,
                admin,
            });
        }

        let counterpart = self
            .counterpart(current_user_id)
            .cloned()
            .ok_or_else(|| IntegrityError::NoCounterpart(self.id.clone()))?;

        Ok(Membership {
            title: counterpart.name.clone(),
            counterpart: Some(counterpart),
            admin: None,
        })
    }
}

/// Which side of the thread a message is drawn on
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Alignment {
    /// Sent by the current user
    Outgoing,
    /// Sent by someone else
    Incoming,
}

/// A single message in a conversation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    /// Unique identifier for the message
    #[serde(rename = "_id")]
    pub id: MessageId,
    /// ID of the conversation this message belongs to
    #[serde(rename = "chat", deserialize_with = "id_or_object")]
    pub conversation_id: ConversationId,
    /// Author of the message
    pub sender: UserSummary,
    /// Text content
    #[serde(rename = "message", alias = "content")]
    pub body: String,
    /// When the backend persisted the message
    #[serde(rename = "createdAt")]
    pub created_at: DateTime<Utc>,
}

impl Message {
    /// Id of the author
    pub fn sender_id(&self) -> &str {
        &self.sender.id
    }

    /// Whether the message was sent by the given user
    pub fn is_from(&self, user_id: &str) -> bool {
        self.sender.id == user_id
    }

    /// Derive the display side from the current user's id
    pub fn alignment(&self, current_user_id: &str) -> Alignment {
        if self.is_from(current_user_id) {
            Alignment::Outgoing
        } else {
            Alignment::Incoming
        }
    }

    /// Local `HH:MM` time label
    pub fn time_label(&self) -> String {
        self.created_at
            .with_timezone(&Local)
            .format("%H:%M")
            .to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn user(id: &str, name: &str) -> UserSummary {
        UserSummary {
            id: id.to_string(),
            name: name.to_string(),
            email: format!("{}@example.com", id),
            avatar: None,
        }
    }

    fn group(admin: Option<&str>, members: Vec<UserSummary>) -> Conversation {
        Conversation {
            id: "g1".to_string(),
            is_group: true,
            display_name: "Team".to_string(),
            participants: members,
            admin_id: admin.map(str::to_string),
        }
    }

    #[test]
    fn test_deserialize_conversation_with_admin_id() {
        let conversation: Conversation = serde_json::from_value(json!({
            "_id": "c1",
            "chatName": "Team",
            "isGroupChat": true,
            "users": [
                {"_id": "u1", "name": "Ada", "email": "ada@example.com", "pic": "https://x/a.png"},
                {"_id": "u2", "name": "Bob", "email": "bob@example.com"}
            ],
            "groupAdmin": "u1"
        }))
        .unwrap();

        assert!(conversation.is_group);
        assert_eq!(conversation.participants.len(), 2);
        assert_eq!(conversation.admin_id.as_deref(), Some("u1"));
        assert_eq!(
            conversation.participants[0].avatar.as_deref(),
            Some("https://x/a.png")
        );
    }

    #[test]
    fn test_deserialize_conversation_with_populated_admin() {
        let conversation: Conversation = serde_json::from_value(json!({
            "_id": "c1",
            "chatName": "Team",
            "isGroupChat": true,
            "users": [{"_id": "u1", "name": "Ada"}],
            "groupAdmin": {"_id": "u1", "name": "Ada", "email": "ada@example.com"}
        }))
        .unwrap();
        assert_eq!(conversation.admin_id.as_deref(), Some("u1"));
    }

    #[test]
    fn test_deserialize_direct_conversation_with_null_admin() {
        let conversation: Conversation = serde_json::from_value(json!({
            "_id": "c2",
            "chatName": "sender",
            "isGroupChat": false,
            "users": [{"_id": "u1", "name": "Ada"}, {"_id": "u2", "name": "Bob"}],
            "groupAdmin": null
        }))
        .unwrap();
        assert!(!conversation.is_group);
        assert!(conversation.admin_id.is_none());
    }

    #[test]
    fn test_deserialize_message_with_populated_chat() {
        let message: Message = serde_json::from_value(json!({
            "_id": "m1",
            "sender": {"_id": "u1", "name": "Ada", "email": "ada@example.com"},
            "message": "hello",
            "chat": {"_id": "c1", "chatName": "sender", "users": []},
            "createdAt": "2024-03-01T10:15:00.000Z"
        }))
        .unwrap();

        assert_eq!(message.conversation_id, "c1");
        assert_eq!(message.sender_id(), "u1");
        assert_eq!(message.body, "hello");
    }

    #[test]
    fn test_deserialize_message_content_alias() {
        let message: Message = serde_json::from_value(json!({
            "_id": "m1",
            "sender": {"_id": "u1", "name": "Ada"},
            "content": "hi",
            "chat": "c1",
            "createdAt": "2024-03-01T10:15:00Z"
        }))
        .unwrap();
        assert_eq!(message.body, "hi");
        assert_eq!(message.conversation_id, "c1");
    }

    #[test]
    fn test_admin_resolution() {
        let conversation = group(Some("u2"), vec![user("u1", "Ada"), user("u2", "Bob")]);
        let admin = conversation.resolve_admin().unwrap().unwrap();
        assert_eq!(admin.name, "Bob");
        assert!(conversation.is_admin("u2"));
        assert!(!conversation.is_admin("u1"));
    }

    #[test]
    fn test_admin_not_among_participants_is_an_error() {
        let conversation = group(Some("ghost"), vec![user("u1", "Ada"), user("u2", "Bob")]);
        assert_eq!(
            conversation.resolve_admin().unwrap_err(),
            IntegrityError::AdminNotFound {
                conversation_id: "g1".to_string(),
                admin_id: "ghost".to_string(),
            }
        );
        assert!(conversation.membership("u1").is_err());
    }

    #[test]
    fn test_group_without_admin_is_an_error() {
        let conversation = group(None, vec![user("u1", "Ada")]);
        assert_eq!(
            conversation.membership("u1").unwrap_err(),
            IntegrityError::MissingAdmin("g1".to_string())
        );
    }

    #[test]
    fn test_empty_participants_is_an_error() {
        let conversation = group(Some("u1"), vec![]);
        assert_eq!(
            conversation.membership("u1").unwrap_err(),
            IntegrityError::EmptyParticipants("g1".to_string())
        );
    }

    #[test]
    fn test_direct_membership_uses_counterpart_name() {
        let conversation = Conversation {
            id: "c1".to_string(),
            is_group: false,
            display_name: "sender".to_string(),
            participants: vec![user("me", "Me"), user("u2", "Bob")],
            admin_id: None,
        };
        let membership = conversation.membership("me").unwrap();
        assert_eq!(membership.title, "Bob");
        assert_eq!(membership.counterpart.unwrap().id, "u2");
        assert!(membership.admin.is_none());

        let lonely = Conversation {
            participants: vec![user("me", "Me")],
            ..conversation
        };
        assert_eq!(
            lonely.membership("me").unwrap_err(),
            IntegrityError::NoCounterpart("c1".to_string())
        );
    }

    #[test]
    fn test_alignment_is_derived_from_sender() {
        let message = Message {
            id: "m1".to_string(),
            conversation_id: "c1".to_string(),
            sender: user("u1", "Ada"),
            body: "hi".to_string(),
            created_at: Utc::now(),
        };
        assert_eq!(message.alignment("u1"), Alignment::Outgoing);
        assert_eq!(message.alignment("u2"), Alignment::Incoming);
        assert_eq!(message.time_label().len(), 5);
    }
}
