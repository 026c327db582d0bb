// Authenticated session
// Identity and token of the signed-in user

use crate::chat::models::UserId;
use serde::{Deserialize, Serialize};

/// The authenticated user's identity and token
///
/// Field names match the backend's sign-in response so the response can be
/// stored as-is.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    /// Id of the signed-in user
    #[serde(rename = "_id")]
    pub user_id: UserId,
    /// Display name
    pub name: String,
    /// Email address
    pub email: String,
    /// Avatar reference, if any
    #[serde(rename = "pic", default, skip_serializing_if = "Option::is_none")]
    pub avatar: Option<String>,
    /// Bearer token for the REST backend
    #[serde(rename = "token")]
    pub auth_token: String,
}

/// Token-free identity announced on the realtime channel
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionIdentity {
    /// Id of the signed-in user
    #[serde(rename = "_id")]
    pub user_id: UserId,
    /// Display name
    pub name: String,
    /// Email address
    pub email: String,
}

impl Session {
    /// Identity to announce in the `setup` handshake
    pub fn identity(&self) -> SessionIdentity {
        SessionIdentity {
            user_id: self.user_id.clone(),
            name: self.name.clone(),
            email: self.email.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_from_sign_in_response() {
        let session: Session = serde_json::from_str(
            r#"{"_id":"u1","name":"Ada","email":"ada@example.com","pic":"https://x/a.png","token":"jwt"}"#,
        )
        .unwrap();
        assert_eq!(session.user_id, "u1");
        assert_eq!(session.auth_token, "jwt");
    }

    #[test]
    fn test_identity_omits_token() {
        let session = Session {
            user_id: "u1".to_string(),
            name: "Ada".to_string(),
            email: "ada@example.com".to_string(),
            avatar: None,
            auth_token: "jwt".to_string(),
        };
        let json = serde_json::to_value(session.identity()).unwrap();
        assert_eq!(json["_id"], "u1");
        assert!(json.get("token").is_none());
    }
}
