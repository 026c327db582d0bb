//! Request and response bodies for the REST backend

use serde::{Deserialize, Serialize};

/// Credentials sent to `POST /api/user/login`
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SignInRequest {
    /// Trimmed email
    pub email: String,
    /// Trimmed password
    pub password: String,
}

/// Account details sent to `POST /api/user`
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SignUpRequest {
    /// Trimmed display name
    pub name: String,
    /// Trimmed email
    pub email: String,
    /// Trimmed password
    pub password: String,
}

/// Group details for `POST /api/chat/group`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreateGroupRequest {
    /// Group name
    pub name: String,
    /// Members besides the creator
    pub member_ids: Vec<String>,
}

/// Wire body for group creation; the backend expects `users` as a JSON-encoded string
#[derive(Debug, Serialize)]
pub(crate) struct CreateGroupBody {
    pub name: String,
    pub users: String,
}

/// Body for `POST /api/chat`
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct AccessChatBody<'a> {
    pub user_id: &'a str,
}

/// Body for `PUT /api/chat/rename`
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct RenameGroupBody<'a> {
    pub chat_id: &'a str,
    pub chat_name: &'a str,
}

/// Body for `PUT /api/chat/groupadd` and `PUT /api/chat/groupremove`
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct GroupMemberBody<'a> {
    pub chat_id: &'a str,
    pub user_id: &'a str,
}

/// Failure body returned by the backend
#[derive(Debug, Deserialize)]
pub(crate) struct ErrorBody {
    #[serde(default)]
    pub message: Option<String>,
}
