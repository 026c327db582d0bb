//! Backend API client
//!
//! Typed access to the REST-like chat backend. The controller talks to the
//! backend only through the [`ChatApi`] trait so tests can swap in a fake.

use super::types::{
    AccessChatBody, CreateGroupBody, CreateGroupRequest, ErrorBody, GroupMemberBody,
    RenameGroupBody, SignInRequest, SignUpRequest,
};
use crate::chat::{Conversation, Message, UserSummary};
use crate::state::Session;
use async_trait::async_trait;
use reqwest::{Method, RequestBuilder};
use serde::de::DeserializeOwned;
use thiserror::Error;

/// Errors returned by backend calls
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ApiError {
    /// The backend answered with a non-success status
    #[error("{message} (HTTP {status})")]
    Rejected {
        /// HTTP status code
        status: u16,
        /// Message from the backend body, or the status reason
        message: String,
    },

    /// The request never produced a response
    #[error("Failed to reach the backend: {0}")]
    Transport(String),

    /// The response body could not be decoded
    #[error("Failed to parse backend response: {0}")]
    Decode(String),
}

impl ApiError {
    /// Message suitable for a user-visible notification
    pub fn user_message(&self) -> String {
        match self {
            ApiError::Rejected { message, .. } => message.clone(),
            other => other.to_string(),
        }
    }
}

/// Operations offered by the chat backend
#[async_trait]
pub trait ChatApi: Send + Sync {
    /// Exchange credentials for a session
    async fn sign_in(&self, request: &SignInRequest) -> Result<Session, ApiError>;

    /// Register a new account
    async fn sign_up(&self, request: &SignUpRequest) -> Result<UserSummary, ApiError>;

    /// Search users by name or email
    async fn search_users(&self, token: &str, term: &str) -> Result<Vec<UserSummary>, ApiError>;

    /// Fetch the conversations the user participates in
    async fn fetch_conversations(&self, token: &str) -> Result<Vec<Conversation>, ApiError>;

    /// Open (or create) the direct conversation with a user
    async fn access_conversation(
        &self,
        token: &str,
        user_id: &str,
    ) -> Result<Conversation, ApiError>;

    /// Fetch the message history of a conversation
    async fn fetch_messages(
        &self,
        token: &str,
        conversation_id: &str,
    ) -> Result<Vec<Message>, ApiError>;

    /// Create a group conversation
    async fn create_group(
        &self,
        token: &str,
        request: &CreateGroupRequest,
    ) -> Result<Conversation, ApiError>;

    /// Rename a group conversation
    async fn rename_group(
        &self,
        token: &str,
        conversation_id: &str,
        name: &str,
    ) -> Result<Conversation, ApiError>;

    /// Add a member to a group conversation
    async fn add_to_group(
        &self,
        token: &str,
        conversation_id: &str,
        user_id: &str,
    ) -> Result<Conversation, ApiError>;

    /// Remove a member from a group conversation
    async fn remove_from_group(
        &self,
        token: &str,
        conversation_id: &str,
        user_id: &str,
    ) -> Result<Conversation, ApiError>;
}

/// [`ChatApi`] over HTTP
#[derive(Debug, Clone)]
pub struct HttpChatApi {
    client: reqwest::Client,
    base_url: String,
}

impl HttpChatApi {
    /// Create a client for the given base URL, sharing the HTTP connection pool
    pub fn new(client: reqwest::Client, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    fn request(&self, method: Method, path: &str, token: Option<&str>) -> RequestBuilder {
        let url = format!("{}{}", self.base_url, path);
        let builder = self.client.request(method, url);
        match token {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }

    async fn send<T: DeserializeOwned>(
        &self,
        builder: RequestBuilder,
        operation: &'static str,
    ) -> Result<T, ApiError> {
        tracing::debug!(operation, "Calling chat backend");

        let response = builder.send().await.map_err(|e| {
            tracing::error!(operation, error = %e, "Backend request failed");
            ApiError::Transport(e.to_string())
        })?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| ApiError::Transport(format!("Failed to read response body: {}", e)))?;

        if !status.is_success() {
            let message = serde_json::from_str::<ErrorBody>(&body)
                .ok()
                .and_then(|b| b.message)
                .filter(|m| !m.trim().is_empty())
                .unwrap_or_else(|| {
                    status
                        .canonical_reason()
                        .unwrap_or("Request failed")
                        .to_string()
                });

            tracing::warn!(
                operation,
                status_code = status.as_u16(),
                message = %message,
                "Backend rejected request"
            );

            return Err(ApiError::Rejected {
                status: status.as_u16(),
                message,
            });
        }

        serde_json::from_str(&body).map_err(|e| {
            tracing::error!(operation, error = %e, "Failed to decode backend response");
            ApiError::Decode(e.to_string())
        })
    }
}

#[async_trait]
impl ChatApi for HttpChatApi {
    async fn sign_in(&self, request: &SignInRequest) -> Result<Session, ApiError> {
        let builder = self
            .request(Method::POST, "/api/user/login", None)
            .json(request);
        self.send(builder, "sign_in").await
    }

    async fn sign_up(&self, request: &SignUpRequest) -> Result<UserSummary, ApiError> {
        let builder = self.request(Method::POST, "/api/user", None).json(request);
        self.send(builder, "sign_up").await
    }

    async fn search_users(&self, token: &str, term: &str) -> Result<Vec<UserSummary>, ApiError> {
        let builder = self
            .request(Method::GET, "/api/user", Some(token))
            .query(&[("search", term)]);
        self.send(builder, "search_users").await
    }

    async fn fetch_conversations(&self, token: &str) -> Result<Vec<Conversation>, ApiError> {
        let builder = self.request(Method::GET, "/api/chat", Some(token));
        self.send(builder, "fetch_conversations").await
    }

    async fn access_conversation(
        &self,
        token: &str,
        user_id: &str,
    ) -> Result<Conversation, ApiError> {
        let builder = self
            .request(Method::POST, "/api/chat", Some(token))
            .json(&AccessChatBody { user_id });
        self.send(builder, "access_conversation").await
    }

    async fn fetch_messages(
        &self,
        token: &str,
        conversation_id: &str,
    ) -> Result<Vec<Message>, ApiError> {
        let path = format!("/api/message/{}", conversation_id);
        let builder = self.request(Method::GET, &path, Some(token));
        self.send(builder, "fetch_messages").await
    }

    async fn create_group(
        &self,
        token: &str,
        request: &CreateGroupRequest,
    ) -> Result<Conversation, ApiError> {
        let users = serde_json::to_string(&request.member_ids)
            .map_err(|e| ApiError::Decode(e.to_string()))?;
        let builder = self
            .request(Method::POST, "/api/chat/group", Some(token))
            .json(&CreateGroupBody {
                name: request.name.clone(),
                users,
            });
        self.send(builder, "create_group").await
    }

    async fn rename_group(
        &self,
        token: &str,
        conversation_id: &str,
        name: &str,
    ) -> Result<Conversation, ApiError> {
        let builder = self
            .request(Method::PUT, "/api/chat/rename", Some(token))
            .json(&RenameGroupBody {
                chat_id: conversation_id,
                chat_name: name,
            });
        self.send(builder, "rename_group").await
    }

    async fn add_to_group(
        &self,
        token: &str,
        conversation_id: &str,
        user_id: &str,
    ) -> Result<Conversation, ApiError> {
        let builder = self
            .request(Method::PUT, "/api/chat/groupadd", Some(token))
            .json(&GroupMemberBody {
                chat_id: conversation_id,
                user_id,
            });
        self.send(builder, "add_to_group").await
    }

    async fn remove_from_group(
        &self,
        token: &str,
        conversation_id: &str,
        user_id: &str,
    ) -> Result<Conversation, ApiError> {
        let builder = self
            .request(Method::PUT, "/api/chat/groupremove", Some(token))
            .json(&GroupMemberBody {
                chat_id: conversation_id,
                user_id,
            });
        self.send(builder, "remove_from_group").await
    }
}
