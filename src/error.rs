//! Error types and error handling for the client
//!
//! Every failure an operation can report is a [`ClientError`]. Each variant
//! maps to one category of the user-facing taxonomy via
//! [`ClientError::category`], which decides how the front end surfaces it.

use crate::api::ApiError;
use crate::chat::IntegrityError;
use crate::state::PersistenceError;
use crate::validation::ValidationError;
use crate::websocket::ChannelError;
use thiserror::Error;

/// How an error is surfaced to the user
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Bad input, shown immediately; nothing was sent
    Validation,
    /// Bad credentials or duplicate account, shown as a transient notification
    Authentication,
    /// Network or channel trouble, shown as degraded connectivity
    Transport,
    /// Inconsistent data from the backend, shown as an explicit error state
    DataIntegrity,
    /// Durable session storage failed
    Storage,
    /// Anything unexpected
    Internal,
}

/// Client-level error types
#[derive(Error, Debug)]
pub enum ClientError {
    /// Input failed local validation
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// The backend refused the credentials or the new account
    #[error("{message}")]
    Authentication {
        /// HTTP status returned by the backend
        status: u16,
        /// Message returned by the backend
        message: String,
    },

    /// A backend call failed
    #[error(transparent)]
    Api(#[from] ApiError),

    /// The realtime channel could not carry the request
    #[error(transparent)]
    Channel(#[from] ChannelError),

    /// Conversation data broke an invariant
    #[error(transparent)]
    Integrity(#[from] IntegrityError),

    /// The session file could not be read or written
    #[error("Session storage error: {0}")]
    Storage(#[from] PersistenceError),

    /// The operation needs a signed-in user
    #[error("You need to sign in first")]
    NotAuthenticated,

    /// The operation needs a selected conversation
    #[error("No conversation selected")]
    NoActiveConversation,

    /// The conversation is not in the loaded chat list
    #[error("Conversation not found: {0}")]
    ConversationNotFound(String),

    /// Internal error (catch-all for unexpected errors)
    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl ClientError {
    /// Turn a backend failure on sign-in or sign-up into an authentication error
    ///
    /// Only explicit rejections count; transport failures stay API errors.
    pub fn from_auth_failure(error: ApiError) -> Self {
        match error {
            ApiError::Rejected { status, message } => {
                ClientError::Authentication { status, message }
            }
            other => ClientError::Api(other),
        }
    }

    /// Category deciding how the error is surfaced
    pub fn category(&self) -> ErrorCategory {
        match self {
            ClientError::Validation(_) => ErrorCategory::Validation,
            ClientError::Authentication { .. } => ErrorCategory::Authentication,
            ClientError::Api(ApiError::Rejected { status, .. }) if *status == 401 => {
                ErrorCategory::Authentication
            }
            ClientError::Api(ApiError::Decode(_)) => ErrorCategory::DataIntegrity,
            ClientError::Api(_) => ErrorCategory::Transport,
            ClientError::Channel(_) => ErrorCategory::Transport,
            ClientError::Integrity(_) => ErrorCategory::DataIntegrity,
            ClientError::Storage(_) => ErrorCategory::Storage,
            ClientError::NotAuthenticated => ErrorCategory::Authentication,
            ClientError::NoActiveConversation => ErrorCategory::Validation,
            ClientError::ConversationNotFound(_) => ErrorCategory::DataIntegrity,
            ClientError::Internal(_) => ErrorCategory::Internal,
        }
    }

    /// Text for a user-visible notification
    pub fn user_message(&self) -> String {
        match self {
            ClientError::Api(e) => e.user_message(),
            other => other.to_string(),
        }
    }
}
