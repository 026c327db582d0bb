//! Chat module
//!
//! Conversations, messages and the feed of the active conversation.

pub mod feed;
pub mod models;

pub use feed::{AppendOutcome, MessageFeed};
pub use models::{
    Alignment, Conversation, ConversationId, IntegrityError, Membership, Message, MessageId,
    UserId, UserSummary,
};
