//! Message feed for the active conversation
//!
//! The feed is loaded once from history (sorted by creation time) and then
//! only appended to. Messages are deduplicated by id so a redelivered event
//! never shows twice.

use super::models::{ConversationId, Message, MessageId};
use std::collections::HashSet;
use tracing::debug;

/// What happened to a message offered to the feed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppendOutcome {
    /// The message was appended
    Appended,
    /// A message with the same id is already in the feed
    Duplicate,
    /// The message belongs to another conversation
    WrongConversation,
}

/// Ordered, append-only list of messages for one conversation
#[derive(Debug, Clone)]
pub struct MessageFeed {
    conversation_id: ConversationId,
    messages: Vec<Message>,
    seen: HashSet<MessageId>,
    history_loaded: bool,
}

impl MessageFeed {
    /// Create an empty feed for a conversation
    pub fn new(conversation_id: ConversationId) -> Self {
        Self {
            conversation_id,
            messages: Vec::new(),
            seen: HashSet::new(),
            history_loaded: false,
        }
    }

    /// Conversation this feed belongs to
    pub fn conversation_id(&self) -> &str {
        &self.conversation_id
    }

    /// Messages in display order
    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    /// Number of messages in the feed
    pub fn len(&self) -> usize {
        self.messages.len()
    }

    /// Whether the feed has no messages
    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// Whether the history fetch has completed
    pub fn history_loaded(&self) -> bool {
        self.history_loaded
    }

    /// Install the fetched history
    ///
    /// History is sorted by creation time (stable, so equal timestamps keep
    /// backend order). Messages that arrived live before the history
    /// response are kept after it unless the history already contains them.
    pub fn load_history(&mut self, mut history: Vec<Message>) {
        history.retain(|m| m.conversation_id == self.conversation_id);
        history.sort_by_key(|m| m.created_at);

        let live = std::mem::take(&mut self.messages);
        self.seen.clear();

        for message in history.into_iter().chain(live) {
            if self.seen.insert(message.id.clone()) {
                self.messages.push(message);
            }
        }
        self.history_loaded = true;
    }

    /// Append a live message in arrival order
    pub fn append(&mut self, message: Message) -> AppendOutcome {
        if message.conversation_id != self.conversation_id {
            return AppendOutcome::WrongConversation;
        }
        if !self.seen.insert(message.id.clone()) {
            debug!(message_id = %message.id, "Dropping duplicate message");
            return AppendOutcome::Duplicate;
        }
        if let Some(last) = self.messages.last() {
            if message.created_at < last.created_at {
                debug!(
                    message_id = %message.id,
                    "Message arrived out of timestamp order; keeping arrival order"
                );
            }
        }
        self.messages.push(message);
        AppendOutcome::Appended
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chat::models::UserSummary;
    use chrono::{Duration, TimeZone, Utc};

    fn message(id: &str, conversation: &str, offset_secs: i64) -> Message {
        Message {
            id: id.to_string(),
            conversation_id: conversation.to_string(),
            sender: UserSummary {
                id: "u1".to_string(),
                name: "Ada".to_string(),
                email: String::new(),
                avatar: None,
            },
            body: format!("body {}", id),
            created_at: Utc.with_ymd_and_hms(2024, 3, 1, 10, 0, 0).unwrap()
                + Duration::seconds(offset_secs),
        }
    }

    fn ids(feed: &MessageFeed) -> Vec<&str> {
        feed.messages().iter().map(|m| m.id.as_str()).collect()
    }

    #[test]
    fn test_history_sorted_by_created_at() {
        let mut feed = MessageFeed::new("c1".to_string());
        feed.load_history(vec![
            message("m3", "c1", 30),
            message("m1", "c1", 10),
            message("m2", "c1", 20),
            message("x", "c2", 0),
        ]);
        assert_eq!(ids(&feed), vec!["m1", "m2", "m3"]);
        assert!(feed.history_loaded());
    }

    #[test]
    fn test_live_messages_keep_arrival_order() {
        let mut feed = MessageFeed::new("c1".to_string());
        for (i, id) in ["a", "b", "c", "d"].iter().enumerate() {
            assert_eq!(
                feed.append(message(id, "c1", i as i64)),
                AppendOutcome::Appended
            );
        }
        assert_eq!(ids(&feed), vec!["a", "b", "c", "d"]);
    }

    #[test]
    fn test_duplicate_is_dropped() {
        let mut feed = MessageFeed::new("c1".to_string());
        feed.append(message("m1", "c1", 0));
        assert_eq!(
            feed.append(message("m1", "c1", 0)),
            AppendOutcome::Duplicate
        );
        assert_eq!(feed.len(), 1);
    }

    #[test]
    fn test_other_conversation_rejected() {
        let mut feed = MessageFeed::new("c1".to_string());
        assert_eq!(
            feed.append(message("m1", "c2", 0)),
            AppendOutcome::WrongConversation
        );
        assert!(feed.is_empty());
    }

    #[test]
    fn test_live_message_before_history_is_kept() {
        let mut feed = MessageFeed::new("c1".to_string());
        feed.append(message("live", "c1", 100));
        feed.append(message("m2", "c1", 20));
        feed.load_history(vec![message("m2", "c1", 20), message("m1", "c1", 10)]);
        assert_eq!(ids(&feed), vec!["m1", "m2", "live"]);
    }
}
