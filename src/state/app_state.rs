// Application state management
// Session, channel status, chat list, active conversation and notifications

use super::session::Session;
use crate::chat::{
    AppendOutcome, Conversation, ConversationId, IntegrityError, Membership, Message,
    MessageFeed, UserSummary,
};
use crate::websocket::{ChannelId, ConnectionState};
use chrono::{DateTime, Utc};
use std::collections::{HashMap, HashSet};
use tracing::{debug, warn};

/// Severity of a user-visible notification
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationLevel {
    /// Something completed
    Success,
    /// Neutral information
    Info,
    /// Something failed
    Error,
}

/// A transient message for the user (a toast)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    /// Severity
    pub level: NotificationLevel,
    /// Text shown to the user
    pub message: String,
}

impl Notification {
    /// Success notification
    pub fn success(message: impl Into<String>) -> Self {
        Self {
            level: NotificationLevel::Success,
            message: message.into(),
        }
    }

    /// Informational notification
    pub fn info(message: impl Into<String>) -> Self {
        Self {
            level: NotificationLevel::Info,
            message: message.into(),
        }
    }

    /// Error notification
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            level: NotificationLevel::Error,
            message: message.into(),
        }
    }
}

/// A message emitted on the channel that has not been echoed back yet
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingSend {
    /// Target conversation
    pub conversation_id: ConversationId,
    /// Text that was sent
    pub body: String,
    /// When the send was emitted
    pub queued_at: DateTime<Utc>,
}

/// Result of the last user search
#[derive(Debug, Clone, Default)]
pub struct SearchState {
    /// A search request is in flight
    pub in_progress: bool,
    /// Users returned by the last completed search
    pub results: Vec<UserSummary>,
}

/// The selected conversation with its resolved membership and feed
#[derive(Debug, Clone)]
pub struct ActiveConversation {
    /// The conversation as last received from the backend
    pub conversation: Conversation,
    /// Resolved membership, or the integrity error that prevented it
    pub membership: Result<Membership, IntegrityError>,
    /// Messages shown for this conversation
    pub feed: MessageFeed,
}

impl ActiveConversation {
    fn new(conversation: Conversation, current_user_id: &str) -> Self {
        let membership = conversation.membership(current_user_id);
        if let Err(e) = &membership {
            warn!(conversation_id = %conversation.id, error = %e, "Conversation failed membership resolution");
        }
        Self {
            feed: MessageFeed::new(conversation.id.clone()),
            membership,
            conversation,
        }
    }

    /// Id of the conversation
    pub fn id(&self) -> &str {
        &self.conversation.id
    }

    /// Integrity error to show instead of the header, if any
    pub fn error(&self) -> Option<&IntegrityError> {
        self.membership.as_ref().err()
    }
}

/// Snapshot of the epoch and selection at the start of a request
///
/// A response is applied only while its ticket is still current.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ticket {
    epoch: u64,
    selection: Option<u64>,
}

/// State mutations; [`AppState::dispatch`] is the only writer
#[derive(Debug, Clone)]
pub enum Action {
    /// A session was created or restored
    SessionStarted(Session),
    /// The user signed out
    SessionEnded,
    /// A realtime channel was opened for the session
    ChannelOpened(ChannelId),
    /// The realtime channel was closed (leaving the authenticated area)
    ChannelClosed,
    /// The channel reported a transport state change
    ConnectionChanged(ConnectionState),
    /// The backend acknowledged the `setup` handshake
    ServerAcknowledged,
    /// The chat list was fetched
    ConversationsLoaded(Vec<Conversation>),
    /// A conversation was created or changed
    ConversationUpserted(Conversation),
    /// The user selected a conversation
    ConversationSelected(Conversation),
    /// History for a conversation arrived
    HistoryLoaded {
        /// Conversation the history belongs to
        conversation_id: ConversationId,
        /// Messages in backend order
        messages: Vec<Message>,
    },
    /// A message arrived on the channel
    MessageReceived(Message),
    /// Someone started typing in a conversation
    TypingStarted(ConversationId),
    /// Someone stopped typing in a conversation
    TypingStopped(ConversationId),
    /// A message was emitted and awaits its echo
    MessageQueued(PendingSend),
    /// A user search started
    SearchStarted,
    /// A user search completed
    SearchCompleted(Vec<UserSummary>),
    /// A user search failed
    SearchFailed,
    /// Show a notification
    Notify(Notification),
    /// Drop all shown notifications
    NotificationsCleared,
}

/// Main application state
/// Holds everything the presentation layer renders
#[derive(Debug, Clone)]
pub struct AppState {
    /// Signed-in session, if any
    pub session: Option<Session>,
    /// Id of the open realtime channel, if any
    pub channel_id: Option<ChannelId>,
    /// Last transport state reported by the channel
    pub connection: ConnectionState,
    /// Whether the backend acknowledged `setup` on the current connection
    pub server_acknowledged: bool,
    /// Chat list, most recently active first
    pub conversations: Vec<Conversation>,
    /// The selected conversation
    pub active: Option<ActiveConversation>,
    /// Unread message counts for conversations other than the active one
    pub unread: HashMap<ConversationId, usize>,
    /// Conversations where someone is typing
    pub typing: HashSet<ConversationId>,
    /// Sends waiting for their echo
    pub outbox: Vec<PendingSend>,
    /// User search state
    pub search: SearchState,
    /// Notifications not yet dismissed
    pub notifications: Vec<Notification>,
    epoch: u64,
    selection: u64,
}

impl Default for AppState {
    fn default() -> Self {
        Self {
            session: None,
            channel_id: None,
            connection: ConnectionState::Closed,
            server_acknowledged: false,
            conversations: Vec::new(),
            active: None,
            unread: HashMap::new(),
            typing: HashSet::new(),
            outbox: Vec::new(),
            search: SearchState::default(),
            notifications: Vec::new(),
            epoch: 0,
            selection: 0,
        }
    }
}

impl AppState {
    /// Create a new application state with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Id of the signed-in user
    pub fn current_user_id(&self) -> Option<&str> {
        self.session.as_ref().map(|s| s.user_id.as_str())
    }

    /// Whether a session exists
    pub fn is_authenticated(&self) -> bool {
        self.session.is_some()
    }

    /// Whether live data can be shown: a channel is open and connected
    pub fn is_ready(&self) -> bool {
        self.channel_id.is_some() && self.connection == ConnectionState::Connected
    }

    /// Whether the channel gave up reconnecting
    pub fn is_stale(&self) -> bool {
        self.channel_id.is_some() && self.connection == ConnectionState::Stale
    }

    /// Id of the selected conversation
    pub fn active_conversation_id(&self) -> Option<&str> {
        self.active.as_ref().map(|a| a.id())
    }

    /// Messages of the selected conversation
    pub fn feed(&self) -> &[Message] {
        self.active
            .as_ref()
            .map(|a| a.feed.messages())
            .unwrap_or(&[])
    }

    /// Find a conversation in the chat list
    pub fn conversation(&self, id: &str) -> Option<&Conversation> {
        self.conversations.iter().find(|c| c.id == id)
    }

    /// Unread count for a conversation
    pub fn unread_count(&self, conversation_id: &str) -> usize {
        self.unread.get(conversation_id).copied().unwrap_or(0)
    }

    /// Whether someone is typing in a conversation
    pub fn is_typing(&self, conversation_id: &str) -> bool {
        self.typing.contains(conversation_id)
    }

    /// Whether to offer group management for the selected conversation
    pub fn can_manage_group(&self) -> bool {
        match (self.current_user_id(), &self.active) {
            (Some(user_id), Some(active)) => active.conversation.is_admin(user_id),
            _ => false,
        }
    }

    /// Ticket for a request tied to the current session epoch
    pub fn ticket(&self) -> Ticket {
        Ticket {
            epoch: self.epoch,
            selection: None,
        }
    }

    /// Ticket for a request tied to the current conversation selection
    pub fn selection_ticket(&self) -> Ticket {
        Ticket {
            epoch: self.epoch,
            selection: Some(self.selection),
        }
    }

    /// Whether a response carrying this ticket may still be applied
    pub fn is_current(&self, ticket: &Ticket) -> bool {
        ticket.epoch == self.epoch && ticket.selection.map_or(true, |s| s == self.selection)
    }

    /// Apply an action
    pub fn dispatch(&mut self, action: Action) {
        match action {
            Action::SessionStarted(session) => {
                self.reset_session_data();
                self.session = Some(session);
            }
            Action::SessionEnded => {
                self.reset_session_data();
                self.session = None;
            }
            Action::ChannelOpened(channel_id) => {
                if self.session.is_none() {
                    warn!(channel_id = %channel_id, "Ignoring channel without a session");
                    return;
                }
                self.epoch += 1;
                self.channel_id = Some(channel_id);
                self.connection = ConnectionState::Connecting;
                self.server_acknowledged = false;
            }
            Action::ChannelClosed => {
                self.epoch += 1;
                self.selection += 1;
                self.channel_id = None;
                self.connection = ConnectionState::Closed;
                self.server_acknowledged = false;
                self.active = None;
                self.typing.clear();
                self.outbox.clear();
            }
            Action::ConnectionChanged(state) => self.connection_changed(state),
            Action::ServerAcknowledged => self.server_acknowledged = true,
            Action::ConversationsLoaded(conversations) => {
                let mut seen = HashSet::new();
                self.conversations = conversations
                    .into_iter()
                    .filter(|c| seen.insert(c.id.clone()))
                    .collect();
            }
            Action::ConversationUpserted(conversation) => self.upsert(conversation),
            Action::ConversationSelected(conversation) => self.select(conversation),
            Action::HistoryLoaded {
                conversation_id,
                messages,
            } => match &mut self.active {
                Some(active) if active.id() == conversation_id => {
                    active.feed.load_history(messages);
                }
                _ => debug!(conversation_id = %conversation_id, "Dropping history for inactive conversation"),
            },
            Action::MessageReceived(message) => self.receive(message),
            Action::TypingStarted(conversation_id) => {
                self.typing.insert(conversation_id);
            }
            Action::TypingStopped(conversation_id) => {
                self.typing.remove(&conversation_id);
            }
            Action::MessageQueued(pending) => self.outbox.push(pending),
            Action::SearchStarted => self.search.in_progress = true,
            Action::SearchCompleted(results) => {
                self.search = SearchState {
                    in_progress: false,
                    results,
                };
            }
            Action::SearchFailed => {
                self.search = SearchState::default();
            }
            Action::Notify(notification) => self.notifications.push(notification),
            Action::NotificationsCleared => self.notifications.clear(),
        }
    }

    fn reset_session_data(&mut self) {
        let notifications = std::mem::take(&mut self.notifications);
        let epoch = self.epoch + 1;
        let selection = self.selection + 1;
        *self = AppState {
            notifications,
            epoch,
            selection,
            ..AppState::default()
        };
    }

    fn connection_changed(&mut self, state: ConnectionState) {
        if self.connection == ConnectionState::Connected && state != ConnectionState::Connected {
            self.server_acknowledged = false;
        }
        // Frames queued on a dropped transport are lost; the backend never echoes them
        if matches!(
            state,
            ConnectionState::Reconnecting { .. } | ConnectionState::Stale
        ) {
            for pending in self.outbox.drain(..) {
                warn!(conversation_id = %pending.conversation_id, "Pending message not delivered");
                self.notifications.push(Notification::error(format!(
                    "Message not delivered: {}",
                    pending.body
                )));
            }
        }
        if state == ConnectionState::Stale && self.connection != ConnectionState::Stale {
            self.notifications.push(Notification::error(
                "Connection to the chat server was lost. Reload to reconnect.",
            ));
        }
        self.connection = state;
    }

    fn upsert(&mut self, conversation: Conversation) {
        if let (Some(active), Some(user_id)) = (&mut self.active, self.session.as_ref()) {
            if active.conversation.id == conversation.id {
                let feed = std::mem::replace(&mut active.feed, MessageFeed::new(String::new()));
                *active = ActiveConversation::new(conversation.clone(), &user_id.user_id);
                active.feed = feed;
            }
        }

        match self.conversations.iter().position(|c| c.id == conversation.id) {
            Some(index) => self.conversations[index] = conversation,
            None => self.conversations.insert(0, conversation),
        }
    }

    fn select(&mut self, conversation: Conversation) {
        self.selection += 1;
        self.unread.remove(&conversation.id);

        if self.conversation(&conversation.id).is_none() {
            self.conversations.insert(0, conversation.clone());
        }

        let user_id = self.current_user_id().unwrap_or_default().to_string();
        self.active = Some(ActiveConversation::new(conversation, &user_id));
    }

    fn receive(&mut self, message: Message) {
        let conversation_id = message.conversation_id.clone();
        self.typing.remove(&conversation_id);

        let own = self
            .current_user_id()
            .map(|id| message.is_from(id))
            .unwrap_or(false);
        if own {
            if let Some(index) = self
                .outbox
                .iter()
                .position(|p| p.conversation_id == conversation_id && p.body == message.body)
            {
                self.outbox.remove(index);
            }
        }

        if let Some(index) = self
            .conversations
            .iter()
            .position(|c| c.id == conversation_id)
        {
            let conversation = self.conversations.remove(index);
            self.conversations.insert(0, conversation);
        }

        match &mut self.active {
            Some(active) if active.id() == conversation_id => {
                if !active.conversation.has_participant(message.sender_id()) {
                    warn!(
                        conversation_id = %conversation_id,
                        sender_id = %message.sender_id(),
                        "Message sender is not a participant"
                    );
                }
                if active.feed.append(message) == AppendOutcome::Appended {
                    debug!(conversation_id = %conversation_id, "Message appended to feed");
                }
            }
            _ => {
                if !own {
                    *self.unread.entry(conversation_id).or_insert(0) += 1;
                }
            }
        }
    }
}
