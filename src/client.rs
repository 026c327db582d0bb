//! Chat client controller
//!
//! [`ChatClient`] is the single writer of [`AppState`]. It runs every user
//! operation (sign-in, selection, sending, group management), owns the one
//! realtime channel of the authenticated area, and feeds channel events into
//! the state. Presentation code reads snapshots and never mutates state.

use crate::api::{ChatApi, HttpChatApi};
use crate::chat::{Conversation, UserSummary};
use crate::config::Config;
use crate::error::ClientError;
use crate::state::{
    Action, AppState, Notification, PendingSend, PersistenceError, Session, SessionStore,
    Ticket,
};
use crate::validation::{GroupForm, InputLimits, SignInForm, SignUpForm, ValidationError};
use crate::websocket::{
    ChannelConnector, ChannelEnvelope, ChannelError, ChannelEvent, ChannelId, ClientEvent,
    ConnectionState, OutgoingMessage, RealtimeChannel, ServerEvent, WebSocketConnector,
};
use chrono::Utc;
use std::sync::{Arc, Weak};
use tokio::sync::{mpsc, Mutex, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// The open channel together with the task pumping its events
struct ChannelSlot {
    channel: Arc<dyn RealtimeChannel>,
    pump: JoinHandle<()>,
}

struct Inner {
    api: Arc<dyn ChatApi>,
    connector: Arc<dyn ChannelConnector>,
    store: SessionStore,
    limits: InputLimits,
    state: Arc<RwLock<AppState>>,
    channel: Mutex<Option<ChannelSlot>>,
}

/// Handle to the chat client; clones share the same state and channel
#[derive(Clone)]
pub struct ChatClient {
    inner: Arc<Inner>,
}

impl ChatClient {
    /// Create a client from its collaborators
    pub fn new(
        api: Arc<dyn ChatApi>,
        connector: Arc<dyn ChannelConnector>,
        store: SessionStore,
        limits: InputLimits,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                api,
                connector,
                store,
                limits,
                state: Arc::new(RwLock::new(AppState::new())),
                channel: Mutex::new(None),
            }),
        }
    }

    /// Create a client talking HTTP and WebSocket as configured
    pub fn from_config(config: &Config) -> Self {
        let api = HttpChatApi::new(reqwest::Client::new(), config.api.base_url.clone());
        let connector = WebSocketConnector::from_config(&config.realtime);
        Self::new(
            Arc::new(api),
            Arc::new(connector),
            SessionStore::new(config.session_path()),
            config.limits,
        )
    }

    /// Shared state, for readers that hold a lock across several reads
    pub fn state(&self) -> Arc<RwLock<AppState>> {
        Arc::clone(&self.inner.state)
    }

    /// Copy of the current state
    pub async fn snapshot(&self) -> AppState {
        self.inner.state.read().await.clone()
    }

    /// Id of the signed-in user
    pub async fn current_user_id(&self) -> Option<String> {
        self.inner
            .state
            .read()
            .await
            .current_user_id()
            .map(str::to_string)
    }

    /// Id of the open realtime channel
    pub async fn channel_id(&self) -> Option<ChannelId> {
        self.inner.state.read().await.channel_id
    }

    /// Id of the selected conversation
    pub async fn active_conversation_id(&self) -> Option<String> {
        self.inner
            .state
            .read()
            .await
            .active_conversation_id()
            .map(str::to_string)
    }

    /// Remove and return the pending notifications
    pub async fn take_notifications(&self) -> Vec<Notification> {
        let mut state = self.inner.state.write().await;
        let notifications = state.notifications.clone();
        state.dispatch(Action::NotificationsCleared);
        notifications
    }

    async fn dispatch(&self, action: Action) {
        self.inner.state.write().await.dispatch(action);
    }

    /// Log an operation failure, surface it as a notification and return it
    async fn fail<T>(&self, operation: &'static str, err: ClientError) -> Result<T, ClientError> {
        error!(operation, category = ?err.category(), error = %err, "Operation failed");
        self.dispatch(Action::Notify(Notification::error(err.user_message())))
            .await;
        Err(err)
    }

    async fn authenticated(&self) -> Result<(String, Ticket), ClientError> {
        let state = self.inner.state.read().await;
        match &state.session {
            Some(session) => Ok((session.auth_token.clone(), state.ticket())),
            None => Err(ClientError::NotAuthenticated),
        }
    }

    async fn open_channel(&self) -> Option<Arc<dyn RealtimeChannel>> {
        self.inner
            .channel
            .lock()
            .await
            .as_ref()
            .map(|slot| Arc::clone(&slot.channel))
    }

    // ---- Session ----

    /// Restore a persisted session, if any
    ///
    /// Any open channel is closed first since it belongs to the previous
    /// session. An unreadable or unsupported session record is discarded and
    /// the client stays anonymous; the failure is still reported as a
    /// notification.
    pub async fn restore_session(&self) -> Result<Option<Session>, ClientError> {
        let loaded = self.inner.store.load();
        if !matches!(loaded, Err(PersistenceError::IoError(_))) {
            self.leave_authenticated_area().await;
        }

        match loaded {
            Ok(Some(session)) => {
                info!(user_id = %session.user_id, "Session restored");
                self.dispatch(Action::SessionStarted(session.clone())).await;
                Ok(Some(session))
            }
            Ok(None) => {
                debug!("No stored session");
                self.dispatch(Action::SessionEnded).await;
                Ok(None)
            }
            Err(e @ (PersistenceError::JsonError(_) | PersistenceError::InvalidData(_))) => {
                warn!(path = %self.inner.store.path().display(), error = %e, "Discarding unreadable session record");
                if let Err(clear) = self.inner.store.clear() {
                    warn!(error = %clear, "Failed to remove session record");
                }
                self.dispatch(Action::SessionEnded).await;
                self.dispatch(Action::Notify(Notification::error(
                    ClientError::from(e).user_message(),
                )))
                .await;
                Ok(None)
            }
            Err(e) => self.fail("restore_session", e.into()).await,
        }
    }

    /// Sign in, persisting the session on success
    ///
    /// Input is validated first; invalid input never reaches the backend.
    pub async fn sign_in(&self, form: &SignInForm) -> Result<Session, ClientError> {
        let request = match form.validate(&self.inner.limits) {
            Ok(request) => request,
            Err(e) => return self.fail("sign_in", e.into()).await,
        };

        let session = match self.inner.api.sign_in(&request).await {
            Ok(session) => session,
            Err(e) => return self.fail("sign_in", ClientError::from_auth_failure(e)).await,
        };

        if self.inner.state.read().await.is_authenticated() {
            self.leave_authenticated_area().await;
        }

        if let Err(e) = self.inner.store.save(&session) {
            return self.fail("sign_in", e.into()).await;
        }

        info!(user_id = %session.user_id, "Signed in");
        let mut state = self.inner.state.write().await;
        state.dispatch(Action::SessionStarted(session.clone()));
        state.dispatch(Action::Notify(Notification::success("Login Success.")));
        Ok(session)
    }

    /// Register a new account; the user signs in afterwards
    pub async fn sign_up(&self, form: &SignUpForm) -> Result<UserSummary, ClientError> {
        let request = match form.validate(&self.inner.limits) {
            Ok(request) => request,
            Err(e) => return self.fail("sign_up", e.into()).await,
        };

        match self.inner.api.sign_up(&request).await {
            Ok(user) => {
                info!(user_id = %user.id, "Account created");
                self.dispatch(Action::Notify(Notification::success(
                    "Account Successfully Created.",
                )))
                .await;
                Ok(user)
            }
            Err(e) => self.fail("sign_up", ClientError::from_auth_failure(e)).await,
        }
    }

    /// Sign out: close the channel, forget the stored session, reset state
    pub async fn sign_out(&self) -> Result<(), ClientError> {
        self.leave_authenticated_area().await;
        self.dispatch(Action::SessionEnded).await;
        info!("Signed out");

        if let Err(e) = self.inner.store.clear() {
            return self.fail("sign_out", e.into()).await;
        }
        Ok(())
    }

    // ---- Realtime channel ----

    /// Open the realtime channel for the session
    ///
    /// At most one channel exists; calling this again returns the open
    /// channel's id.
    pub async fn enter_authenticated_area(&self) -> Result<ChannelId, ClientError> {
        let mut slot = self.inner.channel.lock().await;
        if let Some(existing) = slot.as_ref() {
            return Ok(existing.channel.id());
        }

        let identity = self
            .inner
            .state
            .read()
            .await
            .session
            .as_ref()
            .map(Session::identity);
        let Some(identity) = identity else {
            return self
                .fail("enter_authenticated_area", ClientError::NotAuthenticated)
                .await;
        };

        let (events, mut receiver) = mpsc::unbounded_channel::<ChannelEnvelope>();
        let channel = match self.inner.connector.open(identity, events).await {
            Ok(channel) => channel,
            Err(e) => return self.fail("enter_authenticated_area", e.into()).await,
        };
        let channel_id = channel.id();
        self.dispatch(Action::ChannelOpened(channel_id)).await;

        let weak: Weak<Inner> = Arc::downgrade(&self.inner);
        let pump = tokio::spawn(async move {
            while let Some(envelope) = receiver.recv().await {
                let Some(inner) = weak.upgrade() else { break };
                ChatClient { inner }.process_event(envelope).await;
            }
            debug!(channel_id = %channel_id, "Channel event pump finished");
        });

        info!(channel_id = %channel_id, "Realtime channel opened");
        *slot = Some(ChannelSlot { channel, pump });
        Ok(channel_id)
    }

    /// Close the realtime channel; later events from it are ignored
    pub async fn leave_authenticated_area(&self) {
        let Some(slot) = self.inner.channel.lock().await.take() else {
            return;
        };
        let channel_id = slot.channel.id();

        self.dispatch(Action::ChannelClosed).await;
        slot.channel.close().await;
        slot.pump.abort();
        info!(channel_id = %channel_id, "Realtime channel closed");
    }

    /// Apply one event reported by a channel
    ///
    /// Events stamped with any id other than the open channel's are dropped.
    pub async fn process_event(&self, envelope: ChannelEnvelope) {
        let rejoin = {
            let mut state = self.inner.state.write().await;
            if state.channel_id != Some(envelope.channel_id) {
                debug!(channel_id = %envelope.channel_id, "Dropping event from inactive channel");
                return;
            }

            match envelope.event {
                ChannelEvent::State(connection) => {
                    let previous = state.connection;
                    match connection {
                        ConnectionState::Connected => {
                            if matches!(previous, ConnectionState::Reconnecting { .. }) {
                                info!(channel_id = %envelope.channel_id, "Realtime channel reconnected");
                            }
                        }
                        ConnectionState::Reconnecting { attempt } => {
                            warn!(channel_id = %envelope.channel_id, attempt, "Realtime channel disconnected");
                        }
                        ConnectionState::Stale => {
                            warn!(channel_id = %envelope.channel_id, "Realtime channel is stale");
                        }
                        _ => {}
                    }
                    state.dispatch(Action::ConnectionChanged(connection));
                    if connection == ConnectionState::Connected {
                        state.active_conversation_id().map(str::to_string)
                    } else {
                        None
                    }
                }
                ChannelEvent::Server(ServerEvent::Connection) => {
                    state.dispatch(Action::ServerAcknowledged);
                    None
                }
                ChannelEvent::Server(ServerEvent::NewMessage(message)) => {
                    state.dispatch(Action::MessageReceived(message));
                    None
                }
                ChannelEvent::Server(ServerEvent::Typing(notice)) => {
                    let own = match (notice.user_id.as_deref(), state.current_user_id()) {
                        (Some(sender), Some(me)) => sender == me,
                        _ => false,
                    };
                    if !own {
                        state.dispatch(Action::TypingStarted(notice.conversation_id));
                    }
                    None
                }
                ChannelEvent::Server(ServerEvent::StopTyping(notice)) => {
                    state.dispatch(Action::TypingStopped(notice.conversation_id));
                    None
                }
            }
        };

        if let Some(conversation_id) = rejoin {
            self.join(&conversation_id).await;
        }
    }

    /// Announce interest in a conversation's room
    ///
    /// A join that fails because the transport is down is repeated once the
    /// channel reconnects.
    async fn join(&self, conversation_id: &str) {
        let Some(channel) = self.open_channel().await else {
            debug!(conversation_id = %conversation_id, "No channel to join on");
            return;
        };
        match channel
            .emit(ClientEvent::JoinConversation(conversation_id.to_string()))
            .await
        {
            Ok(()) => debug!(conversation_id = %conversation_id, "Joined conversation"),
            Err(e) => debug!(conversation_id = %conversation_id, error = %e, "Join deferred"),
        }
    }

    // ---- Conversations ----

    /// Fetch the chat list
    pub async fn load_conversations(&self) -> Result<Vec<Conversation>, ClientError> {
        let (token, ticket) = match self.authenticated().await {
            Ok(parts) => parts,
            Err(e) => return self.fail("load_conversations", e).await,
        };

        let conversations = match self.inner.api.fetch_conversations(&token).await {
            Ok(conversations) => conversations,
            Err(e) => return self.fail("load_conversations", e.into()).await,
        };

        let mut state = self.inner.state.write().await;
        if state.is_current(&ticket) {
            state.dispatch(Action::ConversationsLoaded(conversations.clone()));
        } else {
            debug!("Dropping stale conversation list");
        }
        Ok(conversations)
    }

    /// Select a conversation from the chat list
    pub async fn select_conversation(&self, conversation_id: &str) -> Result<(), ClientError> {
        let conversation = self
            .inner
            .state
            .read()
            .await
            .conversation(conversation_id)
            .cloned();
        match conversation {
            Some(conversation) => self.open_conversation(conversation).await,
            None => {
                self.fail(
                    "select_conversation",
                    ClientError::ConversationNotFound(conversation_id.to_string()),
                )
                .await
            }
        }
    }

    /// Make `conversation` active, join its room and load its history
    ///
    /// A conversation that fails membership resolution is still selected;
    /// its error is kept in the active conversation and returned.
    async fn open_conversation(&self, conversation: Conversation) -> Result<(), ClientError> {
        let conversation_id = conversation.id.clone();
        let (token, ticket, integrity) = {
            let mut state = self.inner.state.write().await;
            let Some(token) = state.session.as_ref().map(|s| s.auth_token.clone()) else {
                drop(state);
                return self.fail("select_conversation", ClientError::NotAuthenticated).await;
            };
            state.dispatch(Action::ConversationSelected(conversation));
            let integrity = state.active.as_ref().and_then(|a| a.error().cloned());
            (token, state.selection_ticket(), integrity)
        };
        info!(conversation_id = %conversation_id, "Conversation selected");

        self.join(&conversation_id).await;

        match self.inner.api.fetch_messages(&token, &conversation_id).await {
            Ok(messages) => {
                let mut state = self.inner.state.write().await;
                if state.is_current(&ticket) {
                    state.dispatch(Action::HistoryLoaded {
                        conversation_id: conversation_id.clone(),
                        messages,
                    });
                } else {
                    debug!(conversation_id = %conversation_id, "Dropping stale history");
                }
            }
            Err(e) => {
                if self.inner.state.read().await.is_current(&ticket) {
                    return self.fail("select_conversation", e.into()).await;
                }
                debug!(conversation_id = %conversation_id, error = %e, "Ignoring stale history failure");
            }
        }

        match integrity {
            Some(e) => self.fail("select_conversation", e.into()).await,
            None => Ok(()),
        }
    }

    /// Apply a conversation returned by the backend and optionally select it
    async fn apply_conversation(
        &self,
        operation: &'static str,
        ticket: Ticket,
        conversation: Conversation,
        select: bool,
    ) -> Result<Conversation, ClientError> {
        {
            let mut state = self.inner.state.write().await;
            if !state.is_current(&ticket) {
                debug!(operation, conversation_id = %conversation.id, "Dropping stale conversation");
                return Ok(conversation);
            }
            state.dispatch(Action::ConversationUpserted(conversation.clone()));
        }
        if select {
            self.open_conversation(conversation.clone()).await?;
        }
        Ok(conversation)
    }

    // ---- Messaging ----

    /// Send a message to the active conversation
    ///
    /// The feed is not updated here. The backend persists the message and
    /// broadcasts it back to every member, the sender included; the echo
    /// appends it and clears the pending entry recorded in the outbox.
    /// While the channel is down the send is rejected with
    /// [`ChannelError::NotConnected`] and an error notification. If the
    /// transport drops before the echo arrives, the pending entry is turned
    /// into a "Message not delivered" notification.
    pub async fn send_message(&self, body: &str) -> Result<(), ClientError> {
        let body = body.trim();
        if body.is_empty() {
            return self
                .fail("send_message", ValidationError::Missing("message").into())
                .await;
        }

        let active = self.active_conversation_id().await;
        let Some(conversation_id) = active else {
            return self.fail("send_message", ClientError::NoActiveConversation).await;
        };

        let Some(channel) = self.open_channel().await else {
            return self.fail("send_message", ChannelError::NotConnected.into()).await;
        };

        let _ = channel
            .emit(ClientEvent::StopTyping(conversation_id.clone()))
            .await;
        let event = ClientEvent::SendMessage(OutgoingMessage {
            conversation_id: conversation_id.clone(),
            body: body.to_string(),
        });
        if let Err(e) = channel.emit(event).await {
            return self.fail("send_message", e.into()).await;
        }

        debug!(conversation_id = %conversation_id, "Message sent, awaiting echo");
        self.dispatch(Action::MessageQueued(PendingSend {
            conversation_id,
            body: body.to_string(),
            queued_at: Utc::now(),
        }))
        .await;
        Ok(())
    }

    /// Tell the active conversation the user is typing
    ///
    /// Typing notices are best effort: nothing is sent while disconnected.
    pub async fn start_typing(&self) -> Result<(), ClientError> {
        self.typing_notice(true).await
    }

    /// Tell the active conversation the user stopped typing
    pub async fn stop_typing(&self) -> Result<(), ClientError> {
        self.typing_notice(false).await
    }

    async fn typing_notice(&self, typing: bool) -> Result<(), ClientError> {
        let Some(conversation_id) = self.active_conversation_id().await else {
            return Err(ClientError::NoActiveConversation);
        };
        let Some(channel) = self.open_channel().await else {
            return Ok(());
        };
        let event = if typing {
            ClientEvent::Typing(conversation_id.clone())
        } else {
            ClientEvent::StopTyping(conversation_id.clone())
        };
        if let Err(e) = channel.emit(event).await {
            debug!(conversation_id = %conversation_id, error = %e, "Typing notice not sent");
        }
        Ok(())
    }

    // ---- Users and groups ----

    /// Search users by name or email
    pub async fn search_users(&self, term: &str) -> Result<Vec<UserSummary>, ClientError> {
        let term = term.trim();
        if term.is_empty() {
            return self
                .fail("search_users", ValidationError::Missing("search term").into())
                .await;
        }
        let (token, ticket) = match self.authenticated().await {
            Ok(parts) => parts,
            Err(e) => return self.fail("search_users", e).await,
        };

        self.dispatch(Action::SearchStarted).await;
        match self.inner.api.search_users(&token, term).await {
            Ok(users) => {
                let mut state = self.inner.state.write().await;
                if state.is_current(&ticket) {
                    state.dispatch(Action::SearchCompleted(users.clone()));
                }
                Ok(users)
            }
            Err(e) => {
                self.dispatch(Action::SearchFailed).await;
                self.fail("search_users", e.into()).await
            }
        }
    }

    /// Open (or create) the direct conversation with a user and select it
    pub async fn access_chat(&self, user_id: &str) -> Result<Conversation, ClientError> {
        let (token, ticket) = match self.authenticated().await {
            Ok(parts) => parts,
            Err(e) => return self.fail("access_chat", e).await,
        };
        match self.inner.api.access_conversation(&token, user_id).await {
            Ok(conversation) => {
                self.apply_conversation("access_chat", ticket, conversation, true)
                    .await
            }
            Err(e) => self.fail("access_chat", e.into()).await,
        }
    }

    /// Create a group conversation and select it
    pub async fn create_group(&self, form: &GroupForm) -> Result<Conversation, ClientError> {
        let request = match form.validate(&self.inner.limits) {
            Ok(request) => request,
            Err(e) => return self.fail("create_group", e.into()).await,
        };
        let (token, ticket) = match self.authenticated().await {
            Ok(parts) => parts,
            Err(e) => return self.fail("create_group", e).await,
        };

        match self.inner.api.create_group(&token, &request).await {
            Ok(conversation) => {
                info!(conversation_id = %conversation.id, "Group created");
                self.dispatch(Action::Notify(Notification::success("New Group Chat Created!")))
                    .await;
                self.apply_conversation("create_group", ticket, conversation, true)
                    .await
            }
            Err(e) => self.fail("create_group", e.into()).await,
        }
    }

    /// Rename a group conversation
    pub async fn rename_group(
        &self,
        conversation_id: &str,
        name: &str,
    ) -> Result<Conversation, ClientError> {
        let name = name.trim();
        if name.is_empty() {
            return self
                .fail("rename_group", ValidationError::Missing("group name").into())
                .await;
        }
        if name.chars().count() > self.inner.limits.max_name_len {
            return self
                .fail(
                    "rename_group",
                    ValidationError::InputTooLong { field: "group name" }.into(),
                )
                .await;
        }
        let (token, ticket) = match self.authenticated().await {
            Ok(parts) => parts,
            Err(e) => return self.fail("rename_group", e).await,
        };

        match self
            .inner
            .api
            .rename_group(&token, conversation_id, name)
            .await
        {
            Ok(conversation) => {
                self.apply_conversation("rename_group", ticket, conversation, false)
                    .await
            }
            Err(e) => self.fail("rename_group", e.into()).await,
        }
    }

    /// Add a member to a group conversation
    pub async fn add_to_group(
        &self,
        conversation_id: &str,
        user_id: &str,
    ) -> Result<Conversation, ClientError> {
        let (token, ticket) = match self.authenticated().await {
            Ok(parts) => parts,
            Err(e) => return self.fail("add_to_group", e).await,
        };
        match self
            .inner
            .api
            .add_to_group(&token, conversation_id, user_id)
            .await
        {
            Ok(conversation) => {
                self.apply_conversation("add_to_group", ticket, conversation, false)
                    .await
            }
            Err(e) => self.fail("add_to_group", e.into()).await,
        }
    }

    /// Remove a member from a group conversation
    pub async fn remove_from_group(
        &self,
        conversation_id: &str,
        user_id: &str,
    ) -> Result<Conversation, ClientError> {
        let (token, ticket) = match self.authenticated().await {
            Ok(parts) => parts,
            Err(e) => return self.fail("remove_from_group", e).await,
        };
        match self
            .inner
            .api
            .remove_from_group(&token, conversation_id, user_id)
            .await
        {
            Ok(conversation) => {
                self.apply_conversation("remove_from_group", ticket, conversation, false)
                    .await
            }
            Err(e) => self.fail("remove_from_group", e.into()).await,
        }
    }
}
