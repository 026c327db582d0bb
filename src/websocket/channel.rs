//! Realtime channel abstraction
//!
//! A channel is one live transport owned by one session. Every event it
//! reports is wrapped in a [`ChannelEnvelope`] stamped with the channel id so
//! the controller can drop events from a channel it already tore down.

use super::protocol::{ClientEvent, ServerEvent};
use crate::state::SessionIdentity;
use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::mpsc;
use uuid::Uuid;

/// Identifier of one opened channel
pub type ChannelId = Uuid;

/// Transport state as observed by the channel
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// First connection attempt in progress
    Connecting,
    /// Transport is up and the identity has been announced
    Connected,
    /// Transport was lost; waiting before the given attempt
    Reconnecting {
        /// One-based attempt number
        attempt: u32,
    },
    /// Reconnect attempts are exhausted
    Stale,
    /// The channel was closed by the client
    Closed,
}

/// Something a channel reports to its owner
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelEvent {
    /// The transport state changed
    State(ConnectionState),
    /// The backend sent an event
    Server(ServerEvent),
}

/// A channel event stamped with the channel that produced it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelEnvelope {
    /// Channel that produced the event
    pub channel_id: ChannelId,
    /// The event itself
    pub event: ChannelEvent,
}

/// Sender half handed to a connector for reporting events
pub type EventSink = mpsc::UnboundedSender<ChannelEnvelope>;

/// Errors from the realtime channel
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ChannelError {
    /// The endpoint URL is not usable
    #[error("Invalid realtime endpoint: {0}")]
    InvalidEndpoint(String),

    /// The transport is down; the event was not sent
    #[error("Not connected to the chat server. Message not sent.")]
    NotConnected,

    /// The channel has been closed
    #[error("Realtime channel is closed")]
    Closed,
}

/// A live bidirectional event channel
#[async_trait]
pub trait RealtimeChannel: Send + Sync {
    /// Id stamped on every event from this channel
    fn id(&self) -> ChannelId;

    /// Whether the transport is currently up
    fn is_connected(&self) -> bool;

    /// Emit an event, failing fast when the transport is down
    async fn emit(&self, event: ClientEvent) -> Result<(), ChannelError>;

    /// Close the channel; no further events are reported afterwards
    async fn close(&self);
}

/// Opens channels for a session
#[async_trait]
pub trait ChannelConnector: Send + Sync {
    /// Open a channel announcing `identity`, reporting events into `events`
    ///
    /// Returns as soon as the channel exists; readiness is reported later
    /// through a [`ConnectionState::Connected`] event.
    async fn open(
        &self,
        identity: SessionIdentity,
        events: EventSink,
    ) -> Result<Arc<dyn RealtimeChannel>, ChannelError>;
}
