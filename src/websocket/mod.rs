//! Realtime channel
//!
//! The wire protocol, the channel abstraction the controller talks to, and
//! the WebSocket client that implements it with reconnect-with-backoff.

pub mod backoff;
pub mod channel;
pub mod connection;
pub mod protocol;

pub use backoff::ReconnectPolicy;
pub use channel::{
    ChannelConnector, ChannelEnvelope, ChannelError, ChannelEvent, ChannelId, ConnectionState,
    EventSink, RealtimeChannel,
};
pub use connection::{normalize_endpoint, WebSocketChannel, WebSocketConnector};
pub use protocol::{ClientEvent, OutgoingMessage, ServerEvent, TypingNotice};
