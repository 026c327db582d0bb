//! Chat Client
//!
//! Headless core of a realtime chat client: session handling, the backend
//! API client, the realtime channel with reconnects, and the state a
//! presentation layer renders from.

pub mod api;
pub mod chat;
pub mod client;
pub mod config;
pub mod error;
pub mod state;
pub mod validation;
pub mod websocket;

pub use client::ChatClient;
pub use config::Config;
pub use error::{ClientError, ErrorCategory};
pub use state::{Action, AppState, Notification, NotificationLevel};
