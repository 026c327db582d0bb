//! REST backend access
//!
//! Request/response types and the [`ChatApi`] client trait.

pub mod client;
pub mod types;

pub use client::{ApiError, ChatApi, HttpChatApi};
pub use types::{CreateGroupRequest, SignInRequest, SignUpRequest};
