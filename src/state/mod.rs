// State management module
// Handles the session, its durable storage, and the application state reducer

pub mod app_state;
pub mod persistence;
pub mod session;

pub use app_state::{
    Action, ActiveConversation, AppState, Notification, NotificationLevel, PendingSend,
    SearchState, Ticket,
};
pub use persistence::{PersistenceError, SessionStore};
pub use session::{Session, SessionIdentity};
