//! Shared vocabulary for the ISET assistant client core.
//!
//! Domain types, the error taxonomy, TOML configuration, the event bus and
//! the `ChatBackend` abstraction every other crate talks to.

pub mod config;
pub mod error;
pub mod events;
pub mod remote;
pub mod types;
pub mod wire;

pub use config::AssistantConfig;
pub use error::{IsetError, RemoteError, Result};
pub use events::{ConversationEvent, EventBus, Notification, NotificationLevel};
pub use remote::ChatBackend;
pub use types::*;
