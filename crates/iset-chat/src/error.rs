//! Error types for sessions, timelines and submission.

use iset_core::error::RemoteError;
use iset_core::types::{SessionId, SessionKey, TurnStatus};

/// Errors from the conversation store and the submission pipeline.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ChatError {
    #[error("message cannot be empty")]
    EmptyMessage,
    #[error("message exceeds maximum length of {0} characters")]
    MessageTooLong(usize),
    #[error("a draft session already exists: {0}")]
    DraftExists(SessionKey),
    #[error("session not found: {0}")]
    SessionNotFound(SessionId),
    #[error("unknown session handle: {0}")]
    UnknownSession(SessionKey),
    #[error("unknown shortcut: {0}")]
    UnknownShortcut(String),
    #[error("turn {0} has no confirmed answer")]
    TurnNotConfirmed(u64),
    #[error(transparent)]
    Remote(#[from] RemoteError),
}

impl ChatError {
    /// Input rejected before anything was sent or stored.
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            ChatError::EmptyMessage | ChatError::MessageTooLong(_) | ChatError::UnknownShortcut(_)
        )
    }

    /// Wording for the notification raised alongside this error.
    pub fn user_message(&self) -> String {
        match self {
            ChatError::EmptyMessage => "Please type a message first".to_string(),
            ChatError::MessageTooLong(max) => {
                format!("Messages are limited to {max} characters")
            }
            ChatError::DraftExists(_) => "A new conversation is already open".to_string(),
            ChatError::SessionNotFound(id) => format!("Conversation {id} no longer exists"),
            ChatError::UnknownSession(_) => "This conversation is no longer open".to_string(),
            ChatError::UnknownShortcut(label) => format!("No shortcut named {label:?}"),
            ChatError::TurnNotConfirmed(_) => "Only answered messages can be rated".to_string(),
            ChatError::Remote(err) => err.user_message(),
        }
    }
}

/// Rejected timeline mutation.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TimelineError {
    #[error("no turn with sequence {0}")]
    UnknownSequence(u64),
    #[error("invalid turn transition from {from} to {to}")]
    InvalidTransition { from: TurnStatus, to: TurnStatus },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chat_error_display() {
        assert_eq!(ChatError::EmptyMessage.to_string(), "message cannot be empty");
        assert_eq!(
            ChatError::MessageTooLong(2000).to_string(),
            "message exceeds maximum length of 2000 characters"
        );
        assert_eq!(
            ChatError::SessionNotFound(SessionId(9)).to_string(),
            "session not found: 9"
        );
        assert_eq!(
            ChatError::Remote(RemoteError::Timeout).to_string(),
            "request timed out"
        );
    }

    #[test]
    fn test_validation_family() {
        assert!(ChatError::EmptyMessage.is_validation());
        assert!(ChatError::MessageTooLong(1).is_validation());
        assert!(ChatError::UnknownShortcut("Météo".into()).is_validation());
        assert!(!ChatError::DraftExists(SessionKey::new()).is_validation());
        assert!(!ChatError::Remote(RemoteError::Timeout).is_validation());
    }

    #[test]
    fn test_remote_user_message_passthrough() {
        let err: ChatError = RemoteError::Status {
            code: 500,
            message: "Traceback".into(),
        }
        .into();
        assert_eq!(err.user_message(), "The server encountered an error");
    }

    #[test]
    fn test_timeline_error_display() {
        let err = TimelineError::InvalidTransition {
            from: TurnStatus::Failed,
            to: TurnStatus::Confirmed,
        };
        assert_eq!(
            err.to_string(),
            "invalid turn transition from failed to confirmed"
        );
        assert_eq!(
            TimelineError::UnknownSequence(4).to_string(),
            "no turn with sequence 4"
        );
    }
}
