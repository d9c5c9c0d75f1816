use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use crate::types::{SessionId, SessionKey, Timestamp, TurnStatus, VoicePhase};

/// Severity of a user-facing notification.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationLevel {
    Info,
    Success,
    Warning,
    Error,
}

/// A toast-style message for the user. Presentation is up to the UI.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    pub level: NotificationLevel,
    pub message: String,
    pub timestamp: Timestamp,
}

/// Every state change the UI may want to render.
///
/// Emitted by the store, the pipeline, the voice controller and the review
/// workflow after the change has been applied.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[non_exhaustive]
pub enum ConversationEvent {
    /// An optimistic turn was appended.
    TurnAppended { session: SessionKey, sequence: u64 },

    /// A pending turn was confirmed by the server.
    TurnConfirmed { session: SessionKey, sequence: u64 },

    /// A pending turn failed.
    TurnFailed {
        session: SessionKey,
        sequence: u64,
        reason: String,
    },

    /// A draft session received its server id.
    SessionCommitted { session: SessionKey, id: SessionId },

    /// A session was removed after the server confirmed the delete.
    SessionDeleted { session: SessionKey, id: SessionId },

    /// The active session changed. `None` clears the selection.
    SessionSelected { session: Option<SessionKey> },

    /// The voice controller changed phase.
    VoicePhaseChanged { from: VoicePhase, to: VoicePhase },

    /// A user-facing notification.
    Notice(Notification),
}

impl ConversationEvent {
    /// Returns a short name for this event type, suitable for logging.
    pub fn event_name(&self) -> &'static str {
        match self {
            ConversationEvent::TurnAppended { .. } => "turn_appended",
            ConversationEvent::TurnConfirmed { .. } => "turn_confirmed",
            ConversationEvent::TurnFailed { .. } => "turn_failed",
            ConversationEvent::SessionCommitted { .. } => "session_committed",
            ConversationEvent::SessionDeleted { .. } => "session_deleted",
            ConversationEvent::SessionSelected { .. } => "session_selected",
            ConversationEvent::VoicePhaseChanged { .. } => "voice_phase_changed",
            ConversationEvent::Notice(_) => "notice",
        }
    }

    /// The turn status this event moved a turn into, if any.
    pub fn turn_status(&self) -> Option<TurnStatus> {
        match self {
            ConversationEvent::TurnAppended { .. } => Some(TurnStatus::Pending),
            ConversationEvent::TurnConfirmed { .. } => Some(TurnStatus::Confirmed),
            ConversationEvent::TurnFailed { .. } => Some(TurnStatus::Failed),
            _ => None,
        }
    }
}

/// Fan-out channel for `ConversationEvent`s.
///
/// Cloning shares the same channel. Publishing with no subscribers is fine;
/// the event is dropped.
#[derive(Clone, Debug)]
pub struct EventBus {
    tx: broadcast::Sender<ConversationEvent>,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(256)
    }
}

impl EventBus {
    /// Create a bus that buffers up to `capacity` events per lagging subscriber.
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ConversationEvent> {
        self.tx.subscribe()
    }

    pub fn publish(&self, event: ConversationEvent) {
        tracing::trace!(event = event.event_name(), "Publishing event");
        let _ = self.tx.send(event);
    }

    /// Publish a notification and mirror it to the log.
    pub fn notify(&self, level: NotificationLevel, message: impl Into<String>) {
        let message = message.into();
        match level {
            NotificationLevel::Error => tracing::warn!(%message, "User notified of error"),
            NotificationLevel::Warning => tracing::info!(%message, "User warned"),
            NotificationLevel::Info | NotificationLevel::Success => {
                tracing::debug!(%message, ?level, "User notified")
            }
        }
        self.publish(ConversationEvent::Notice(Notification {
            level,
            message,
            timestamp: Timestamp::now(),
        }));
    }

    pub fn info(&self, message: impl Into<String>) {
        self.notify(NotificationLevel::Info, message);
    }

    pub fn success(&self, message: impl Into<String>) {
        self.notify(NotificationLevel::Success, message);
    }

    pub fn warning(&self, message: impl Into<String>) {
        self.notify(NotificationLevel::Warning, message);
    }

    pub fn error(&self, message: impl Into<String>) {
        self.notify(NotificationLevel::Error, message);
    }
}
