//! Error types for voice capture.

use iset_chat::ChatError;
use iset_core::types::VoicePhase;

/// Errors from the voice capture controller.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum VoiceError {
    #[error("microphone permission denied")]
    PermissionDenied,
    #[error("speech recognition is not available")]
    Unsupported,
    #[error("invalid voice transition: {from} -> {to}")]
    InvalidTransition { from: VoicePhase, to: VoicePhase },
    #[error("recognizer error: {0}")]
    Recognizer(String),
    #[error("transcript rejected: {0}")]
    Submission(#[from] ChatError),
}

impl VoiceError {
    /// Wording for the notification raised alongside this error.
    pub fn user_message(&self) -> String {
        match self {
            VoiceError::PermissionDenied => "Microphone access was denied".to_string(),
            VoiceError::Unsupported => {
                "Speech recognition is not supported on this device".to_string()
            }
            VoiceError::InvalidTransition { .. } => "Voice input is busy".to_string(),
            VoiceError::Recognizer(reason) => format!("Speech recognition failed: {reason}"),
            VoiceError::Submission(err) => err.user_message(),
        }
    }
}
