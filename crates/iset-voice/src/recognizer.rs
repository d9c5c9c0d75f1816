//! Speech-recognition capability the controller drives.
//!
//! The recognizer only opens and closes the stream. Its output arrives as
//! `SpeechEvent`s, delivered to the controller directly or through
//! `VoiceCaptureController::run`.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, PoisonError};

/// Whether speech capture can be used right now.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Availability {
    Available,
    PermissionDenied,
    Unsupported,
}

/// Output of an open recognition stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SpeechEvent {
    /// Best transcript so far. Replaces any earlier interim text.
    Interim(String),
    /// The recognizer decided the speaker has finished.
    EndOfSpeech,
    /// The stream failed and is no longer usable.
    Error(String),
}

/// Continuous speech-to-text stream.
pub trait SpeechRecognizer: Send + Sync {
    fn availability(&self) -> Availability;

    /// Open a recognition stream for `language` (BCP 47, e.g. `fr-FR`).
    fn start(&self, language: &str) -> Result<(), String>;

    /// Close the stream. Closing an already closed stream is harmless.
    fn stop(&self);
}

// =============================================================================
// Scripted recognizer
// =============================================================================

/// Recognizer that opens no device. Counts streams so callers can check that
/// they never hold more than one.
#[derive(Debug)]
pub struct ScriptedRecognizer {
    availability: Mutex<Availability>,
    fail_start: Mutex<Option<String>>,
    open_streams: AtomicUsize,
    start_calls: AtomicUsize,
}

impl Default for ScriptedRecognizer {
    fn default() -> Self {
        Self::new()
    }
}

impl ScriptedRecognizer {
    pub fn new() -> Self {
        Self {
            availability: Mutex::new(Availability::Available),
            fail_start: Mutex::new(None),
            open_streams: AtomicUsize::new(0),
            start_calls: AtomicUsize::new(0),
        }
    }

    pub fn with_availability(availability: Availability) -> Self {
        let recognizer = Self::new();
        recognizer.set_availability(availability);
        recognizer
    }

    pub fn set_availability(&self, availability: Availability) {
        *self
            .availability
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = availability;
    }

    /// Make the next `start` fail with `reason`.
    pub fn fail_next_start(&self, reason: impl Into<String>) {
        *self
            .fail_start
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(reason.into());
    }

    pub fn open_streams(&self) -> usize {
        self.open_streams.load(Ordering::SeqCst)
    }

    pub fn start_calls(&self) -> usize {
        self.start_calls.load(Ordering::SeqCst)
    }
}

impl SpeechRecognizer for ScriptedRecognizer {
    fn availability(&self) -> Availability {
        *self
            .availability
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn start(&self, language: &str) -> Result<(), String> {
        self.start_calls.fetch_add(1, Ordering::SeqCst);
        let failure = self
            .fail_start
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(reason) = failure {
            return Err(reason);
        }
        self.open_streams.fetch_add(1, Ordering::SeqCst);
        tracing::debug!(language, "Scripted recognition stream opened");
        Ok(())
    }

    fn stop(&self) {
        let _ = self
            .open_streams
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1));
    }
}
