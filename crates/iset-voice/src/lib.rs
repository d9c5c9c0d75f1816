//! Voice input for the ISET assistant.
//!
//! `VoiceCaptureController` wraps a `SpeechRecognizer` stream in an explicit
//! phase machine and hands finalized transcripts to the same submission
//! pipeline typed text uses.

pub mod controller;
pub mod error;
pub mod recognizer;

pub use controller::{StartOutcome, StopOutcome, StopTrigger, VoiceCaptureController};
pub use error::VoiceError;
pub use recognizer::{Availability, ScriptedRecognizer, SpeechEvent, SpeechRecognizer};
