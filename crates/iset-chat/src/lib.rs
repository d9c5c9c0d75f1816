//! Conversation sessions for the ISET assistant.
//!
//! `SessionStore` owns every session and its `TurnTimeline`.
//! `SubmissionPipeline` is the single entry point for typed text, shortcuts
//! and voice transcripts; it appends optimistically and reconciles against
//! the backend's reply.

pub mod error;
pub mod feedback;
pub mod pipeline;
pub mod store;
pub mod timeline;

pub use error::{ChatError, TimelineError};
pub use pipeline::{SubmissionPipeline, CANCELLED};
pub use store::{parse_share_link, Session, SessionStore, SessionSummary};
pub use timeline::TurnTimeline;
