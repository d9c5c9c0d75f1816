//! The remote collaborator every component talks to.

use async_trait::async_trait;

use crate::error::RemoteError;
use crate::types::SessionId;
use crate::wire::{
    ChatReply, ChatRequest, IntegrateReply, IntegrateRequest, LearningStatus, RateRequest,
    WireCandidate, WireSession,
};

/// Assistant backend operations the client core depends on.
///
/// Implementations own transport concerns, timeouts included. Every failure
/// comes back as a `RemoteError`; callers never retry on their own.
#[async_trait]
pub trait ChatBackend: Send + Sync {
    /// Every stored session with its messages.
    async fn list_sessions(&self) -> Result<Vec<WireSession>, RemoteError>;

    /// Allocate an empty session server-side.
    async fn new_chat(&self) -> Result<SessionId, RemoteError>;

    /// Delete a session. `Ok` means the server confirmed it.
    async fn delete_chat(&self, id: SessionId) -> Result<(), RemoteError>;

    /// Submit one user message and get the bot's entry back.
    async fn send_chat(&self, request: &ChatRequest) -> Result<ChatReply, RemoteError>;

    /// Record a thumbs-up/down on an answered question.
    async fn rate(&self, request: &RateRequest) -> Result<(), RemoteError>;

    /// Self-learning counters.
    async fn learning_status(&self) -> Result<LearningStatus, RemoteError>;

    /// Well-rated questions proposed for the knowledge base.
    async fn candidates(&self) -> Result<Vec<WireCandidate>, RemoteError>;

    /// Add reviewed questions to the knowledge base.
    async fn integrate(&self, request: &IntegrateRequest) -> Result<IntegrateReply, RemoteError>;
}
