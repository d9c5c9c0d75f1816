//! The one path from user input to a confirmed or failed turn.
//!
//! Typed text, shortcut chips, suggestion chips and voice transcripts all go
//! through `SubmissionPipeline::submit`. Validation, session targeting and the
//! optimistic append happen when `submit` is called; the returned future only
//! covers the round-trip and reconciliation. Call order is therefore display
//! order, however the futures are scheduled.

use std::future::Future;

use iset_core::types::{BotReply, InputSource, SessionKey, Suggestion, Turn};
use iset_core::wire::ChatRequest;

use crate::error::ChatError;
use crate::store::{Claim, SessionStore};

/// Failure reason of a turn whose submission was dropped mid-flight.
pub const CANCELLED: &str = "cancelled";

/// A turn that has been appended and is waiting to be sent.
#[derive(Debug)]
struct Prepared {
    session: SessionKey,
    turn: Turn,
}

#[derive(Clone)]
pub struct SubmissionPipeline {
    store: SessionStore,
}

impl SubmissionPipeline {
    pub fn new(store: SessionStore) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &SessionStore {
        &self.store
    }

    /// Submit a message from any source.
    ///
    /// Resolves to `Err` only when the input is rejected up front, in which
    /// case nothing was appended. Otherwise resolves to the turn in its final
    /// state, `Confirmed` or `Failed`.
    pub fn submit(
        &self,
        text: impl Into<String>,
        source: InputSource,
    ) -> impl Future<Output = Result<Turn, ChatError>> + Send + 'static {
        let prepared = self.prepare(text.into(), source);
        let this = self.clone();
        async move {
            let prepared = prepared?;
            Ok(this.dispatch(prepared).await)
        }
    }

    /// Submit a configured quick action by its label.
    pub fn submit_shortcut(
        &self,
        label: &str,
    ) -> impl Future<Output = Result<Turn, ChatError>> + Send + 'static {
        let submission = match self.shortcut_text(label) {
            Some(text) => Ok(self.submit(text, InputSource::Shortcut)),
            None => {
                let err = ChatError::UnknownShortcut(label.to_string());
                self.store.events().warning(err.user_message());
                Err(err)
            }
        };
        async move { submission?.await }
    }

    /// Submit a follow-up chip offered with a reply.
    pub fn submit_suggestion(
        &self,
        suggestion: &Suggestion,
    ) -> impl Future<Output = Result<Turn, ChatError>> + Send + 'static {
        self.submit(suggestion.text.clone(), InputSource::Shortcut)
    }

    /// Configured quick actions, in display order.
    pub fn shortcuts(&self) -> &[Suggestion] {
        &self.store.config().shortcuts
    }

    fn shortcut_text(&self, label: &str) -> Option<String> {
        let label = label.trim();
        self.shortcuts()
            .iter()
            .find(|s| s.label.eq_ignore_ascii_case(label) || s.text == label)
            .map(|s| s.text.clone())
    }

    fn prepare(&self, text: String, source: InputSource) -> Result<Prepared, ChatError> {
        let text = text.trim();
        if text.is_empty() {
            return Err(self.reject(ChatError::EmptyMessage));
        }
        let max = self.store.config().max_message_chars;
        if text.chars().count() > max {
            return Err(self.reject(ChatError::MessageTooLong(max)));
        }

        let session = self.store.target_session();
        let turn = self
            .store
            .append_optimistic(session, text.to_string(), source)
            .map_err(|err| self.reject(err))?;
        Ok(Prepared { session, turn })
    }

    fn reject(&self, err: ChatError) -> ChatError {
        tracing::debug!(%err, "Submission rejected");
        self.store.events().warning(err.user_message());
        err
    }

    async fn dispatch(&self, prepared: Prepared) -> Turn {
        let Prepared { session, turn } = prepared;
        let sequence = turn.sequence;
        let mut guard = Dispatching {
            store: self.store.clone(),
            session,
            sequence,
            allocating: false,
            settled: false,
        };

        let claim = self.store.claim_session_id(session).await;
        let session_id = match claim {
            Claim::Known(id) => Some(id),
            Claim::Allocate => {
                guard.allocating = true;
                None
            }
        };
        let request = ChatRequest {
            message: turn.user_text.clone(),
            session_id,
            source: turn.source,
        };
        tracing::info!(session = %session, sequence, source = %turn.source, "Sending message");

        let settled = match self.store.backend().send_chat(&request).await {
            Ok(reply) => {
                let assigned = match session_id {
                    None => self.store.commit_session_id(session, reply.session_id),
                    Some(sent) if sent != reply.session_id => {
                        self.store.rebind_session_id(session, reply.session_id)
                    }
                    Some(_) => Ok(()),
                };
                if let Err(err) = assigned {
                    tracing::warn!(%err, "Could not record the session id");
                }
                let bot = BotReply::from(reply.chat_entry.bot.unwrap_or_default());
                self.store
                    .reconcile(session, sequence, bot)
                    .unwrap_or(turn)
            }
            Err(err) => {
                if claim == Claim::Allocate {
                    self.store.release_allocation(session);
                }
                tracing::warn!(session = %session, sequence, %err, "Message failed");
                self.store.events().error(err.user_message());
                self.store
                    .mark_failed(session, sequence, err.to_string())
                    .unwrap_or(turn)
            }
        };
        guard.settled = true;
        settled
    }
}

/// Settles a dispatch whose future was dropped before the reply arrived:
/// the turn fails and the draft gate is released for the next submission.
struct Dispatching {
    store: SessionStore,
    session: SessionKey,
    sequence: u64,
    allocating: bool,
    settled: bool,
}

impl Drop for Dispatching {
    fn drop(&mut self) {
        if self.settled {
            return;
        }
        tracing::warn!(session = %self.session, sequence = self.sequence, "Submission cancelled");
        if self.allocating {
            self.store.release_allocation(self.session);
        }
        self.store.mark_failed(self.session, self.sequence, CANCELLED);
    }
}
