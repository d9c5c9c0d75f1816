//! Thumbs-up/down on answered turns. Ratings feed the self-learning review.

use iset_core::types::{SessionKey, TurnStatus};
use iset_core::wire::RateRequest;

use crate::error::ChatError;
use crate::store::SessionStore;

impl SessionStore {
    /// Tell the backend whether the answer to a turn was useful.
    ///
    /// Only confirmed turns can be rated. The rating is keyed by the question
    /// text, which is how the backend stores it.
    pub async fn rate(
        &self,
        session: SessionKey,
        sequence: u64,
        useful: bool,
    ) -> Result<(), ChatError> {
        let question = match self.rateable_question(session, sequence) {
            Ok(question) => question,
            Err(err) => {
                self.events().warning(err.user_message());
                return Err(err);
            }
        };

        let request = RateRequest {
            question,
            rating: useful,
        };
        match self.backend().rate(&request).await {
            Ok(()) => {
                tracing::info!(session = %session, sequence, useful, "Answer rated");
                self.events().success("Thanks for your feedback");
                Ok(())
            }
            Err(err) => {
                tracing::warn!(session = %session, sequence, %err, "Rating failed");
                self.events().error(err.user_message());
                Err(err.into())
            }
        }
    }

    fn rateable_question(&self, session: SessionKey, sequence: u64) -> Result<String, ChatError> {
        let snapshot = self
            .session(session)
            .ok_or(ChatError::UnknownSession(session))?;
        let turn = snapshot
            .timeline
            .get(sequence)
            .filter(|t| t.status == TurnStatus::Confirmed)
            .ok_or(ChatError::TurnNotConfirmed(sequence))?;
        Ok(turn.user_text.clone())
    }
}
