//! Per-session ordered turn list.
//!
//! Turns are appended optimistically with the next sequence number and later
//! confirmed or failed in place. The backing vector is kept sorted by
//! sequence, which is also the rendering order.

use iset_core::types::{BotReply, InputSource, Suggestion, Timestamp, Turn, TurnStatus};
use iset_core::wire::WireMessage;

use crate::error::TimelineError;

#[derive(Clone, Debug, Default, PartialEq)]
pub struct TurnTimeline {
    turns: Vec<Turn>,
}

impl TurnTimeline {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild a timeline from server history. Every turn is `Confirmed`
    /// and numbered `1..=n` in the order the server listed them.
    pub fn from_history(messages: Vec<WireMessage>) -> Self {
        let turns = messages
            .into_iter()
            .zip(1u64..)
            .map(|(msg, sequence)| Turn {
                sequence,
                user_text: msg.user,
                submitted_at: msg.timestamp,
                source: InputSource::Typed,
                status: TurnStatus::Confirmed,
                bot_reply: msg.bot.map(BotReply::from),
                failure: None,
            })
            .collect();
        Self { turns }
    }

    pub fn turns(&self) -> &[Turn] {
        &self.turns
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    pub fn get(&self, sequence: u64) -> Option<&Turn> {
        self.position(sequence).map(|i| &self.turns[i])
    }

    /// Sequence the next appended turn will get.
    pub fn next_sequence(&self) -> u64 {
        self.turns.last().map_or(1, |t| t.sequence + 1)
    }

    pub fn has_pending(&self) -> bool {
        self.turns.iter().any(Turn::is_pending)
    }

    pub fn first_user_text(&self) -> Option<&str> {
        self.turns.first().map(|t| t.user_text.as_str())
    }

    /// Time of the most recent turn.
    pub fn last_activity(&self) -> Option<Timestamp> {
        self.turns.last().map(|t| t.submitted_at)
    }

    /// Append a `Pending` turn holding only the user's text.
    pub fn append_optimistic(&mut self, user_text: String, source: InputSource) -> &Turn {
        let turn = Turn::pending(self.next_sequence(), user_text, source);
        self.turns.push(turn);
        &self.turns[self.turns.len() - 1]
    }

    /// Attach the bot's reply to a pending turn.
    pub fn reconcile(&mut self, sequence: u64, reply: BotReply) -> Result<&Turn, TimelineError> {
        let turn = self.transition(sequence, TurnStatus::Confirmed)?;
        turn.bot_reply = Some(reply);
        Ok(turn)
    }

    /// Mark a pending turn as failed. It is never resubmitted from here.
    pub fn mark_failed(
        &mut self,
        sequence: u64,
        reason: impl Into<String>,
    ) -> Result<&Turn, TimelineError> {
        let turn = self.transition(sequence, TurnStatus::Failed)?;
        turn.failure = Some(reason.into());
        Ok(turn)
    }

    /// Suggestions offered with the latest confirmed reply.
    pub fn latest_suggestions(&self) -> &[Suggestion] {
        self.turns
            .iter()
            .rev()
            .find(|t| t.status == TurnStatus::Confirmed)
            .and_then(|t| t.bot_reply.as_ref())
            .map(|r| r.suggestions.as_slice())
            .unwrap_or(&[])
    }

    fn position(&self, sequence: u64) -> Option<usize> {
        self.turns
            .binary_search_by_key(&sequence, |t| t.sequence)
            .ok()
    }

    fn transition(
        &mut self,
        sequence: u64,
        target: TurnStatus,
    ) -> Result<&mut Turn, TimelineError> {
        let index = self
            .position(sequence)
            .ok_or(TimelineError::UnknownSequence(sequence))?;
        let turn = &mut self.turns[index];
        if !turn.status.can_transition_to(&target) {
            return Err(TimelineError::InvalidTransition {
                from: turn.status,
                to: target,
            });
        }
        turn.status = target;
        Ok(turn)
    }
}
