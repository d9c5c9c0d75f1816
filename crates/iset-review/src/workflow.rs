//! Review dialog for self-learning candidates.
//!
//! A review opens with `fetch_candidates`, is edited locally, and closes on
//! `integrate`. Only the integrate call writes anything server-side.

use std::sync::Arc;

use iset_core::config::ReviewConfig;
use iset_core::events::EventBus;
use iset_core::remote::ChatBackend;
use iset_core::types::Category;
use iset_core::wire::{IntegrateReply, IntegrateRequest, LearningStatus, WireCandidate};

use crate::candidate::{Candidate, IntegrationResult, IntegrationStatus, ItemOutcome, ItemStatus};
use crate::error::ReviewError;

/// Owns the candidate list for one review at a time.
pub struct CandidateReviewWorkflow {
    backend: Arc<dyn ChatBackend>,
    events: EventBus,
    config: ReviewConfig,
    candidates: Vec<Candidate>,
    open: bool,
    last_status: Option<LearningStatus>,
}

impl CandidateReviewWorkflow {
    pub fn new(backend: Arc<dyn ChatBackend>, events: EventBus, config: ReviewConfig) -> Self {
        Self {
            backend,
            events,
            config,
            candidates: Vec::new(),
            open: false,
            last_status: None,
        }
    }

    pub fn config(&self) -> &ReviewConfig {
        &self.config
    }

    pub fn is_open(&self) -> bool {
        self.open
    }

    /// Candidates of the current or last review.
    pub fn candidates(&self) -> &[Candidate] {
        &self.candidates
    }

    pub fn selected_count(&self) -> usize {
        self.candidates.iter().filter(|c| c.selected).count()
    }

    /// Status from the most recent successful `status` call.
    pub fn last_status(&self) -> Option<&LearningStatus> {
        self.last_status.as_ref()
    }

    fn fail(&self, err: ReviewError) -> ReviewError {
        self.events.error(err.user_message());
        err
    }

    // =========================================================================
    // Fetch
    // =========================================================================

    pub async fn status(&mut self) -> Result<LearningStatus, ReviewError> {
        match self.backend.learning_status().await {
            Ok(status) => {
                tracing::debug!(
                    well_rated = status.well_rated_available,
                    "Learning status refreshed"
                );
                self.last_status = Some(status.clone());
                Ok(status)
            }
            Err(err) => {
                tracing::warn!(error = %err, "Failed to fetch learning status");
                Err(self.fail(err.into()))
            }
        }
    }

    /// Open a review with every candidate selected.
    ///
    /// Refused while the server reports no well-rated questions. Any review
    /// already open is closed first, whether or not the fetch succeeds.
    pub async fn fetch_candidates(&mut self) -> Result<&[Candidate], ReviewError> {
        self.open = false;
        let status = self.status().await?;
        if !status.has_candidates() {
            self.events.info(ReviewError::NothingToReview.user_message());
            return Err(ReviewError::NothingToReview);
        }

        let fetched = match self.backend.candidates().await {
            Ok(fetched) => fetched,
            Err(err) => {
                tracing::warn!(error = %err, "Failed to fetch candidates");
                return Err(self.fail(err.into()));
            }
        };
        if fetched.is_empty() {
            self.events.info(ReviewError::NothingToReview.user_message());
            return Err(ReviewError::NothingToReview);
        }

        self.candidates = fetched.into_iter().map(Candidate::from).collect();
        self.open = true;
        tracing::info!(count = self.candidates.len(), "Review opened");
        Ok(&self.candidates)
    }

    // =========================================================================
    // Local edits
    // =========================================================================

    fn candidate_mut(&mut self, index: usize) -> Result<&mut Candidate, ReviewError> {
        if !self.open {
            return Err(ReviewError::ReviewClosed);
        }
        self.candidates
            .get_mut(index)
            .ok_or(ReviewError::NoSuchCandidate(index))
    }

    /// Flip one candidate's selection. Returns the new value.
    pub fn toggle_selection(&mut self, index: usize) -> Result<bool, ReviewError> {
        let candidate = self.candidate_mut(index)?;
        candidate.selected = !candidate.selected;
        Ok(candidate.selected)
    }

    pub fn edit_answer(
        &mut self,
        index: usize,
        answer: impl Into<String>,
    ) -> Result<(), ReviewError> {
        self.candidate_mut(index)?.answer = answer.into();
        Ok(())
    }

    pub fn edit_category(&mut self, index: usize, category: Category) -> Result<(), ReviewError> {
        self.candidate_mut(index)?.category = category;
        Ok(())
    }

    // =========================================================================
    // Integrate
    // =========================================================================

    /// Submit the selected candidates and close the review.
    ///
    /// An empty selection sends nothing. A failed request is reported in the
    /// result rather than as an error; the review is closed either way.
    pub async fn integrate(&mut self) -> Result<IntegrationResult, ReviewError> {
        if !self.open {
            return Err(ReviewError::ReviewClosed);
        }
        self.open = false;

        let questions: Vec<WireCandidate> = self
            .candidates
            .iter()
            .filter(|c| c.selected)
            .map(Candidate::to_wire)
            .collect();

        if questions.is_empty() {
            let result = IntegrationResult::nothing_selected();
            self.events.info(result.summary());
            return Ok(result);
        }

        tracing::info!(count = questions.len(), "Integrating reviewed questions");
        let request = IntegrateRequest { questions };
        let result = match self.backend.integrate(&request).await {
            Ok(reply) => {
                let result = interpret_reply(&request.questions, reply);
                match result.status {
                    IntegrationStatus::Success => self.events.success(result.summary()),
                    _ => self.events.warning(result.summary()),
                }
                result
            }
            Err(err) => {
                tracing::warn!(error = %err, "Integration failed");
                let result = IntegrationResult::failed(&request.questions, err);
                self.events.error(result.summary());
                result
            }
        };

        self.refresh_status_quietly().await;
        Ok(result)
    }

    async fn refresh_status_quietly(&mut self) {
        match self.backend.learning_status().await {
            Ok(status) => self.last_status = Some(status),
            Err(err) => tracing::debug!(error = %err, "Status refresh after integration failed"),
        }
    }
}

/// Map the server reply onto the questions that were sent.
fn interpret_reply(questions: &[WireCandidate], reply: IntegrateReply) -> IntegrationResult {
    let submitted = questions.len();
    let (per_item, success_count) = match reply.per_item_status {
        Some(items) => {
            let per_item: Vec<ItemOutcome> = questions
                .iter()
                .map(|q| match items.iter().find(|item| item.question == q.question) {
                    Some(item) => ItemOutcome {
                        question: q.question.clone(),
                        status: item.status.into(),
                        reason: item.reason.clone(),
                    },
                    None => ItemOutcome {
                        question: q.question.clone(),
                        status: ItemStatus::Unconfirmed,
                        reason: None,
                    },
                })
                .collect();
            let accepted = per_item
                .iter()
                .filter(|item| item.status == ItemStatus::Accepted)
                .count();
            (per_item, accepted)
        }
        None => {
            let count = usize::try_from(reply.count).unwrap_or(usize::MAX);
            let status = if count == submitted {
                ItemStatus::Accepted
            } else {
                ItemStatus::Unconfirmed
            };
            let per_item: Vec<ItemOutcome> = questions
                .iter()
                .map(|q| ItemOutcome {
                    question: q.question.clone(),
                    status,
                    reason: None,
                })
                .collect();
            (per_item, count.min(submitted))
        }
    };

    let status = if success_count == submitted
        && per_item.iter().all(|item| item.status == ItemStatus::Accepted)
    {
        IntegrationStatus::Success
    } else {
        IntegrationStatus::PartialFailure
    };

    IntegrationResult {
        status,
        submitted,
        success_count,
        per_item,
        failure: None,
    }
}
