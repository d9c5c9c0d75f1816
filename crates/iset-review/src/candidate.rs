//! Candidate Q/A pairs as the reviewer edits them, and integration results.

use serde::Serialize;

use iset_core::config::ReviewConfig;
use iset_core::error::RemoteError;
use iset_core::types::Category;
use iset_core::wire::{WireCandidate, WireItemVerdict};

/// How sure the server is that a candidate belongs in the knowledge base.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ConfidenceBand {
    High,
    Medium,
    Low,
}

/// One proposed question with its editable answer and category.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Candidate {
    pub question: String,
    pub answer: String,
    pub category: Category,
    pub confidence: f64,
    pub selected: bool,
}

impl Candidate {
    pub fn confidence_band(&self, config: &ReviewConfig) -> ConfidenceBand {
        if self.confidence > config.high_confidence {
            ConfidenceBand::High
        } else if self.confidence > config.medium_confidence {
            ConfidenceBand::Medium
        } else {
            ConfidenceBand::Low
        }
    }

    pub(crate) fn to_wire(&self) -> WireCandidate {
        WireCandidate {
            question: self.question.clone(),
            answer: self.answer.clone(),
            category: self.category,
            confidence: self.confidence,
        }
    }
}

impl From<WireCandidate> for Candidate {
    fn from(wire: WireCandidate) -> Self {
        Self {
            question: wire.question,
            answer: wire.answer,
            category: wire.category,
            confidence: wire.confidence,
            selected: true,
        }
    }
}

// =============================================================================
// Integration results
// =============================================================================

/// Overall outcome of an `integrate` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum IntegrationStatus {
    /// Nothing was selected, nothing was sent.
    Info,
    /// Every submitted question was accepted.
    Success,
    /// The server answered but did not accept every question.
    PartialFailure,
    /// The request itself failed.
    Failure,
}

/// What happened to one submitted question.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemStatus {
    Accepted,
    Rejected,
    /// The server did not say.
    Unconfirmed,
}

impl From<WireItemVerdict> for ItemStatus {
    fn from(verdict: WireItemVerdict) -> Self {
        match verdict {
            WireItemVerdict::Accepted => ItemStatus::Accepted,
            WireItemVerdict::Rejected => ItemStatus::Rejected,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ItemOutcome {
    pub question: String,
    pub status: ItemStatus,
    pub reason: Option<String>,
}

/// Result of submitting a review.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IntegrationResult {
    pub status: IntegrationStatus,
    pub submitted: usize,
    pub success_count: usize,
    pub per_item: Vec<ItemOutcome>,
    #[serde(skip)]
    pub failure: Option<RemoteError>,
}

impl IntegrationResult {
    pub(crate) fn nothing_selected() -> Self {
        Self {
            status: IntegrationStatus::Info,
            submitted: 0,
            success_count: 0,
            per_item: Vec::new(),
            failure: None,
        }
    }

    pub(crate) fn failed(questions: &[WireCandidate], err: RemoteError) -> Self {
        Self {
            status: IntegrationStatus::Failure,
            submitted: questions.len(),
            success_count: 0,
            per_item: questions
                .iter()
                .map(|q| ItemOutcome {
                    question: q.question.clone(),
                    status: ItemStatus::Unconfirmed,
                    reason: None,
                })
                .collect(),
            failure: Some(err),
        }
    }

    /// One-line summary for the notification raised with this result.
    pub fn summary(&self) -> String {
        match self.status {
            IntegrationStatus::Info => "No question selected for integration".to_string(),
            IntegrationStatus::Success => {
                format!("{} questions integrated successfully", self.success_count)
            }
            IntegrationStatus::PartialFailure => format!(
                "{} of {} questions integrated",
                self.success_count, self.submitted
            ),
            IntegrationStatus::Failure => match &self.failure {
                Some(err) => format!("Integration failed: {}", err.user_message()),
                None => "Integration failed".to_string(),
            },
        }
    }
}
