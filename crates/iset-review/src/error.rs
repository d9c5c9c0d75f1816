//! Error types for candidate review.

use iset_core::error::RemoteError;

/// Errors from the candidate review workflow.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ReviewError {
    #[error("no candidate at index {0}")]
    NoSuchCandidate(usize),
    #[error("review dialog is closed")]
    ReviewClosed,
    #[error("no well-rated questions to review")]
    NothingToReview,
    #[error(transparent)]
    Remote(#[from] RemoteError),
}

impl ReviewError {
    pub fn user_message(&self) -> String {
        match self {
            ReviewError::NoSuchCandidate(index) => format!("No candidate number {}", index + 1),
            ReviewError::ReviewClosed => "This review has already been submitted".to_string(),
            ReviewError::NothingToReview => {
                "There are no well-rated questions to review yet".to_string()
            }
            ReviewError::Remote(err) => err.user_message(),
        }
    }
}
