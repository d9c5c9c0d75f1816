//! Human review of self-learning candidates.
//!
//! Well-rated past questions come back from the server as candidates. A
//! reviewer selects, edits and recategorizes them before they are integrated
//! into the knowledge base.

pub mod candidate;
pub mod error;
pub mod workflow;

pub use candidate::{
    Candidate, ConfidenceBand, IntegrationResult, IntegrationStatus, ItemOutcome, ItemStatus,
};
pub use error::ReviewError;
pub use workflow::CandidateReviewWorkflow;
