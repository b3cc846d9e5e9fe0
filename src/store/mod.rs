//! Access to the human ratings, AI run files, rubric and candidate images.
//!
//! Writes replace whole files; concurrent writers race and the last write
//! wins.

mod error;
mod file;

pub use error::{StoreError, StoreResult};
pub use file::FileRatingStore;

use crate::ratings::{CandidateId, Evaluation, RatingSet, RubricDefinition, RunSummary};
use std::future::Future;

/// Operations the dashboard and the analytics need from the backing store
pub trait RatingStore: Send + Sync {
    /// All human ratings; empty when nothing has been rated yet
    fn human_ratings(&self) -> impl Future<Output = StoreResult<RatingSet>> + Send;

    fn get_human_evaluation(
        &self,
        candidate_id: &CandidateId,
    ) -> impl Future<Output = StoreResult<Option<Evaluation>>> + Send;

    /// Replace the human record for `candidate_id`
    fn put_human_evaluation(
        &self,
        candidate_id: &CandidateId,
        evaluation: Evaluation,
    ) -> impl Future<Output = StoreResult<()>> + Send;

    /// Run metadata, newest first
    fn list_runs(&self) -> impl Future<Output = StoreResult<Vec<RunSummary>>> + Send;

    fn run_evaluations(&self, run: &str) -> impl Future<Output = StoreResult<RatingSet>> + Send;

    /// Persist the dashboard visibility flag of a run
    fn set_run_visibility(
        &self,
        run: &str,
        hidden: bool,
    ) -> impl Future<Output = StoreResult<RunSummary>> + Send;

    fn rubric(&self) -> impl Future<Output = StoreResult<RubricDefinition>> + Send;
}

/// Reject names that could escape the data directory
pub(crate) fn validate_filename(name: &str) -> StoreResult<()> {
    if name.is_empty() || name.contains('/') || name.contains('\\') || name.contains("..") {
        return Err(StoreError::Validation(format!("invalid filename: {}", name)));
    }
    Ok(())
}
