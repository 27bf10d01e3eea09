//! Typed error hierarchy for the pipeline core.
//!
//! Two enums cover the two failure scopes:
//! - `PipelineError` — run-level failures crossing the orchestrator boundary
//! - `StageError` — a single stage attempt failing inside a run
//!
//! Expected business outcomes (rejection, revision, retry exhaustion) are
//! returned as [`PipelineResult`](crate::result::PipelineResult) values, not
//! errors; callers only see a `PipelineError` for infrastructure failures
//! such as admission denial.

use crate::stage::StageId;
use std::time::Duration;
use thiserror::Error;

/// Errors surfaced across the orchestrator boundary.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("Concurrency limit exceeded: {active}/{limit} runs active")]
    ConcurrencyLimitExceeded { active: usize, limit: usize },

    #[error("Reviewer verdict could not be classified: {preview}")]
    DecisionAmbiguous { preview: String },

    #[error("Retry budget exhausted after {retries} attempts")]
    MaxRetriesExceeded { retries: u32 },

    #[error(transparent)]
    Stage(#[from] StageError),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Errors from a single stage execution within an attempt.
#[derive(Debug, Error)]
pub enum StageError {
    #[error("Stage {stage} failed: {message}")]
    WorkerFailed { stage: StageId, message: String },

    #[error("Stage {stage} exceeded its {limit:?} deadline")]
    TimedOut { stage: StageId, limit: Duration },
}

impl StageError {
    /// The stage the failure occurred in.
    pub fn stage(&self) -> StageId {
        match self {
            StageError::WorkerFailed { stage, .. } => *stage,
            StageError::TimedOut { stage, .. } => *stage,
        }
    }
}
