//! Terminal run outcomes.
//!
//! Every `submit` call that gets admitted ends in exactly one
//! [`PipelineResult`]; rejection, revision exhaustion, and stage failures are
//! all reported here as values rather than errors.

use crate::request::ContentRequest;
use crate::stage::{StageResult, duration_serde};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use uuid::Uuid;

/// The terminal status label of a completed run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TerminalStatus {
    /// The reviewer approved the content.
    Approved,
    /// The reviewer rejected the content and no retry was available.
    Rejected,
    /// A stage worker failed or the reviewer verdict was unclassifiable.
    Error,
    /// The rejection/revision loop exhausted its retry budget.
    MaxRetriesExceeded,
}

impl TerminalStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TerminalStatus::Approved => "approved",
            TerminalStatus::Rejected => "rejected",
            TerminalStatus::Error => "error",
            TerminalStatus::MaxRetriesExceeded => "max_retries_exceeded",
        }
    }

    /// Only approval counts as success.
    pub fn is_success(&self) -> bool {
        matches!(self, TerminalStatus::Approved)
    }
}

/// Immutable record of one completed run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineResult {
    pub run_id: Uuid,
    /// The originating request, as the caller submitted it.
    pub request: ContentRequest,
    pub success: bool,
    /// The approved content. Empty unless `status` is `Approved`.
    pub final_content: String,
    /// Stage history of the final attempt.
    pub stage_results: Vec<StageResult>,
    /// Wall-clock duration across all attempts.
    #[serde(with = "duration_serde")]
    pub total_duration: Duration,
    pub status: TerminalStatus,
    /// Retries consumed by the run.
    pub retry_count: u32,
    /// Reviewer feedback from the last attempt, or the failure message for
    /// `Error` results.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub revision_feedback: Option<String>,
}

impl PipelineResult {
    pub fn approved(
        run_id: Uuid,
        request: ContentRequest,
        final_content: String,
        stage_results: Vec<StageResult>,
        total_duration: Duration,
        retry_count: u32,
    ) -> Self {
        Self {
            run_id,
            request,
            success: true,
            final_content,
            stage_results,
            total_duration,
            status: TerminalStatus::Approved,
            retry_count,
            revision_feedback: None,
        }
    }

    pub fn rejected(
        run_id: Uuid,
        request: ContentRequest,
        stage_results: Vec<StageResult>,
        total_duration: Duration,
        retry_count: u32,
        feedback: Option<String>,
    ) -> Self {
        Self {
            run_id,
            request,
            success: false,
            final_content: String::new(),
            stage_results,
            total_duration,
            status: TerminalStatus::Rejected,
            retry_count,
            revision_feedback: feedback,
        }
    }

    pub fn max_retries_exceeded(
        run_id: Uuid,
        request: ContentRequest,
        stage_results: Vec<StageResult>,
        total_duration: Duration,
        retry_count: u32,
        feedback: Option<String>,
    ) -> Self {
        Self {
            run_id,
            request,
            success: false,
            final_content: String::new(),
            stage_results,
            total_duration,
            status: TerminalStatus::MaxRetriesExceeded,
            retry_count,
            revision_feedback: feedback,
        }
    }

    pub fn error(
        run_id: Uuid,
        request: ContentRequest,
        stage_results: Vec<StageResult>,
        total_duration: Duration,
        retry_count: u32,
        message: String,
    ) -> Self {
        Self {
            run_id,
            request,
            success: false,
            final_content: String::new(),
            stage_results,
            total_duration,
            status: TerminalStatus::Error,
            retry_count,
            revision_feedback: Some(message),
        }
    }
}
