//! Per-run mutable state and its status machine.
//!
//! A [`RunContext`] is exclusively owned by the task driving its run; no
//! locking is needed for any of its fields. Callers observe progress through
//! the cheap [`RunStatusView`] snapshots the orchestrator publishes at stage
//! boundaries.

use crate::decision::Decision;
use crate::request::ContentRequest;
use crate::stage::{StageId, StageResult, duration_serde};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::{Duration, Instant};
use uuid::Uuid;

/// Where a run currently is.
///
/// `Idle` through `Editing` track the in-flight stage; `Retry` is the
/// transient state between a rejected attempt and the next one; `Approved`,
/// `Rejected`, and `Error` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    #[default]
    Idle,
    Research,
    Writing,
    Visual,
    Editing,
    Approved,
    Rejected,
    Error,
    Retry,
}

impl RunStatus {
    /// The status corresponding to an in-flight stage.
    pub fn for_stage(stage: StageId) -> Self {
        match stage {
            StageId::Research => RunStatus::Research,
            StageId::Writing => RunStatus::Writing,
            StageId::Visual => RunStatus::Visual,
            StageId::Editing => RunStatus::Editing,
        }
    }

    /// A run in a terminal status is moved out of the active set and never
    /// mutated again.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Approved | Self::Rejected | Self::Error)
    }
}

/// Reviewer feedback captured during an attempt. Cleared when a retry begins.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeedbackRecord {
    /// The stage the feedback came from.
    pub stage: StageId,
    pub message: String,
    pub recorded_at: DateTime<Utc>,
}

impl FeedbackRecord {
    pub fn new(stage: StageId, message: impl Into<String>) -> Self {
        Self {
            stage,
            message: message.into(),
            recorded_at: Utc::now(),
        }
    }
}

/// The mutable state of one in-flight run.
pub struct RunContext {
    pub id: Uuid,
    /// The caller's original request; untouched by retries.
    pub request: Arc<ContentRequest>,
    /// The request handed to workers on the current attempt. On retry it is
    /// rebuilt from the original with the reviewer feedback threaded in.
    pub attempt_request: Arc<ContentRequest>,
    pub status: RunStatus,
    pub current_stage: Option<StageId>,
    pub started_at: DateTime<Utc>,
    timer: Instant,
    /// One entry per completed stage of the current attempt.
    pub stage_results: Vec<StageResult>,
    pub feedback_history: Vec<FeedbackRecord>,
    pub retry_count: u32,
    pub max_retries: u32,
    pub decision: Decision,
    pub last_feedback: Option<String>,
}

impl RunContext {
    pub fn new(request: ContentRequest, max_retries: u32) -> Self {
        let request = Arc::new(request);
        Self {
            id: Uuid::new_v4(),
            attempt_request: Arc::clone(&request),
            request,
            status: RunStatus::Idle,
            current_stage: None,
            started_at: Utc::now(),
            timer: Instant::now(),
            stage_results: Vec::new(),
            feedback_history: Vec::new(),
            retry_count: 0,
            max_retries,
            decision: Decision::Pending,
            last_feedback: None,
        }
    }

    /// Whether the retry budget still has room for another attempt.
    pub fn can_retry(&self) -> bool {
        self.retry_count < self.max_retries
    }

    /// Mark a stage as in flight.
    pub fn begin_stage(&mut self, stage: StageId) {
        self.status = RunStatus::for_stage(stage);
        self.current_stage = Some(stage);
    }

    /// Append a completed stage artifact for the current attempt.
    pub fn record_stage(&mut self, result: StageResult) {
        self.stage_results.push(result);
    }

    pub fn record_feedback(&mut self, record: FeedbackRecord) {
        self.feedback_history.push(record);
    }

    /// Start a new attempt after a rejection: clear per-attempt histories,
    /// consume one retry, and thread the reviewer feedback into the next
    /// attempt's request.
    pub fn begin_retry(&mut self, feedback: String) {
        debug_assert!(self.can_retry(), "retry past the configured budget");
        self.stage_results.clear();
        self.feedback_history.clear();
        self.retry_count += 1;
        self.attempt_request = Arc::new(self.request.with_supplementary_instructions(&feedback));
        self.last_feedback = Some(feedback);
        self.status = RunStatus::Retry;
        self.current_stage = None;
        self.decision = Decision::Pending;
    }

    /// Move the run to a terminal status.
    pub fn finish(&mut self, status: RunStatus) {
        debug_assert!(status.is_terminal(), "finish requires a terminal status");
        self.status = status;
        self.current_stage = None;
    }

    /// Wall-clock time since the run started, across all attempts.
    pub fn elapsed(&self) -> Duration {
        self.timer.elapsed()
    }

    /// The monotonic start instant, for live elapsed-time queries.
    pub(crate) fn timer_start(&self) -> Instant {
        self.timer
    }

    /// Point-in-time view for status queries.
    pub fn view(&self) -> RunStatusView {
        RunStatusView {
            id: self.id,
            status: self.status,
            current_stage: self.current_stage,
            retry_count: self.retry_count,
            stages_completed: self.stage_results.len(),
            elapsed: self.elapsed(),
        }
    }
}

/// Status snapshot of an in-flight run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunStatusView {
    pub id: Uuid,
    pub status: RunStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_stage: Option<StageId>,
    pub retry_count: u32,
    pub stages_completed: usize,
    #[serde(with = "duration_serde")]
    pub elapsed: Duration,
}
