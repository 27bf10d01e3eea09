//! Aggregate statistics over completed runs.
//!
//! Writers are serialized through a single mutex; readers get point-in-time
//! copies. No time series is kept beyond the scalar aggregates and a bounded
//! most-recent-runs list.

use crate::result::{PipelineResult, TerminalStatus};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;
use uuid::Uuid;

/// Terminal facts about one run, as recorded into the aggregator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunOutcome {
    pub run_id: Uuid,
    pub status: TerminalStatus,
    pub duration: Duration,
    pub retries: u32,
    pub completed_at: DateTime<Utc>,
}

impl RunOutcome {
    pub fn new(run_id: Uuid, status: TerminalStatus, duration: Duration, retries: u32) -> Self {
        Self {
            run_id,
            status,
            duration,
            retries,
            completed_at: Utc::now(),
        }
    }

    pub fn from_result(result: &PipelineResult) -> Self {
        Self::new(
            result.run_id,
            result.status,
            result.total_duration,
            result.retry_count,
        )
    }
}

/// Point-in-time copy of the aggregate counters.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    pub total_runs: u64,
    pub successful_runs: u64,
    pub failed_runs: u64,
    /// Running average of run duration, in seconds.
    pub avg_duration_secs: f64,
    /// Running average of retries consumed per run.
    pub avg_retries: f64,
    /// `successful_runs / total_runs`; zero before any run completes.
    pub approval_rate: f64,
    /// Most recent runs, newest last, bounded by the configured limit.
    pub recent_runs: Vec<RunOutcome>,
}

#[derive(Default)]
struct MetricsInner {
    snapshot: MetricsSnapshot,
    recent: VecDeque<RunOutcome>,
}

/// Incrementally updated run statistics, shared across concurrently
/// completing runs.
pub struct MetricsAggregator {
    inner: Mutex<MetricsInner>,
    recent_limit: usize,
}

impl MetricsAggregator {
    pub fn new(recent_limit: usize) -> Self {
        Self {
            inner: Mutex::new(MetricsInner::default()),
            recent_limit,
        }
    }

    /// Record one completed run. Updates total and success/failure counters,
    /// the running averages via `new_avg = (old_avg * (n-1) + x) / n`, and
    /// the approval rate.
    pub fn record(&self, outcome: RunOutcome) {
        let mut inner = self.lock();
        let stats = &mut inner.snapshot;

        stats.total_runs += 1;
        if outcome.status.is_success() {
            stats.successful_runs += 1;
        } else {
            stats.failed_runs += 1;
        }

        let n = stats.total_runs as f64;
        stats.avg_duration_secs =
            (stats.avg_duration_secs * (n - 1.0) + outcome.duration.as_secs_f64()) / n;
        stats.avg_retries = (stats.avg_retries * (n - 1.0) + f64::from(outcome.retries)) / n;
        stats.approval_rate = stats.successful_runs as f64 / n;

        inner.recent.push_back(outcome);
        while inner.recent.len() > self.recent_limit {
            inner.recent.pop_front();
        }
    }

    /// Convenience wrapper for recording a pipeline result.
    pub fn record_result(&self, result: &PipelineResult) {
        self.record(RunOutcome::from_result(result));
    }

    /// Point-in-time copy of the aggregates.
    pub fn snapshot(&self) -> MetricsSnapshot {
        let inner = self.lock();
        let mut snapshot = inner.snapshot.clone();
        snapshot.recent_runs = inner.recent.iter().cloned().collect();
        snapshot
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, MetricsInner> {
        // Metrics are advisory; keep serving them even after a panicked writer.
        match self.inner.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}
