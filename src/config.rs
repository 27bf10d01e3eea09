//! Construction-time configuration for the pipeline orchestrator.

use std::time::Duration;

/// Tunables consumed when building a
/// [`PipelineOrchestrator`](crate::orchestrator::PipelineOrchestrator).
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Ceiling on simultaneously active runs. Admission beyond this fails
    /// fast; there is no queue.
    pub max_concurrent_runs: usize,
    /// How many full-pipeline retries a rejected run may consume.
    pub max_retries: u32,
    /// Per-stage deadline. `None` lets a hung worker block its run
    /// indefinitely.
    pub stage_timeout: Option<Duration>,
    /// How many completed runs the metrics snapshot remembers.
    pub recent_history_limit: usize,
    /// Fallback prefix length when no feedback section is found in the
    /// reviewer text.
    pub feedback_fallback_chars: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            max_concurrent_runs: 3,
            max_retries: 3,
            stage_timeout: None,
            recent_history_limit: 10,
            feedback_fallback_chars: 500,
        }
    }
}

impl PipelineConfig {
    /// Defaults overridden by `CREWLINE_*` environment variables where set.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Some(n) = env_usize("CREWLINE_MAX_CONCURRENT_RUNS") {
            config.max_concurrent_runs = n;
        }
        if let Some(n) = env_usize("CREWLINE_MAX_RETRIES") {
            config.max_retries = n as u32;
        }
        if let Some(secs) = env_usize("CREWLINE_STAGE_TIMEOUT_SECS") {
            config.stage_timeout = Some(Duration::from_secs(secs as u64));
        }
        config
    }

    pub fn with_max_concurrent_runs(mut self, limit: usize) -> Self {
        self.max_concurrent_runs = limit;
        self
    }

    pub fn with_max_retries(mut self, retries: u32) -> Self {
        self.max_retries = retries;
        self
    }

    pub fn with_stage_timeout(mut self, timeout: Duration) -> Self {
        self.stage_timeout = Some(timeout);
        self
    }

    pub fn with_recent_history_limit(mut self, limit: usize) -> Self {
        self.recent_history_limit = limit;
        self
    }
}

fn env_usize(key: &str) -> Option<usize> {
    std::env::var(key).ok().and_then(|v| v.parse().ok())
}
