//! The pipeline orchestrator: sequencing, verdict handling, and the bounded
//! retry loop.
//!
//! One orchestrator owns its [`ConcurrencyGate`] and [`MetricsAggregator`];
//! construct it explicitly and inject the stage workers, rather than going
//! through any shared global. Each admitted run executes as the caller's own
//! task: stages strictly in order, the editing artifact classified, and on
//! rejection the whole sequence re-run with the reviewer feedback threaded
//! into the request, up to the configured retry budget.

use crate::config::PipelineConfig;
use crate::context::{FeedbackRecord, RunContext, RunStatus, RunStatusView};
use crate::decision::{
    Decision, DecisionClassifier, DecisionConfidence, FeedbackExtractor, HeuristicFeedbackExtractor,
};
use crate::errors::{PipelineError, StageError};
use crate::gate::ConcurrencyGate;
use crate::metrics::{MetricsAggregator, MetricsSnapshot};
use crate::result::PipelineResult;
use crate::stage::{StageId, StageResult, StageSet};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Instant;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Entry in the active-run table, kept current by the driving task.
struct ActiveRun {
    view: RunStatusView,
    started: Instant,
}

/// Drives content requests through the fixed stage sequence behind an
/// admission gate, and aggregates metrics over completed runs.
pub struct PipelineOrchestrator {
    config: PipelineConfig,
    stages: StageSet,
    classifier: DecisionClassifier,
    extractor: Arc<dyn FeedbackExtractor>,
    gate: ConcurrencyGate,
    metrics: Arc<MetricsAggregator>,
    active: Mutex<HashMap<Uuid, ActiveRun>>,
}

impl PipelineOrchestrator {
    pub fn new(config: PipelineConfig, stages: StageSet) -> Self {
        let gate = ConcurrencyGate::new(config.max_concurrent_runs);
        let metrics = Arc::new(MetricsAggregator::new(config.recent_history_limit));
        let extractor = Arc::new(HeuristicFeedbackExtractor::new(
            config.feedback_fallback_chars,
        ));
        Self {
            config,
            stages,
            classifier: DecisionClassifier::new(),
            extractor,
            gate,
            metrics,
            active: Mutex::new(HashMap::new()),
        }
    }

    /// Swap in a custom feedback extractor.
    pub fn with_feedback_extractor(mut self, extractor: Arc<dyn FeedbackExtractor>) -> Self {
        self.extractor = extractor;
        self
    }

    /// Run a content request through the pipeline to completion.
    ///
    /// Fails fast with [`PipelineError::ConcurrencyLimitExceeded`] when the
    /// run ceiling is reached; every admitted run returns a
    /// [`PipelineResult`] whose status field carries the business outcome.
    pub async fn submit(
        &self,
        request: crate::request::ContentRequest,
    ) -> Result<PipelineResult, PipelineError> {
        // Admission happens before any stage work; the token's drop releases
        // the slot on every exit path, panics included.
        let _token = self.gate.admit()?;

        let mut ctx = RunContext::new(request, self.config.max_retries);
        let run_id = ctx.id;
        info!(%run_id, topic = %ctx.request.topic, "run admitted");
        self.publish(&ctx);

        let result = self.drive(&mut ctx).await;

        self.metrics.record_result(&result);
        self.active_runs_lock().remove(&run_id);
        info!(
            %run_id,
            status = result.status.as_str(),
            retries = result.retry_count,
            elapsed_secs = result.total_duration.as_secs_f64(),
            "run finished"
        );
        Ok(result)
    }

    /// Status of an in-flight run, with a live elapsed time.
    pub fn status(&self, run_id: Uuid) -> Option<RunStatusView> {
        self.active_runs_lock().get(&run_id).map(|entry| {
            let mut view = entry.view.clone();
            view.elapsed = entry.started.elapsed();
            view
        })
    }

    /// Status views for all in-flight runs.
    pub fn active_runs(&self) -> Vec<RunStatusView> {
        self.active_runs_lock()
            .values()
            .map(|entry| {
                let mut view = entry.view.clone();
                view.elapsed = entry.started.elapsed();
                view
            })
            .collect()
    }

    /// Point-in-time metrics over completed runs.
    pub fn metrics(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }

    /// Number of currently admitted runs.
    pub fn active_count(&self) -> usize {
        self.gate.active()
    }

    /// The attempt/classify/retry loop. Always produces a terminal result.
    async fn drive(&self, ctx: &mut RunContext) -> PipelineResult {
        loop {
            let editing_artifact = match self.run_attempt(ctx).await {
                Ok(artifact) => artifact,
                Err(stage_err) => {
                    // Mid-sequence stage failures are fatal for the run;
                    // only classified rejections re-enter the loop.
                    warn!(run_id = %ctx.id, error = %stage_err, "stage failed, run aborted");
                    return self.finish_error(ctx, stage_err.to_string());
                }
            };

            let classification = self.classifier.classify(&editing_artifact);
            ctx.decision = classification.decision;
            if classification.confidence != DecisionConfidence::Marker
                && classification.decision != Decision::Pending
            {
                warn!(
                    run_id = %ctx.id,
                    decision = ?classification.decision,
                    confidence = ?classification.confidence,
                    "reviewer verdict classified without an explicit marker"
                );
            }

            match classification.decision {
                Decision::Approved => {
                    ctx.finish(RunStatus::Approved);
                    self.publish(ctx);
                    return PipelineResult::approved(
                        ctx.id,
                        ctx.request.as_ref().clone(),
                        editing_artifact,
                        std::mem::take(&mut ctx.stage_results),
                        ctx.elapsed(),
                        ctx.retry_count,
                    );
                }
                Decision::Rejected | Decision::NeedsRevision => {
                    let feedback = self.extractor.extract(&editing_artifact);
                    ctx.record_feedback(FeedbackRecord::new(StageId::Editing, feedback.clone()));

                    if ctx.can_retry() {
                        info!(
                            run_id = %ctx.id,
                            attempt = ctx.retry_count + 1,
                            max_retries = ctx.max_retries,
                            "content not approved, retrying with reviewer feedback"
                        );
                        ctx.begin_retry(feedback);
                        self.publish(ctx);
                        continue;
                    }

                    ctx.finish(RunStatus::Rejected);
                    self.publish(ctx);
                    // Exhaustion through retry cycles reports the dedicated
                    // status; a rejection with no budget at all is plain
                    // rejected.
                    return if ctx.max_retries == 0 {
                        PipelineResult::rejected(
                            ctx.id,
                            ctx.request.as_ref().clone(),
                            std::mem::take(&mut ctx.stage_results),
                            ctx.elapsed(),
                            ctx.retry_count,
                            Some(feedback),
                        )
                    } else {
                        PipelineResult::max_retries_exceeded(
                            ctx.id,
                            ctx.request.as_ref().clone(),
                            std::mem::take(&mut ctx.stage_results),
                            ctx.elapsed(),
                            ctx.retry_count,
                            Some(feedback),
                        )
                    };
                }
                Decision::Pending => {
                    // No verdict means no actionable feedback; retrying
                    // blindly would loop on the same ambiguity.
                    let err = PipelineError::DecisionAmbiguous {
                        preview: preview(&editing_artifact, 120),
                    };
                    warn!(run_id = %ctx.id, error = %err, "run aborted");
                    return self.finish_error(ctx, err.to_string());
                }
            }
        }
    }

    /// Execute the four stages in order for the current attempt, returning
    /// the editing artifact. Any worker failure or deadline overrun aborts
    /// the attempt with the partial history preserved on the context.
    async fn run_attempt(&self, ctx: &mut RunContext) -> Result<String, StageError> {
        for stage in StageId::SEQUENCE {
            ctx.begin_stage(stage);
            self.publish(ctx);
            debug!(run_id = %ctx.id, %stage, "stage starting");

            let worker = Arc::clone(self.stages.worker(stage));
            let started = Instant::now();
            let outcome = match self.config.stage_timeout {
                Some(limit) => {
                    match tokio::time::timeout(
                        limit,
                        worker.execute(&ctx.attempt_request, &ctx.stage_results),
                    )
                    .await
                    {
                        Ok(outcome) => outcome,
                        Err(_) => {
                            ctx.record_stage(StageResult::failure(
                                stage,
                                "stage deadline exceeded",
                                started.elapsed(),
                            ));
                            return Err(StageError::TimedOut { stage, limit });
                        }
                    }
                }
                None => worker.execute(&ctx.attempt_request, &ctx.stage_results).await,
            };

            match outcome {
                Ok(result) if result.success => {
                    info!(
                        run_id = %ctx.id,
                        %stage,
                        elapsed_secs = result.duration.as_secs_f64(),
                        "stage completed"
                    );
                    ctx.record_stage(result);
                }
                Ok(result) => {
                    let message = result
                        .error
                        .clone()
                        .unwrap_or_else(|| "stage reported failure".to_string());
                    ctx.record_stage(result);
                    return Err(StageError::WorkerFailed { stage, message });
                }
                Err(err) => {
                    let message = err.to_string();
                    ctx.record_stage(StageResult::failure(stage, &message, started.elapsed()));
                    return Err(StageError::WorkerFailed { stage, message });
                }
            }
        }

        // SEQUENCE ends with Editing, so the last result is its artifact.
        Ok(ctx
            .stage_results
            .last()
            .map(|r| r.content.clone())
            .unwrap_or_default())
    }

    /// Terminal error path shared by stage failures and ambiguous verdicts.
    fn finish_error(&self, ctx: &mut RunContext, message: String) -> PipelineResult {
        ctx.finish(RunStatus::Error);
        self.publish(ctx);
        PipelineResult::error(
            ctx.id,
            ctx.request.as_ref().clone(),
            std::mem::take(&mut ctx.stage_results),
            ctx.elapsed(),
            ctx.retry_count,
            message,
        )
    }

    /// Refresh this run's entry in the active-run table.
    fn publish(&self, ctx: &RunContext) {
        self.active_runs_lock().insert(
            ctx.id,
            ActiveRun {
                view: ctx.view(),
                started: ctx.timer_start(),
            },
        );
    }

    fn active_runs_lock(&self) -> MutexGuard<'_, HashMap<Uuid, ActiveRun>> {
        match self.active.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

/// Char-boundary-safe prefix for log previews.
fn preview(text: &str, max_chars: usize) -> String {
    text.chars().take(max_chars).collect()
}
