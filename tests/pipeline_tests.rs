//! End-to-end pipeline scenarios driven by scripted stage workers.

use anyhow::{Result, anyhow};
use async_trait::async_trait;
use crewline::{
    ContentRequest, PipelineConfig, PipelineError, PipelineOrchestrator, RunStatus, StageId,
    StageResult, StageSet, StageWorker, TerminalStatus,
};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::sync::Notify;

fn make_request() -> ContentRequest {
    ContentRequest::new(
        "sustainable fashion trends",
        vec!["instagram".to_string(), "linkedin".to_string()],
        "young professionals",
        "engagement",
    )
    .unwrap()
}

/// Worker that always succeeds with a fixed artifact.
struct EchoWorker {
    stage: StageId,
    artifact: &'static str,
}

impl EchoWorker {
    fn arc(stage: StageId, artifact: &'static str) -> Arc<dyn StageWorker> {
        Arc::new(Self { stage, artifact })
    }
}

#[async_trait]
impl StageWorker for EchoWorker {
    async fn execute(
        &self,
        _request: &ContentRequest,
        _prior: &[StageResult],
    ) -> Result<StageResult> {
        Ok(StageResult::success(
            self.stage,
            self.artifact,
            Duration::from_millis(1),
        ))
    }
}

/// Editing worker that replays a scripted artifact per attempt, sticking on
/// the last one.
struct ScriptedEditor {
    artifacts: Vec<&'static str>,
    calls: AtomicUsize,
}

impl ScriptedEditor {
    fn arc(artifacts: Vec<&'static str>) -> Arc<dyn StageWorker> {
        Arc::new(Self {
            artifacts,
            calls: AtomicUsize::new(0),
        })
    }
}

#[async_trait]
impl StageWorker for ScriptedEditor {
    async fn execute(
        &self,
        _request: &ContentRequest,
        _prior: &[StageResult],
    ) -> Result<StageResult> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        let artifact = self.artifacts[call.min(self.artifacts.len() - 1)];
        Ok(StageResult::success(
            StageId::Editing,
            artifact,
            Duration::from_millis(1),
        ))
    }
}

/// Writing worker that records the special instructions it was handed and
/// checks it always runs after research.
struct RecordingWriter {
    instructions_seen: std::sync::Mutex<Vec<Option<String>>>,
}

impl RecordingWriter {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            instructions_seen: std::sync::Mutex::new(Vec::new()),
        })
    }
}

#[async_trait]
impl StageWorker for RecordingWriter {
    async fn execute(
        &self,
        request: &ContentRequest,
        prior: &[StageResult],
    ) -> Result<StageResult> {
        assert_eq!(prior.len(), 1, "writing must see exactly the research artifact");
        assert_eq!(prior[0].stage, StageId::Research);
        self.instructions_seen
            .lock()
            .unwrap()
            .push(request.special_instructions.clone());
        Ok(StageResult::success(
            StageId::Writing,
            "draft copy",
            Duration::from_millis(1),
        ))
    }
}

/// Worker that fails outright.
struct FailingWorker {
    stage: StageId,
}

#[async_trait]
impl StageWorker for FailingWorker {
    async fn execute(
        &self,
        _request: &ContentRequest,
        _prior: &[StageResult],
    ) -> Result<StageResult> {
        Err(anyhow!("search backend unavailable"))
    }
}

/// Worker that sleeps before succeeding, to keep runs in flight.
struct SlowWorker {
    stage: StageId,
    delay: Duration,
    artifact: &'static str,
    calls: AtomicUsize,
}

impl SlowWorker {
    fn new(stage: StageId, delay: Duration, artifact: &'static str) -> Arc<Self> {
        Arc::new(Self {
            stage,
            delay,
            artifact,
            calls: AtomicUsize::new(0),
        })
    }
}

#[async_trait]
impl StageWorker for SlowWorker {
    async fn execute(
        &self,
        _request: &ContentRequest,
        _prior: &[StageResult],
    ) -> Result<StageResult> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(self.delay).await;
        Ok(StageResult::success(
            self.stage,
            self.artifact,
            self.delay,
        ))
    }
}

/// Worker that blocks until released, for observing in-flight status.
struct GatedWorker {
    stage: StageId,
    release: Arc<Notify>,
}

#[async_trait]
impl StageWorker for GatedWorker {
    async fn execute(
        &self,
        _request: &ContentRequest,
        _prior: &[StageResult],
    ) -> Result<StageResult> {
        self.release.notified().await;
        Ok(StageResult::success(
            self.stage,
            "[APPROVED] done",
            Duration::from_millis(1),
        ))
    }
}

fn happy_set(editing_artifact: &'static str) -> StageSet {
    StageSet::new(
        EchoWorker::arc(StageId::Research, "market findings"),
        EchoWorker::arc(StageId::Writing, "draft copy"),
        EchoWorker::arc(StageId::Visual, "image prompt"),
        EchoWorker::arc(StageId::Editing, editing_artifact),
    )
}

fn scripted_set(editor: Arc<dyn StageWorker>) -> StageSet {
    StageSet::new(
        EchoWorker::arc(StageId::Research, "market findings"),
        EchoWorker::arc(StageId::Writing, "draft copy"),
        EchoWorker::arc(StageId::Visual, "image prompt"),
        editor,
    )
}

const REJECTION: &str = "[REJEITADO]\nFeedback:\nadd more statistics";

// Scenario A: all four stages succeed, the editor approves outright.
#[tokio::test]
async fn happy_path_approves_on_first_attempt() {
    let orchestrator = PipelineOrchestrator::new(
        PipelineConfig::default(),
        happy_set("[APROVADO] excellent campaign"),
    );

    let result = orchestrator.submit(make_request()).await.unwrap();

    assert_eq!(result.status, TerminalStatus::Approved);
    assert!(result.success);
    assert_eq!(result.final_content, "[APROVADO] excellent campaign");
    assert_eq!(result.retry_count, 0);
    assert_eq!(result.stage_results.len(), 4);
    assert_eq!(
        result
            .stage_results
            .iter()
            .map(|r| r.stage)
            .collect::<Vec<_>>(),
        StageId::SEQUENCE.to_vec()
    );
}

// Scenario B: two rejections with feedback, then approval on the third
// attempt; the feedback is threaded into the retried request.
#[tokio::test]
async fn bounded_retry_recovers_after_rejections() {
    let writer = RecordingWriter::new();
    let stages = StageSet::new(
        EchoWorker::arc(StageId::Research, "market findings"),
        writer.clone(),
        EchoWorker::arc(StageId::Visual, "image prompt"),
        ScriptedEditor::arc(vec![REJECTION, REJECTION, "[APROVADO] much better"]),
    );
    let orchestrator =
        PipelineOrchestrator::new(PipelineConfig::default().with_max_retries(3), stages);

    let result = orchestrator.submit(make_request()).await.unwrap();

    assert_eq!(result.status, TerminalStatus::Approved);
    assert_eq!(result.retry_count, 2);
    assert_eq!(result.final_content, "[APROVADO] much better");
    // Stage history was reset on each retry; only the final attempt remains
    assert_eq!(result.stage_results.len(), 4);

    let seen = writer.instructions_seen.lock().unwrap();
    assert_eq!(seen.len(), 3);
    assert!(seen[0].is_none());
    for instructions in &seen[1..] {
        assert!(
            instructions
                .as_deref()
                .unwrap()
                .contains("add more statistics")
        );
    }
}

// Scenario C: every attempt is rejected until the budget runs out.
#[tokio::test]
async fn retry_exhaustion_reports_last_feedback() {
    let orchestrator = PipelineOrchestrator::new(
        PipelineConfig::default().with_max_retries(2),
        scripted_set(ScriptedEditor::arc(vec![REJECTION])),
    );

    let result = orchestrator.submit(make_request()).await.unwrap();

    assert_eq!(result.status, TerminalStatus::MaxRetriesExceeded);
    assert!(!result.success);
    assert!(result.final_content.is_empty());
    assert_eq!(result.retry_count, 2);
    assert_eq!(result.revision_feedback.as_deref(), Some("add more statistics"));
}

// With no retry budget at all, a rejection terminates as plain rejected.
#[tokio::test]
async fn rejection_without_budget_is_rejected() {
    let orchestrator = PipelineOrchestrator::new(
        PipelineConfig::default().with_max_retries(0),
        scripted_set(ScriptedEditor::arc(vec![REJECTION])),
    );

    let result = orchestrator.submit(make_request()).await.unwrap();

    assert_eq!(result.status, TerminalStatus::Rejected);
    assert_eq!(result.retry_count, 0);
    assert_eq!(result.revision_feedback.as_deref(), Some("add more statistics"));
}

// Scenario D: admission is a pure capacity check with no queue.
#[tokio::test]
async fn concurrency_denial_is_immediate_and_slot_is_reusable() {
    let research = SlowWorker::new(
        StageId::Research,
        Duration::from_millis(200),
        "market findings",
    );
    let stages = StageSet::new(
        research.clone(),
        EchoWorker::arc(StageId::Writing, "draft copy"),
        EchoWorker::arc(StageId::Visual, "image prompt"),
        EchoWorker::arc(StageId::Editing, "[APPROVED] fine"),
    );
    let orchestrator = Arc::new(PipelineOrchestrator::new(
        PipelineConfig::default().with_max_concurrent_runs(1),
        stages,
    ));

    let in_flight = {
        let orchestrator = Arc::clone(&orchestrator);
        tokio::spawn(async move { orchestrator.submit(make_request()).await })
    };

    // Let run X reach its slow research stage
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(orchestrator.active_count(), 1);
    let stages_started = research.calls.load(Ordering::SeqCst);

    // Run Y is denied immediately, without starting any stage
    let denied = orchestrator.submit(make_request()).await;
    assert!(matches!(
        denied,
        Err(PipelineError::ConcurrencyLimitExceeded { active: 1, limit: 1 })
    ));
    assert_eq!(research.calls.load(Ordering::SeqCst), stages_started);

    // Once X completes, a new submission is admitted
    let x = in_flight.await.unwrap().unwrap();
    assert_eq!(x.status, TerminalStatus::Approved);
    assert_eq!(orchestrator.active_count(), 0);

    let z = orchestrator.submit(make_request()).await.unwrap();
    assert_eq!(z.status, TerminalStatus::Approved);
}

// A stage worker failure is fatal for the run, with the partial history and
// the message preserved.
#[tokio::test]
async fn stage_failure_aborts_run_with_partial_history() {
    let stages = StageSet::new(
        EchoWorker::arc(StageId::Research, "market findings"),
        Arc::new(FailingWorker {
            stage: StageId::Writing,
        }),
        EchoWorker::arc(StageId::Visual, "image prompt"),
        EchoWorker::arc(StageId::Editing, "[APPROVED] unreachable"),
    );
    let orchestrator = PipelineOrchestrator::new(PipelineConfig::default(), stages);

    let result = orchestrator.submit(make_request()).await.unwrap();

    assert_eq!(result.status, TerminalStatus::Error);
    assert_eq!(result.retry_count, 0);
    assert_eq!(result.stage_results.len(), 2);
    assert!(result.stage_results[0].success);
    assert!(!result.stage_results[1].success);
    assert!(
        result
            .revision_feedback
            .as_deref()
            .unwrap()
            .contains("search backend unavailable")
    );
}

// A configured stage deadline turns a hung worker into a run error.
#[tokio::test(start_paused = true)]
async fn stage_timeout_is_enforced_when_configured() {
    let stages = StageSet::new(
        SlowWorker::new(StageId::Research, Duration::from_secs(3600), "never"),
        EchoWorker::arc(StageId::Writing, "draft copy"),
        EchoWorker::arc(StageId::Visual, "image prompt"),
        EchoWorker::arc(StageId::Editing, "[APPROVED] unreachable"),
    );
    let orchestrator = PipelineOrchestrator::new(
        PipelineConfig::default().with_stage_timeout(Duration::from_millis(100)),
        stages,
    );

    let result = orchestrator.submit(make_request()).await.unwrap();

    assert_eq!(result.status, TerminalStatus::Error);
    assert!(result.revision_feedback.as_deref().unwrap().contains("deadline"));
    assert_eq!(result.stage_results.len(), 1);
    assert!(!result.stage_results[0].success);
}

// In-flight runs are observable through the status API and disappear once
// terminal.
#[tokio::test]
async fn status_reports_in_flight_stage_and_retries() {
    let release = Arc::new(Notify::new());
    let stages = StageSet::new(
        EchoWorker::arc(StageId::Research, "market findings"),
        EchoWorker::arc(StageId::Writing, "draft copy"),
        EchoWorker::arc(StageId::Visual, "image prompt"),
        Arc::new(GatedWorker {
            stage: StageId::Editing,
            release: release.clone(),
        }),
    );
    let orchestrator = Arc::new(PipelineOrchestrator::new(PipelineConfig::default(), stages));

    let run = {
        let orchestrator = Arc::clone(&orchestrator);
        tokio::spawn(async move { orchestrator.submit(make_request()).await })
    };

    // Wait until the run parks in the editing stage
    let mut view = None;
    for _ in 0..100 {
        let active = orchestrator.active_runs();
        if let Some(v) = active.first() {
            if v.status == RunStatus::Editing {
                view = Some(v.clone());
                break;
            }
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    let view = view.expect("run never reached the editing stage");
    assert_eq!(view.current_stage, Some(StageId::Editing));
    assert_eq!(view.retry_count, 0);
    assert_eq!(view.stages_completed, 3);
    assert!(orchestrator.status(view.id).is_some());

    release.notify_one();
    let result = run.await.unwrap().unwrap();
    assert_eq!(result.status, TerminalStatus::Approved);
    assert!(orchestrator.status(view.id).is_none());
    assert!(orchestrator.active_runs().is_empty());
}

// Metrics aggregate across mixed outcomes.
#[tokio::test]
async fn metrics_track_mixed_outcomes() {
    let orchestrator = PipelineOrchestrator::new(
        PipelineConfig::default().with_max_retries(2),
        scripted_set(ScriptedEditor::arc(vec![
            "[APROVADO] great",
            REJECTION,
            REJECTION,
            REJECTION,
        ])),
    );

    let approved = orchestrator.submit(make_request()).await.unwrap();
    assert_eq!(approved.status, TerminalStatus::Approved);

    let exhausted = orchestrator.submit(make_request()).await.unwrap();
    assert_eq!(exhausted.status, TerminalStatus::MaxRetriesExceeded);
    assert_eq!(exhausted.retry_count, 2);

    let snap = orchestrator.metrics();
    assert_eq!(snap.total_runs, 2);
    assert_eq!(snap.successful_runs, 1);
    assert_eq!(snap.failed_runs, 1);
    assert!((snap.approval_rate - 0.5).abs() < f64::EPSILON);
    assert!((snap.avg_retries - 1.0).abs() < 1e-9);
    assert_eq!(snap.recent_runs.len(), 2);
    assert_eq!(snap.recent_runs[0].run_id, approved.run_id);
    assert_eq!(snap.recent_runs[1].run_id, exhausted.run_id);
}
