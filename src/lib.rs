//! crewline — content pipeline orchestrator.
//!
//! Drives a fixed sequence of specialist content stages (research, writing,
//! visual prompting, editorial review) through an approval-gated, bounded
//! retry loop. Stage workers are injected behind the [`stage::StageWorker`]
//! trait; this crate owns only the sequencing, verdict classification,
//! admission control, and run metrics.

pub mod config;
pub mod context;
pub mod decision;
pub mod errors;
pub mod gate;
pub mod metrics;
pub mod orchestrator;
pub mod request;
pub mod result;
pub mod stage;
pub mod telemetry;

pub use config::PipelineConfig;
pub use context::{RunStatus, RunStatusView};
pub use decision::{Decision, DecisionClassifier, FeedbackExtractor};
pub use errors::{PipelineError, StageError};
pub use metrics::MetricsSnapshot;
pub use orchestrator::PipelineOrchestrator;
pub use request::ContentRequest;
pub use result::{PipelineResult, TerminalStatus};
pub use stage::{StageId, StageResult, StageSet, StageWorker};
