//! Stage identifiers, per-stage artifacts, and the worker seam.
//!
//! The pipeline runs a fixed four-stage sequence. Workers are resolved once
//! at construction through [`StageSet`] rather than looked up by name at
//! call time, so a missing stage is a compile error instead of a runtime
//! surprise.

use crate::request::ContentRequest;
use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// Identifier for one stage of the content pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageId {
    Research,
    Writing,
    Visual,
    Editing,
}

impl StageId {
    /// Fixed execution order. Editing is always last; its artifact is what
    /// the decision classifier inspects.
    pub const SEQUENCE: [StageId; 4] = [
        StageId::Research,
        StageId::Writing,
        StageId::Visual,
        StageId::Editing,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            StageId::Research => "research",
            StageId::Writing => "writing",
            StageId::Visual => "visual",
            StageId::Editing => "editing",
        }
    }
}

impl fmt::Display for StageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Artifact produced by one stage attempt. Immutable after creation and
/// owned by the run that produced it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageResult {
    /// Which stage produced this artifact.
    pub stage: StageId,
    /// Whether the worker completed successfully.
    pub success: bool,
    /// The artifact text (empty on failure).
    pub content: String,
    /// Worker-defined metadata (model used, token counts, source URLs).
    #[serde(default)]
    pub metadata: HashMap<String, String>,
    /// Wall-clock time the worker spent.
    #[serde(with = "duration_serde")]
    pub duration: Duration,
    /// Error message if the worker failed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl StageResult {
    /// Create a successful stage result.
    pub fn success(stage: StageId, content: impl Into<String>, duration: Duration) -> Self {
        Self {
            stage,
            success: true,
            content: content.into(),
            metadata: HashMap::new(),
            duration,
            error: None,
        }
    }

    /// Create a failed stage result.
    pub fn failure(stage: StageId, error: &str, duration: Duration) -> Self {
        Self {
            stage,
            success: false,
            content: String::new(),
            metadata: HashMap::new(),
            duration,
            error: Some(error.to_string()),
        }
    }

    /// Attach a metadata entry.
    pub fn with_metadata(mut self, key: &str, value: &str) -> Self {
        self.metadata.insert(key.to_string(), value.to_string());
        self
    }
}

/// One worker per stage. Implementations wrap the actual content producers
/// (search, copywriting, visual prompting, editorial review) and must be
/// safe to re-invoke when the pipeline retries after a rejection.
#[async_trait]
pub trait StageWorker: Send + Sync {
    /// Produce this stage's artifact from the request and the accumulated
    /// artifacts of all prior stages in the same attempt.
    async fn execute(
        &self,
        request: &ContentRequest,
        prior: &[StageResult],
    ) -> Result<StageResult>;
}

/// The full set of stage workers, one per [`StageId`], resolved at
/// construction time.
#[derive(Clone)]
pub struct StageSet {
    research: Arc<dyn StageWorker>,
    writing: Arc<dyn StageWorker>,
    visual: Arc<dyn StageWorker>,
    editing: Arc<dyn StageWorker>,
}

impl StageSet {
    pub fn new(
        research: Arc<dyn StageWorker>,
        writing: Arc<dyn StageWorker>,
        visual: Arc<dyn StageWorker>,
        editing: Arc<dyn StageWorker>,
    ) -> Self {
        Self {
            research,
            writing,
            visual,
            editing,
        }
    }

    /// Look up the worker for a stage.
    pub fn worker(&self, stage: StageId) -> &Arc<dyn StageWorker> {
        match stage {
            StageId::Research => &self.research,
            StageId::Writing => &self.writing,
            StageId::Visual => &self.visual,
            StageId::Editing => &self.editing,
        }
    }
}

/// Serde helpers for Duration serialization (milliseconds).
pub(crate) mod duration_serde {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        duration.as_millis().serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(millis))
    }
}
