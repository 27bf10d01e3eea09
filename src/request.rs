//! The immutable content request that seeds a pipeline run.

use anyhow::{Result, bail};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A request for platform-specific marketing content. Created by the caller,
/// never mutated; retries derive an enriched copy via
/// [`with_supplementary_instructions`](ContentRequest::with_supplementary_instructions).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContentRequest {
    /// What the content is about.
    pub topic: String,
    /// Target platform identifiers, in priority order. Never empty.
    pub platforms: Vec<String>,
    /// Who the content is for.
    pub target_audience: String,
    /// What the content should achieve.
    pub objective: String,
    /// Optional tone of voice ("professional", "playful", ...).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tone: Option<String>,
    /// Free-text instructions passed through to every stage.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub special_instructions: Option<String>,
    /// Optional publication deadline.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deadline: Option<DateTime<Utc>>,
}

impl ContentRequest {
    /// Create a request. Fails if no target platform is given.
    pub fn new(
        topic: impl Into<String>,
        platforms: Vec<String>,
        target_audience: impl Into<String>,
        objective: impl Into<String>,
    ) -> Result<Self> {
        if platforms.is_empty() {
            bail!("Content request needs at least one target platform");
        }
        Ok(Self {
            topic: topic.into(),
            platforms,
            target_audience: target_audience.into(),
            objective: objective.into(),
            tone: None,
            special_instructions: None,
            deadline: None,
        })
    }

    pub fn with_tone(mut self, tone: &str) -> Self {
        self.tone = Some(tone.to_string());
        self
    }

    pub fn with_special_instructions(mut self, instructions: &str) -> Self {
        self.special_instructions = Some(instructions.to_string());
        self
    }

    pub fn with_deadline(mut self, deadline: DateTime<Utc>) -> Self {
        self.deadline = Some(deadline);
        self
    }

    /// Derive a copy with reviewer feedback appended to the special
    /// instructions, so stage workers on the next attempt can react to it.
    pub fn with_supplementary_instructions(&self, feedback: &str) -> Self {
        let base = self
            .special_instructions
            .as_deref()
            .unwrap_or("Create engaging, professional content");
        let enriched = format!(
            "**REVIEWER FEEDBACK FROM PREVIOUS ATTEMPT:**\n{feedback}\n\n\
             **ORIGINAL INSTRUCTIONS:**\n{base}"
        );
        Self {
            special_instructions: Some(enriched),
            ..self.clone()
        }
    }
}
