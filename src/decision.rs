//! Reviewer verdict classification and feedback extraction.
//!
//! The editing stage ends with free-form reviewer text. [`DecisionClassifier`]
//! turns that text into a [`Decision`] using a fixed priority ladder:
//! explicit bracketed markers, then bare keywords near the start of the text,
//! then sentiment heuristics, then [`Decision::Pending`]. The ladder is
//! best-effort; the classifier reports which rung matched so callers can
//! treat non-marker verdicts as lower confidence.

use regex::Regex;
use serde::{Deserialize, Serialize};

/// Classified verdict of the editorial review stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Decision {
    Approved,
    Rejected,
    NeedsRevision,
    /// No verdict could be determined. The orchestrator treats this as a
    /// fatal run error since no automatic action is defined for it.
    #[default]
    Pending,
}

/// Which rung of the classification ladder produced the decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DecisionConfidence {
    /// An explicit bracketed marker was found.
    Marker,
    /// A bare keyword appeared in the leading tokens.
    Keyword,
    /// Only sentiment vocabulary matched.
    Sentiment,
    /// Nothing matched.
    Unmatched,
}

/// A decision together with how it was reached.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Classification {
    pub decision: Decision,
    pub confidence: DecisionConfidence,
}

/// How many leading whitespace-delimited tokens the keyword rung inspects.
const KEYWORD_WINDOW: usize = 10;

/// Parses reviewer text into a [`Decision`]. Recognizes English and
/// Portuguese marker and keyword forms; the review workers emit either.
pub struct DecisionClassifier {
    approved_marker: Regex,
    rejected_marker: Regex,
    revision_marker: Regex,
}

impl Default for DecisionClassifier {
    fn default() -> Self {
        Self::new()
    }
}

impl DecisionClassifier {
    pub fn new() -> Self {
        // The patterns are fixed and known-valid, so construction cannot fail.
        Self {
            approved_marker: Regex::new(r"(?i)\[\s*(approved|aprovado)\s*\]").unwrap(),
            rejected_marker: Regex::new(r"(?i)\[\s*(rejected|rejeitado)\s*\]").unwrap(),
            revision_marker: Regex::new(r"(?i)\[\s*(needs\s+revision|revis[aã]o\s+necess[aá]ria)\s*\]")
                .unwrap(),
        }
    }

    /// Classify reviewer text, reporting the match tier alongside the verdict.
    pub fn classify(&self, text: &str) -> Classification {
        if let Some(decision) = self.match_marker(text) {
            return Classification {
                decision,
                confidence: DecisionConfidence::Marker,
            };
        }

        if let Some(decision) = self.match_leading_keyword(text) {
            return Classification {
                decision,
                confidence: DecisionConfidence::Keyword,
            };
        }

        if let Some(decision) = self.match_sentiment(text) {
            return Classification {
                decision,
                confidence: DecisionConfidence::Sentiment,
            };
        }

        Classification {
            decision: Decision::Pending,
            confidence: DecisionConfidence::Unmatched,
        }
    }

    fn match_marker(&self, text: &str) -> Option<Decision> {
        if self.approved_marker.is_match(text) {
            Some(Decision::Approved)
        } else if self.rejected_marker.is_match(text) {
            Some(Decision::Rejected)
        } else if self.revision_marker.is_match(text) {
            Some(Decision::NeedsRevision)
        } else {
            None
        }
    }

    fn match_leading_keyword(&self, text: &str) -> Option<Decision> {
        for token in text.split_whitespace().take(KEYWORD_WINDOW) {
            let word = token
                .trim_matches(|c: char| !c.is_alphanumeric())
                .to_lowercase();
            match word.as_str() {
                "approved" | "aprovado" => return Some(Decision::Approved),
                "rejected" | "rejeitado" => return Some(Decision::Rejected),
                "revision" | "revisão" | "revisao" => return Some(Decision::NeedsRevision),
                _ => {}
            }
        }
        None
    }

    fn match_sentiment(&self, text: &str) -> Option<Decision> {
        let lowered = text.to_lowercase();

        const POSITIVE: [&str; 6] = [
            "excellent",
            "perfect",
            "excelente",
            "perfeito",
            "ótimo",
            "otimo",
        ];
        const NEGATIVE: [&str; 5] = [
            "needs improvement",
            "does not meet",
            "precisa melhorar",
            "não atende",
            "nao atende",
        ];

        if POSITIVE.iter().any(|w| lowered.contains(w)) {
            Some(Decision::Approved)
        } else if NEGATIVE.iter().any(|w| lowered.contains(w)) {
            Some(Decision::NeedsRevision)
        } else {
            None
        }
    }
}

/// Pluggable extraction of actionable feedback from reviewer text.
pub trait FeedbackExtractor: Send + Sync {
    fn extract(&self, text: &str) -> String;
}

/// Default extractor: find a feedback/improvements section header and
/// collect the lines that follow it until the first blank line; fall back to
/// a prefix of the whole text when no section is found.
pub struct HeuristicFeedbackExtractor {
    fallback_chars: usize,
}

impl HeuristicFeedbackExtractor {
    pub fn new(fallback_chars: usize) -> Self {
        Self { fallback_chars }
    }
}

impl Default for HeuristicFeedbackExtractor {
    fn default() -> Self {
        Self::new(500)
    }
}

impl FeedbackExtractor for HeuristicFeedbackExtractor {
    fn extract(&self, text: &str) -> String {
        let mut section = Vec::new();
        let mut in_section = false;

        for line in text.lines() {
            let lowered = line.to_lowercase();
            if lowered.contains("feedback")
                || lowered.contains("improvements")
                || lowered.contains("melhorias")
            {
                in_section = true;
            } else if in_section && !line.trim().is_empty() {
                section.push(line.trim());
            } else if in_section {
                break;
            }
        }

        if section.is_empty() {
            // Char-boundary safe prefix; reviewer text is frequently non-ASCII.
            text.chars().take(self.fallback_chars).collect()
        } else {
            section.join("\n")
        }
    }
}
