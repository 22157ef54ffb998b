//! Extraction Validator
//!
//! Applied to one chunk's raw result before merging. Rules run in a fixed
//! order per candidate:
//!
//! 1. relation-typed facts whose value is a bare relation word are dropped
//! 2. facts backed by a contentless snippet ("thanks", "ok") are dropped
//! 3. travel facts filed under Layer1 move to Layer4
//! 4. facts below the confidence floor are dropped
//!
//! Layers left with no candidates are omitted from the output.

use super::similarity::normalize_text;
use super::types::{FactCandidate, Layer, LayeredFacts};
use serde::Serialize;

/// Fact types that name a relation
pub const RELATION_FACT_TYPES: &[&str] = &["relationship", "family_member", "spouse"];

/// Relation words that are not a name on their own
pub const BARE_RELATION_WORDS: &[&str] = &[
    "wife", "husband", "nephew", "niece", "son", "daughter", "brother", "sister", "mother",
    "father", "aunt", "uncle", "cousin", "friend", "colleague",
];

/// Snippets that carry no information
pub const CONTENTLESS_PHRASES: &[&str] = &[
    "thanks guys",
    "thank you",
    "thanks",
    "ok",
    "okay",
    "yes",
    "no",
    "sure",
    "great",
    "perfect",
    "sounds good",
    "alright",
];

/// Travel fact types that belong in Layer4, not Layer1
pub const TRAVEL_FACT_TYPES: &[&str] = &["travel_plan", "flight_number", "travel_date"];

/// Whether `(fact_type, value)` is a relation fact holding only a relation word
pub fn is_bare_relation(fact_type: &str, value: &str) -> bool {
    let fact_type = fact_type.trim().to_lowercase();
    RELATION_FACT_TYPES.contains(&fact_type.as_str())
        && BARE_RELATION_WORDS.contains(&normalize_text(value).as_str())
}

/// Whether a snippet is a contentless phrase, ignoring case, spacing and
/// trailing punctuation
pub fn is_contentless(snippet: &str) -> bool {
    let normalized = normalize_text(snippet);
    let trimmed = normalized.trim_end_matches(|c: char| c.is_ascii_punctuation());
    CONTENTLESS_PHRASES.contains(&trimmed.trim())
}

/// Counters for one validation pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ValidationStats {
    pub bare_relation: usize,
    pub contentless_evidence: usize,
    pub relocated: usize,
    pub low_confidence: usize,
    pub kept: usize,
}

impl std::ops::AddAssign for ValidationStats {
    fn add_assign(&mut self, other: Self) {
        self.bare_relation += other.bare_relation;
        self.contentless_evidence += other.contentless_evidence;
        self.relocated += other.relocated;
        self.low_confidence += other.low_confidence;
        self.kept += other.kept;
    }
}

/// Deterministic per-chunk validation policy
#[derive(Debug, Clone)]
pub struct Validator {
    min_confidence: f64,
}

impl Default for Validator {
    fn default() -> Self {
        Self::new(0.75)
    }
}

impl Validator {
    pub fn new(min_confidence: f64) -> Self {
        Self { min_confidence }
    }

    /// Confidence floor; NaN never passes
    pub fn meets_confidence(&self, confidence: f64) -> bool {
        confidence >= self.min_confidence
    }

    /// Validate one chunk's raw result
    pub fn validate(&self, raw: LayeredFacts) -> (LayeredFacts, ValidationStats) {
        let mut stats = ValidationStats::default();
        let mut out = LayeredFacts::new();

        for (layer, candidates) in raw {
            for mut candidate in candidates {
                candidate.layer = layer;

                if is_bare_relation(&candidate.fact_type, &candidate.value) {
                    tracing::debug!(
                        fact_type = %candidate.fact_type,
                        value = %candidate.value,
                        "Dropping bare relation word"
                    );
                    stats.bare_relation += 1;
                    continue;
                }

                if candidate.evidence.iter().any(|e| is_contentless(&e.snippet)) {
                    tracing::debug!(
                        fact_type = %candidate.fact_type,
                        "Dropping fact backed by contentless evidence"
                    );
                    stats.contentless_evidence += 1;
                    continue;
                }

                if candidate.layer == Layer::Identity
                    && TRAVEL_FACT_TYPES
                        .contains(&candidate.fact_type.trim().to_lowercase().as_str())
                {
                    candidate.layer = Layer::Preferences;
                    stats.relocated += 1;
                }

                if !self.meets_confidence(candidate.confidence) {
                    tracing::debug!(
                        fact_type = %candidate.fact_type,
                        confidence = candidate.confidence,
                        "Dropping low-confidence fact"
                    );
                    stats.low_confidence += 1;
                    continue;
                }

                stats.kept += 1;
                out.push(candidate);
            }
        }

        (out, stats)
    }
}
