//! Tier B: deterministic rule-based deduplication
//!
//! Candidates are grouped by fact type within each layer, groups keep the
//! order in which their type was first seen, and each group is reduced:
//!
//! - `phone_number`: only the highest-confidence candidate survives, ties go
//!   to the first one seen
//! - `email`: values equal after normalization are duplicates
//! - everything else: values whose normalized similarity reaches the
//!   threshold are duplicates
//!
//! Of two duplicates the higher-confidence one stays, in the slot of the
//! earlier one. A group is reduced until no pair inside it is a duplicate,
//! which makes the pass idempotent.

use super::strategy::{DedupAttempt, DedupStrategy};
use crate::extraction::{normalize_text, ratio, FactCandidate, LayeredFacts};
use async_trait::async_trait;

/// Rule-based deduplication
#[derive(Debug, Clone)]
pub struct RuleDedup {
    similarity_threshold: u8,
}

impl Default for RuleDedup {
    fn default() -> Self {
        Self::new(85)
    }
}

impl RuleDedup {
    pub fn new(similarity_threshold: u8) -> Self {
        Self {
            similarity_threshold,
        }
    }

    /// Deduplicate every layer. Layer keys are preserved.
    pub fn apply(&self, facts: &LayeredFacts) -> LayeredFacts {
        facts
            .iter()
            .map(|(layer, candidates)| (layer, self.dedup_layer(candidates)))
            .collect()
    }

    /// Deduplicate one layer's candidates
    pub fn dedup_layer(&self, candidates: &[FactCandidate]) -> Vec<FactCandidate> {
        let mut groups: Vec<(String, Vec<FactCandidate>)> = Vec::new();
        for candidate in candidates {
            let key = candidate.fact_type.trim().to_lowercase();
            match groups.iter_mut().find(|(k, _)| *k == key) {
                Some((_, group)) => group.push(candidate.clone()),
                None => groups.push((key, vec![candidate.clone()])),
            }
        }

        groups
            .into_iter()
            .flat_map(|(key, group)| self.reduce_group(&key, group))
            .collect()
    }

    fn reduce_group(&self, fact_type: &str, group: Vec<FactCandidate>) -> Vec<FactCandidate> {
        if fact_type == "phone_number" {
            return keep_most_confident(group).into_iter().collect();
        }

        let mut current = group;
        loop {
            let before = current.len();
            current = self.merge_pass(fact_type, current);
            if current.len() == before {
                return current;
            }
        }
    }

    /// One left-to-right pass merging each candidate into the first kept
    /// duplicate
    fn merge_pass(&self, fact_type: &str, group: Vec<FactCandidate>) -> Vec<FactCandidate> {
        let mut kept: Vec<(FactCandidate, String)> = Vec::new();

        for candidate in group {
            let normalized = normalize_text(&candidate.value);
            let existing = kept
                .iter()
                .position(|(_, seen)| self.is_duplicate(fact_type, &normalized, seen));
            match existing {
                Some(i) => {
                    if candidate.confidence > kept[i].0.confidence {
                        kept[i] = (candidate, normalized);
                    }
                }
                None => kept.push((candidate, normalized)),
            }
        }

        kept.into_iter().map(|(c, _)| c).collect()
    }

    fn is_duplicate(&self, fact_type: &str, a: &str, b: &str) -> bool {
        if fact_type == "email" {
            a == b
        } else {
            a == b || ratio(a, b) >= self.similarity_threshold
        }
    }
}

/// Highest confidence wins, the first seen wins ties
fn keep_most_confident(group: Vec<FactCandidate>) -> Option<FactCandidate> {
    group.into_iter().reduce(|best, candidate| {
        if candidate.confidence > best.confidence {
            candidate
        } else {
            best
        }
    })
}

/// Keep only the most confident `phone_number` in each layer, placed in the
/// slot of the first phone seen. Other candidates are left as they are.
pub fn collapse_phones(facts: LayeredFacts) -> LayeredFacts {
    facts
        .into_iter()
        .map(|(layer, candidates)| (layer, collapse_layer_phones(candidates)))
        .collect()
}

fn collapse_layer_phones(candidates: Vec<FactCandidate>) -> Vec<FactCandidate> {
    let is_phone = |c: &FactCandidate| c.fact_type.trim().eq_ignore_ascii_case("phone_number");
    let phones: Vec<FactCandidate> = candidates.iter().filter(|&c| is_phone(c)).cloned().collect();
    if phones.len() < 2 {
        return candidates;
    }
    let Some(best) = keep_most_confident(phones) else {
        return candidates;
    };

    let mut placed = false;
    candidates
        .into_iter()
        .filter_map(|c| {
            if !is_phone(&c) {
                Some(c)
            } else if placed {
                None
            } else {
                placed = true;
                Some(best.clone())
            }
        })
        .collect()
}

#[async_trait]
impl DedupStrategy for RuleDedup {
    fn name(&self) -> &'static str {
        "rules"
    }

    async fn attempt(&self, _user_id: &str, facts: &LayeredFacts) -> DedupAttempt {
        DedupAttempt::Parsed(self.apply(facts))
    }
}
