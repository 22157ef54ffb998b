//! Two-tier deduplication
//!
//! Tier A asks the extraction service to merge duplicates; Tier B is a
//! deterministic rule pass. `select_tier_a` decides whether a Tier A result
//! is usable, and the `Deduplicator` falls back to Tier B whenever it is not.
//! An accepted Tier A result still keeps at most one phone number per layer.

pub mod llm;
pub mod rules;
pub mod strategy;

pub use llm::LlmDedup;
pub use rules::{collapse_phones, RuleDedup};
pub use strategy::{select_tier_a, DedupAttempt, DedupStrategy, FallbackReason};

use crate::extraction::LayeredFacts;
use serde::Serialize;

/// Which tier produced a deduplicated result
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "tier", rename_all = "snake_case")]
pub enum DedupTier {
    /// Nothing to deduplicate, no call was made
    Skipped,
    /// The primary strategy's result was accepted
    Primary,
    /// The rule-based fallback ran
    Fallback { reason: FallbackReason },
}

/// Deduplicated facts and the tier that produced them
#[derive(Debug, Clone)]
pub struct DedupOutcome {
    pub facts: LayeredFacts,
    pub tier: DedupTier,
}

/// Runs a primary strategy and falls back to the rule pass
pub struct Deduplicator {
    primary: Box<dyn DedupStrategy>,
    fallback: RuleDedup,
}

impl Deduplicator {
    /// Primary strategy with the rule pass as fallback
    pub fn new(primary: Box<dyn DedupStrategy>, fallback: RuleDedup) -> Self {
        Self { primary, fallback }
    }

    /// Rule pass as the only strategy
    pub fn rules_only(rules: RuleDedup) -> Self {
        Self {
            primary: Box::new(rules.clone()),
            fallback: rules,
        }
    }

    /// Deduplicate merged candidates for a user
    pub async fn deduplicate(&self, user_id: &str, facts: LayeredFacts) -> DedupOutcome {
        if facts.is_empty() {
            return DedupOutcome {
                facts,
                tier: DedupTier::Skipped,
            };
        }

        let primary = &self.primary;
        let attempt = primary.attempt(user_id, &facts).await;
        match select_tier_a(&facts, attempt) {
            Ok(accepted) => {
                let accepted = collapse_phones(accepted);
                tracing::info!(
                    user_id = %user_id,
                    strategy = primary.name(),
                    before = facts.total(),
                    after = accepted.total(),
                    "Deduplication complete"
                );
                DedupOutcome {
                    facts: accepted,
                    tier: DedupTier::Primary,
                }
            }
            Err(reason) => {
                tracing::warn!(
                    user_id = %user_id,
                    strategy = primary.name(),
                    reason = %reason,
                    "Falling back to rule-based deduplication"
                );
                let deduplicated = self.fallback.apply(&facts);
                tracing::info!(
                    user_id = %user_id,
                    before = facts.total(),
                    after = deduplicated.total(),
                    "Rule-based deduplication complete"
                );
                DedupOutcome {
                    facts: deduplicated,
                    tier: DedupTier::Fallback { reason },
                }
            }
        }
    }
}
